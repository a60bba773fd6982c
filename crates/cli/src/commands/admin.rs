//! Admin account commands.
//!
//! ```bash
//! rc-cli admin create -u ops_lead -e ops@example.com -p 'long enough secret'
//! ```
//!
//! Admins have no self-registration; this is how the first one is made.

use secrecy::SecretString;

use reality_cheque_api::services::{AuthError, AuthService};

use super::{CommandError, connect};

/// Create an admin account and return its id.
pub async fn create(username: &str, email: &str, password: &str) -> Result<i32, CommandError> {
    let pool = connect().await?;
    // Creating an account issues no token
    let unused_secret = SecretString::from(String::new());

    tracing::info!("Creating admin: {} <{}>", username, email);
    let admin = AuthService::new(&pool, &unused_secret)
        .create_admin(username, email, password)
        .await
        .map_err(|e| match e {
            AuthError::UserAlreadyExists => {
                CommandError::Rejected(format!("Admin already exists: {username} / {email}"))
            }
            other => CommandError::Rejected(other.to_string()),
        })?;

    tracing::info!(
        "Admin created successfully! ID: {}, Username: {}",
        admin.id,
        admin.username
    );
    Ok(admin.id.as_i32())
}
