//! Database operations for the `app` schema in `PostgreSQL`.
//!
//! ## Tables
//!
//! - `users` - Accounts, tier, credit balances and agency profile
//! - `admins` - Admin accounts (separate table and role)
//! - `session` - Cookie session storage (tower-sessions)
//! - `categories`, `features`, `ai_models`, `ai_model_feature` - Bot catalog
//! - `chats`, `messages` - Conversation history
//! - `vouchers` - Discount codes
//!
//! Queries are built at runtime with `sqlx::query_as::<_, Row>` and mapped
//! from private row structs into [`crate::models`] types.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p reality-cheque-cli -- migrate
//! ```

pub mod admins;
pub mod catalog;
pub mod chats;
pub mod dashboard;
pub mod users;
pub mod vouchers;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use admins::AdminRepository;
pub use catalog::CatalogRepository;
pub use chats::ChatRepository;
pub use dashboard::DashboardRepository;
pub use users::UserRepository;
pub use vouchers::VoucherRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to [`RepositoryError::Conflict`] with `message`.
    pub(crate) fn unique_or(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
