//! Database migration command.
//!
//! ```bash
//! rc-cli migrate
//! ```
//!
//! Migrations live in `crates/api/migrations/` and create the `app`
//! schema, including the `app.session` table used by the session store.

use super::{CommandError, connect};

/// Run all pending migrations.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../api/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
