//! Admin domain types.
//!
//! Admins authenticate the same way users do (argon2 password) but live in a
//! separate table and only ever hold bearer tokens.

use chrono::{DateTime, Utc};
use serde::Serialize;

use reality_cheque_core::{AdminId, Email};

/// An admin account (domain type).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: AdminId,
    pub username: String,
    pub email: Email,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
