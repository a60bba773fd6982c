//! Aggregate queries for the admin dashboard.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use reality_cheque_core::Tier;

use super::RepositoryError;

/// Users on one tier.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TierCount {
    pub tier: Tier,
    pub users: i64,
}

/// Platform-wide totals.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total_users: i64,
    pub active_chats: i64,
    pub total_messages: i64,
    pub credits_issued: Decimal,
    pub credits_used: Decimal,
    pub total_tokens: i64,
    pub total_cost: Decimal,
    pub active_vouchers: i64,
}

/// Repository for dashboard queries.
pub struct DashboardRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DashboardRepository<'a> {
    /// Create a new dashboard repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Platform-wide totals.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn totals(&self) -> Result<Totals, RepositoryError> {
        let totals = sqlx::query_as::<_, Totals>(
            r"
            SELECT
                (SELECT COUNT(*) FROM app.users) AS total_users,
                (SELECT COUNT(*) FROM app.chats WHERE is_active) AS active_chats,
                (SELECT COUNT(*) FROM app.messages) AS total_messages,
                (SELECT COALESCE(SUM(total_credits), 0) FROM app.users) AS credits_issued,
                (SELECT COALESCE(SUM(used_credits), 0) FROM app.users) AS credits_used,
                (SELECT COALESCE(SUM(total_tokens), 0)::BIGINT FROM app.chats) AS total_tokens,
                (SELECT COALESCE(SUM(total_cost), 0) FROM app.chats) AS total_cost,
                (SELECT COUNT(*) FROM app.vouchers
                 WHERE is_active AND NOW() BETWEEN valid_from AND valid_until
                   AND used_count < max_uses) AS active_vouchers
            ",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(totals)
    }

    /// User counts per tier, lowest tier first. Tiers without users are omitted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn users_by_tier(&self) -> Result<Vec<TierCount>, RepositoryError> {
        let rows = sqlx::query_as::<_, TierCount>(
            r"
            SELECT tier, COUNT(*) AS users
            FROM app.users
            GROUP BY tier
            ORDER BY tier
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }
}
