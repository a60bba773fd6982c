//! Admin back office: dashboard and user management.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};

use reality_cheque_core::{AdminId, Tier, UserId};

use crate::db::RepositoryError;
use crate::db::dashboard::{DashboardRepository, TierCount, Totals};
use crate::db::users::UserRepository;
use crate::models::User;
use crate::services::credits::CreditService;

/// Users shown in the dashboard's "recent signups" list.
const RECENT_USERS: i64 = 5;

/// Largest page of users an admin can request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Admin dashboard payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    #[serde(flatten)]
    pub totals: Totals,
    /// One entry per tier, including tiers without users.
    pub users_by_tier: Vec<TierCount>,
    pub recent_users: Vec<User>,
}

/// Paging parameters for the user list.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

const fn default_page() -> i64 {
    1
}

const fn default_page_size() -> i64 {
    20
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl Page {
    /// `(limit, offset)` with out-of-range values clamped.
    #[must_use]
    pub fn limit_offset(self) -> (i64, i64) {
        let size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        let page = self.page.max(1);
        (size, (page - 1).saturating_mul(size))
    }
}

/// One page of users.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// Fill in zero counts for tiers nobody is on, lowest tier first.
#[must_use]
pub fn complete_tier_counts(counts: &[TierCount]) -> Vec<TierCount> {
    Tier::ALL
        .iter()
        .map(|&tier| TierCount {
            tier,
            users: counts
                .iter()
                .find(|c| c.tier == tier)
                .map_or(0, |c| c.users),
        })
        .collect()
}

/// Admin service.
pub struct AdminService<'a> {
    pool: &'a PgPool,
    users: UserRepository<'a>,
}

impl<'a> AdminService<'a> {
    /// Create a new admin service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            users: UserRepository::new(pool),
        }
    }

    /// Platform totals, users per tier and the latest signups.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[instrument(skip(self))]
    pub async fn dashboard(&self) -> Result<Dashboard, RepositoryError> {
        let repo = DashboardRepository::new(self.pool);
        let totals = repo.totals().await?;
        let users_by_tier = complete_tier_counts(&repo.users_by_tier().await?);
        let recent_users = self.users.list(RECENT_USERS, 0).await?;

        Ok(Dashboard {
            totals,
            users_by_tier,
            recent_users,
        })
    }

    /// List users, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_users(&self, page: Page) -> Result<UserPage, RepositoryError> {
        let (limit, offset) = page.limit_offset();
        let users = self.users.list(limit, offset).await?;
        let total = self.users.count().await?;

        Ok(UserPage {
            users,
            total,
            page: page.page.max(1),
            page_size: limit,
        })
    }

    /// Add credits to a user's balance. Returns the new remaining balance.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    #[instrument(skip(self), fields(admin_id = %admin_id, user_id = %user_id))]
    pub async fn grant_credits(
        &self,
        admin_id: AdminId,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<Decimal, RepositoryError> {
        let remaining = CreditService::new(self.pool).grant(user_id, amount).await?;
        info!(amount = %amount, "Admin granted credits");
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_tier_counts_fills_gaps() {
        let counts = vec![TierCount {
            tier: Tier::Tier2,
            users: 4,
        }];
        let complete = complete_tier_counts(&counts);
        let flat: Vec<(Tier, i64)> = complete.iter().map(|c| (c.tier, c.users)).collect();
        assert_eq!(
            flat,
            vec![(Tier::Tier1, 0), (Tier::Tier2, 4), (Tier::Tier3, 0)]
        );
    }

    #[test]
    fn test_page_clamping() {
        assert_eq!(Page::default().limit_offset(), (20, 0));
        assert_eq!(
            Page {
                page: 3,
                page_size: 10
            }
            .limit_offset(),
            (10, 20)
        );
        assert_eq!(
            Page {
                page: 0,
                page_size: 1000
            }
            .limit_offset(),
            (MAX_PAGE_SIZE, 0)
        );
        assert_eq!(
            Page {
                page: -4,
                page_size: 0
            }
            .limit_offset(),
            (1, 0)
        );
    }
}
