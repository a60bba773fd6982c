//! Credit accounting.
//!
//! Balances are dollar amounts. Spending goes through [`CreditService::debit`],
//! which never lets `used_credits` exceed `total_credits`.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use reality_cheque_core::{Tier, UserId};

use crate::db::RepositoryError;
use crate::db::users::{Debit, UserRepository};
use crate::models::User;

/// Whether `user` may start another generation (`remaining > 0.01`).
#[must_use]
pub fn check_user_credits(user: &User) -> bool {
    user.has_credits()
}

/// A user's balance as shown to them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub tier: Tier,
    pub total_credits: Decimal,
    pub used_credits: Decimal,
    pub remaining_credits: Decimal,
    pub has_credits: bool,
}

impl From<&User> for CreditBalance {
    fn from(user: &User) -> Self {
        Self {
            tier: user.tier,
            total_credits: user.total_credits,
            used_credits: user.used_credits,
            remaining_credits: user.remaining_credits(),
            has_credits: check_user_credits(user),
        }
    }
}

/// Credit service.
pub struct CreditService<'a> {
    users: UserRepository<'a>,
}

impl<'a> CreditService<'a> {
    /// Create a new credit service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
        }
    }

    /// Current balance of a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn balance(&self, user_id: UserId) -> Result<CreditBalance, RepositoryError> {
        let user = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(CreditBalance::from(&user))
    }

    /// Charge `cost` dollars. Never overdraws; a capped charge is logged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    #[instrument(skip(self), fields(user_id = %user_id, cost = %cost))]
    pub async fn debit(&self, user_id: UserId, cost: Decimal) -> Result<Debit, RepositoryError> {
        if cost <= Decimal::ZERO {
            let remaining = self.balance(user_id).await?.remaining_credits;
            return Ok(Debit {
                charged: Decimal::ZERO,
                remaining,
                capped: false,
            });
        }

        let debit = self.users.debit(user_id, cost).await?;
        if debit.capped {
            warn!(charged = %debit.charged, "Debit capped at remaining balance");
        }
        Ok(debit)
    }

    /// Add `amount` dollars to a user's total. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    #[instrument(skip(self), fields(user_id = %user_id, amount = %amount))]
    pub async fn grant(&self, user_id: UserId, amount: Decimal) -> Result<Decimal, RepositoryError> {
        let remaining = self.users.grant(user_id, amount).await?;
        info!(remaining = %remaining, "Credits granted");
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::tests::sample_user;

    #[test]
    fn test_check_user_credits_boundary() {
        let user = sample_user(Decimal::new(10, 0), Decimal::new(9995, 3));
        assert!(!check_user_credits(&user));

        let user = sample_user(Decimal::new(10, 0), Decimal::new(9, 0));
        assert!(check_user_credits(&user));
    }

    #[test]
    fn test_balance_from_user() {
        let user = sample_user(Decimal::new(30, 0), Decimal::new(1250, 2));
        let balance = CreditBalance::from(&user);
        assert_eq!(balance.remaining_credits, Decimal::new(1750, 2));
        assert!(balance.has_credits);

        let json = serde_json::to_value(&balance).expect("serialize");
        assert_eq!(json["remainingCredits"], "17.50");
        assert_eq!(json["tier"], "tier2");
    }
}
