//! Account self-service: profile, deletion and plan changes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};

use reality_cheque_core::{Email, Tier, UserId, VoucherType};

use crate::db::RepositoryError;
use crate::db::users::{ProfileUpdate, UserRepository};
use crate::models::{Gig, User, UserProfile};
use crate::services::auth::validate_username;
use crate::services::voucher::{VoucherError, VoucherOutcome, VoucherService};

/// Errors from account operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Voucher(#[from] VoucherError),

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for UserError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

/// Profile edit submitted by the user. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub profile: UserProfile,
    #[serde(default)]
    pub gigs: Option<Vec<Gig>>,
}

impl ProfileInput {
    /// Validate and convert into a repository update.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Invalid` for a malformed username, email or gig.
    pub fn into_update(self) -> Result<ProfileUpdate, UserError> {
        let username = self
            .username
            .map(|u| validate_username(&u))
            .transpose()
            .map_err(|e| UserError::Invalid(e.to_string()))?;
        let email = self
            .email
            .map(|e| Email::parse(&e))
            .transpose()
            .map_err(|e| UserError::Invalid(e.to_string()))?;

        if let Some(gigs) = &self.gigs
            && gigs.iter().any(|g| g.title.trim().is_empty())
        {
            return Err(UserError::Invalid("Every gig needs a title".to_string()));
        }

        Ok(ProfileUpdate {
            username,
            email,
            profile: self.profile,
            gigs: self.gigs,
        })
    }
}

/// Plan change requested by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanChange {
    pub tier: Tier,
    #[serde(default)]
    pub voucher_code: Option<String>,
}

/// Outcome of a plan change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReceipt {
    pub user: User,
    pub list_price: Decimal,
    pub discount: Decimal,
    pub amount_due: Decimal,
    pub credits_granted: Decimal,
}

/// Price after a percentage discount, never below zero.
#[must_use]
pub fn amount_due(list_price: Decimal, discount: Decimal) -> Decimal {
    (list_price - discount).max(Decimal::ZERO)
}

/// Account service.
pub struct UserService<'a> {
    pool: &'a PgPool,
    users: UserRepository<'a>,
}

impl<'a> UserService<'a> {
    /// Create a new user service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            users: UserRepository::new(pool),
        }
    }

    /// Load a user's profile.
    ///
    /// # Errors
    ///
    /// Returns `UserError::NotFound` if the user does not exist.
    pub async fn get_profile(&self, id: UserId) -> Result<User, UserError> {
        self.users.get_by_id(id).await?.ok_or(UserError::NotFound)
    }

    /// Apply a profile edit.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Invalid` for malformed input and
    /// `UserError::Conflict` if the new username or email is taken.
    #[instrument(skip(self, input), fields(user_id = %id))]
    pub async fn update_profile(&self, id: UserId, input: ProfileInput) -> Result<User, UserError> {
        let update = input.into_update()?;
        let user = self.users.update_profile(id, &update).await?;
        info!("Profile updated");
        Ok(user)
    }

    /// Delete an account. Its chats are deactivated and kept.
    ///
    /// # Errors
    ///
    /// Returns `UserError::NotFound` if the user does not exist.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete_account(&self, id: UserId) -> Result<(), UserError> {
        if !self.users.delete(id).await? {
            return Err(UserError::NotFound);
        }
        info!("Account deleted");
        Ok(())
    }

    /// Move a user to `change.tier`, optionally redeeming a voucher.
    ///
    /// The voucher is redeemed first; a rejected voucher leaves the plan
    /// unchanged. The new tier's monthly allowance is then granted. The
    /// redemption, the tier change and both grants commit together.
    ///
    /// # Errors
    ///
    /// Returns `UserError::Invalid` when the user is already on the tier or
    /// the voucher is rejected.
    #[instrument(skip(self, change), fields(user_id = %id, tier = %change.tier))]
    pub async fn change_plan(&self, id: UserId, change: &PlanChange) -> Result<PlanReceipt, UserError> {
        let user = self.get_profile(id).await?;
        if user.tier == change.tier {
            return Err(UserError::Invalid(format!(
                "Already on the {} plan",
                change.tier
            )));
        }

        let list_price = change.tier.monthly_price();
        let mut discount = Decimal::ZERO;
        let mut credits_granted = Decimal::ZERO;

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        if let Some(code) = change
            .voucher_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            let redemption = match VoucherService::new(self.pool)
                .redeem_on(&mut tx, code, id, list_price, change.tier.as_str())
                .await?
            {
                VoucherOutcome::Accepted(r) => r,
                VoucherOutcome::Rejected(message) => return Err(UserError::Invalid(message)),
            };
            match redemption.voucher_type {
                VoucherType::Percentage => discount = redemption.discount,
                VoucherType::Credits => credits_granted += redemption.credits_granted,
            }
        }

        UserRepository::set_tier(&mut tx, id, change.tier).await?;
        let allowance = change.tier.credit_allowance();
        UserRepository::grant_on(&mut tx, id, allowance).await?;
        credits_granted += allowance;

        tx.commit().await.map_err(RepositoryError::from)?;

        let user = self.get_profile(id).await?;
        info!(discount = %discount, credits_granted = %credits_granted, "Plan changed");

        Ok(PlanReceipt {
            user,
            list_price,
            discount,
            amount_due: amount_due(list_price, discount),
            credits_granted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_due_never_negative() {
        assert_eq!(
            amount_due(Decimal::new(29, 0), Decimal::new(58, 1)),
            Decimal::new(232, 1)
        );
        assert_eq!(
            amount_due(Decimal::new(29, 0), Decimal::new(40, 0)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_profile_input_flattens_profile_fields() {
        let json = r#"{
            "agencyName": "Northwind Studio",
            "leadSources": "Referrals",
            "gigs": [{"title": "Logo design", "price": "$200"}]
        }"#;
        let input: ProfileInput = serde_json::from_str(json).expect("deserialize");
        assert_eq!(input.profile.agency_name.as_deref(), Some("Northwind Studio"));
        assert_eq!(input.profile.lead_sources.as_deref(), Some("Referrals"));
        assert!(input.username.is_none());

        let update = input.into_update().expect("valid update");
        assert_eq!(update.gigs.map(|g| g.len()), Some(1));
    }

    #[test]
    fn test_profile_input_rejects_bad_email() {
        let input = ProfileInput {
            email: Some("not-an-email".to_string()),
            ..ProfileInput::default()
        };
        assert!(matches!(input.into_update(), Err(UserError::Invalid(_))));
    }

    #[test]
    fn test_profile_input_rejects_bad_username() {
        let input = ProfileInput {
            username: Some("no spaces allowed".to_string()),
            ..ProfileInput::default()
        };
        assert!(matches!(input.into_update(), Err(UserError::Invalid(_))));
    }

    #[test]
    fn test_profile_input_normalizes_email() {
        let input = ProfileInput {
            email: Some("Owner@Example.COM".to_string()),
            ..ProfileInput::default()
        };
        let update = input.into_update().expect("valid update");
        assert_eq!(update.email.map(|e| e.to_string()), Some("owner@example.com".to_string()));
    }

    #[test]
    fn test_untitled_gig_rejected() {
        let input = ProfileInput {
            gigs: Some(vec![Gig::default()]),
            ..ProfileInput::default()
        };
        assert!(matches!(input.into_update(), Err(UserError::Invalid(_))));
    }

    #[test]
    fn test_plan_change_deserializes() {
        let change: PlanChange =
            serde_json::from_str(r#"{"tier": "tier2", "voucherCode": "save20"}"#).expect("deserialize");
        assert_eq!(change.tier, Tier::Tier2);
        assert_eq!(change.voucher_code.as_deref(), Some("save20"));
    }
}
