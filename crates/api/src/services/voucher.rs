//! Voucher service: creation, validation and redemption of discount codes.
//!
//! Validation failures are ordinary outcomes ([`VoucherOutcome::Rejected`]),
//! not errors. Errors are reserved for storage failures and for running out
//! of fresh codes.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, instrument, warn};

use reality_cheque_core::{AdminId, UserId, VoucherCode, VoucherId, VoucherType};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::db::vouchers::{NewVoucher, VoucherRepository};
use crate::models::{Voucher, VoucherCheck};

/// Attempts at an unused random code before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 100;

/// Message for a code that does not exist.
pub const INVALID_CODE_MESSAGE: &str = "Invalid voucher code";

/// Errors from voucher operations.
#[derive(Debug, Error)]
pub enum VoucherError {
    #[error("voucher not found")]
    NotFound,

    #[error("could not generate a unique voucher code after {0} attempts")]
    CodeSpaceExhausted(usize),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of an operation that may be refused for a business reason.
#[derive(Debug, Clone, PartialEq)]
pub enum VoucherOutcome<T> {
    Accepted(T),
    Rejected(String),
}

impl<T> VoucherOutcome<T> {
    fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

/// Admin input for a new voucher.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherInput {
    /// Generated when absent or blank.
    #[serde(default)]
    pub code: Option<String>,
    pub voucher_type: VoucherType,
    pub value: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_max_uses")]
    pub max_uses: i32,
    /// Defaults to now.
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub applicable_plans: Vec<String>,
}

const fn default_max_uses() -> i32 {
    1
}

/// Result of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub discount: Decimal,
    pub voucher_type: VoucherType,
    pub value: Decimal,
}

/// Result of a successful redemption.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub code: VoucherCode,
    pub voucher_type: VoucherType,
    pub discount: Decimal,
    /// Credits added to the user's balance (credit vouchers only).
    pub credits_granted: Decimal,
}

/// Generate a random code of 6 or 8 characters from [`VoucherCode::ALPHABET`].
#[must_use]
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    let len = if rng.random_bool(0.5) {
        VoucherCode::MIN_LENGTH
    } else {
        VoucherCode::MAX_LENGTH
    };
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..VoucherCode::ALPHABET.len());
            char::from(VoucherCode::ALPHABET.get(idx).copied().unwrap_or(b'A'))
        })
        .collect()
}

/// Check the non-code fields of a voucher input.
///
/// # Errors
///
/// Returns the message to show the admin.
pub fn validate_input(input: &VoucherInput, now: DateTime<Utc>) -> Result<(), String> {
    match input.voucher_type {
        VoucherType::Percentage => {
            if input.value <= Decimal::ZERO || input.value > Decimal::ONE_HUNDRED {
                return Err("Percentage value must be greater than 0 and at most 100".to_string());
            }
        }
        VoucherType::Credits => {
            if input.value <= Decimal::ZERO {
                return Err("Credit value must be greater than 0".to_string());
            }
        }
    }
    if input.max_uses < 1 {
        return Err("Max uses must be at least 1".to_string());
    }
    if input.valid_until <= input.valid_from.unwrap_or(now) {
        return Err("Valid until must be after valid from".to_string());
    }
    Ok(())
}

/// Voucher service.
pub struct VoucherService<'a> {
    pool: &'a PgPool,
    vouchers: VoucherRepository<'a>,
}

impl<'a> VoucherService<'a> {
    /// Create a new voucher service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            vouchers: VoucherRepository::new(pool),
        }
    }

    /// Create a voucher, generating a code when none is supplied.
    ///
    /// # Errors
    ///
    /// Returns `VoucherError::CodeSpaceExhausted` if no unused code could be
    /// generated and `VoucherError::Repository` on storage failures.
    #[instrument(skip(self, input), fields(voucher_type = %input.voucher_type))]
    pub async fn create_voucher(
        &self,
        input: &VoucherInput,
        created_by: Option<AdminId>,
    ) -> Result<VoucherOutcome<Voucher>, VoucherError> {
        let now = Utc::now();
        if let Err(message) = validate_input(input, now) {
            return Ok(VoucherOutcome::Rejected(message));
        }

        let supplied = input
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let code = match supplied {
            Some(raw) => {
                let Ok(code) = VoucherCode::normalize(raw) else {
                    return Ok(VoucherOutcome::rejected(
                        "Voucher code must be 6-8 uppercase letters or digits",
                    ));
                };
                if self.vouchers.code_exists(&code).await? {
                    return Ok(VoucherOutcome::rejected("Voucher code already exists"));
                }
                code
            }
            None => self.generate_unique_code().await?,
        };

        let new = NewVoucher {
            code,
            voucher_type: input.voucher_type,
            value: input.value,
            description: input.description.clone(),
            max_uses: input.max_uses,
            valid_from: input.valid_from.unwrap_or(now),
            valid_until: input.valid_until,
            applicable_plans: input
                .applicable_plans
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            created_by,
        };

        match self.vouchers.create(&new).await {
            Ok(voucher) => {
                info!(code = %voucher.code, "Voucher created");
                Ok(VoucherOutcome::Accepted(voucher))
            }
            Err(RepositoryError::Conflict(_)) => {
                Ok(VoucherOutcome::rejected("Voucher code already exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Generate a code no existing voucher uses.
    ///
    /// # Errors
    ///
    /// Returns `VoucherError::CodeSpaceExhausted` after
    /// [`MAX_CODE_ATTEMPTS`] collisions.
    pub async fn generate_unique_code(&self) -> Result<VoucherCode, VoucherError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let Ok(code) = VoucherCode::parse(&generate_code()) else {
                continue;
            };
            if !self.vouchers.code_exists(&code).await? {
                return Ok(code);
            }
        }
        warn!(attempts = MAX_CODE_ATTEMPTS, "Voucher code generation exhausted");
        Err(VoucherError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Check whether `user_id` may use `code` on an order for `plan`.
    ///
    /// # Errors
    ///
    /// Returns `VoucherError::Repository` if the lookup fails.
    pub async fn validate_voucher(
        &self,
        code: &str,
        user_id: UserId,
        order_value: Decimal,
        plan: &str,
    ) -> Result<VoucherOutcome<Validation>, VoucherError> {
        let Some(voucher) = self.lookup(code).await? else {
            return Ok(VoucherOutcome::rejected(INVALID_CODE_MESSAGE));
        };

        Ok(
            match voucher.validate_for_user(user_id, order_value, plan, Utc::now()) {
                VoucherCheck::Valid { discount } => VoucherOutcome::Accepted(Validation {
                    discount,
                    voucher_type: voucher.voucher_type,
                    value: voucher.value,
                }),
                VoucherCheck::Invalid { message } => VoucherOutcome::Rejected(message),
            },
        )
    }

    /// Validate and redeem a voucher for a user.
    ///
    /// Redemption is a single conditional update; losing a race against
    /// another redemption yields a rejection. Credit vouchers add their
    /// value to the user's balance in the same transaction, so a failed
    /// grant leaves the voucher unused.
    ///
    /// # Errors
    ///
    /// Returns `VoucherError::Repository` on storage failures.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn use_voucher(
        &self,
        code: &str,
        user_id: UserId,
        order_value: Decimal,
        plan: &str,
    ) -> Result<VoucherOutcome<Redemption>, VoucherError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let outcome = self
            .redeem_on(&mut tx, code, user_id, order_value, plan)
            .await?;
        if matches!(outcome, VoucherOutcome::Accepted(_)) {
            tx.commit().await.map_err(RepositoryError::from)?;
        }
        Ok(outcome)
    }

    /// Validate, redeem and pay out a voucher on `conn` without committing.
    ///
    /// A rejection writes nothing. The caller owns the transaction and
    /// decides whether the use sticks.
    ///
    /// # Errors
    ///
    /// Returns `VoucherError::Repository` on storage failures.
    pub async fn redeem_on(
        &self,
        conn: &mut PgConnection,
        code: &str,
        user_id: UserId,
        order_value: Decimal,
        plan: &str,
    ) -> Result<VoucherOutcome<Redemption>, VoucherError> {
        let Some(voucher) = self.lookup(code).await? else {
            return Ok(VoucherOutcome::rejected(INVALID_CODE_MESSAGE));
        };

        let discount = match voucher.validate_for_user(user_id, order_value, plan, Utc::now()) {
            VoucherCheck::Valid { discount } => discount,
            VoucherCheck::Invalid { message } => return Ok(VoucherOutcome::Rejected(message)),
        };

        let Some(redeemed) = VoucherRepository::redeem(conn, &voucher.code, user_id).await? else {
            info!(code = %voucher.code, "Voucher redemption lost a race");
            return Ok(VoucherOutcome::rejected("Voucher is no longer available"));
        };

        let credits_granted = match redeemed.voucher_type {
            VoucherType::Credits => {
                UserRepository::grant_on(conn, user_id, redeemed.value).await?;
                redeemed.value
            }
            VoucherType::Percentage => Decimal::ZERO,
        };

        info!(code = %redeemed.code, used_count = redeemed.used_count, "Voucher redeemed");
        Ok(VoucherOutcome::Accepted(Redemption {
            code: redeemed.code,
            voucher_type: redeemed.voucher_type,
            discount,
            credits_granted,
        }))
    }

    /// All vouchers, newest first.
    ///
    /// # Errors
    ///
    /// Returns `VoucherError::Repository` if the query fails.
    pub async fn list_vouchers(&self) -> Result<Vec<Voucher>, VoucherError> {
        Ok(self.vouchers.list().await?)
    }

    /// Enable or disable a voucher.
    ///
    /// # Errors
    ///
    /// Returns `VoucherError::NotFound` if the voucher does not exist.
    pub async fn set_active(&self, id: VoucherId, active: bool) -> Result<Voucher, VoucherError> {
        match self.vouchers.set_active(id, active).await {
            Ok(voucher) => Ok(voucher),
            Err(RepositoryError::NotFound) => Err(VoucherError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a voucher that has never been used.
    ///
    /// # Errors
    ///
    /// Returns `VoucherError::NotFound` if the voucher does not exist.
    #[instrument(skip(self), fields(voucher_id = %id))]
    pub async fn delete_voucher(&self, id: VoucherId) -> Result<VoucherOutcome<()>, VoucherError> {
        let voucher = self.vouchers.get(id).await?.ok_or(VoucherError::NotFound)?;
        if voucher.used_count > 0 {
            return Ok(VoucherOutcome::rejected(
                "Cannot delete a voucher that has been used",
            ));
        }

        if self.vouchers.delete_unused(id).await? {
            info!(code = %voucher.code, "Voucher deleted");
            Ok(VoucherOutcome::Accepted(()))
        } else {
            Ok(VoucherOutcome::rejected(
                "Cannot delete a voucher that has been used",
            ))
        }
    }

    /// Find a voucher by user-supplied code. Malformed codes find nothing.
    async fn lookup(&self, code: &str) -> Result<Option<Voucher>, VoucherError> {
        let Ok(code) = VoucherCode::normalize(code) else {
            return Ok(None);
        };
        Ok(self.vouchers.get_by_code(&code).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Duration;

    use super::*;

    fn input(voucher_type: VoucherType, value: i64) -> VoucherInput {
        VoucherInput {
            code: None,
            voucher_type,
            value: Decimal::new(value, 0),
            description: None,
            max_uses: 5,
            valid_from: None,
            valid_until: Utc::now() + Duration::days(7),
            applicable_plans: Vec::new(),
        }
    }

    #[test]
    fn test_generated_codes_are_valid() {
        for _ in 0..200 {
            let code = generate_code();
            assert!(
                code.len() == 6 || code.len() == 8,
                "unexpected length: {code}"
            );
            assert!(VoucherCode::parse(&code).is_ok(), "invalid code: {code}");
        }
    }

    #[test]
    fn test_generated_codes_use_both_lengths() {
        let lengths: HashSet<usize> = (0..200).map(|_| generate_code().len()).collect();
        assert_eq!(lengths, HashSet::from([6, 8]));
    }

    #[test]
    fn test_generated_codes_rarely_collide() {
        let codes: HashSet<String> = (0..500).map(|_| generate_code()).collect();
        assert!(codes.len() > 495);
    }

    #[test]
    fn test_percentage_bounds() {
        let now = Utc::now();
        assert!(validate_input(&input(VoucherType::Percentage, 20), now).is_ok());
        assert!(validate_input(&input(VoucherType::Percentage, 100), now).is_ok());
        assert!(validate_input(&input(VoucherType::Percentage, 0), now).is_err());
        assert!(validate_input(&input(VoucherType::Percentage, 101), now).is_err());
    }

    #[test]
    fn test_credit_value_must_be_positive() {
        let now = Utc::now();
        assert!(validate_input(&input(VoucherType::Credits, 500), now).is_ok());
        assert!(validate_input(&input(VoucherType::Credits, 0), now).is_err());
        assert!(validate_input(&input(VoucherType::Credits, -5), now).is_err());
    }

    #[test]
    fn test_window_must_be_forward() {
        let now = Utc::now();
        let mut backwards = input(VoucherType::Credits, 10);
        backwards.valid_from = Some(now);
        backwards.valid_until = now - Duration::hours(1);
        assert_eq!(
            validate_input(&backwards, now),
            Err("Valid until must be after valid from".to_string())
        );
    }

    #[test]
    fn test_max_uses_at_least_one() {
        let mut zero = input(VoucherType::Credits, 10);
        zero.max_uses = 0;
        assert!(validate_input(&zero, Utc::now()).is_err());
    }

    #[test]
    fn test_input_defaults() {
        let json = r#"{
            "voucherType": "credits",
            "value": "25",
            "validUntil": "2030-01-01T00:00:00Z"
        }"#;
        let parsed: VoucherInput = serde_json::from_str(json).expect("deserialize");
        assert_eq!(parsed.max_uses, 1);
        assert!(parsed.code.is_none());
        assert!(parsed.valid_from.is_none());
        assert!(parsed.applicable_plans.is_empty());
        assert_eq!(parsed.value, Decimal::new(25, 0));
    }
}
