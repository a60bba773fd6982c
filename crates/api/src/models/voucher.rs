//! Voucher domain type and its redemption rules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use reality_cheque_core::{AdminId, UserId, VoucherCode, VoucherId, VoucherType};

/// A discount code.
///
/// There is no stored "used up" state: validity is always recomputed from
/// `is_active`, the validity window and `used_count < max_uses`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub id: VoucherId,
    pub code: VoucherCode,
    pub voucher_type: VoucherType,
    pub value: Decimal,
    pub description: Option<String>,
    pub max_uses: i32,
    pub used_count: i32,
    pub used_by: Vec<UserId>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    /// Plans this voucher applies to; empty means every plan.
    pub applicable_plans: Vec<String>,
    pub created_by: Option<AdminId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of checking a voucher for one user and order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoucherCheck {
    Valid { discount: Decimal },
    Invalid { message: String },
}

impl VoucherCheck {
    fn invalid(message: &str) -> Self {
        Self::Invalid {
            message: message.to_string(),
        }
    }

    /// Whether the voucher may be applied.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

impl Voucher {
    /// Past `valid_until`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    /// Active, inside the validity window and with uses remaining.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && now >= self.valid_from
            && !self.is_expired_at(now)
            && self.used_count < self.max_uses
    }

    /// Redemptions left before the voucher is exhausted.
    #[must_use]
    pub fn remaining_uses(&self) -> i32 {
        (self.max_uses - self.used_count).max(0)
    }

    /// Whether `user_id` has already redeemed this voucher.
    #[must_use]
    pub fn has_been_used_by(&self, user_id: UserId) -> bool {
        self.used_by.contains(&user_id)
    }

    /// Whether the voucher can be applied to `plan`.
    #[must_use]
    pub fn applies_to_plan(&self, plan: &str) -> bool {
        self.applicable_plans.is_empty()
            || self
                .applicable_plans
                .iter()
                .any(|p| p.eq_ignore_ascii_case(plan.trim()))
    }

    /// Discount granted on an order of `order_value` dollars.
    ///
    /// Percentage vouchers take `value`% of the order; credit vouchers are
    /// worth their flat `value` whatever the order.
    #[must_use]
    pub fn calculate_discount(&self, order_value: Decimal) -> Decimal {
        match self.voucher_type {
            VoucherType::Percentage => order_value * self.value / Decimal::ONE_HUNDRED,
            VoucherType::Credits => self.value,
        }
    }

    /// Check the voucher for one user, order and plan.
    ///
    /// Checks run in order: overall validity, prior use by this user, plan
    /// applicability, then a positive order value for percentage vouchers.
    #[must_use]
    pub fn validate_for_user(
        &self,
        user_id: UserId,
        order_value: Decimal,
        plan: &str,
        now: DateTime<Utc>,
    ) -> VoucherCheck {
        if !self.is_active {
            return VoucherCheck::invalid("Voucher is not active");
        }
        if now < self.valid_from {
            return VoucherCheck::invalid("Voucher is not yet valid");
        }
        if self.is_expired_at(now) {
            return VoucherCheck::invalid("Voucher has expired");
        }
        if self.used_count >= self.max_uses {
            return VoucherCheck::invalid("Voucher usage limit reached");
        }
        if self.has_been_used_by(user_id) {
            return VoucherCheck::invalid("You have already used this voucher");
        }
        if !self.applies_to_plan(plan) {
            return VoucherCheck::invalid("Voucher is not applicable to this plan");
        }
        if self.voucher_type == VoucherType::Percentage && order_value <= Decimal::ZERO {
            return VoucherCheck::invalid("Order value must be greater than 0");
        }

        VoucherCheck::Valid {
            discount: self.calculate_discount(order_value),
        }
    }
}
