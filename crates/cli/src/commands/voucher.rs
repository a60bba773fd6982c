//! Voucher commands.
//!
//! ```bash
//! # 20% off the pro plan for 30 days, 50 uses, generated code
//! rc-cli voucher create -t percentage -v 20 --days 30 --max-uses 50 --plan tier2
//! ```

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use reality_cheque_api::services::voucher::VoucherInput;
use reality_cheque_api::services::{VoucherOutcome, VoucherService};
use reality_cheque_core::VoucherType;

use super::{CommandError, connect};

/// Options for a new voucher.
#[derive(Debug)]
pub struct CreateOptions {
    pub code: Option<String>,
    pub voucher_type: VoucherType,
    pub value: Decimal,
    pub description: Option<String>,
    pub max_uses: i32,
    pub days: i64,
    pub plans: Vec<String>,
}

impl CreateOptions {
    fn into_input(self) -> VoucherInput {
        VoucherInput {
            code: self.code,
            voucher_type: self.voucher_type,
            value: self.value,
            description: self.description,
            max_uses: self.max_uses,
            valid_from: None,
            valid_until: Utc::now() + Duration::days(self.days),
            applicable_plans: self.plans,
        }
    }
}

/// Create a voucher and return its code.
pub async fn create(options: CreateOptions) -> Result<String, CommandError> {
    let pool = connect().await?;
    let input = options.into_input();

    match VoucherService::new(&pool)
        .create_voucher(&input, None)
        .await
        .map_err(|e| CommandError::Rejected(e.to_string()))?
    {
        VoucherOutcome::Accepted(voucher) => {
            tracing::info!(
                "Voucher created: {} ({} {}, {} uses, valid until {})",
                voucher.code,
                voucher.value,
                voucher.voucher_type,
                voucher.max_uses,
                voucher.valid_until
            );
            Ok(voucher.code.to_string())
        }
        VoucherOutcome::Rejected(message) => Err(CommandError::Rejected(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_expire_after_days() {
        let input = CreateOptions {
            code: None,
            voucher_type: VoucherType::Credits,
            value: Decimal::from(5),
            description: None,
            max_uses: 3,
            days: 7,
            plans: vec!["tier2".into()],
        }
        .into_input();

        let remaining = input.valid_until - Utc::now();
        assert!(remaining > Duration::days(6) && remaining <= Duration::days(7));
        assert!(input.valid_from.is_none());
        assert_eq!(input.max_uses, 3);
    }
}
