//! Subscription tiers.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown tier name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown tier: {0} (expected tier1, tier2 or tier3)")]
pub struct TierError(pub String);

/// A user's subscription tier.
///
/// Tiers are ordered: `Tier1 < Tier2 < Tier3`. Catalog categories carry a
/// minimum tier and are visible to users at or above it.
///
/// ```
/// use reality_cheque_core::Tier;
///
/// assert!(Tier::Tier3 > Tier::Tier1);
/// assert_eq!("tier2".parse::<Tier>().unwrap(), Tier::Tier2);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "app.user_tier"))]
pub enum Tier {
    #[default]
    #[serde(rename = "tier1")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "tier1"))]
    Tier1,
    #[serde(rename = "tier2")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "tier2"))]
    Tier2,
    #[serde(rename = "tier3")]
    #[cfg_attr(feature = "postgres", sqlx(rename = "tier3"))]
    Tier3,
}

impl Tier {
    /// All tiers, lowest first.
    pub const ALL: [Self; 3] = [Self::Tier1, Self::Tier2, Self::Tier3];

    /// Wire/database name of the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
        }
    }

    /// Monthly list price in dollars, before vouchers.
    #[must_use]
    pub fn monthly_price(self) -> Decimal {
        match self {
            Self::Tier1 => Decimal::ZERO,
            Self::Tier2 => Decimal::new(29, 0),
            Self::Tier3 => Decimal::new(99, 0),
        }
    }

    /// Dollar credits granted when a user starts (or moves to) this tier.
    #[must_use]
    pub fn credit_allowance(self) -> Decimal {
        match self {
            Self::Tier1 => Decimal::new(5, 0),
            Self::Tier2 => Decimal::new(30, 0),
            Self::Tier3 => Decimal::new(120, 0),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = TierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tier1" => Ok(Self::Tier1),
            "tier2" => Ok(Self::Tier2),
            "tier3" => Ok(Self::Tier3),
            other => Err(TierError(other.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Tier1 < Tier::Tier2);
        assert!(Tier::Tier2 < Tier::Tier3);
        assert_eq!(Tier::ALL.iter().max(), Some(&Tier::Tier3));
    }

    #[test]
    fn test_tier_default_is_lowest() {
        assert_eq!(Tier::default(), Tier::Tier1);
    }

    #[test]
    fn test_tier_serde_names() {
        assert_eq!(serde_json::to_string(&Tier::Tier2).unwrap(), "\"tier2\"");
        let tier: Tier = serde_json::from_str("\"tier3\"").unwrap();
        assert_eq!(tier, Tier::Tier3);
    }

    #[test]
    fn test_tier_parse_rejects_unknown() {
        let err = "pro".parse::<Tier>().unwrap_err();
        assert_eq!(err, TierError("pro".to_string()));
    }

    #[test]
    fn test_higher_tiers_cost_more_and_grant_more() {
        for pair in Tier::ALL.windows(2) {
            let [lower, higher] = pair else { continue };
            assert!(lower.monthly_price() < higher.monthly_price());
            assert!(lower.credit_allowance() < higher.credit_allowance());
        }
    }
}
