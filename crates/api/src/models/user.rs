//! User domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use reality_cheque_core::{Email, Tier, UserId};

/// Remaining balance a user must exceed to start a generation.
pub const CREDIT_THRESHOLD: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// A gig listing on the user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Gig {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Free-form agency/business profile used to personalize prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub agency_name: Option<String>,
    pub services: Option<String>,
    pub pricing_packages: Option<String>,
    pub offers: Option<String>,
    pub case_studies: Option<String>,
    pub lead_sources: Option<String>,
}

impl UserProfile {
    /// Labelled, non-empty profile fields in display order.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("Agency", &self.agency_name),
            ("Services", &self.services),
            ("Pricing packages", &self.pricing_packages),
            ("Offers", &self.offers),
            ("Case studies", &self.case_studies),
            ("Lead sources", &self.lead_sources),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (label, v))
        })
        .collect()
    }
}

/// A registered user (domain type).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Email,
    pub tier: Tier,
    pub total_credits: Decimal,
    pub used_credits: Decimal,
    #[serde(flatten)]
    pub profile: UserProfile,
    pub gigs: Vec<Gig>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Credits left to spend. Negative only if data was edited by hand.
    #[must_use]
    pub fn remaining_credits(&self) -> Decimal {
        self.total_credits - self.used_credits
    }

    /// Whether the user may start another generation.
    ///
    /// The comparison is strict: a balance of exactly one cent is not enough.
    #[must_use]
    pub fn has_credits(&self) -> bool {
        self.remaining_credits() > CREDIT_THRESHOLD
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_user(total: Decimal, used: Decimal) -> User {
        User {
            id: UserId::new(7),
            username: "studio_owner".to_string(),
            email: Email::parse("owner@studio.test").expect("valid email"),
            tier: Tier::Tier2,
            total_credits: total,
            used_credits: used,
            profile: UserProfile::default(),
            gigs: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_credit_threshold_is_one_cent() {
        assert_eq!(CREDIT_THRESHOLD, Decimal::new(1, 2));
    }

    #[test]
    fn test_remaining_credits() {
        let user = sample_user(Decimal::new(10, 0), Decimal::new(25, 1));
        assert_eq!(user.remaining_credits(), Decimal::new(75, 1));
        assert!(user.has_credits());
    }

    #[test]
    fn test_half_cent_balance_has_no_credits() {
        // 10 - 9.995 = 0.005, below the threshold
        let user = sample_user(Decimal::new(10, 0), Decimal::new(9995, 3));
        assert!(!user.has_credits());
    }

    #[test]
    fn test_exactly_one_cent_has_no_credits() {
        let user = sample_user(Decimal::new(10, 0), Decimal::new(999, 2));
        assert!(!user.has_credits());
    }

    #[test]
    fn test_just_above_one_cent_has_credits() {
        let user = sample_user(Decimal::new(10, 0), Decimal::new(9989, 3));
        assert!(user.has_credits());
    }

    #[test]
    fn test_profile_entries_skip_blank_fields() {
        let profile = UserProfile {
            agency_name: Some("Northwind Creative".to_string()),
            services: Some("   ".to_string()),
            offers: Some("Free audit".to_string()),
            ..UserProfile::default()
        };

        let entries = profile.entries();
        assert_eq!(
            entries,
            vec![("Agency", "Northwind Creative"), ("Offers", "Free audit")]
        );
    }

    #[test]
    fn test_user_serializes_camel_case_with_flattened_profile() {
        let mut user = sample_user(Decimal::new(5, 0), Decimal::ZERO);
        user.profile.agency_name = Some("Acme".to_string());

        let json = serde_json::to_value(&user).expect("serialize");
        assert_eq!(json["totalCredits"], "5");
        assert_eq!(json["agencyName"], "Acme");
        assert_eq!(json["tier"], "tier2");
    }
}
