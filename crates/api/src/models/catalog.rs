//! AI model catalog domain types: categories, features and models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use reality_cheque_core::{AiModelId, CategoryId, FeatureId, Tier};

/// A group of models, gated by a minimum tier.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    /// Lowest tier allowed to see this category.
    pub tier_access: Tier,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Whether a user on `tier` may see this category.
    #[must_use]
    pub fn is_visible_to(&self, tier: Tier) -> bool {
        self.is_active && tier >= self.tier_access
    }
}

/// One section of a feature-based model's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
    pub description: String,
    pub prompt: String,
    #[serde(rename = "order")]
    pub sort_order: i32,
    pub is_optional: bool,
}

/// Which generation strategy a model uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Output is one JSON object keyed by feature name.
    FeatureBased,
    /// Output is free-form text driven by the master prompt.
    MasterPrompt,
}

/// Per-1K-token dollar rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRates {
    pub input_per_1k: Decimal,
    pub output_per_1k: Decimal,
}

impl CostRates {
    /// Rates applied when a model has none configured: $0.005 in, $0.015 out.
    pub const DEFAULT: Self = Self {
        input_per_1k: Decimal::from_parts(5, 0, 0, false, 3),
        output_per_1k: Decimal::from_parts(15, 0, 0, false, 3),
    };

    /// Dollar cost of a call: `in/1000 * in_rate + out/1000 * out_rate`.
    #[must_use]
    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> Decimal {
        let thousand = Decimal::from(1000);
        Decimal::from(input_tokens) / thousand * self.input_per_1k
            + Decimal::from(output_tokens) / thousand * self.output_per_1k
    }
}

impl Default for CostRates {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A configured assistant ("bot").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiModel {
    pub id: AiModelId,
    pub name: String,
    pub description: String,
    pub category_id: CategoryId,
    pub master_prompt: Option<String>,
    /// Features in prompt order (`sort_order`, then id).
    pub features: Vec<Feature>,
    pub input_cost_per_1k: Option<Decimal>,
    pub output_cost_per_1k: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AiModel {
    /// Feature-based when any feature is attached, otherwise master-prompt.
    #[must_use]
    pub fn kind(&self) -> ModelKind {
        if self.features.is_empty() {
            ModelKind::MasterPrompt
        } else {
            ModelKind::FeatureBased
        }
    }

    /// Feature names in prompt order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    /// Look up an attached feature by exact name.
    #[must_use]
    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Configured rates, falling back to [`CostRates::DEFAULT`] per side.
    #[must_use]
    pub fn rates(&self) -> CostRates {
        CostRates {
            input_per_1k: self
                .input_cost_per_1k
                .unwrap_or(CostRates::DEFAULT.input_per_1k),
            output_per_1k: self
                .output_cost_per_1k
                .unwrap_or(CostRates::DEFAULT.output_per_1k),
        }
    }
}

/// Sort features into prompt order.
pub fn sort_features(features: &mut [Feature]) {
    features.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then(a.id.as_i32().cmp(&b.id.as_i32()))
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn feature(id: i32, name: &str, order: i32) -> Feature {
        Feature {
            id: FeatureId::new(id),
            name: name.to_string(),
            description: format!("{name} section"),
            prompt: format!("Write the {name}."),
            sort_order: order,
            is_optional: false,
        }
    }

    pub(crate) fn model(features: Vec<Feature>, master_prompt: Option<&str>) -> AiModel {
        AiModel {
            id: AiModelId::new(1),
            name: "Ad Writer".to_string(),
            description: "Writes ad copy".to_string(),
            category_id: CategoryId::new(1),
            master_prompt: master_prompt.map(str::to_string),
            features,
            input_cost_per_1k: None,
            output_cost_per_1k: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_model_kind() {
        let featured = model(vec![feature(1, "Headline", 1)], None);
        assert_eq!(featured.kind(), ModelKind::FeatureBased);

        let master = model(Vec::new(), Some("You are a copywriter."));
        assert_eq!(master.kind(), ModelKind::MasterPrompt);
    }

    #[test]
    fn test_default_rates() {
        assert_eq!(CostRates::DEFAULT.input_per_1k, Decimal::new(5, 3));
        assert_eq!(CostRates::DEFAULT.output_per_1k, Decimal::new(15, 3));
    }

    #[test]
    fn test_cost_with_default_rates() {
        // 1200/1000 * 0.005 + 800/1000 * 0.015 = 0.006 + 0.012
        let cost = CostRates::DEFAULT.cost(1200, 800);
        assert_eq!(cost, Decimal::new(18, 3));
    }

    #[test]
    fn test_cost_zero_tokens_is_free() {
        assert_eq!(CostRates::DEFAULT.cost(0, 0), Decimal::ZERO);
    }

    #[test]
    fn test_rates_fall_back_per_side() {
        let mut m = model(Vec::new(), Some("prompt"));
        m.input_cost_per_1k = Some(Decimal::new(1, 2));

        let rates = m.rates();
        assert_eq!(rates.input_per_1k, Decimal::new(1, 2));
        assert_eq!(rates.output_per_1k, CostRates::DEFAULT.output_per_1k);
        // 500/1000 * 0.01 + 1000/1000 * 0.015
        assert_eq!(rates.cost(500, 1000), Decimal::new(20, 3));
    }

    #[test]
    fn test_sort_features_by_order_then_id() {
        let mut features = vec![
            feature(3, "CTA", 2),
            feature(2, "Body", 1),
            feature(1, "Headline", 1),
        ];
        sort_features(&mut features);
        let names: Vec<_> = features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Headline", "Body", "CTA"]);
    }

    #[test]
    fn test_category_visibility() {
        let category = Category {
            id: CategoryId::new(1),
            name: "Sales".to_string(),
            description: String::new(),
            tier_access: Tier::Tier2,
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(!category.is_visible_to(Tier::Tier1));
        assert!(category.is_visible_to(Tier::Tier2));
        assert!(category.is_visible_to(Tier::Tier3));
    }

    #[test]
    fn test_feature_serializes_order_field() {
        let json = serde_json::to_value(feature(1, "Headline", 4)).expect("serialize");
        assert_eq!(json["order"], 4);
        assert_eq!(json["isOptional"], false);
    }
}
