//! Bot catalog service: categories, features, models and the built-in seed.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument};

use reality_cheque_core::{AiModelId, CategoryId, FeatureId, Tier};

use crate::db::RepositoryError;
use crate::db::catalog::{CatalogRepository, NewAiModel, NewCategory, NewFeature};
use crate::models::{AiModel, Category, Feature};

/// Built-in catalog used by `populate`.
pub const DEFAULT_CATALOG: &str = include_str!("../../seed/catalog.yaml");

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid catalog seed: {0}")]
    Seed(String),

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CatalogError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Input for a new category.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tier_access: Tier,
}

/// Input for a new feature.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub is_optional: bool,
}

/// Input for a new model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub master_prompt: Option<String>,
    #[serde(default)]
    pub feature_ids: Vec<FeatureId>,
    #[serde(default)]
    pub input_cost_per_1k: Option<Decimal>,
    #[serde(default)]
    pub output_cost_per_1k: Option<Decimal>,
}

/// A model together with the prompt it effectively runs with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDetail {
    #[serde(flatten)]
    pub model: AiModel,
    pub effective_prompt: String,
}

// =============================================================================
// Seed format
// =============================================================================

/// Seed file layout. Models reference categories and features by name.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub features: Vec<FeatureSeed>,
    #[serde(default)]
    pub models: Vec<ModelSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tier_access: Tier,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureSeed {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSeed {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub master_prompt: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub input_cost_per_1k: Option<Decimal>,
    #[serde(default)]
    pub output_cost_per_1k: Option<Decimal>,
}

impl CatalogSeed {
    /// Parse and cross-check a seed document.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Seed` if the YAML is malformed, a model names an
    /// unknown category or feature, or a model has neither features nor a
    /// master prompt.
    pub fn parse(yaml: &str) -> Result<Self, CatalogError> {
        let seed: Self = serde_yaml::from_str(yaml)
            .map_err(|e| CatalogError::Seed(format!("Failed to parse YAML: {e}")))?;

        for model in &seed.models {
            if !seed.categories.iter().any(|c| c.name == model.category) {
                return Err(CatalogError::Seed(format!(
                    "model '{}' references unknown category '{}'",
                    model.name, model.category
                )));
            }
            if let Some(missing) = model
                .features
                .iter()
                .find(|name| !seed.features.iter().any(|f| &f.name == *name))
            {
                return Err(CatalogError::Seed(format!(
                    "model '{}' references unknown feature '{missing}'",
                    model.name
                )));
            }
            if model.features.is_empty() && !has_text(model.master_prompt.as_deref()) {
                return Err(CatalogError::Seed(format!(
                    "model '{}' needs features or a master prompt",
                    model.name
                )));
            }
        }

        Ok(seed)
    }
}

/// Counts of upserted catalog entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub categories: usize,
    pub features: usize,
    pub models: usize,
}

// =============================================================================
// Prompt composition
// =============================================================================

/// Base prompt followed by each feature as `## {name}` and its prompt.
#[must_use]
pub fn compose_master_prompt(base: &str, features: &[Feature]) -> String {
    let mut sections: Vec<String> = Vec::with_capacity(features.len() + 1);
    let base = base.trim();
    if !base.is_empty() {
        sections.push(base.to_string());
    }
    for feature in features {
        sections.push(format!("## {}\n{}", feature.name, feature.prompt.trim()));
    }
    sections.join("\n\n")
}

fn has_text(s: Option<&str>) -> bool {
    s.is_some_and(|s| !s.trim().is_empty())
}

fn require_name(name: &str, what: &str) -> Result<String, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::Invalid(format!("{what} name is required")));
    }
    Ok(name.to_string())
}

fn check_rate(rate: Option<Decimal>, which: &str) -> Result<(), CatalogError> {
    if rate.is_some_and(|r| r.is_sign_negative()) {
        return Err(CatalogError::Invalid(format!(
            "{which} cost per 1K tokens cannot be negative"
        )));
    }
    Ok(())
}

// =============================================================================
// Service
// =============================================================================

/// Catalog service.
pub struct CatalogService<'a> {
    repo: CatalogRepository<'a>,
}

impl<'a> CatalogService<'a> {
    /// Create a new catalog service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            repo: CatalogRepository::new(pool),
        }
    }

    /// Categories visible to `tier`, or all of them for admins (`None`).
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    pub async fn list_categories(&self, tier: Option<Tier>) -> Result<Vec<Category>, CatalogError> {
        Ok(self.repo.list_categories(tier).await?)
    }

    /// Active models in a category visible to `tier`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the category does not exist or is
    /// hidden from `tier`.
    pub async fn models_in_category(
        &self,
        category_id: CategoryId,
        tier: Option<Tier>,
    ) -> Result<Vec<AiModel>, CatalogError> {
        let category = self
            .repo
            .get_category(category_id)
            .await?
            .ok_or(CatalogError::NotFound("Category"))?;
        if let Some(tier) = tier
            && !category.is_visible_to(tier)
        {
            return Err(CatalogError::NotFound("Category"));
        }

        Ok(self.repo.list_models(Some(category_id), tier).await?)
    }

    /// Active models visible to `tier`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    pub async fn list_models(&self, tier: Option<Tier>) -> Result<Vec<AiModel>, CatalogError> {
        Ok(self.repo.list_models(None, tier).await?)
    }

    /// An active model with its effective prompt.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the model is missing or inactive.
    pub async fn get_model(&self, id: AiModelId) -> Result<ModelDetail, CatalogError> {
        let model = self
            .repo
            .get_model(id, true)
            .await?
            .ok_or(CatalogError::NotFound("Model"))?;

        let effective_prompt =
            compose_master_prompt(model.master_prompt.as_deref().unwrap_or_default(), &model.features);
        Ok(ModelDetail {
            model,
            effective_prompt,
        })
    }

    /// All features in prompt order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    pub async fn list_features(&self) -> Result<Vec<Feature>, CatalogError> {
        Ok(self.repo.list_features().await?)
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for a blank name and
    /// `CatalogError::Conflict` for a duplicate one.
    pub async fn create_category(&self, input: &CategoryInput) -> Result<Category, CatalogError> {
        let name = require_name(&input.name, "Category")?;
        let category = self
            .repo
            .create_category(&NewCategory {
                name,
                description: input.description.trim().to_string(),
                tier_access: input.tier_access,
            })
            .await?;

        info!(category_id = %category.id, "Category created");
        Ok(category)
    }

    /// Create a feature.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` for a blank name or prompt and
    /// `CatalogError::Conflict` for a duplicate name.
    pub async fn create_feature(&self, input: &FeatureInput) -> Result<Feature, CatalogError> {
        let name = require_name(&input.name, "Feature")?;
        if input.prompt.trim().is_empty() {
            return Err(CatalogError::Invalid("Feature prompt is required".to_string()));
        }

        let feature = self
            .repo
            .create_feature(&NewFeature {
                name,
                description: input.description.trim().to_string(),
                prompt: input.prompt.trim().to_string(),
                sort_order: input.order,
                is_optional: input.is_optional,
            })
            .await?;

        info!(feature_id = %feature.id, "Feature created");
        Ok(feature)
    }

    /// Create a model.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Invalid` if the name is blank, the model has
    /// neither features nor a master prompt, a rate is negative or a feature
    /// does not exist; `CatalogError::NotFound` if the category does not exist.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_model(&self, input: &ModelInput) -> Result<AiModel, CatalogError> {
        let name = require_name(&input.name, "Model")?;
        if input.feature_ids.is_empty() && !has_text(input.master_prompt.as_deref()) {
            return Err(CatalogError::Invalid(
                "Model needs at least one feature or a master prompt".to_string(),
            ));
        }
        check_rate(input.input_cost_per_1k, "Input")?;
        check_rate(input.output_cost_per_1k, "Output")?;

        self.repo
            .get_category(input.category_id)
            .await?
            .ok_or(CatalogError::NotFound("Category"))?;

        let mut feature_ids = input.feature_ids.clone();
        feature_ids.sort_by_key(FeatureId::as_i32);
        feature_ids.dedup();
        let found = self.repo.features_by_ids(&feature_ids).await?;
        if found.len() != feature_ids.len() {
            return Err(CatalogError::Invalid("Unknown feature id".to_string()));
        }

        let model = self
            .repo
            .create_model(&NewAiModel {
                name,
                description: input.description.trim().to_string(),
                category_id: input.category_id,
                master_prompt: input
                    .master_prompt
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
                feature_ids,
                input_cost_per_1k: input.input_cost_per_1k,
                output_cost_per_1k: input.output_cost_per_1k,
            })
            .await?;

        info!(model_id = %model.id, "Model created");
        Ok(model)
    }

    /// Upsert the built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Seed` if the embedded catalog is invalid, or a
    /// repository error if an upsert fails.
    pub async fn populate(&self) -> Result<SeedReport, CatalogError> {
        let seed = CatalogSeed::parse(DEFAULT_CATALOG)?;
        self.seed(&seed).await
    }

    /// Upsert every entry of a seed, by name. Running it twice changes nothing.
    ///
    /// # Errors
    ///
    /// Returns a repository error if an upsert fails.
    #[instrument(skip(self, seed), fields(models = seed.models.len()))]
    pub async fn seed(&self, seed: &CatalogSeed) -> Result<SeedReport, CatalogError> {
        let mut categories: HashMap<&str, CategoryId> = HashMap::new();
        for c in &seed.categories {
            let category = self
                .repo
                .upsert_category(&NewCategory {
                    name: c.name.clone(),
                    description: c.description.clone(),
                    tier_access: c.tier_access,
                })
                .await?;
            categories.insert(c.name.as_str(), category.id);
        }

        let mut features: HashMap<&str, FeatureId> = HashMap::new();
        for f in &seed.features {
            let feature = self
                .repo
                .upsert_feature(&NewFeature {
                    name: f.name.clone(),
                    description: f.description.clone(),
                    prompt: f.prompt.clone(),
                    sort_order: f.order,
                    is_optional: f.optional,
                })
                .await?;
            features.insert(f.name.as_str(), feature.id);
        }

        for m in &seed.models {
            let category_id = *categories
                .get(m.category.as_str())
                .ok_or_else(|| CatalogError::Seed(format!("unknown category '{}'", m.category)))?;
            let feature_ids = m
                .features
                .iter()
                .map(|name| {
                    features
                        .get(name.as_str())
                        .copied()
                        .ok_or_else(|| CatalogError::Seed(format!("unknown feature '{name}'")))
                })
                .collect::<Result<Vec<_>, _>>()?;

            self.repo
                .upsert_model(&NewAiModel {
                    name: m.name.clone(),
                    description: m.description.clone(),
                    category_id,
                    master_prompt: m.master_prompt.clone(),
                    feature_ids,
                    input_cost_per_1k: m.input_cost_per_1k,
                    output_cost_per_1k: m.output_cost_per_1k,
                })
                .await?;
        }

        let report = SeedReport {
            categories: seed.categories.len(),
            features: seed.features.len(),
            models: seed.models.len(),
        };
        info!(?report, "Catalog seeded");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::tests::feature;

    #[test]
    fn test_compose_master_prompt() {
        let features = vec![feature(1, "Headline", 1), feature(2, "Body", 2)];
        let prompt = compose_master_prompt("You are a copywriter.", &features);
        assert_eq!(
            prompt,
            "You are a copywriter.\n\n## Headline\nWrite the Headline.\n\n## Body\nWrite the Body."
        );
    }

    #[test]
    fn test_compose_master_prompt_without_base() {
        let prompt = compose_master_prompt("  ", &[feature(1, "CTA", 1)]);
        assert_eq!(prompt, "## CTA\nWrite the CTA.");
    }

    #[test]
    fn test_compose_master_prompt_without_features() {
        assert_eq!(compose_master_prompt("Base only", &[]), "Base only");
    }

    #[test]
    fn test_default_catalog_parses() {
        let seed = CatalogSeed::parse(DEFAULT_CATALOG).expect("valid seed");
        assert!(!seed.categories.is_empty());
        assert!(!seed.models.is_empty());
        assert!(
            seed.models
                .iter()
                .any(|m| m.features.is_empty() && m.master_prompt.is_some())
        );
        assert!(seed.models.iter().any(|m| !m.features.is_empty()));
    }

    #[test]
    fn test_seed_rejects_unknown_feature() {
        let yaml = r"
categories:
  - name: Sales
features: []
models:
  - name: Broken
    category: Sales
    features: [Missing]
";
        let err = CatalogSeed::parse(yaml).expect_err("should fail");
        assert!(err.to_string().contains("unknown feature 'Missing'"));
    }

    #[test]
    fn test_seed_rejects_model_without_prompt_or_features() {
        let yaml = r"
categories:
  - name: Sales
models:
  - name: Empty
    category: Sales
";
        assert!(matches!(CatalogSeed::parse(yaml), Err(CatalogError::Seed(_))));
    }

    #[test]
    fn test_seed_rejects_unknown_category() {
        let yaml = r"
models:
  - name: Orphan
    category: Nowhere
    master_prompt: hi
";
        assert!(CatalogSeed::parse(yaml).is_err());
    }

    #[test]
    fn test_model_input_deserializes_camel_case() {
        let json = r#"{"name": "Bot", "categoryId": 3, "featureIds": [1, 2], "inputCostPer1k": "0.01"}"#;
        let input: ModelInput = serde_json::from_str(json).expect("deserialize");
        assert_eq!(input.category_id, CategoryId::new(3));
        assert_eq!(input.feature_ids.len(), 2);
        assert_eq!(input.input_cost_per_1k, Some(Decimal::new(1, 2)));
    }
}
