//! Catalog repository: categories, features and AI models.
//!
//! Models are loaded together with their features (join table
//! `app.ai_model_feature`) in prompt order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use reality_cheque_core::{AiModelId, CategoryId, FeatureId, Tier};

use super::RepositoryError;
use crate::models::catalog::sort_features;
use crate::models::{AiModel, Category, Feature};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    name: String,
    description: String,
    tier_access: Tier,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::new(row.id),
            name: row.name,
            description: row.description,
            tier_access: row.tier_access,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FeatureRow {
    id: i32,
    name: String,
    description: String,
    prompt: String,
    sort_order: i32,
    is_optional: bool,
}

impl From<FeatureRow> for Feature {
    fn from(row: FeatureRow) -> Self {
        Self {
            id: FeatureId::new(row.id),
            name: row.name,
            description: row.description,
            prompt: row.prompt,
            sort_order: row.sort_order,
            is_optional: row.is_optional,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ModelFeatureRow {
    ai_model_id: i32,
    #[sqlx(flatten)]
    feature: FeatureRow,
}

#[derive(Debug, sqlx::FromRow)]
struct AiModelRow {
    id: i32,
    name: String,
    description: String,
    category_id: i32,
    master_prompt: Option<String>,
    input_cost_per_1k: Option<Decimal>,
    output_cost_per_1k: Option<Decimal>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AiModelRow {
    fn into_model(self, features: Vec<Feature>) -> AiModel {
        AiModel {
            id: AiModelId::new(self.id),
            name: self.name,
            description: self.description,
            category_id: CategoryId::new(self.category_id),
            master_prompt: self.master_prompt,
            features,
            input_cost_per_1k: self.input_cost_per_1k,
            output_cost_per_1k: self.output_cost_per_1k,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// =============================================================================
// Parameter Types
// =============================================================================

/// Fields for a new category.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub description: String,
    pub tier_access: Tier,
}

/// Fields for a new feature.
#[derive(Debug, Clone)]
pub struct NewFeature {
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub sort_order: i32,
    pub is_optional: bool,
}

/// Fields for a new model.
#[derive(Debug, Clone)]
pub struct NewAiModel {
    pub name: String,
    pub description: String,
    pub category_id: CategoryId,
    pub master_prompt: Option<String>,
    pub feature_ids: Vec<FeatureId>,
    pub input_cost_per_1k: Option<Decimal>,
    pub output_cost_per_1k: Option<Decimal>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog database operations.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------------
    // Categories
    // -------------------------------------------------------------------------

    /// List categories by name.
    ///
    /// With `visible_to`, only active categories whose `tier_access` is at or
    /// below that tier are returned; without it, every category is.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_categories(
        &self,
        visible_to: Option<Tier>,
    ) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            r"
            SELECT id, name, description, tier_access, is_active, created_at
            FROM app.categories
            WHERE $1::app.user_tier IS NULL
               OR (is_active AND tier_access <= $1::app.user_tier)
            ORDER BY name
            ",
        )
        .bind(visible_to)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Get a category by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r"
            SELECT id, name, description, tier_access, is_active, created_at
            FROM app.categories
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name already exists.
    pub async fn create_category(&self, new: &NewCategory) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r"
            INSERT INTO app.categories (name, description, tier_access)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, tier_access, is_active, created_at
            ",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.tier_access)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "category name already exists"))?;

        Ok(row.into())
    }

    /// Insert a category or update the existing one with the same name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_category(&self, new: &NewCategory) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r"
            INSERT INTO app.categories (name, description, tier_access)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET description = EXCLUDED.description,
                tier_access = EXCLUDED.tier_access
            RETURNING id, name, description, tier_access, is_active, created_at
            ",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.tier_access)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    // -------------------------------------------------------------------------
    // Features
    // -------------------------------------------------------------------------

    /// List all features in prompt order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_features(&self) -> Result<Vec<Feature>, RepositoryError> {
        let rows = sqlx::query_as::<_, FeatureRow>(
            r"
            SELECT id, name, description, prompt, sort_order, is_optional
            FROM app.features
            ORDER BY sort_order, id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Fetch the features with the given IDs. Unknown IDs are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn features_by_ids(&self, ids: &[FeatureId]) -> Result<Vec<Feature>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(FeatureId::as_i32).collect();
        let rows = sqlx::query_as::<_, FeatureRow>(
            r"
            SELECT id, name, description, prompt, sort_order, is_optional
            FROM app.features
            WHERE id = ANY($1)
            ORDER BY sort_order, id
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Create a feature.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name already exists.
    pub async fn create_feature(&self, new: &NewFeature) -> Result<Feature, RepositoryError> {
        let row = sqlx::query_as::<_, FeatureRow>(
            r"
            INSERT INTO app.features (name, description, prompt, sort_order, is_optional)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, description, prompt, sort_order, is_optional
            ",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.prompt)
        .bind(new.sort_order)
        .bind(new.is_optional)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "feature name already exists"))?;

        Ok(row.into())
    }

    /// Insert a feature or update the existing one with the same name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_feature(&self, new: &NewFeature) -> Result<Feature, RepositoryError> {
        let row = sqlx::query_as::<_, FeatureRow>(
            r"
            INSERT INTO app.features (name, description, prompt, sort_order, is_optional)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE
            SET description = EXCLUDED.description,
                prompt = EXCLUDED.prompt,
                sort_order = EXCLUDED.sort_order,
                is_optional = EXCLUDED.is_optional
            RETURNING id, name, description, prompt, sort_order, is_optional
            ",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.prompt)
        .bind(new.sort_order)
        .bind(new.is_optional)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    // -------------------------------------------------------------------------
    // Models
    // -------------------------------------------------------------------------

    /// Get a model with its features.
    ///
    /// With `active_only`, inactive models (or models in inactive categories)
    /// are treated as missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_model(
        &self,
        id: AiModelId,
        active_only: bool,
    ) -> Result<Option<AiModel>, RepositoryError> {
        let row = sqlx::query_as::<_, AiModelRow>(
            r"
            SELECT m.id, m.name, m.description, m.category_id, m.master_prompt,
                   m.input_cost_per_1k, m.output_cost_per_1k, m.is_active,
                   m.created_at, m.updated_at
            FROM app.ai_models m
            JOIN app.categories c ON c.id = m.category_id
            WHERE m.id = $1 AND (NOT $2 OR (m.is_active AND c.is_active))
            ",
        )
        .bind(id)
        .bind(active_only)
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut features = self.load_features(&[row.id]).await?;
        let own = features.remove(&row.id).unwrap_or_default();
        Ok(Some(row.into_model(own)))
    }

    /// List active models, optionally limited to one category and/or to
    /// categories visible to a tier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_models(
        &self,
        category: Option<CategoryId>,
        visible_to: Option<Tier>,
    ) -> Result<Vec<AiModel>, RepositoryError> {
        let rows = sqlx::query_as::<_, AiModelRow>(
            r"
            SELECT m.id, m.name, m.description, m.category_id, m.master_prompt,
                   m.input_cost_per_1k, m.output_cost_per_1k, m.is_active,
                   m.created_at, m.updated_at
            FROM app.ai_models m
            JOIN app.categories c ON c.id = m.category_id
            WHERE m.is_active
              AND ($1::INTEGER IS NULL OR m.category_id = $1)
              AND ($2::app.user_tier IS NULL
                   OR (c.is_active AND c.tier_access <= $2::app.user_tier))
            ORDER BY m.name
            ",
        )
        .bind(category)
        .bind(visible_to)
        .fetch_all(self.pool)
        .await?;

        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        let mut features = self.load_features(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let own = features.remove(&row.id).unwrap_or_default();
                row.into_model(own)
            })
            .collect())
    }

    /// Create a model and attach its features.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name already exists.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_model(&self, new: &NewAiModel) -> Result<AiModel, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, AiModelRow>(
            r"
            INSERT INTO app.ai_models
                (name, description, category_id, master_prompt,
                 input_cost_per_1k, output_cost_per_1k)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, description, category_id, master_prompt,
                      input_cost_per_1k, output_cost_per_1k, is_active,
                      created_at, updated_at
            ",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.category_id)
        .bind(new.master_prompt.as_deref())
        .bind(new.input_cost_per_1k)
        .bind(new.output_cost_per_1k)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::unique_or(e, "model name already exists"))?;

        attach_features(&mut tx, row.id, &new.feature_ids).await?;
        tx.commit().await?;

        self.get_model(AiModelId::new(row.id), false)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Insert a model or update the existing one with the same name, replacing
    /// its feature set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn upsert_model(&self, new: &NewAiModel) -> Result<AiModel, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO app.ai_models
                (name, description, category_id, master_prompt,
                 input_cost_per_1k, output_cost_per_1k)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE
            SET description = EXCLUDED.description,
                category_id = EXCLUDED.category_id,
                master_prompt = EXCLUDED.master_prompt,
                input_cost_per_1k = EXCLUDED.input_cost_per_1k,
                output_cost_per_1k = EXCLUDED.output_cost_per_1k,
                updated_at = NOW()
            RETURNING id
            ",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.category_id)
        .bind(new.master_prompt.as_deref())
        .bind(new.input_cost_per_1k)
        .bind(new.output_cost_per_1k)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM app.ai_model_feature WHERE ai_model_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        attach_features(&mut tx, id, &new.feature_ids).await?;
        tx.commit().await?;

        self.get_model(AiModelId::new(id), false)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Load features for the given model IDs, grouped by model, in prompt order.
    async fn load_features(
        &self,
        model_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<Feature>>, RepositoryError> {
        if model_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, ModelFeatureRow>(
            r"
            SELECT mf.ai_model_id, f.id, f.name, f.description, f.prompt,
                   f.sort_order, f.is_optional
            FROM app.ai_model_feature mf
            JOIN app.features f ON f.id = mf.feature_id
            WHERE mf.ai_model_id = ANY($1)
            ",
        )
        .bind(model_ids)
        .fetch_all(self.pool)
        .await?;

        let mut grouped: HashMap<i32, Vec<Feature>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.ai_model_id)
                .or_default()
                .push(row.feature.into());
        }
        for features in grouped.values_mut() {
            sort_features(features);
        }

        Ok(grouped)
    }
}

async fn attach_features(
    tx: &mut Transaction<'_, Postgres>,
    model_id: i32,
    feature_ids: &[FeatureId],
) -> Result<(), RepositoryError> {
    if feature_ids.is_empty() {
        return Ok(());
    }

    let ids: Vec<i32> = feature_ids.iter().map(FeatureId::as_i32).collect();
    sqlx::query(
        r"
        INSERT INTO app.ai_model_feature (ai_model_id, feature_id)
        SELECT $1, UNNEST($2::INTEGER[])
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(model_id)
    .bind(&ids)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
