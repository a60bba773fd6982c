//! Bot catalog routes.
//!
//! Reads are open to any principal; users only see categories their tier
//! unlocks, admins see everything. Writes require an admin.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use reality_cheque_core::{AiModelId, CategoryId, Tier};

use super::{ApiResponse, ok};
use crate::error::AppError;
use crate::middleware::{AnyPrincipal, Principal, RequireAdmin};
use crate::models::{AiModel, Category, Feature};
use crate::services::CatalogService;
use crate::services::catalog::{CategoryInput, FeatureInput, ModelDetail, ModelInput, SeedReport};
use crate::state::AppState;

/// Build the catalog router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/{id}/models", get(models_in_category))
        .route("/models", get(list_models).post(create_model))
        .route("/models/{id}", get(get_model))
        .route("/features", get(list_features).post(create_feature))
        .route("/populate", post(populate))
}

/// Tier filter for a principal: `None` means unfiltered.
const fn tier_filter(principal: &Principal) -> Option<Tier> {
    match principal {
        Principal::User(user) => Some(user.tier),
        Principal::Admin(_) => None,
    }
}

async fn list_categories(
    State(state): State<AppState>,
    AnyPrincipal(principal): AnyPrincipal,
) -> Result<Json<ApiResponse<Vec<Category>>>, AppError> {
    let categories = CatalogService::new(state.pool())
        .list_categories(tier_filter(&principal))
        .await?;
    Ok(ok(categories))
}

async fn models_in_category(
    State(state): State<AppState>,
    AnyPrincipal(principal): AnyPrincipal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<AiModel>>>, AppError> {
    let models = CatalogService::new(state.pool())
        .models_in_category(CategoryId::new(id), tier_filter(&principal))
        .await?;
    Ok(ok(models))
}

async fn list_models(
    State(state): State<AppState>,
    AnyPrincipal(principal): AnyPrincipal,
) -> Result<Json<ApiResponse<Vec<AiModel>>>, AppError> {
    let models = CatalogService::new(state.pool())
        .list_models(tier_filter(&principal))
        .await?;
    Ok(ok(models))
}

async fn get_model(
    State(state): State<AppState>,
    AnyPrincipal(_): AnyPrincipal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<ModelDetail>>, AppError> {
    let model = CatalogService::new(state.pool())
        .get_model(AiModelId::new(id))
        .await?;
    Ok(ok(model))
}

async fn list_features(
    State(state): State<AppState>,
    AnyPrincipal(_): AnyPrincipal,
) -> Result<Json<ApiResponse<Vec<Feature>>>, AppError> {
    Ok(ok(CatalogService::new(state.pool()).list_features().await?))
}

async fn create_category(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(body): Json<CategoryInput>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), AppError> {
    let category = CatalogService::new(state.pool())
        .create_category(&body)
        .await?;
    Ok((StatusCode::CREATED, ok(category)))
}

async fn create_feature(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(body): Json<FeatureInput>,
) -> Result<(StatusCode, Json<ApiResponse<Feature>>), AppError> {
    let feature = CatalogService::new(state.pool())
        .create_feature(&body)
        .await?;
    Ok((StatusCode::CREATED, ok(feature)))
}

async fn create_model(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(body): Json<ModelInput>,
) -> Result<(StatusCode, Json<ApiResponse<AiModel>>), AppError> {
    let model = CatalogService::new(state.pool()).create_model(&body).await?;
    Ok((StatusCode::CREATED, ok(model)))
}

/// Load the built-in catalog. Safe to call repeatedly.
async fn populate(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<ApiResponse<SeedReport>>, AppError> {
    let report = CatalogService::new(state.pool()).populate().await?;
    tracing::info!(admin_id = %admin.id, ?report, "Catalog populated");
    Ok(ok(report))
}
