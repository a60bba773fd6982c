//! Account routes. A user may only read or change their own account.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use tower_sessions::Session;

use reality_cheque_core::UserId;

use super::{ApiResponse, MessageResponse, message, ok};
use crate::error::AppError;
use crate::middleware::{RequireUser, clear_current_user};
use crate::models::User;
use crate::services::UserService;
use crate::services::user::{PlanChange, PlanReceipt, ProfileInput};
use crate::state::AppState;

/// Build the account router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_profile).put(update_profile).delete(delete_account))
        .route("/{id}/plan", put(change_plan))
}

/// Reject access to anyone else's account.
fn ensure_self(user: &User, id: i32) -> Result<UserId, AppError> {
    let id = UserId::new(id);
    if user.id != id {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }
    Ok(id)
}

async fn get_profile(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let id = ensure_self(&user, id)?;
    let profile = UserService::new(state.pool()).get_profile(id).await?;
    Ok(ok(profile))
}

async fn update_profile(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<i32>,
    Json(input): Json<ProfileInput>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let id = ensure_self(&user, id)?;
    let updated = UserService::new(state.pool())
        .update_profile(id, input)
        .await?;
    Ok(ok(updated))
}

async fn delete_account(
    State(state): State<AppState>,
    session: Session,
    RequireUser(user): RequireUser,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = ensure_self(&user, id)?;
    UserService::new(state.pool()).delete_account(id).await?;
    clear_current_user(&session).await?;
    Ok(message("Account deleted"))
}

async fn change_plan(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<i32>,
    Json(change): Json<PlanChange>,
) -> Result<Json<ApiResponse<PlanReceipt>>, AppError> {
    let id = ensure_self(&user, id)?;
    let receipt = UserService::new(state.pool())
        .change_plan(id, &change)
        .await?;
    Ok(ok(receipt))
}
