//! Admin routes: token auth, dashboard, users and vouchers.
//!
//! Everything except login requires an admin bearer token.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use reality_cheque_core::{UserId, VoucherId};

use super::{ApiResponse, MessageResponse, message, ok};
use crate::error::AppError;
use crate::middleware::{RequireAdmin, auth_rate_limiter};
use crate::models::{Admin, Voucher};
use crate::services::admin::{Dashboard, Page, UserPage};
use crate::services::auth::token::ADMIN_TOKEN_TTL;
use crate::services::voucher::VoucherInput;
use crate::services::{AdminService, AuthService, VoucherOutcome, VoucherService};
use crate::state::AppState;

/// Build the admin router. Login is rate limited.
pub fn router() -> Router<AppState> {
    let limited = Router::new()
        .route("/login", post(login))
        .layer(auth_rate_limiter());

    Router::new()
        .merge(limited)
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
        .route("/me", get(me))
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users))
        .route("/users/{id}/credits", post(grant_credits))
        .route("/vouchers", get(list_vouchers).post(create_voucher))
        .route("/vouchers/{id}", delete(delete_voucher))
        .route("/vouchers/{id}/active", put(set_voucher_active))
}

/// Admin login form.
#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    pub password: String,
}

/// Admin token response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminToken {
    pub admin: Admin,
    pub token: String,
    pub expires_in: i64,
}

/// Credit grant form.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub amount: Decimal,
}

/// Balance after a grant.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResponse {
    pub user_id: UserId,
    pub remaining_credits: Decimal,
}

/// Voucher activation form.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRequest {
    pub is_active: bool,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<AdminLoginRequest>,
) -> Result<Json<ApiResponse<AdminToken>>, AppError> {
    let (admin, token) = AuthService::new(state.pool(), &state.config().jwt_secret)
        .admin_login(body.identifier.trim(), &body.password)
        .await?;

    Ok(ok(AdminToken {
        admin,
        token,
        expires_in: ADMIN_TOKEN_TTL.num_seconds(),
    }))
}

/// Admin tokens are stateless; the client discards its copy.
async fn logout() -> Json<MessageResponse> {
    message("Logged out")
}

async fn refresh(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<ApiResponse<AdminToken>>, AppError> {
    let token = AuthService::new(state.pool(), &state.config().jwt_secret)
        .refresh_admin(&admin)
        .await?;

    Ok(ok(AdminToken {
        admin,
        token,
        expires_in: ADMIN_TOKEN_TTL.num_seconds(),
    }))
}

async fn me(RequireAdmin(admin): RequireAdmin) -> Json<ApiResponse<Admin>> {
    ok(admin)
}

async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<ApiResponse<Dashboard>>, AppError> {
    Ok(ok(AdminService::new(state.pool()).dashboard().await?))
}

async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(page): Query<Page>,
) -> Result<Json<ApiResponse<UserPage>>, AppError> {
    Ok(ok(AdminService::new(state.pool()).list_users(page).await?))
}

async fn grant_credits(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(body): Json<GrantRequest>,
) -> Result<Json<ApiResponse<GrantResponse>>, AppError> {
    if body.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Amount must be greater than 0".to_string(),
        ));
    }

    let user_id = UserId::new(id);
    let remaining_credits = AdminService::new(state.pool())
        .grant_credits(admin.id, user_id, body.amount)
        .await?;

    Ok(ok(GrantResponse {
        user_id,
        remaining_credits,
    }))
}

async fn list_vouchers(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<ApiResponse<Vec<Voucher>>>, AppError> {
    Ok(ok(VoucherService::new(state.pool()).list_vouchers().await?))
}

async fn create_voucher(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<VoucherInput>,
) -> Result<(StatusCode, Json<ApiResponse<Voucher>>), AppError> {
    match VoucherService::new(state.pool())
        .create_voucher(&body, Some(admin.id))
        .await?
    {
        VoucherOutcome::Accepted(voucher) => Ok((StatusCode::CREATED, ok(voucher))),
        VoucherOutcome::Rejected(msg) => Err(AppError::BadRequest(msg)),
    }
}

async fn delete_voucher(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, AppError> {
    match VoucherService::new(state.pool())
        .delete_voucher(VoucherId::new(id))
        .await?
    {
        VoucherOutcome::Accepted(()) => Ok(message("Voucher deleted")),
        VoucherOutcome::Rejected(msg) => Err(AppError::BadRequest(msg)),
    }
}

async fn set_voucher_active(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<i32>,
    Json(body): Json<ActiveRequest>,
) -> Result<Json<ApiResponse<Voucher>>, AppError> {
    let voucher = VoucherService::new(state.pool())
        .set_active(VoucherId::new(id), body.is_active)
        .await?;
    Ok(ok(voucher))
}
