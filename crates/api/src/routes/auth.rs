//! User authentication routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::info;

use super::{ApiResponse, MessageResponse, message, ok};
use crate::error::AppError;
use crate::middleware::{
    AnyPrincipal, Principal, auth_rate_limiter, clear_current_user, set_current_user,
};
use crate::models::{Admin, CurrentUser, User};
use crate::services::AuthService;
use crate::services::auth::Registration;
use crate::state::AppState;

/// Build the auth router. Register and login are rate limited.
pub fn router() -> Router<AppState> {
    let limited = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .layer(auth_rate_limiter());

    Router::new()
        .merge(limited)
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// Registration form.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login form. `identifier` is an email or a username.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "email", alias = "username")]
    pub identifier: String,
    pub password: String,
}

/// A user plus a bearer token.
#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
}

/// The caller's identity.
#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum MePayload {
    User { user: User },
    Admin { admin: Admin },
}

/// Create an account and log it in.
async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthPayload>>), AppError> {
    let auth = AuthService::new(state.pool(), &state.config().jwt_secret);
    let user = auth
        .register(&Registration {
            username: &body.username,
            email: &body.email,
            password: &body.password,
        })
        .await?;
    let token = auth.user_token(&user)?;

    set_current_user(&session, &CurrentUser::from(&user)).await?;
    info!(user_id = %user.id, "User registered");

    Ok((StatusCode::CREATED, ok(AuthPayload { user, token })))
}

/// Log in by email or username.
async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthPayload>>, AppError> {
    let auth = AuthService::new(state.pool(), &state.config().jwt_secret);
    let user = auth.login(body.identifier.trim(), &body.password).await?;
    let token = auth.user_token(&user)?;

    set_current_user(&session, &CurrentUser::from(&user)).await?;
    info!(user_id = %user.id, "User logged in");

    Ok(ok(AuthPayload { user, token }))
}

/// End the cookie session. Bearer tokens simply expire.
async fn logout(session: Session) -> Result<Json<MessageResponse>, AppError> {
    clear_current_user(&session).await?;
    Ok(message("Logged out"))
}

/// Who is calling.
async fn me(AnyPrincipal(principal): AnyPrincipal) -> Json<ApiResponse<MePayload>> {
    ok(match principal {
        Principal::User(user) => MePayload::User { user },
        Principal::Admin(admin) => MePayload::Admin { admin },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_accepts_email_or_username() {
        let by_email: LoginRequest =
            serde_json::from_str(r#"{"email": "a@b.co", "password": "pw"}"#).expect("email");
        assert_eq!(by_email.identifier, "a@b.co");

        let by_name: LoginRequest =
            serde_json::from_str(r#"{"username": "studio", "password": "pw"}"#).expect("username");
        assert_eq!(by_name.identifier, "studio");

        let explicit: LoginRequest =
            serde_json::from_str(r#"{"identifier": "studio", "password": "pw"}"#).expect("identifier");
        assert_eq!(explicit.identifier, "studio");
    }
}
