//! Authentication extractors.
//!
//! Users authenticate with a bearer token or the cookie session; admins only
//! with a bearer token. Every extractor reloads the principal from the
//! database so deleted accounts lose access immediately.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tower_sessions::Session;

use reality_cheque_core::{AdminId, UserId};

use crate::db::{AdminRepository, UserRepository};
use crate::error::{AppError, set_sentry_user};
use crate::models::{Admin, CurrentUser, User, session_keys};
use crate::services::auth::{AuthService, Claims, TokenRole};
use crate::services::check_user_credits;
use crate::state::AppState;

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify the bearer token, if one was sent.
fn bearer_claims(parts: &Parts, state: &AppState) -> Result<Option<Claims>, AppError> {
    let Some(raw) = bearer_token(parts) else {
        return Ok(None);
    };
    AuthService::new(state.pool(), &state.config().jwt_secret)
        .verify_token(raw)
        .map(Some)
        .map_err(AppError::from)
}

async fn load_user(state: &AppState, id: UserId) -> Result<User, AppError> {
    let user = UserRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;
    set_sentry_user(user.id.as_i32(), &user.username);
    Ok(user)
}

async fn load_admin(state: &AppState, id: AdminId) -> Result<Admin, AppError> {
    let admin = AdminRepository::new(state.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Admin not found".to_string()))?;
    set_sentry_user(admin.id.as_i32(), &admin.username);
    Ok(admin)
}

/// User id stored in the cookie session, if any.
async fn session_user_id(parts: &Parts) -> Option<UserId> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
        .map(|current| current.id)
}

/// Extractor that requires an authenticated user.
///
/// Checks the bearer token first, then the cookie session. Rejects with
/// 401 when neither identifies a user and 403 for an admin token.
///
/// ```rust,ignore
/// async fn handler(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.username)
/// }
/// ```
pub struct RequireUser(pub User);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(claims) = bearer_claims(parts, state)? {
            if claims.role != TokenRole::User {
                return Err(AppError::Forbidden("User access required".to_string()));
            }
            return load_user(state, UserId::new(claims.sub)).await.map(Self);
        }

        let id = session_user_id(parts)
            .await
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
        load_user(state, id).await.map(Self)
    }
}

/// Extractor that requires an authenticated user with credits left.
///
/// Rejects with 402 `INSUFFICIENT_CREDITS` when the balance is at or below
/// the threshold.
pub struct RequireCredits(pub User);

impl FromRequestParts<AppState> for RequireCredits {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireUser(user) = RequireUser::from_request_parts(parts, state).await?;
        if !check_user_credits(&user) {
            return Err(AppError::InsufficientCredits);
        }
        Ok(Self(user))
    }
}

/// Extractor that requires an admin bearer token.
///
/// Rejects with 401 without a valid token and 403 for a user token.
pub struct RequireAdmin(pub Admin);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state)?
            .ok_or_else(|| AppError::Unauthorized("Admin token required".to_string()))?;
        if claims.role != TokenRole::Admin {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        load_admin(state, AdminId::new(claims.sub)).await.map(Self)
    }
}

/// An authenticated user or admin.
#[derive(Debug, Clone)]
pub enum Principal {
    User(User),
    Admin(Admin),
}

/// Extractor accepting either kind of principal.
pub struct AnyPrincipal(pub Principal);

impl FromRequestParts<AppState> for AnyPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(claims) = bearer_claims(parts, state)? {
            let principal = match claims.role {
                TokenRole::User => Principal::User(load_user(state, UserId::new(claims.sub)).await?),
                TokenRole::Admin => {
                    Principal::Admin(load_admin(state, AdminId::new(claims.sub)).await?)
                }
            };
            return Ok(Self(principal));
        }

        let id = session_user_id(parts)
            .await
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
        Ok(Self(Principal::User(load_user(state, id).await?)))
    }
}

/// Store the logged-in user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Remove the logged-in user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
