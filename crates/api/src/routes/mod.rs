//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                  - Liveness
//! GET  /health/ready                            - Readiness (database)
//!
//! # Under /api
//! POST /auth/register | /auth/login | /auth/logout
//! GET  /auth/me                                 - User or admin
//!
//! POST /admin/login | /admin/logout | /admin/refresh
//! GET  /admin/me | /admin/dashboard | /admin/users
//! POST /admin/users/{id}/credits
//! GET  /admin/vouchers, POST /admin/vouchers
//! DELETE /admin/vouchers/{id}, PUT /admin/vouchers/{id}/active
//!
//! GET  /ai-models/categories | /ai-models/categories/{id}/models
//! GET  /ai-models/models | /ai-models/models/{id} | /ai-models/features
//! POST /ai-models/categories | /ai-models/features | /ai-models/models
//! POST /ai-models/populate                      - Seed the built-in catalog
//!
//! POST /generate/generate | /generate/batch-generate | /generate/regenerate-feature
//! GET  /generate/credits | /generate/model/{modelId} | /generate/chats
//! GET  /generate/session/{sessionId}/history, DELETE /generate/session/{sessionId}
//! GET  /generate/chat/{chatId}/history | /generate/chat/{chatId}/stats
//! DELETE /generate/chat/{chatId}
//!
//! GET|PUT|DELETE /user/{id}, PUT /user/{id}/plan
//! POST /voucher/validate | /voucher/use
//! ```

pub mod admin;
pub mod ai_models;
pub mod auth;
pub mod generate;
pub mod health;
pub mod user;
pub mod voucher;

use axum::{
    Json, Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::from_fn,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultOnResponse, OnResponse, TraceLayer},
};
use tracing::Span;

use crate::middleware::{
    api_rate_limiter, create_session_layer, request_id_middleware,
    security_headers_middleware,
};
use crate::state::AppState;

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

/// Wrap `data` in a success envelope.
pub const fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Body of responses that only carry a message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Success with a message only.
pub fn message(text: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse {
        success: true,
        message: text.into(),
    })
}

/// Build the `/api` router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/admin", admin::router())
        .nest("/ai-models", ai_models::router())
        .nest("/generate", generate::router().layer(api_rate_limiter()))
        .nest("/user", user::router())
        .nest("/voucher", voucher::router())
}

/// CORS for the configured frontend origin. Without one, browsers only get
/// same-origin access.
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin).allow_credentials(true),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Ignoring invalid CORS_ORIGIN");
            layer
        }
        None => layer,
    }
}

/// Build the complete application: health checks, `/api` and all layers.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.pool(), state.config());
    let cors = cors_layer(state.config().cors_origin.as_deref());

    Router::new()
        .merge(health::router())
        .nest("/api", api_routes())
        .layer(from_fn(security_headers_middleware))
        .layer(session_layer)
        .layer(cors)
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let Json(body) = ok(vec![1, 2]);
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json, serde_json::json!({"success": true, "data": [1, 2]}));
    }

    #[test]
    fn test_cors_layer_tolerates_bad_origin() {
        let _ = cors_layer(Some("https://app.realitycheque.com"));
        let _ = cors_layer(Some("bad\norigin"));
        let _ = cors_layer(None);
    }

    #[test]
    fn test_message_envelope() {
        let Json(body) = message("Logged out");
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["message"], "Logged out");
        assert_eq!(json["success"], true);
    }
}
