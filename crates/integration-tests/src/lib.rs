//! Integration tests for Reality Cheque.
//!
//! # Running Tests
//!
//! ```bash
//! # Start the database, migrate and run the server
//! rc-cli migrate && rc-cli seed catalog
//! cargo run -p reality-cheque-api
//!
//! # Run the server-backed tests
//! cargo test -p reality-cheque-integration-tests -- --ignored
//! ```
//!
//! Tests that need a running server are `#[ignore]`d; the rest run
//! against the library directly. Tests marked "Requires database" talk to
//! `DATABASE_URL` through the service layer without a server.

use reqwest::Client;
use secrecy::SecretString;
use sqlx::PgPool;
use serde_json::{Value, json};
use uuid::Uuid;

/// Base URL of the API server (configurable via environment).
#[must_use]
pub fn base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// URL of an `/api` path.
#[must_use]
pub fn api_url(path: &str) -> String {
    format!("{}/api{path}", base_url())
}

/// HTTP client that keeps the session cookie.
///
/// # Panics
///
/// Panics if the client cannot be built.
#[must_use]
pub fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
}

/// A freshly registered user.
pub struct TestUser {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub token: String,
}

/// Register a user with a unique name and return its credentials.
///
/// # Panics
///
/// Panics if registration fails.
pub async fn register_user(client: &Client) -> TestUser {
    let username = format!("it_{}", unique_suffix(12).to_lowercase());
    let password = "correct horse battery".to_string();

    let resp = client
        .post(api_url("/auth/register"))
        .json(&json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": password,
        }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), 201, "registration should succeed");

    let body: Value = resp.json().await.expect("Failed to read response");
    TestUser {
        id: body["data"]["user"]["id"].as_i64().expect("user id"),
        username,
        password,
        token: body["data"]["token"]
            .as_str()
            .expect("token")
            .to_string(),
    }
}

/// Pool on `DATABASE_URL` for service-level tests.
///
/// # Panics
///
/// Panics if `DATABASE_URL` is unset or unreachable.
pub async fn database() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    reality_cheque_api::db::create_pool(&SecretString::from(url))
        .await
        .expect("Failed to connect to database")
}

/// Unique suffix for usernames and voucher codes.
#[must_use]
pub fn unique_suffix(len: usize) -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .to_uppercase()
        .chars()
        .take(len)
        .collect()
}

/// Log in as the admin named by `TEST_ADMIN_USERNAME` / `TEST_ADMIN_PASSWORD`
/// (create one with `rc-cli admin create`) and return its bearer token.
///
/// # Panics
///
/// Panics if the variables are unset or the login fails.
pub async fn admin_token(client: &Client) -> String {
    let username = std::env::var("TEST_ADMIN_USERNAME").expect("TEST_ADMIN_USERNAME must be set");
    let password = std::env::var("TEST_ADMIN_PASSWORD").expect("TEST_ADMIN_PASSWORD must be set");

    let resp = client
        .post(api_url("/admin/login"))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .expect("Failed to log in as admin");
    assert_eq!(resp.status(), 200, "admin login should succeed");

    let body: Value = resp.json().await.expect("Failed to read response");
    body["data"]["token"]
        .as_str()
        .expect("admin token")
        .to_string()
}
