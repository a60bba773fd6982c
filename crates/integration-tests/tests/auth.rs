//! Integration tests for registration, login and access control.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (`rc-cli migrate`)
//! - The API server running (`cargo run -p reality-cheque-api`)

use reqwest::StatusCode;
use serde_json::{Value, json};

use reality_cheque_integration_tests::{api_url, base_url, client, register_user};

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_health() {
    let resp = client()
        .get(format!("{}/health", base_url()))
        .send()
        .await
        .expect("Failed to reach server");
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_register_then_me_with_session() {
    let client = client();
    let user = register_user(&client).await;

    let resp = client
        .get(api_url("/auth/me"))
        .send()
        .await
        .expect("Failed to get me");
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["role"], "user");
    assert_eq!(body["data"]["user"]["username"], user.username);
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_login_with_bearer_token() {
    let user = register_user(&client()).await;

    let resp = client()
        .post(api_url("/auth/login"))
        .json(&json!({"username": user.username, "password": user.password}))
        .send()
        .await
        .expect("Failed to login");
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("json");
    let token = body["data"]["token"].as_str().expect("token");

    let resp = client()
        .get(api_url("/generate/credits"))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to get credits");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_wrong_password_is_unauthorized() {
    let user = register_user(&client()).await;

    let resp = client()
        .post(api_url("/auth/login"))
        .json(&json!({"username": user.username, "password": "not the password"}))
        .send()
        .await
        .expect("Failed to login");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_protected_routes_require_auth() {
    for path in ["/generate/credits", "/generate/chats", "/ai-models/models"] {
        let resp = client()
            .get(api_url(path))
            .send()
            .await
            .expect("Failed to send");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{path}");
    }
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_user_token_cannot_reach_admin() {
    let user = register_user(&client()).await;

    let resp = client()
        .get(api_url("/admin/dashboard"))
        .bearer_auth(&user.token)
        .send()
        .await
        .expect("Failed to send");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_cannot_read_other_profile() {
    let first = register_user(&client()).await;
    let second = register_user(&client()).await;

    let resp = client()
        .get(api_url(&format!("/user/{}", second.id)))
        .bearer_auth(&first.token)
        .send()
        .await
        .expect("Failed to send");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client()
        .get(api_url(&format!("/user/{}", first.id)))
        .bearer_auth(&first.token)
        .send()
        .await
        .expect("Failed to send");
    assert_eq!(resp.status(), StatusCode::OK);
}
