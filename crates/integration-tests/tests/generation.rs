//! Integration tests for the generation routes that do not call the LLM.
//!
//! These tests require a running server with a seeded catalog
//! (`rc-cli seed catalog`).

use reqwest::StatusCode;
use serde_json::{Value, json};

use reality_cheque_integration_tests::{api_url, client, register_user};

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_new_user_has_starting_credits() {
    let user = register_user(&client()).await;

    let body: Value = client()
        .get(api_url("/generate/credits"))
        .bearer_auth(&user.token)
        .send()
        .await
        .expect("Failed to get credits")
        .json()
        .await
        .expect("json");
    assert_eq!(body["success"], true);
    assert!(body["data"]["remainingCredits"].is_string());
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_foreign_session_is_forbidden() {
    let user = register_user(&client()).await;
    let foreign = format!("{}_1_1700000000000", user.id + 1);

    let resp = client()
        .get(api_url(&format!("/generate/session/{foreign}/history")))
        .bearer_auth(&user.token)
        .send()
        .await
        .expect("Failed to send");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_unknown_chat_is_not_found() {
    let user = register_user(&client()).await;

    let resp = client()
        .get(api_url("/generate/chat/2147483000/history"))
        .bearer_auth(&user.token)
        .send()
        .await
        .expect("Failed to send");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_batch_limit_is_validated() {
    let user = register_user(&client()).await;
    let inputs: Vec<String> = (0..11).map(|i| format!("input {i}")).collect();

    let resp = client()
        .post(api_url("/generate/batch-generate"))
        .bearer_auth(&user.token)
        .json(&json!({"modelId": 1, "inputs": inputs}))
        .send()
        .await
        .expect("Failed to send");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_fresh_user_has_no_chats() {
    let user = register_user(&client()).await;

    let body: Value = client()
        .get(api_url("/generate/chats"))
        .bearer_auth(&user.token)
        .send()
        .await
        .expect("Failed to send")
        .json()
        .await
        .expect("json");
    assert_eq!(body["data"], json!([]));
}
