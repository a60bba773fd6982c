//! Integration tests for voucher validation and redemption.
//!
//! These tests require a running server. The redemption flows also need an
//! admin account (see `admin_token`).

use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::{Value, json};

use reality_cheque_integration_tests::{
    admin_token, api_url, client, register_user, unique_suffix,
};

/// Test helper: create a credits voucher through the admin API.
async fn create_credits_voucher(client: &Client, admin: &str, max_uses: i32) -> String {
    let code = unique_suffix(8);
    let resp = client
        .post(api_url("/admin/vouchers"))
        .bearer_auth(admin)
        .json(&json!({
            "code": code,
            "voucherType": "credits",
            "value": "12.50",
            "maxUses": max_uses,
            "validUntil": Utc::now() + Duration::days(1),
        }))
        .send()
        .await
        .expect("Failed to create voucher");
    assert_eq!(resp.status(), StatusCode::CREATED);
    code
}

/// Test helper: the admin view of one voucher.
async fn admin_voucher(client: &Client, admin: &str, code: &str) -> Value {
    let resp = client
        .get(api_url("/admin/vouchers"))
        .bearer_auth(admin)
        .send()
        .await
        .expect("Failed to list vouchers");
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.expect("json");
    body["data"]
        .as_array()
        .expect("voucher list")
        .iter()
        .find(|v| v["code"] == code)
        .cloned()
        .expect("voucher listed")
}

/// Test helper: a user's remaining credits.
async fn remaining_credits(client: &Client, token: &str) -> Decimal {
    let resp = client
        .get(api_url("/generate/credits"))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to get credits");
    let body: Value = resp.json().await.expect("json");
    body["data"]["remainingCredits"]
        .as_str()
        .expect("decimal string")
        .parse()
        .expect("decimal")
}

/// Test helper: redeem `code` as the token's user.
async fn use_code(client: &Client, token: &str, code: &str) -> reqwest::Response {
    client
        .post(api_url("/voucher/use"))
        .bearer_auth(token)
        .json(&json!({"code": code, "plan": "tier1"}))
        .send()
        .await
        .expect("Failed to send")
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_unknown_code_is_invalid_not_error() {
    let user = register_user(&client()).await;

    let resp = client()
        .post(api_url("/voucher/validate"))
        .bearer_auth(&user.token)
        .json(&json!({"code": "ZZZZZZ", "orderValue": "19.99", "plan": "tier2"}))
        .send()
        .await
        .expect("Failed to send");
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["data"]["valid"], false);
    assert_eq!(body["data"]["message"], "Invalid voucher code");
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_using_unknown_code_is_rejected() {
    let user = register_user(&client()).await;

    let resp = client()
        .post(api_url("/voucher/use"))
        .bearer_auth(&user.token)
        .json(&json!({"code": "ZZZZZZ", "orderValue": "19.99", "plan": "tier2"}))
        .send()
        .await
        .expect("Failed to send");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Redemption
// ============================================================================

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_user_can_redeem_a_voucher_only_once() {
    let client = client();
    let admin = admin_token(&client).await;
    let code = create_credits_voucher(&client, &admin, 5).await;
    let user = register_user(&client).await;
    let before = remaining_credits(&client, &user.token).await;

    let resp = use_code(&client, &user.token, &code).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["success"], true);
    let granted: Decimal = body["data"]["creditsGranted"]
        .as_str()
        .expect("decimal string")
        .parse()
        .expect("decimal");
    assert_eq!(granted, Decimal::new(1250, 2));
    assert_eq!(
        remaining_credits(&client, &user.token).await,
        before + Decimal::new(1250, 2)
    );

    let resp = use_code(&client, &user.token, &code).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(
        remaining_credits(&client, &user.token).await,
        before + Decimal::new(1250, 2)
    );

    let voucher = admin_voucher(&client, &admin, &code).await;
    assert_eq!(voucher["usedCount"], 1);
    assert_eq!(voucher["usedBy"].as_array().map(Vec::len), Some(1));
    assert_eq!(voucher["usedBy"][0], user.id);
}

#[tokio::test]
#[ignore = "Requires running server"]
async fn test_single_use_voucher_refuses_second_user() {
    let client = client();
    let admin = admin_token(&client).await;
    let code = create_credits_voucher(&client, &admin, 1).await;
    let first = register_user(&client).await;
    let second = register_user(&client).await;

    let resp = use_code(&client, &first.token, &code).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let before = remaining_credits(&client, &second.token).await;
    let resp = use_code(&client, &second.token, &code).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("json");
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(remaining_credits(&client, &second.token).await, before);

    let voucher = admin_voucher(&client, &admin, &code).await;
    assert_eq!(voucher["usedCount"], 1);
    assert_eq!(voucher["usedBy"].as_array().map(Vec::len), Some(1));
    assert_eq!(voucher["usedBy"][0], first.id);
}
