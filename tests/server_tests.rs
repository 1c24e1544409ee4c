//! HTTP surface: health, recent objects and bearer authentication

mod common;

use std::time::Duration;

use common::{Harness, OAuthReply, spawn};
use crm_gateway::config::AuthConfig;
use crm_gateway::gateway::create_router;
use pretty_assertions::assert_eq;
use serde_json::Value;

async fn serve(h: &Harness, auth: &AuthConfig) -> String {
    let state = h.services.app_state(auth);
    spawn(create_router(state, Duration::from_secs(10))).await
}

#[tokio::test]
async fn test_health_reports_cache_stats() {
    let h = Harness::start().await;
    let base = serve(&h, &AuthConfig::default()).await;

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["list_cache"]["hits"], 0);
    assert_eq!(body["token_refreshes"], 0);
    assert!(body["store"].is_object());
}

#[tokio::test]
async fn test_new_crm_objects_with_defaults() {
    let h = Harness::start().await;
    let base = serve(&h, &AuthConfig::default()).await;

    let response = reqwest::get(format!("{base}/new_crm_objects")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    for resource in ["contacts", "deals", "tickets"] {
        let objects = body[resource].as_array().unwrap();
        assert_eq!(objects.len(), 10, "{resource}");
        // Default sort is by id
        assert_eq!(objects[0]["id"], "1");
        assert_eq!(objects[9]["id"], "10");
    }
    assert!(h.crm.requests().iter().all(|r| r.limit == 10 && r.after == 0));
}

#[tokio::test]
async fn test_new_crm_objects_pagination_and_filter() {
    let h = Harness::start().await;
    let base = serve(&h, &AuthConfig::default()).await;

    let response = reqwest::get(format!(
        "{base}/new_crm_objects?page=2&page_size=5&filter_by=deals-8"
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["contacts"].as_array().unwrap().len(), 0);
    let deals = body["deals"].as_array().unwrap();
    assert_eq!(deals.len(), 1);
    assert_eq!(deals[0]["properties"]["name"], "deals-8");
    assert!(h.crm.requests().iter().all(|r| r.limit == 5 && r.after == 5));
}

#[tokio::test]
async fn test_invalid_page_size_is_bad_request() {
    let h = Harness::start().await;
    let base = serve(&h, &AuthConfig::default()).await;

    let response = reqwest::get(format!("{base}/new_crm_objects?page_size=500"))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("page_size"));
    assert_eq!(h.crm.hits(), 0);
}

#[tokio::test]
async fn test_refresh_failure_is_bad_gateway() {
    let h = Harness::start().await;
    h.oauth
        .reply_with(OAuthReply::Status(401, "unauthorized client".to_string()));
    let base = serve(&h, &AuthConfig::default()).await;

    let response = reqwest::get(format!("{base}/new_crm_objects")).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("HTTP 401"));
}

#[tokio::test]
async fn test_bearer_auth_protects_objects_but_not_health() {
    let h = Harness::start().await;
    let auth = AuthConfig {
        enabled: true,
        bearer_tokens: vec!["internal-caller".to_string()],
        ..AuthConfig::default()
    };
    let base = serve(&h, &auth).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);

    let anonymous = client
        .get(format!("{base}/new_crm_objects"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);
    assert_eq!(anonymous.headers()["www-authenticate"], "Bearer");

    let wrong = client
        .get(format!("{base}/new_crm_objects"))
        .bearer_auth("guess")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let allowed = client
        .get(format!("{base}/new_crm_objects"))
        .bearer_auth("internal-caller")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
    assert_eq!(h.crm.hits(), 3);
}
