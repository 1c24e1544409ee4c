//! Access token lifecycle against a stub OAuth endpoint
//!
//! Covers:
//! - Refresh on an empty cache, reuse while valid
//! - Refresh once the cached token expires
//! - Self-healing of an undecodable cache entry
//! - Refresh failures surfacing status and body
//! - Single-flight refresh under concurrency

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, OAuthReply, T0};
use crm_gateway::Error;
use crm_gateway::oauth::TokenRecord;
use crm_gateway::store::CacheStore;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_empty_cache_refreshes_once_and_stores_record() {
    let h = Harness::start().await;

    let token = h.services.tokens.get_token().await.unwrap();
    assert_eq!(token, "token-1");
    assert_eq!(h.oauth.hits(), 1);

    let raw = h.store.get("hubspot_token").await.unwrap().unwrap();
    let record: TokenRecord = serde_json::from_str(&raw).unwrap();
    assert_eq!(record.token, "token-1");
    assert_eq!(record.expires_at, T0 + 1800);
    assert_eq!(h.store.ttl_of("hubspot_token"), Some(1800));

    // Still valid: no second refresh
    h.clock.advance(1000);
    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-1");
    assert_eq!(h.oauth.hits(), 1);
    assert_eq!(h.services.tokens.refresher().refresh_count(), 1);
}

#[tokio::test]
async fn test_valid_cached_token_needs_no_network() {
    let h = Harness::start().await;
    h.services
        .tokens
        .cache()
        .store("cached-token", 3600)
        .await
        .unwrap();

    assert_eq!(h.services.tokens.get_token().await.unwrap(), "cached-token");
    assert_eq!(h.oauth.hits(), 0);
}

#[tokio::test]
async fn test_expired_token_triggers_exactly_one_refresh() {
    let h = Harness::start().await;
    h.services
        .tokens
        .cache()
        .store("old-token", 60)
        .await
        .unwrap();

    h.clock.advance(60);
    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-1");
    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-1");
    assert_eq!(h.oauth.hits(), 1);
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_replaced() {
    let h = Harness::start().await;
    h.store
        .insert_raw("hubspot_token", "{not json", Duration::from_secs(3600));

    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-1");
    assert_eq!(h.oauth.hits(), 1);

    let record = h.services.tokens.cache().load().await.unwrap().unwrap();
    assert_eq!(record.token, "token-1");
}

#[tokio::test]
async fn test_refresh_sends_refresh_token_grant() {
    let h = Harness::start().await;
    h.services.tokens.get_token().await.unwrap();

    let form = h.oauth.last_form().unwrap();
    assert_eq!(form.get("grant_type").map(String::as_str), Some("refresh_token"));
    assert_eq!(form.get("client_id").map(String::as_str), Some("client-id"));
    assert_eq!(form.get("client_secret").map(String::as_str), Some("client-secret"));
    assert_eq!(form.get("refresh_token").map(String::as_str), Some("refresh-secret"));
}

#[tokio::test]
async fn test_rejected_refresh_carries_status_and_body() {
    let h = Harness::start().await;
    h.oauth.reply_with(OAuthReply::Status(
        400,
        r#"{"status":"BAD_REFRESH_TOKEN","message":"missing or invalid refresh token"}"#.to_string(),
    ));

    let err = h.services.tokens.get_token().await.unwrap_err();
    match err {
        Error::Refresh { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("BAD_REFRESH_TOKEN"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.store.get("hubspot_token").await.unwrap().is_none());
    assert_eq!(h.services.tokens.refresher().refresh_count(), 0);
}

#[tokio::test]
async fn test_malformed_token_response() {
    let h = Harness::start().await;

    h.oauth
        .reply_with(OAuthReply::Raw(r#"{"access_token":"abc"}"#.to_string()));
    let err = h.services.tokens.get_token().await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)), "{err:?}");

    h.oauth.reply_with(OAuthReply::Raw(
        r#"{"access_token":"abc","expires_in":0}"#.to_string(),
    ));
    let err = h.services.tokens.get_token().await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)), "{err:?}");

    assert!(h.store.get("hubspot_token").await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let h = Harness::start().await;
    h.oauth.delay(Duration::from_millis(100));
    let tokens = Arc::clone(&h.services.tokens);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tokens = Arc::clone(&tokens);
            tokio::spawn(async move { tokens.get_token().await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "token-1");
    }
    assert_eq!(h.oauth.hits(), 1);
}

#[tokio::test]
async fn test_force_refresh_replaces_valid_token() {
    let h = Harness::start().await;
    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-1");

    assert_eq!(h.services.tokens.force_refresh().await.unwrap(), "token-2");
    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-2");
    assert_eq!(h.oauth.hits(), 2);
}

#[tokio::test]
async fn test_invalidate_forces_next_refresh() {
    let h = Harness::start().await;
    h.services.tokens.get_token().await.unwrap();

    h.services.tokens.cache().invalidate().await.unwrap();
    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-2");
}

#[tokio::test]
async fn test_refresh_releases_sentinel() {
    let h = Harness::start().await;
    h.services.tokens.get_token().await.unwrap();
    assert!(
        h.store
            .get("hubspot_token:refreshing")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_waits_for_refresh_by_another_instance() {
    let h = Harness::start().await;
    h.store
        .set("hubspot_token:refreshing", "1", Duration::from_secs(30))
        .await
        .unwrap();

    let peer = Arc::clone(&h.services.tokens);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        peer.cache().store("peer-token", 3600).await.unwrap();
    });

    assert_eq!(h.services.tokens.get_token().await.unwrap(), "peer-token");
    assert_eq!(h.oauth.hits(), 0);
}

#[tokio::test]
async fn test_stale_sentinel_falls_back_to_refresh() {
    let oauth = common::StubOAuth::start().await;
    let crm = common::StubCrm::start().await;
    let mut config = common::test_config(&oauth, &crm);
    config.oauth.timeout = Duration::from_millis(300);
    let h = Harness::with_config(oauth, crm, config);
    h.store
        .set("hubspot_token:refreshing", "1", Duration::from_secs(30))
        .await
        .unwrap();

    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-1");
    assert_eq!(h.oauth.hits(), 1);
}

#[tokio::test]
async fn test_lifecycle_without_single_flight() {
    let oauth = common::StubOAuth::start().await;
    let crm = common::StubCrm::start().await;
    let mut config = common::test_config(&oauth, &crm);
    config.oauth.single_flight = false;
    let h = Harness::with_config(oauth, crm, config);

    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-1");
    assert_eq!(h.oauth.hits(), 1);

    h.clock.advance(1799);
    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-1");
    assert_eq!(h.oauth.hits(), 1);

    h.clock.advance(1);
    assert_eq!(h.services.tokens.get_token().await.unwrap(), "token-2");
    assert_eq!(h.oauth.hits(), 2);
    // No sentinel without single-flight
    assert!(
        h.store
            .get("hubspot_token:refreshing")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_refresh_timeout_leaves_cache_untouched() {
    let oauth = common::StubOAuth::start().await;
    let crm = common::StubCrm::start().await;
    let mut config = common::test_config(&oauth, &crm);
    config.oauth.timeout = Duration::from_millis(100);
    let h = Harness::with_config(oauth, crm, config);
    h.oauth.delay(Duration::from_secs(1));

    let err = h.services.tokens.get_token().await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err:?}");
    assert!(h.store.get("hubspot_token").await.unwrap().is_none());
    assert_eq!(h.services.tokens.refresher().refresh_count(), 0);
}
