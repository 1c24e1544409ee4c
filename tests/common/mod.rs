//! Stub OAuth and CRM servers shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;

use crm_gateway::clock::ManualClock;
use crm_gateway::config::{Config, RetryConfig};
use crm_gateway::gateway::Services;
use crm_gateway::store::InMemoryStore;

/// Start time for manual clocks
pub const T0: u64 = 1_700_000_000;

/// Serve `router` on an ephemeral local port, returning its base URL
pub async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// What the stub token endpoint answers
#[derive(Debug, Clone)]
pub enum OAuthReply {
    /// Issue `token-<n>` valid for `expires_in` seconds
    Token { expires_in: u64 },
    /// Error status with a body
    Status(u16, String),
    /// 200 with an arbitrary body
    Raw(String),
}

pub struct OAuthState {
    hits: AtomicUsize,
    reply: Mutex<OAuthReply>,
    delay: Mutex<Duration>,
    last_form: Mutex<Option<HashMap<String, String>>>,
}

/// Stub OAuth token endpoint
pub struct StubOAuth {
    pub url: String,
    state: Arc<OAuthState>,
}

impl StubOAuth {
    pub async fn start() -> Self {
        let state = Arc::new(OAuthState {
            hits: AtomicUsize::new(0),
            reply: Mutex::new(OAuthReply::Token { expires_in: 1800 }),
            delay: Mutex::new(Duration::ZERO),
            last_form: Mutex::new(None),
        });
        let router = Router::new()
            .route("/oauth/v1/token", post(token_handler))
            .with_state(Arc::clone(&state));
        let base = spawn(router).await;
        Self {
            url: format!("{base}/oauth/v1/token"),
            state,
        }
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn reply_with(&self, reply: OAuthReply) {
        *self.state.reply.lock().unwrap() = reply;
    }

    pub fn delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    pub fn last_form(&self) -> Option<HashMap<String, String>> {
        self.state.last_form.lock().unwrap().clone()
    }
}

async fn token_handler(
    State(state): State<Arc<OAuthState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    *state.last_form.lock().unwrap() = Some(form);

    let delay = *state.delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let reply = state.reply.lock().unwrap().clone();
    match reply {
        OAuthReply::Token { expires_in } => Json(json!({
            "access_token": format!("token-{n}"),
            "refresh_token": "refresh-secret",
            "expires_in": expires_in,
            "token_type": "bearer",
        }))
        .into_response(),
        OAuthReply::Status(status, body) => {
            (StatusCode::from_u16(status).unwrap(), body).into_response()
        }
        OAuthReply::Raw(body) => {
            ([("content-type", "application/json")], body).into_response()
        }
    }
}

/// What the stub CRM answers
#[derive(Debug, Clone)]
pub enum CrmReply {
    /// Serve pages
    Ok,
    /// 429 with `Retry-After: 0` this many times, then serve pages
    RateLimited(usize),
    /// Fixed error status
    Status(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrmRequest {
    pub resource: String,
    pub limit: u32,
    pub after: u32,
    pub bearer: Option<String>,
}

pub struct CrmState {
    reply: Mutex<CrmReply>,
    requests: Mutex<Vec<CrmRequest>>,
}

/// Stub CRM objects API
pub struct StubCrm {
    pub url: String,
    state: Arc<CrmState>,
}

impl StubCrm {
    pub async fn start() -> Self {
        let state = Arc::new(CrmState {
            reply: Mutex::new(CrmReply::Ok),
            requests: Mutex::new(Vec::new()),
        });
        let router = Router::new()
            .route("/crm/v3/objects/{resource}", get(objects_handler))
            .with_state(Arc::clone(&state));
        let url = spawn(router).await;
        Self { url, state }
    }

    pub fn reply_with(&self, reply: CrmReply) {
        *self.state.reply.lock().unwrap() = reply;
    }

    pub fn requests(&self) -> Vec<CrmRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    pub fn hits_for(&self, resource: &str) -> usize {
        self.state
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.resource == resource)
            .count()
    }
}

async fn objects_handler(
    State(state): State<Arc<CrmState>>,
    Path(resource): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let limit: u32 = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(10);
    let after: u32 = query.get("after").and_then(|v| v.parse().ok()).unwrap_or(0);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(ToString::to_string);
    state.requests.lock().unwrap().push(CrmRequest {
        resource: resource.clone(),
        limit,
        after,
        bearer,
    });

    let reply = {
        let mut guard = state.reply.lock().unwrap();
        let current = guard.clone();
        if let CrmReply::RateLimited(remaining) = current {
            *guard = if remaining <= 1 {
                CrmReply::Ok
            } else {
                CrmReply::RateLimited(remaining - 1)
            };
        }
        current
    };

    match reply {
        CrmReply::Ok => Json(page_body(&resource, limit, after)).into_response(),
        CrmReply::RateLimited(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            [("retry-after", "0")],
            "slow down",
        )
            .into_response(),
        CrmReply::Status(status) => {
            (StatusCode::from_u16(status).unwrap(), "backend failure").into_response()
        }
    }
}

/// Objects `after+1..=after+limit`, newest first
fn page_body(resource: &str, limit: u32, after: u32) -> serde_json::Value {
    let results: Vec<_> = (after + 1..=after + limit)
        .rev()
        .map(|id| {
            json!({
                "id": id.to_string(),
                "properties": { "name": format!("{resource}-{id}") },
                "createdAt": format!("2024-01-{:02}T00:00:00Z", id % 28 + 1),
                "updatedAt": "2024-02-01T00:00:00Z",
                "archived": false,
            })
        })
        .collect();
    json!({ "results": results, "paging": { "next": { "after": (after + limit).to_string() } } })
}

/// Configuration pointing at the stubs, with fast retries
pub fn test_config(oauth: &StubOAuth, crm: &StubCrm) -> Config {
    let mut config = Config::default();
    config.oauth.token_url = oauth.url.clone();
    config.oauth.client_id = "client-id".to_string();
    config.oauth.client_secret = "client-secret".to_string();
    config.oauth.refresh_token = "refresh-secret".to_string();
    config.crm.base_url = crm.url.clone();
    config.crm.retry = RetryConfig {
        enabled: true,
        max_attempts: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        multiplier: 2.0,
    };
    config
}

/// Everything a test needs to drive the gateway against the stubs
pub struct Harness {
    pub oauth: StubOAuth,
    pub crm: StubCrm,
    pub config: Config,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStore>,
    pub services: Services,
}

impl Harness {
    pub async fn start() -> Self {
        let oauth = StubOAuth::start().await;
        let crm = StubCrm::start().await;
        let config = test_config(&oauth, &crm);
        Self::with_config(oauth, crm, config)
    }

    pub fn with_config(oauth: StubOAuth, crm: StubCrm, config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let services = Services::with_store(&config, store.clone(), clock.clone()).unwrap();
        Self {
            oauth,
            crm,
            config,
            clock,
            store,
            services,
        }
    }
}
