//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, warn};

use super::auth::{ResolvedAuthConfig, auth_middleware};
use crate::Error;
use crate::crm::{RecentObjects, ViewOptions};
use crate::oauth::AccessTokenProvider;
use crate::store::CacheStore;

/// Shared application state
pub struct AppState {
    /// Access token provider
    pub tokens: Arc<AccessTokenProvider>,
    /// Recent objects service (list cache + CRM client)
    pub recent: Arc<RecentObjects>,
    /// Shared cache store
    pub store: Arc<dyn CacheStore>,
    /// Authentication configuration
    pub auth_config: Arc<ResolvedAuthConfig>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let auth_config = Arc::clone(&state.auth_config);

    Router::new()
        .route("/health", get(health_handler))
        .route("/new_crm_objects", get(new_crm_objects_handler))
        .layer(middleware::from_fn_with_state(auth_config, auth_middleware))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query parameters for `/new_crm_objects`
#[derive(Debug, Deserialize)]
pub struct NewObjectsQuery {
    /// Page number, from 1
    #[serde(default = "default_page")]
    pub page: u32,
    /// Records per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Sort field
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    /// Substring filter
    #[serde(default)]
    pub filter_by: String,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

fn default_sort_by() -> String {
    "id".to_string()
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "list_cache": state.recent.lists().stats(),
        "store": state.store.stats(),
        "token_refreshes": state.tokens.refresher().refresh_count(),
    }))
}

/// GET /new_crm_objects - contacts, deals and tickets for one page
async fn new_crm_objects_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NewObjectsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let view = ViewOptions {
        sort_by: Some(query.sort_by),
        filter_by: Some(query.filter_by),
    };
    let objects = state
        .recent
        .collect(query.page, query.page_size, &view)
        .await?;
    Ok(Json(objects))
}

/// Error wrapper rendering gateway errors as JSON responses
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(error = %self.0, "Request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
