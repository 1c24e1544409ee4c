//! Bearer-token authentication for internal callers

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::AuthConfig;

/// Resolved authentication configuration
#[derive(Debug, Default)]
pub struct ResolvedAuthConfig {
    /// Whether auth is enabled
    pub enabled: bool,
    /// Accepted tokens
    tokens: Vec<String>,
    /// Public paths
    pub public_paths: Vec<String>,
}

impl ResolvedAuthConfig {
    /// Create resolved config from `AuthConfig`
    pub fn from_config(config: &AuthConfig) -> Self {
        let tokens: Vec<String> = config
            .bearer_tokens
            .iter()
            .filter(|t| !t.is_empty())
            .cloned()
            .collect();

        if config.enabled && tokens.is_empty() {
            warn!("Authentication enabled without any bearer tokens; all protected requests will be rejected");
        }

        Self {
            enabled: config.enabled,
            tokens,
            public_paths: config.public_paths.clone(),
        }
    }

    /// Check if a path bypasses authentication
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path == p || path.starts_with(&format!("{p}/")))
    }

    /// Constant-time check of a presented token
    pub fn validate_token(&self, token: &str) -> bool {
        let presented = token.as_bytes();
        self.tokens
            .iter()
            .fold(false, |found, t| found | bool::from(t.as_bytes().ct_eq(presented)))
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(auth_config): State<Arc<ResolvedAuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_config.enabled {
        return next.run(request).await;
    }

    let path = request.uri().path();
    if auth_config.is_public_path(path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        });

    let Some(token) = token else {
        warn!(path = %path, "Missing Authorization header");
        return unauthorized_response(
            "Missing Authorization header. Use: Authorization: Bearer <token>",
        );
    };

    if auth_config.validate_token(token) {
        next.run(request).await
    } else {
        warn!(path = %path, "Invalid token");
        unauthorized_response("Invalid token")
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(json!({ "error": message })),
    )
        .into_response()
}
