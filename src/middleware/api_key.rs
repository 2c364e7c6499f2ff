use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::ApiKeyConfig;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared-secret check applied to every request before routing.
#[derive(Debug)]
pub struct ApiKeyGate {
    key: String,
    exempt_paths: HashSet<String>,
}

impl ApiKeyGate {
    pub fn new(cfg: &ApiKeyConfig) -> Self {
        Self {
            key: cfg.key.clone(),
            exempt_paths: cfg.exempt_paths.clone(),
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }

    pub fn accepts(&self, presented: Option<&[u8]>) -> bool {
        presented.is_some_and(|p| bool::from(p.ct_eq(self.key.as_bytes())))
    }
}

pub async fn require_api_key(
    State(gate): State<Arc<ApiKeyGate>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if gate.is_exempt(path) {
        return next.run(req).await;
    }

    let presented = req.headers().get(API_KEY_HEADER).map(|v| v.as_bytes());
    if !gate.accepts(presented) {
        warn!(path, present = presented.is_some(), "api key rejected");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Invalid or missing API key" })),
        )
            .into_response();
    }

    next.run(req).await
}
