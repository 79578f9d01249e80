use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{routing::get, routing::post, Json, Router};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::dedup::DedupStore;
use crate::metrics::Metrics;
use crate::normalize::{self, NormalizeError, WebhookPayload};
use crate::notify::Notifier;
use crate::signature;

const SIGNATURE_HEADER: &str = "x-webhook-signature";
const SIGNATURE_HEADER_FALLBACK: &str = "x-signature";
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Errors surfaced at the webhook boundary. The display string doubles as the
/// stable machine-readable error code.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid_signature")]
    InvalidSignature,
    #[error("invalid_json")]
    InvalidJson,
    #[error("missing_orderId")]
    MissingOrderId,
    #[error("internal_error")]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    fn status(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidJson | WebhookError::MissingOrderId => StatusCode::BAD_REQUEST,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            WebhookError::InvalidSignature => "invalid_signature",
            WebhookError::InvalidJson => "invalid_json",
            WebhookError::MissingOrderId => "missing_orderId",
            WebhookError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup: Option<bool>,
}

impl WebhookResponse {
    fn success() -> Self {
        Self {
            ok: true,
            error: None,
            skipped: None,
            dedup: None,
        }
    }

    fn skipped() -> Self {
        Self {
            skipped: Some(true),
            ..Self::success()
        }
    }

    fn duplicate() -> Self {
        Self {
            dedup: Some(true),
            ..Self::success()
        }
    }

    fn failure(code: &'static str) -> Self {
        Self {
            ok: false,
            error: Some(code),
            skipped: None,
            dedup: None,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dedup: DedupStore,
    pub notifier: Arc<Notifier>,
    pub metrics: Arc<Metrics>,
}

enum Outcome {
    Announced,
    Skipped,
    Duplicate,
}

async fn handle_purchase(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Outcome, WebhookError> {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(SIGNATURE_HEADER_FALLBACK))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !signature::verify(&state.config.webhook_secret, body, provided) {
        return Err(WebhookError::InvalidSignature);
    }

    let payload: WebhookPayload =
        serde_json::from_slice(body).map_err(|_| WebhookError::InvalidJson)?;

    // Unknown event types are acknowledged, not processed.
    if !payload.is_purchase() {
        return Ok(Outcome::Skipped);
    }

    let event = normalize::from_webhook(&payload, Utc::now()).map_err(|e| match e {
        NormalizeError::MissingOrderId => WebhookError::MissingOrderId,
        other => WebhookError::Internal(other.into()),
    })?;

    if state.dedup.has(&event.dedup_key).await? {
        return Ok(Outcome::Duplicate);
    }

    // Channel failures are isolated inside announce; the dedup commit happens
    // regardless, at-least-once with dedup at the source.
    state.notifier.announce(&event).await;
    state.dedup.add(&event.dedup_key).await?;
    state.metrics.increment_events();
    info!(order_id = %event.dedup_key, "Processed purchase webhook");
    Ok(Outcome::Announced)
}

async fn purchase_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    match handle_purchase(&state, &headers, &body).await {
        Ok(Outcome::Announced) => (StatusCode::OK, Json(WebhookResponse::success())),
        Ok(Outcome::Skipped) => (StatusCode::OK, Json(WebhookResponse::skipped())),
        Ok(Outcome::Duplicate) => (StatusCode::OK, Json(WebhookResponse::duplicate())),
        Err(e) => {
            if let WebhookError::Internal(inner) = &e {
                error!("Webhook error: {inner:#}");
            }
            (e.status(), Json(WebhookResponse::failure(e.code())))
        }
    }
}

async fn health() -> Json<WebhookResponse> {
    Json(WebhookResponse::success())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/public-sale", post(purchase_webhook))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
