//! HTTP surface of the relay.
//!
//! `GET /health` answers locally. Everything under `/<mount>` is forwarded.

use std::any::Any;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, warn, Level};

use crate::config::RelayConfig;
use crate::error::{ErrorBody, Result};
use crate::forward::Forwarder;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub forwarder: Forwarder,
}

impl AppState {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            forwarder: Forwarder::new(config)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

pub fn build_router(state: AppState) -> Router {
    let mount = state.forwarder.mount().to_string();
    Router::new()
        .route("/health", get(health))
        .route(&format!("/{mount}"), any(relay))
        .route(&format!("/{mount}/{{*rest}}"), any(relay))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors())
        .with_state(state)
}

/// `GET /health`
async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "Proxy server is running".to_string(),
    })
}

/// Any method under the mount path.
async fn relay(State(state): State<AppState>, request: Request) -> Response {
    match state.forwarder.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            if e.status().is_server_error() {
                warn!("Proxy error: {}", e);
            } else {
                debug!("Rejected relay request: {}", e);
            }
            e.into_response()
        }
    }
}

/// Browsers must be able to read relayed responses and send credentials, so
/// the caller's origin, method and headers are mirrored back.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    warn!("Relay handler panicked: {}", detail);
    let body = ErrorBody {
        error: "Internal server error".to_string(),
        message: detail.to_string(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
