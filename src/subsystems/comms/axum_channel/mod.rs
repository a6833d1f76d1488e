//! Axum-based HTTP channel: the public `/agent/*` API plus `/api/health`.
//!
//! Implements [`Component`] so it slots into the comms subsystem lifecycle:
//! `run()` drives the axum event loop; the [`CancellationToken`] is wired to
//! axum's graceful shutdown.
//!
//! ## URL layout
//!
//! ```text
//! POST /agent/execute-sql        {query}
//! POST /agent/execute-terminal   {command}
//! POST /agent/gpt                {prompt, temperature?}
//! POST /agent/zapier             {prompt}
//! POST /agent/write              {input: string | {data, fileName}}
//! POST /agent/read               {fileName}
//! POST /agent/qa-over-code       {prompt, path}
//! POST /agent/conversation       {prompt, temperature?, ownerId?}
//! POST /agent/chat               {prompt, temperature?, ownerId?}
//! GET  /agent/chat/history       ?ownerId&limit&offset
//! POST /agent/index/invalidate   {path}           → 204
//! GET  /agent/langchain          → "langchain"
//! GET  /api/health
//! ```

mod api;

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::core::config::HttpConfig;
use crate::core::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

use super::state::{CommsEvent, CommsState};

// ── Shared request state ──────────────────────────────────────────────────────

/// Axum router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone: all fields are reference-counted.
#[derive(Clone)]
pub(crate) struct AxumState {
    /// Channel identifier used in log spans and bus requests.
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
}

// ── AxumChannel ───────────────────────────────────────────────────────────────

pub struct AxumChannel {
    channel_id: String,
    config: HttpConfig,
    state: Arc<CommsState>,
}

impl AxumChannel {
    pub fn new(channel_id: impl Into<String>, config: HttpConfig, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), config, state }
    }
}

impl Component for AxumChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_axum(self.channel_id, self.config, self.state, shutdown))
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

async fn run_axum(
    channel_id: String,
    config: HttpConfig,
    comms: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(&channel_id, comms.clone(), &config.allowed_origins);

    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| AppError::Comms(format!("axum bind failed on {}: {e}", config.bind)))?;

    info!(%channel_id, bind = %config.bind, "axum channel listening");
    comms.report_event(CommsEvent::ChannelStarted { channel_id: channel_id.clone() });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("axum server error: {e}")))?;

    info!(%channel_id, "axum channel shut down");
    comms.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the full router.  Public so integration tests can drive it without
/// binding a socket.
pub fn build_router(channel_id: &str, comms: Arc<CommsState>, allowed_origins: &[String]) -> Router {
    let state = AxumState { channel_id: Arc::from(channel_id), comms };

    Router::new()
        .route("/agent/execute-sql",      post(api::execute_sql))
        .route("/agent/execute-terminal", post(api::execute_terminal))
        .route("/agent/gpt",              post(api::gpt))
        .route("/agent/zapier",           post(api::zapier))
        .route("/agent/write",            post(api::write))
        .route("/agent/read",             post(api::read))
        .route("/agent/qa-over-code",     post(api::qa_over_code))
        .route("/agent/conversation",     post(api::conversation))
        .route("/agent/chat",             post(api::chat))
        .route("/agent/chat/history",     get(api::chat_history))
        .route("/agent/index/invalidate", post(api::invalidate_index))
        .route("/agent/langchain",        get(api::langchain))
        .route("/api/health",             get(api::health))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(%origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
