//! HTTP ingress: health probe, task submission and status polling.

mod auth;
mod error;
mod handlers;

pub use auth::{check_bearer, Authorized};
pub use error::{ApiError, ApiResult};
pub use handlers::{HealthResponse, ProcessResponse, StatusQuery};

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ResponseMode;
use crate::ffmpeg::FFmpegProcessor;
use crate::pipeline::Pipeline;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub encoder: Arc<FFmpegProcessor>,
    pub api_key: Arc<str>,
    pub mode: ResponseMode,
}

impl AppState {
    pub fn new(
        pipeline: Pipeline,
        encoder: FFmpegProcessor,
        api_key: impl Into<Arc<str>>,
        mode: ResponseMode,
    ) -> Self {
        Self {
            pipeline,
            encoder: Arc::new(encoder),
            api_key: api_key.into(),
            mode,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/process", post(handlers::process))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("🌐 Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
