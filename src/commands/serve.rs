use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use crate::config::{Config, ResponseMode};
use crate::ffmpeg::FFmpegProcessor;
use crate::pipeline::Pipeline;
use crate::server::{self, AppState};
use crate::store::TaskStore;

/// Command to run the HTTP worker
pub struct ServeCommand {
    config: Config,
}

impl ServeCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = &self.config;

        if config.api_key.is_empty() {
            warn!("⚠️ WORKER_API_KEY is empty; any request sending an empty bearer token is accepted");
        }

        tokio::fs::create_dir_all(&config.work_dir)
            .await
            .with_context(|| format!("Cannot create work directory {:?}", config.work_dir))?;

        let mode = match config.response_mode {
            ResponseMode::Async => "async (poll /status)",
            ResponseMode::Sync => "sync",
        };
        info!("✅ Starting worker in {} mode.", mode);
        info!("Task work directories go under: {:?}", config.work_dir);

        let store = Arc::new(TaskStore::new());
        let pipeline = Pipeline::from_config(config, store)
            .context("Failed to build HTTP client")?;
        let encoder = FFmpegProcessor::new(
            config.ffmpeg_bin.clone(),
            config.encoding.clone(),
            config.background,
        );

        match encoder.version().await {
            Ok(version) => info!("Using {}", version),
            Err(e) => warn!("FFmpeg is not available yet: {:#}", e),
        }

        let state = AppState::new(
            pipeline,
            encoder,
            config.api_key.as_str(),
            config.response_mode,
        );

        server::serve(state, config.bind_addr, async {
            let _ = signal::ctrl_c().await;
            info!("🛑 Shutdown signal received. Exiting gracefully.");
        })
        .await
    }
}
