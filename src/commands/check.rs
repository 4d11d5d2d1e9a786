use anyhow::{anyhow, Result};
use tracing::info;

use crate::config::Config;
use crate::ffmpeg::FFmpegProcessor;

/// Command to verify that FFmpeg can be started
pub struct CheckCommand {
    config: Config,
}

impl CheckCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> Result<String> {
        let encoder = FFmpegProcessor::new(
            self.config.ffmpeg_bin.clone(),
            self.config.encoding.clone(),
            false,
        );
        let version = encoder
            .version()
            .await
            .map_err(|e| anyhow!("FFmpeg check failed: {e:#}"))?;
        info!("✅ {}", version);
        Ok(version)
    }
}
