use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::store::TaskStore;
use crate::task::ProcessRequest;

/// Command to run a single task in the foreground, without the HTTP server
pub struct RunCommand {
    config: Config,
    request: ProcessRequest,
}

impl RunCommand {
    pub fn new(config: Config, input_url: String, upload_url: String) -> Self {
        Self {
            config,
            request: ProcessRequest::new(input_url, upload_url),
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let pipeline = Pipeline::from_config(&self.config, Arc::new(TaskStore::new()))?;

        let (task_id, result) = pipeline.run(&self.request).await;
        match result {
            Ok(()) => {
                info!("✅ Task {} completed: {}", task_id, self.request.upload_url);
                Ok(())
            }
            Err(e) => match e.stage() {
                Some(stage) => Err(anyhow!("Task {} failed during {}: {}", task_id, stage, e)),
                None => Err(anyhow!("Task {} failed: {}", task_id, e)),
            },
        }
    }
}
