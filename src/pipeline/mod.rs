//! Download → transcode → upload for a single task.
//!
//! A run executes the stages strictly in order and stops at the first
//! failure. The task store sees exactly two writes per task: `processing`
//! when the task is created and one terminal write when the run ends.

mod workspace;

pub use workspace::Workspace;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::ffmpeg::{FFmpegProcessor, TranscodeError, Transcoder};
use crate::store::TaskStore;
use crate::task::{ProcessRequest, TaskId};
use crate::transfer::{HttpTransfer, Transfer, TransferError};

/// The three steps of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Transcode,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Download => "download",
            Stage::Transcode => "transcode",
            Stage::Upload => "upload",
        };
        f.write_str(s)
    }
}

/// Failure of one stage; always terminal for the task
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Download {0}")]
    Download(#[source] TransferError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error("Upload {0}")]
    Upload(#[source] TransferError),

    /// The worker running the task panicked or was cancelled
    #[error("worker stopped unexpectedly: {0}")]
    Crashed(String),
}

impl StageError {
    /// Stage that failed; `None` when the worker itself went away
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageError::Download(_) => Some(Stage::Download),
            StageError::Transcode(_) => Some(Stage::Transcode),
            StageError::Upload(_) => Some(Stage::Upload),
            StageError::Crashed(_) => None,
        }
    }
}

/// Sequences the stages of each task and records the outcome
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<TaskStore>,
    transfer: Arc<dyn Transfer>,
    transcoder: Arc<dyn Transcoder>,
    work_dir: PathBuf,
}

impl Pipeline {
    pub fn new(
        store: Arc<TaskStore>,
        transfer: Arc<dyn Transfer>,
        transcoder: Arc<dyn Transcoder>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            transfer,
            transcoder,
            work_dir,
        }
    }

    /// Wire up the HTTP transfer client and FFmpeg from configuration
    pub fn from_config(config: &Config, store: Arc<TaskStore>) -> Result<Self, TransferError> {
        let transfer = HttpTransfer::new(config.download_timeout, config.upload_timeout)?;
        let transcoder = FFmpegProcessor::new(
            config.ffmpeg_bin.clone(),
            config.encoding.clone(),
            config.background,
        )
        .with_timeout(config.transcode_timeout);

        Ok(Self::new(
            store,
            Arc::new(transfer),
            Arc::new(transcoder),
            config.work_dir.clone(),
        ))
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Create a task and run it in the background.
    ///
    /// The returned id is already visible as `processing`.
    pub fn submit(&self, request: ProcessRequest) -> TaskId {
        let id = self.store.create();
        self.spawn_worker(id, request);
        id
    }

    /// Create a task and wait for it to finish.
    ///
    /// The task runs on its own worker, so it still reaches a terminal
    /// state if this future is dropped.
    pub async fn run(&self, request: &ProcessRequest) -> (TaskId, Result<(), StageError>) {
        let id = self.store.create();
        let result = match self.spawn_worker(id, request.clone()).await {
            Ok(result) => result,
            Err(e) => Err(StageError::Crashed(e.to_string())),
        };
        (id, result)
    }

    /// Execute `id` on a spawned worker; a panicking worker fails the task
    fn spawn_worker(
        &self,
        id: TaskId,
        request: ProcessRequest,
    ) -> JoinHandle<Result<(), StageError>> {
        let pipeline = self.clone();
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            let worker = tokio::spawn(async move { pipeline.execute(id, &request).await });
            match worker.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Worker for task {} stopped unexpectedly: {}", id, e);
                    let err = StageError::Crashed(e.to_string());
                    store.fail(&id, err.to_string());
                    Err(err)
                }
            }
        })
    }

    /// Run all stages for an existing task and record the terminal state
    pub async fn execute(&self, id: TaskId, request: &ProcessRequest) -> Result<(), StageError> {
        let span = info_span!("task", id = %id);
        async move {
            match Workspace::create(&self.work_dir, &id).await {
                Ok(workspace) => {
                    let result = self.run_stages(&workspace, request).await;
                    self.record(&id, &result);
                    if let Err(e) = workspace.close().await {
                        warn!("Failed to remove work directory: {}", e);
                    }
                    result
                }
                Err(e) => {
                    let result = Err(StageError::Download(TransferError::Io(e)));
                    self.record(&id, &result);
                    result
                }
            }
        }
        .instrument(span)
        .await
    }

    /// The single terminal write for a task
    fn record(&self, id: &TaskId, result: &Result<(), StageError>) {
        match result {
            Ok(()) => {
                self.store.complete(id);
                info!("✅ Task completed");
            }
            Err(e) => {
                self.store.fail(id, e.to_string());
                match e.stage() {
                    Some(stage) => error!("❌ Task failed during {}: {}", stage, e),
                    None => error!("❌ Task failed: {}", e),
                }
            }
        }
    }

    async fn run_stages(
        &self,
        workspace: &Workspace,
        request: &ProcessRequest,
    ) -> Result<(), StageError> {
        info!("⬇️ Stage {}: {}", Stage::Download, request.input_url);
        self.transfer
            .download(&request.input_url, workspace.input_path())
            .await
            .map_err(StageError::Download)?;

        info!("🎞️ Stage {}", Stage::Transcode);
        self.transcoder
            .transcode(workspace.input_path(), workspace.output_path())
            .await?;

        info!("⬆️ Stage {}: {}", Stage::Upload, request.upload_url);
        self.transfer
            .upload(workspace.output_path(), &request.upload_url)
            .await
            .map_err(StageError::Upload)?;

        Ok(())
    }
}
