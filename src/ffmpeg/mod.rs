use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::truncate::{tail, STDERR_TAIL_LIMIT};

/// x264/AAC settings applied to every task
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingSettings {
    pub preset: String,
    pub crf: String,
    pub audio_bitrate: String,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            preset: "veryfast".to_string(),
            crf: "20".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The encoder ran and exited unsuccessfully
    #[error("ffmpeg failed: {stderr_tail}")]
    Exited {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("ffmpeg could not be started: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// Turns a downloaded input file into the output file
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError>;
}

/// FFmpeg wrapper for media transcoding
#[derive(Debug, Clone)]
pub struct FFmpegProcessor {
    binary: PathBuf,
    settings: EncodingSettings,
    background_mode: bool,
    timeout: Option<Duration>,
}

impl FFmpegProcessor {
    pub fn new(binary: impl Into<PathBuf>, settings: EncodingSettings, background_mode: bool) -> Self {
        Self {
            binary: binary.into(),
            settings,
            background_mode,
            timeout: None,
        }
    }

    /// Kill the encoder if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build base FFmpeg command, lowering its priority in background mode
    fn build_base_command(&self) -> Command {
        if self.background_mode {
            let mut c = Command::new("nice");
            c.args(["-n", "19"]);
            c.arg(&self.binary);
            c
        } else {
            Command::new(&self.binary)
        }
    }

    /// Full argument list for one transcode
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
        ];
        args.extend(
            [
                "-c:v",
                "libx264",
                "-preset",
                self.settings.preset.as_str(),
                "-crf",
                self.settings.crf.as_str(),
                "-c:a",
                "aac",
                "-b:a",
                self.settings.audio_bitrate.as_str(),
                "-movflags",
                "+faststart",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(output.to_string_lossy().into_owned());
        args
    }

    /// First line of `ffmpeg -version`
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to start {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} -version exited with {}: {}",
                self.binary.display(),
                output.status,
                tail(stderr.trim(), STDERR_TAIL_LIMIT)
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }
}

/// Drain `reader`, keeping only its last `limit` characters
async fn read_tail<R: AsyncRead + Unpin>(reader: R, limit: usize) -> std::io::Result<String> {
    let max_bytes = limit * 4;
    let mut reader = BufReader::new(reader);
    let mut kept: VecDeque<u8> = VecDeque::with_capacity(max_bytes);

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let n = chunk.len();
        kept.extend(chunk);
        let excess = kept.len().saturating_sub(max_bytes);
        kept.drain(..excess);
        reader.consume(n);
    }

    let bytes = Vec::from(kept);
    Ok(tail(&String::from_utf8_lossy(&bytes), limit))
}

#[async_trait]
impl Transcoder for FFmpegProcessor {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        info!("🚀 Starting conversion for: {:?}", input);

        let mut cmd = self.build_base_command();
        cmd.args(self.build_args(input, output));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!("Executing FFmpeg command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(TranscodeError::Spawn)?;
        let stderr = child.stderr.take();

        let run = async {
            let collect = async {
                match stderr {
                    Some(stderr) => read_tail(stderr, STDERR_TAIL_LIMIT)
                        .await
                        .unwrap_or_default(),
                    None => String::new(),
                }
            };
            let (status, stderr_tail) = tokio::join!(child.wait(), collect);
            status.map(|status| (status, stderr_tail))
        };
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| TranscodeError::TimedOut(limit))?,
            None => run.await,
        };
        let (status, stderr_tail) = result.map_err(TranscodeError::Spawn)?;

        if !status.success() {
            error!("FFmpeg failed with {}", status);
            return Err(TranscodeError::Exited {
                code: status.code(),
                stderr_tail,
            });
        }

        info!("✅ Conversion successful: {:?} -> {:?}", input, output);
        Ok(())
    }
}
