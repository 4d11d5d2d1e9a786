use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ffmpeg::EncodingSettings;

/// How `POST /process` answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Return the task id right away; clients poll `/status`
    Async,
    /// Run the whole pipeline before answering with `{"ok": true}`
    Sync,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "async" => Ok(ResponseMode::Async),
            "sync" => Ok(ResponseMode::Sync),
            other => Err(format!("Unknown response mode '{other}'. Use 'async' or 'sync'")),
        }
    }
}

/// Configuration for the worker, FFmpeg and transfers
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub bind_addr: SocketAddr,
    pub work_dir: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub encoding: EncodingSettings,
    pub download_timeout: Duration,
    pub upload_timeout: Duration,
    pub transcode_timeout: Option<Duration>,
    pub response_mode: ResponseMode,
    pub background: bool,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env::var("WORKER_API_KEY").unwrap_or_default(),
            bind_addr: parse_env("BIND_ADDR").unwrap_or(defaults.bind_addr),
            work_dir: env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_bin: env::var("FFMPEG_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_bin),
            encoding: EncodingSettings {
                preset: env::var("FFMPEG_PRESET").unwrap_or(defaults.encoding.preset),
                crf: env::var("FFMPEG_CRF").unwrap_or(defaults.encoding.crf),
                audio_bitrate: env::var("FFMPEG_AUDIO_BITRATE")
                    .unwrap_or(defaults.encoding.audio_bitrate),
            },
            download_timeout: parse_env("DOWNLOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            upload_timeout: parse_env("UPLOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upload_timeout),
            transcode_timeout: parse_env("TRANSCODE_TIMEOUT_SECS").map(Duration::from_secs),
            response_mode: parse_env("RESPONSE_MODE").unwrap_or(defaults.response_mode),
            background: parse_env("BACKGROUND").unwrap_or(defaults.background),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            work_dir: env::temp_dir(),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            encoding: EncodingSettings::default(),
            download_timeout: Duration::from_secs(120),
            upload_timeout: Duration::from_secs(300),
            transcode_timeout: None,
            response_mode: ResponseMode::Async,
            background: false,
        }
    }
}

/// Read and parse an environment variable, ignoring unset or malformed values
fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok()?.trim().parse().ok()
}
