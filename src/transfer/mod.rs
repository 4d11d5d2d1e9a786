use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::error::Error as _;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::truncate::{head, MESSAGE_LIMIT};

/// Size of the buffers used when moving media between the network and disk
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Content type declared for uploaded output
pub const UPLOAD_CONTENT_TYPE: &str = "video/mp4";

/// Error bodies are read up to this many bytes before truncation
const ERROR_BODY_READ_LIMIT: usize = 4 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The remote answered with a status of 300 or above
    #[error("failed: {status} {body}")]
    Status { status: u16, body: String },

    /// DNS, connect, reset, timeout and other transport faults
    #[error("error: {0}")]
    Transport(String),

    /// Reading or writing the local file
    #[error("error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    fn transport(err: reqwest::Error) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        TransferError::Transport(head(&message, MESSAGE_LIMIT))
    }

    async fn from_response(response: Response) -> Self {
        let status = response.status().as_u16();
        let body = read_body_prefix(response).await;
        TransferError::Status {
            status,
            body: head(&body, MESSAGE_LIMIT),
        }
    }
}

/// Moves media between remote URLs and local files
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Stream `url` into the file at `dest`
    async fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError>;

    /// Stream the file at `src` to `url`
    async fn upload(&self, src: &Path, url: &str) -> Result<(), TransferError>;
}

/// Streaming HTTP transfers with stage-specific timeouts
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: Client,
    download_timeout: Duration,
    upload_timeout: Duration,
}

impl HttpTransfer {
    pub fn new(download_timeout: Duration, upload_timeout: Duration) -> Result<Self, TransferError> {
        let client = Client::builder()
            .connect_timeout(download_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransferError::transport)?;

        Ok(Self {
            client,
            download_timeout,
            upload_timeout,
        })
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), TransferError> {
        debug!("Downloading {} -> {:?}", url, dest);

        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(TransferError::transport)?;

        if response.status().as_u16() >= 300 {
            return Err(TransferError::from_response(response).await);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = File::create(dest).await?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(TransferError::transport)?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        info!("⬇️ Downloaded {} bytes to {:?}", written, dest);
        Ok(())
    }

    async fn upload(&self, src: &Path, url: &str) -> Result<(), TransferError> {
        debug!("Uploading {:?} -> {}", src, url);

        let file = File::open(src).await?;
        let length = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));

        let response = self
            .client
            .put(url)
            .timeout(self.upload_timeout)
            .header(CONTENT_TYPE, UPLOAD_CONTENT_TYPE)
            .header(CONTENT_LENGTH, length)
            .body(body)
            .send()
            .await
            .map_err(TransferError::transport)?;

        if response.status().as_u16() >= 300 {
            return Err(TransferError::from_response(response).await);
        }

        info!("⬆️ Uploaded {} bytes from {:?}", length, src);
        Ok(())
    }
}

/// Read the start of an error response without pulling the whole body
async fn read_body_prefix(response: Response) -> String {
    let mut buf = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(Ok(chunk)) = stream.next().await {
        buf.extend_from_slice(&chunk);
        if buf.len() >= ERROR_BODY_READ_LIMIT {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
