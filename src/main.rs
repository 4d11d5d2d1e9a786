//! # transcode-relay - Remote Transcoding Worker
//!
//! A small HTTP worker that downloads a media file, re-encodes it with FFmpeg
//! and uploads the result to a destination URL.
//!
//! ## Features
//!
//! - **Task Polling**: `POST /process` answers with a task id, `GET /status` reports progress
//! - **Isolated Work Directories**: every task gets its own scratch directory, removed when it ends
//! - **Streaming Transfers**: media is moved in 1 MiB chunks, never buffered whole
//! - **Configurable**: FFmpeg settings, timeouts and the shared secret come from environment variables
//! - **Signal Handling**: Graceful shutdown on SIGINT
//!
//! ## Usage
//!
//! ```bash
//! # Start the worker
//! WORKER_API_KEY=secret transcode-relay serve --bind 0.0.0.0:8000
//!
//! # Run one task in the foreground
//! transcode-relay run https://example.com/in.webm https://bucket.example.com/out.mp4
//!
//! # Check that FFmpeg can be started
//! transcode-relay check
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transcode_relay::commands::{check::CheckCommand, run::RunCommand, serve::ServeCommand};
use transcode_relay::config::Config;

/// transcode-relay - download, transcode with FFmpeg, upload
#[derive(Parser)]
#[command(
    name = "transcode-relay",
    about = "A remote transcoding worker",
    long_about = "Downloads a source media URL, re-encodes it to H.264/AAC MP4 with FFmpeg and uploads the result.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP worker
    Serve {
        /// Address to listen on
        #[arg(long, short = 'b', env = "BIND_ADDR")]
        bind: Option<SocketAddr>,
        /// Directory under which per-task work directories are created
        #[arg(long, short = 'w', env = "WORK_DIR")]
        work_dir: Option<PathBuf>,
        /// Run FFmpeg with low priority
        #[arg(long)]
        background: bool,
    },
    /// Download, transcode and upload a single file, then exit
    Run {
        /// Source media URL
        input_url: String,
        /// Destination URL the result is PUT to
        upload_url: String,
        /// Directory under which the work directory is created
        #[arg(long, short = 'w', env = "WORK_DIR")]
        work_dir: Option<PathBuf>,
    },
    /// Check that FFmpeg can be started
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcode_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    let result = match cli.command {
        Commands::Serve {
            bind,
            work_dir,
            background,
        } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(work_dir) = work_dir {
                config.work_dir = work_dir;
            }
            config.background |= background;
            info!(
                "Starting serve command on {}, work: {:?}, background: {}",
                config.bind_addr, config.work_dir, config.background
            );
            ServeCommand::new(config).execute().await
        }
        Commands::Run {
            input_url,
            upload_url,
            work_dir,
        } => {
            if let Some(work_dir) = work_dir {
                config.work_dir = work_dir;
            }
            info!("Starting run command for: {}", input_url);
            RunCommand::new(config, input_url, upload_url).execute().await
        }
        Commands::Check => match CheckCommand::new(config).execute().await {
            Ok(version) => {
                println!("{version}");
                Ok(())
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
