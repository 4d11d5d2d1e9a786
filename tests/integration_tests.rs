#![cfg(unix)]

use axum::body::{Body, Bytes};
use axum::extract::{Path as UrlPath, State};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::Router;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;

use serial_test::serial;

use transcode_relay::config::{Config, ResponseMode};
use transcode_relay::ffmpeg::FFmpegProcessor;
use transcode_relay::pipeline::Pipeline;
use transcode_relay::server::{create_router, AppState};
use transcode_relay::store::TaskStore;

const API_KEY: &str = "integration-secret";

type Uploads = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Source and destination storage on a local port.
///
/// `GET /media/{name}`: `missing*` answers 404, `slow*` waits before answering,
/// anything else returns `<name>-content`.
/// `PUT /upload/{name}`: `broken*` answers 500, anything else is recorded.
async fn start_storage() -> (SocketAddr, Uploads) {
    async fn source(UrlPath(name): UrlPath<String>) -> impl IntoResponse {
        if name.starts_with("missing") {
            return (StatusCode::NOT_FOUND, "object not found".to_string());
        }
        if name.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        (StatusCode::OK, format!("{name}-content"))
    }

    async fn upload(
        State(uploads): State<Uploads>,
        UrlPath(name): UrlPath<String>,
        body: Bytes,
    ) -> impl IntoResponse {
        if name.starts_with("broken") {
            return (StatusCode::INTERNAL_SERVER_ERROR, "bucket unavailable");
        }
        uploads.lock().unwrap().insert(name, body.to_vec());
        (StatusCode::OK, "")
    }

    let uploads = Uploads::default();
    let app = Router::new()
        .route("/media/{name}", get(source))
        .route("/upload/{name}", put(upload))
        .with_state(uploads.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, uploads)
}

/// Stand-in for ffmpeg: logs each input, fails on inputs starting with `bad`,
/// otherwise copies input to output
fn write_fake_ffmpeg(dir: &Path) -> (PathBuf, PathBuf) {
    let calls = dir.join("ffmpeg-calls.log");
    let script = dir.join("ffmpeg");
    let body = format!(
        r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo 'ffmpeg version 6.1-fake'; exit 0; fi
echo "$3" >> '{calls}'
case "$(head -c 3 "$3")" in
  bad) echo 'Invalid data found when processing input' >&2; exit 1 ;;
esac
for last; do :; done
cp "$3" "$last"
"#,
        calls = calls.display()
    );
    fs::write(&script, body).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    (script, calls)
}

fn ffmpeg_calls(calls: &Path) -> usize {
    fs::read_to_string(calls)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

struct Worker {
    app: Router,
    storage: SocketAddr,
    uploads: Uploads,
    calls: PathBuf,
    work_dir: PathBuf,
    _temp: TempDir,
}

async fn start_worker(mode: ResponseMode) -> Worker {
    let temp = TempDir::new().unwrap();
    let (script, calls) = write_fake_ffmpeg(temp.path());
    let work_dir = temp.path().join("work");
    let (storage, uploads) = start_storage().await;

    let config = Config {
        api_key: API_KEY.to_string(),
        work_dir: work_dir.clone(),
        ffmpeg_bin: script,
        response_mode: mode,
        download_timeout: Duration::from_secs(10),
        upload_timeout: Duration::from_secs(10),
        ..Default::default()
    };
    let pipeline = Pipeline::from_config(&config, Arc::new(TaskStore::new())).unwrap();
    let encoder = FFmpegProcessor::new(
        config.ffmpeg_bin.clone(),
        config.encoding.clone(),
        false,
    );
    let app = create_router(AppState::new(pipeline, encoder, API_KEY, mode));

    Worker {
        app,
        storage,
        uploads,
        calls,
        work_dir,
        _temp: temp,
    }
}

impl Worker {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn process(&self, source: &str, dest: &str) -> (StatusCode, Value) {
        let body = json!({
            "input_url": format!("http://{}/media/{source}", self.storage),
            "upload_url": format!("http://{}/upload/{dest}", self.storage),
            "preset": {"crf": 18},
            "export": {}
        });
        let request = Request::builder()
            .method("POST")
            .uri("/process")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {API_KEY}"))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn status(&self, task_id: &str) -> Value {
        let request = Request::builder()
            .uri(format!("/status?task_id={task_id}"))
            .body(Body::empty())
            .unwrap();
        self.send(request).await.1
    }

    async fn submit(&self, source: &str, dest: &str) -> String {
        let (status, body) = self.process(source, dest).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "processing");
        body["task_id"].as_str().unwrap().to_string()
    }

    async fn wait_for_terminal(&self, task_id: &str) -> Value {
        for _ in 0..500 {
            let body = self.status(task_id).await;
            if body["status"] == "completed" || body["status"] == "failed" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} did not reach a terminal state");
    }

    fn uploaded(&self, name: &str) -> Option<Vec<u8>> {
        self.uploads.lock().unwrap().get(name).cloned()
    }

    fn work_dir_is_empty(&self) -> bool {
        fs::read_dir(&self.work_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}

/// A successful task is visible as processing, then completed, and its output arrives
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_process_and_poll_until_completed() {
    let worker = start_worker(ResponseMode::Async).await;

    let task_id = worker.submit("slow-clip.webm", "clip.mp4").await;
    assert_eq!(worker.status(&task_id).await["status"], "processing");

    let body = worker.wait_for_terminal(&task_id).await;
    assert_eq!(body, json!({"task_id": task_id, "status": "completed"}));
    assert_eq!(
        worker.uploaded("clip.mp4").as_deref(),
        Some(&b"slow-clip.webm-content"[..])
    );
    assert_eq!(ffmpeg_calls(&worker.calls), 1);
    assert!(worker.work_dir_is_empty());

    // Still completed on later polls
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(worker.status(&task_id).await["status"], "completed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_download_404_fails_without_transcoding() {
    let worker = start_worker(ResponseMode::Async).await;

    let task_id = worker.submit("missing.webm", "never.mp4").await;
    let body = worker.wait_for_terminal(&task_id).await;

    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"], "Download failed: 404 object not found");
    assert_eq!(ffmpeg_calls(&worker.calls), 0);
    assert!(worker.uploaded("never.mp4").is_none());
    assert!(worker.work_dir_is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_transcode_failure_skips_upload() {
    let worker = start_worker(ResponseMode::Async).await;

    let task_id = worker.submit("bad-input.webm", "never.mp4").await;
    let body = worker.wait_for_terminal(&task_id).await;

    assert_eq!(body["status"], "failed");
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("ffmpeg failed: "), "{error}");
    assert!(error.contains("Invalid data found when processing input"));
    assert_eq!(ffmpeg_calls(&worker.calls), 1);
    assert!(worker.uploaded("never.mp4").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_upload_500_fails_task() {
    let worker = start_worker(ResponseMode::Async).await;

    let task_id = worker.submit("clip.webm", "broken.mp4").await;
    let body = worker.wait_for_terminal(&task_id).await;

    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"], "Upload failed: 500 bucket unavailable");
    assert!(worker.work_dir_is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_unknown_task_is_not_found() {
    let worker = start_worker(ResponseMode::Async).await;
    let id = uuid::Uuid::new_v4().to_string();
    assert_eq!(
        worker.status(&id).await,
        json!({"task_id": id, "status": "not_found"})
    );
}

/// Concurrent tasks each end in the state matching their own injected condition
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_tasks_with_mixed_outcomes() {
    let worker = start_worker(ResponseMode::Async).await;

    let cases: Vec<(String, String)> = (0..12)
        .map(|i| match i % 4 {
            0 => (format!("clip-{i}.webm"), format!("out-{i}.mp4")),
            1 => (format!("missing-{i}.webm"), format!("out-{i}.mp4")),
            2 => (format!("bad-{i}.webm"), format!("out-{i}.mp4")),
            _ => (format!("clip-{i}.webm"), format!("broken-{i}.mp4")),
        })
        .collect();

    let mut task_ids = Vec::new();
    for (source, dest) in &cases {
        task_ids.push(worker.submit(source, dest).await);
    }

    for (i, ((source, dest), task_id)) in cases.iter().zip(&task_ids).enumerate() {
        let body = worker.wait_for_terminal(task_id).await;
        let error = body["error"].as_str().unwrap_or_default();
        match i % 4 {
            0 => {
                assert_eq!(body["status"], "completed");
                assert_eq!(
                    worker.uploaded(dest),
                    Some(format!("{source}-content").into_bytes())
                );
            }
            1 => assert!(error.starts_with("Download failed: 404"), "{error}"),
            2 => assert!(error.starts_with("ffmpeg failed"), "{error}"),
            _ => assert!(error.starts_with("Upload failed: 500"), "{error}"),
        }
    }
    assert!(worker.work_dir_is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_sync_mode_status_codes() {
    let worker = start_worker(ResponseMode::Sync).await;

    let (status, body) = worker.process("clip.webm", "sync.mp4").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
    assert!(worker.uploaded("sync.mp4").is_some());

    let (status, body) = worker.process("missing.webm", "sync.mp4").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["detail"], "Download failed: 404 object not found");

    let (status, _) = worker.process("bad.webm", "sync.mp4").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = worker.process("clip.webm", "broken.mp4").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_auth_and_health() {
    let worker = start_worker(ResponseMode::Async).await;

    let (status, body) = worker
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "ffmpeg": "ffmpeg version 6.1-fake"}));

    for (header, expected) in [
        (None, StatusCode::UNAUTHORIZED),
        (Some("Basic abc".to_string()), StatusCode::UNAUTHORIZED),
        (Some("Bearer wrong".to_string()), StatusCode::FORBIDDEN),
    ] {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/process")
            .header("content-type", "application/json");
        if let Some(header) = header {
            builder = builder.header("authorization", header);
        }
        let body = json!({"input_url": "http://x/in", "upload_url": "http://x/out"});
        let (status, _) = worker
            .send(builder.body(Body::from(body.to_string())).unwrap())
            .await;
        assert_eq!(status, expected);
    }
    assert_eq!(ffmpeg_calls(&worker.calls), 0);
}

/// Test help commands work
#[test]
fn test_help_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_transcode-relay"))
        .arg("--help")
        .output()
        .expect("Failed to execute help command");

    assert!(output.status.success(), "Help command failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["serve", "run", "check"] {
        assert!(stdout.contains(command), "Help should list {command} command");
    }
}

#[test]
#[serial]
fn test_check_command_uses_configured_binary() {
    let temp = TempDir::new().unwrap();
    let (script, _) = write_fake_ffmpeg(temp.path());

    let output = Command::new(env!("CARGO_BIN_EXE_transcode-relay"))
        .arg("check")
        .env("FFMPEG_BIN", &script)
        .output()
        .expect("Failed to execute check command");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ffmpeg version 6.1-fake"));

    let output = Command::new(env!("CARGO_BIN_EXE_transcode-relay"))
        .arg("check")
        .env("FFMPEG_BIN", temp.path().join("absent"))
        .output()
        .expect("Failed to execute check command");
    assert!(!output.status.success());
}

#[test]
fn test_run_command_fails_on_unreachable_source() {
    let temp = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_transcode-relay"))
        .args([
            "run",
            "http://127.0.0.1:9/in.webm",
            "http://127.0.0.1:9/out.mp4",
            "--work-dir",
            temp.path().to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute run command");

    assert!(!output.status.success());
}
