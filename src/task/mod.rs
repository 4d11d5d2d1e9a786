use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a single transcoding task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Externally visible state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Processing,
    Completed,
    Failed,
    /// Reported for unknown ids, never stored
    NotFound,
}

impl TaskStatus {
    /// Completed and failed tasks never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether a stored task in `self` may move to `next`
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

/// One in-flight or finished request to transcode and relay a media file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    #[serde(rename = "task_id")]
    pub id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::Processing,
            error: None,
        }
    }
}

/// Body of `POST /process`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessRequest {
    pub input_url: String,
    pub upload_url: String,
    /// Encoder preset overrides; accepted but not interpreted yet
    #[serde(default)]
    pub preset: Map<String, Value>,
    /// Export settings; accepted but not interpreted yet
    #[serde(default)]
    pub export: Map<String, Value>,
}

impl ProcessRequest {
    pub fn new(input_url: impl Into<String>, upload_url: impl Into<String>) -> Self {
        Self {
            input_url: input_url.into(),
            upload_url: upload_url.into(),
            preset: Map::new(),
            export: Map::new(),
        }
    }
}

/// Answer to a status query, either the stored task or a `not_found` marker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatusReport {
    Found(Task),
    NotFound { task_id: String, status: TaskStatus },
}

impl StatusReport {
    pub fn not_found(task_id: impl Into<String>) -> Self {
        StatusReport::NotFound {
            task_id: task_id.into(),
            status: TaskStatus::NotFound,
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            StatusReport::Found(task) => task.status,
            StatusReport::NotFound { status, .. } => *status,
        }
    }
}
