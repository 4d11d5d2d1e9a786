use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::task::{Task, TaskId, TaskStatus};

/// In-memory record of every task seen since the process started.
///
/// Entries are never evicted. Each read returns a clone taken under the
/// lock, so callers only ever observe whole snapshots of a task.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task in the `processing` state and return its id
    pub fn create(&self) -> TaskId {
        let mut tasks = self.tasks.write();
        let mut id = TaskId::new();
        while tasks.contains_key(&id) {
            id = TaskId::new();
        }
        tasks.insert(id, Task::new(id));
        debug!("Created task: {}", id);
        id
    }

    /// Move a task to `status`, recording `error` alongside it.
    ///
    /// Returns false when the id is unknown or the transition is not
    /// allowed (terminal tasks never change).
    pub fn update(&self, id: &TaskId, status: TaskStatus, error: Option<String>) -> bool {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(id) else {
            warn!("Ignoring update for unknown task: {}", id);
            return false;
        };

        if !task.status.can_transition_to(status) {
            warn!(
                "Ignoring transition {} -> {} for task {}",
                task.status, status, id
            );
            return false;
        }

        task.status = status;
        task.error = if status == TaskStatus::Failed {
            error
        } else {
            None
        };
        debug!("Task {} is now {}", id, status);
        true
    }

    /// Mark a task completed
    pub fn complete(&self, id: &TaskId) -> bool {
        self.update(id, TaskStatus::Completed, None)
    }

    /// Mark a task failed with a reason
    pub fn fail(&self, id: &TaskId, reason: impl Into<String>) -> bool {
        self.update(id, TaskStatus::Failed, Some(reason.into()))
    }

    /// Snapshot of a task, if it exists
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Number of tasks still in `processing`
    pub fn in_flight(&self) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|t| t.status == TaskStatus::Processing)
            .count()
    }
}
