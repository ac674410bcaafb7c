use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
  Loading,
  Success,
  Fail,
}

impl TaskStatus {
  pub fn is_terminal(self) -> bool {
    !matches!(self, TaskStatus::Loading)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub task_id: Uuid,
  pub status: TaskStatus,
  pub msg: String,
  pub progress: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Task {
  pub fn new() -> Self {
    let now = Utc::now();
    Self {
      task_id: Uuid::new_v4(),
      status: TaskStatus::Loading,
      msg: "Initializing...".into(),
      progress: String::new(),
      created_at: now,
      updated_at: now,
    }
  }

  /// Moves the task into a terminal state. Returns false (and changes nothing)
  /// when the task already finished.
  pub fn finish(&mut self, status: TaskStatus, msg: &str) -> bool {
    if self.status.is_terminal() {
      warn!("Task {} already finished as {:?}, ignoring {:?}", self.task_id, self.status, status);
      return false;
    }
    self.status = status;
    self.msg = msg.to_string();
    self.updated_at = Utc::now();
    true
  }
}

impl Default for Task {
  fn default() -> Self {
    Self::new()
  }
}

/// Shared handle to a live task. The scrape job writes through it while the
/// store and pollers only take snapshots.
#[derive(Debug, Clone)]
pub struct TaskHandle {
  inner: Arc<RwLock<Task>>,
}

impl TaskHandle {
  pub fn new(task: Task) -> Self {
    Self { inner: Arc::new(RwLock::new(task)) }
  }

  pub fn id(&self) -> Uuid {
    self.inner.read().task_id
  }

  pub fn snapshot(&self) -> Task {
    self.inner.read().clone()
  }

  pub fn set_msg(&self, msg: &str) {
    let mut task = self.inner.write();
    task.msg = msg.to_string();
    task.updated_at = Utc::now();
  }

  pub fn set_progress(&self, progress: String) {
    let mut task = self.inner.write();
    task.progress = progress;
    task.updated_at = Utc::now();
  }

  pub fn succeed(&self, msg: &str) -> bool {
    self.inner.write().finish(TaskStatus::Success, msg)
  }

  pub fn fail(&self, msg: &str) -> bool {
    self.inner.write().finish(TaskStatus::Fail, msg)
  }

  pub fn ptr_eq(&self, other: &TaskHandle) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}
