use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::ScrapeError;
use crate::models::{Task, TaskHandle};

/// In-memory registry of live tasks, shared by every request handler.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
  tasks: Arc<RwLock<HashMap<Uuid, TaskHandle>>>,
}

impl TaskStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, task: TaskHandle) {
    self.tasks.write().insert(task.id(), task);
  }

  pub fn get(&self, task_id: &Uuid) -> Option<TaskHandle> {
    self.tasks.read().get(task_id).cloned()
  }

  pub fn snapshot(&self, task_id: &Uuid) -> Result<Task, ScrapeError> {
    self
      .get(task_id)
      .map(|handle| handle.snapshot())
      .ok_or(ScrapeError::LookupNotFound(*task_id))
  }

  /// Looks a task up by the raw id a caller sent; malformed ids are simply unknown.
  pub fn snapshot_str(&self, raw_id: &str) -> Option<Task> {
    let task_id = Uuid::parse_str(raw_id).ok()?;
    self.snapshot(&task_id).ok()
  }

  pub fn len(&self) -> usize {
    self.tasks.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.read().is_empty()
  }
}
