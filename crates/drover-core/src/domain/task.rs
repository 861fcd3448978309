use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Revision, TaskId, TaskStatus};

/// One error annotation recorded on a task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskErrorEntry {
    /// Unix seconds.
    pub time: i64,
    pub kind: String,
    pub message: String,
}

/// A task document as stored in the document store.
///
/// The run loop only touches `lock`, `done`, the revision and the error list.
/// Everything else lives in `payload` and belongs to the processing code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    id: TaskId,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<Revision>,
    #[serde(default)]
    lock: i64,
    #[serde(default)]
    done: i64,
    #[serde(rename = "error", default, skip_serializing_if = "Vec::is_empty")]
    errors: Vec<TaskErrorEntry>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl Task {
    /// New `todo` task (lock = 0, done = 0) without a revision.
    pub fn new(id: TaskId, payload: Map<String, Value>) -> Self {
        Self {
            id,
            rev: None,
            lock: 0,
            done: 0,
            errors: Vec::new(),
            payload,
        }
    }

    /// Build a task from a JSON object. `_id` is generated when missing.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut value = value;
        if let Value::Object(map) = &mut value
            && !map.contains_key("_id")
        {
            map.insert("_id".into(), Value::String(TaskId::generate().to_string()));
        }
        serde_json::from_value(value)
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn rev(&self) -> Option<&Revision> {
        self.rev.as_ref()
    }

    /// Overwrite the revision token (store saves and conflict resolution only).
    pub fn set_rev(&mut self, rev: Option<Revision>) {
        self.rev = rev;
    }

    pub fn lock_value(&self) -> i64 {
        self.lock
    }

    pub fn done_value(&self) -> i64 {
        self.done
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_fields(self.lock, self.done)
    }

    pub fn errors(&self) -> &[TaskErrorEntry] {
        &self.errors
    }

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Claim the task: `lock = now`, `done = 0`.
    pub fn lock_now(&mut self) {
        self.lock = Utc::now().timestamp();
        self.done = 0;
    }

    /// Mark the task as finished: `done = now`.
    pub fn mark_done(&mut self) {
        self.done = Utc::now().timestamp();
    }

    /// Append an error annotation and move the task to the error state.
    pub fn error(&mut self, kind: impl Into<String>, message: impl Into<String>) {
        self.errors.push(TaskErrorEntry {
            time: Utc::now().timestamp(),
            kind: kind.into(),
            message: message.into(),
        });
        self.lock = -1;
        self.done = -1;
    }

    /// Overwrite `lock` and `done` with the given pair.
    pub fn reset(&mut self, lock: i64, done: i64) {
        self.lock = lock;
        self.done = done;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(key.into(), value.into());
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}
