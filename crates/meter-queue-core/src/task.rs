use crate::{PriorityClass, TaskError, TaskHandler, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a task
pub type TaskId = Uuid;

/// Task payload (opaque structured data, only read by the task's handler)
pub type TaskPayload = serde_json::Value;

/// Closed set of task kinds understood by the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Record a reading reported by a meter
    MeterReading,
    /// Compute a bill for a client
    Billing,
    /// Push an alert to a user (e.g. a grid problem)
    Alert,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::MeterReading, TaskKind::Billing, TaskKind::Alert];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::MeterReading => "meter_reading",
            TaskKind::Billing => "billing",
            TaskKind::Alert => "alert",
        }
    }

    /// Priority flag a task of this kind gets when the caller gives no override.
    pub fn default_priority(&self) -> bool {
        matches!(self, TaskKind::Alert)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meter_reading" => Ok(TaskKind::MeterReading),
            "billing" => Ok(TaskKind::Billing),
            "alert" => Ok(TaskKind::Alert),
            other => Err(TaskError::UnknownTaskKind(other.to_string())),
        }
    }
}

/// A unit of work: identity, payload, priority flag and attempt history.
///
/// `Task` is not `Clone`: it moves between a queue and the executor and has
/// exactly one owner at a time.
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    payload: TaskPayload,
    is_priority: bool,
    attempts: u32,
    created_at: DateTime<Utc>,
    last_attempt_at: DateTime<Utc>,
    disposed: bool,
    handler: Arc<dyn TaskHandler>,
}

impl Task {
    /// Create a new task bound to the behaviour that executes it
    pub fn new(
        kind: TaskKind,
        payload: TaskPayload,
        is_priority: bool,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            kind,
            payload,
            is_priority,
            attempts: 0,
            created_at: now,
            last_attempt_at: now,
            disposed: false,
            handler,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    pub fn is_priority(&self) -> bool {
        self.is_priority
    }

    /// Class the priority queue orders this task by
    pub fn priority_class(&self) -> PriorityClass {
        PriorityClass::from_flag(self.is_priority)
    }

    /// Number of failed executions so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the task was last dequeued for execution (creation time if never)
    pub fn last_attempt_at(&self) -> DateTime<Utc> {
        self.last_attempt_at
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Handler that runs this task
    pub fn handler(&self) -> Arc<dyn TaskHandler> {
        Arc::clone(&self.handler)
    }

    /// Run the task body in place
    pub async fn execute(&self) -> TaskResult {
        self.handler.execute(&self.payload).await
    }

    /// Stamp the start of an execution attempt
    pub fn mark_attempt(&mut self, at: DateTime<Utc>) {
        self.last_attempt_at = at;
    }

    /// Override the last attempt timestamp. Test hook for simulating aged
    /// work; production code stamps attempts through [`mark_attempt`](Self::mark_attempt).
    pub fn with_last_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_attempt_at = at;
        self
    }

    /// Count a failed execution and return the new attempt count.
    pub fn record_failure(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Drop the priority flag so a retry competes as normal work.
    pub fn demote(&mut self) {
        self.is_priority = false;
    }

    /// Permanently retire the task. Calling it again is a no-op.
    pub fn dispose(&mut self) {
        self.disposed = true;
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("payload", &self.payload)
            .field("is_priority", &self.is_priority)
            .field("attempts", &self.attempts)
            .field("created_at", &self.created_at)
            .field("last_attempt_at", &self.last_attempt_at)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(task_id={}, payload={})", self.kind, self.id, self.payload)
    }
}
