use crate::queue::Lane;
use meter_queue_core::{Task, TaskId};
use std::time::Duration;
use thiserror::Error;

/// Why a queue operation could not complete
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("{lane} queue is full (capacity {capacity})")]
    Full { lane: Lane, capacity: usize },

    #[error("{0} queue is empty")]
    Empty(Lane),

    #[error("disposed tasks cannot be enqueued on the {0} queue")]
    Disposed(Lane),
}

/// A put that was refused. The task is handed back to the caller.
#[derive(Error, Debug)]
#[error("task {} rejected: {reason}", .task.id())]
pub struct Rejected {
    pub reason: QueueError,
    pub task: Box<Task>,
}

impl Rejected {
    pub fn new(reason: QueueError, task: Task) -> Self {
        Rejected {
            reason,
            task: Box::new(task),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self.reason, QueueError::Full { .. })
    }

    pub fn into_task(self) -> Task {
        *self.task
    }
}

/// Errors surfaced to callers of `TaskScheduler::schedule`
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Queue is full. Cannot schedule task {task_id} on the {lane} queue")]
    QueueFull {
        task_id: TaskId,
        lane: Lane,
        task: Box<Task>,
    },

    #[error("Task {task_id} is disposed and cannot be scheduled")]
    Disposed { task_id: TaskId },
}

impl SchedulerError {
    pub fn task_id(&self) -> TaskId {
        match self {
            SchedulerError::QueueFull { task_id, .. } => *task_id,
            SchedulerError::Disposed { task_id } => *task_id,
        }
    }

    /// Take back the task that could not be scheduled, if it is still live
    pub fn into_task(self) -> Option<Task> {
        match self {
            SchedulerError::QueueFull { task, .. } => Some(*task),
            SchedulerError::Disposed { .. } => None,
        }
    }
}

/// Why one execution of a task body failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFailure {
    #[error("Task execution failed: {0}")]
    Handler(String),

    #[error("Task execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Task panicked: {0}")]
    Panic(String),

    #[error("Task was cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
