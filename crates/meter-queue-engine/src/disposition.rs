//! What happens to a task once it is retired after failing.

use meter_queue_core::{Task, TaskId, TaskKind};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The task failed `max_attempts` times
    AttemptsExhausted,
    /// A retry was due but the normal queue had no room
    RetryQueueFull,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalReason::AttemptsExhausted => f.write_str("attempts exhausted"),
            TerminalReason::RetryQueueFull => f.write_str("retry queue full"),
        }
    }
}

/// Terminal failure report for a retired task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalReport {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub attempts: u32,
    pub last_error: String,
    pub reason: TerminalReason,
}

/// Receives tasks that failed for good. The task is already disposed.
pub trait TerminalDisposition: Send + Sync {
    fn retire(&self, task: Task, report: &TerminalReport);
}

/// Default disposition: log the report and drop the task
pub struct LogAndDrop;

impl TerminalDisposition for LogAndDrop {
    fn retire(&self, task: Task, report: &TerminalReport) {
        error!(
            task_id = %report.task_id,
            kind = %report.kind,
            attempts = report.attempts,
            reason = %report.reason,
            last_error = %report.last_error,
            "Task failed after {} attempts: {}",
            report.attempts,
            task
        );
    }
}

/// Keeps terminal reports in memory so callers can inspect them later
#[derive(Default)]
pub struct MemoryDisposition {
    reports: Mutex<Vec<TerminalReport>>,
}

impl MemoryDisposition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<TerminalReport> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TerminalDisposition for MemoryDisposition {
    fn retire(&self, task: Task, report: &TerminalReport) {
        LogAndDrop.retire(task, report);
        self.reports.lock().push(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_queue_core::TaskFactory;
    use serde_json::json;

    #[test]
    fn test_memory_disposition_records_reports() {
        let mut task = TaskFactory::default()
            .create("billing", json!({"client_id": "456", "amount": 50.0}))
            .unwrap();
        task.dispose();

        let report = TerminalReport {
            task_id: task.id(),
            kind: task.kind(),
            attempts: 3,
            last_error: "Task execution failed: boom".to_string(),
            reason: TerminalReason::AttemptsExhausted,
        };

        let disposition = MemoryDisposition::new();
        assert!(disposition.is_empty());
        disposition.retire(task, &report);

        assert_eq!(disposition.reports(), vec![report]);
    }
}
