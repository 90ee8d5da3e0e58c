//! Reads newline-delimited JSON envelopes and schedules the resulting tasks.

use crate::interpreter::MessageInterpreter;
use meter_queue_engine::{Lane, SchedulerError, TaskScheduler};
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Per-run ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub lines: u64,
    pub scheduled_normal: u64,
    pub scheduled_priority: u64,
    /// Envelopes that failed validation or named an unknown kind
    pub invalid: u64,
    /// Valid tasks refused by a full queue, even after one retry
    pub rejected: u64,
}

impl IngestReport {
    pub fn scheduled(&self) -> u64 {
        self.scheduled_normal + self.scheduled_priority
    }
}

pub struct Ingestor<'a> {
    interpreter: &'a MessageInterpreter,
    scheduler: &'a TaskScheduler,
    retry_delay: Duration,
}

impl<'a> Ingestor<'a> {
    pub fn new(interpreter: &'a MessageInterpreter, scheduler: &'a TaskScheduler) -> Self {
        Ingestor {
            interpreter,
            scheduler,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Wait before the single retry of a task refused by a full queue
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Consume `reader` to the end. Blank lines are skipped; bad envelopes and
    /// full queues are logged and counted, never fatal.
    pub async fn ingest<R>(&self, reader: R) -> std::io::Result<IngestReport>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut report = IngestReport::default();
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            report.lines += 1;
            self.ingest_line(line, &mut report).await;
        }

        debug!(?report, "Input exhausted");
        Ok(report)
    }

    async fn ingest_line(&self, line: &str, report: &mut IngestReport) {
        let task = match self.interpreter.interpret_str(line) {
            Ok(task) => task,
            Err(e) => {
                warn!(line = report.lines, error = %e, "Discarding message");
                report.invalid += 1;
                return;
            }
        };

        let result = match self.scheduler.schedule(task) {
            Err(SchedulerError::QueueFull { task_id, lane, task }) => {
                // The executor drains concurrently; give it a moment.
                info!(%task_id, %lane, "Queue full, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                self.scheduler.schedule(*task)
            }
            other => other,
        };

        match result {
            Ok(Lane::Normal) => report.scheduled_normal += 1,
            Ok(Lane::Priority) => report.scheduled_priority += 1,
            Err(e) => {
                warn!(
                    task_id = %e.task_id(),
                    error = %e,
                    "Dropping task that could not be scheduled"
                );
                report.rejected += 1;
            }
        }
    }
}
