//! The execution control loop.
//!
//! One cycle acquires a task (priority queue first, then the normal queue,
//! boosting normal tasks that waited past the threshold), runs its body and
//! either disposes it, re-enqueues it for retry, or retires it through the
//! terminal disposition hook.

use crate::config::ExecutorConfig;
use crate::disposition::{LogAndDrop, TerminalDisposition, TerminalReason, TerminalReport};
use crate::error::{ExecutionFailure, Rejected};
use crate::metrics::EngineMetrics;
use crate::queue::{Lane, NormalQueue, PriorityQueue};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use meter_queue_core::{Task, TaskId, TaskKind};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// What a single executor cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No task could be acquired, usually because both queues were empty
    Idle,
    /// The task ran and was disposed
    Succeeded { task_id: TaskId, kind: TaskKind },
    /// The task failed and went back to the normal queue
    Retried { task_id: TaskId, attempts: u32 },
    /// The task failed for good and was handed to the terminal disposition
    Exhausted {
        task_id: TaskId,
        attempts: u32,
        reason: TerminalReason,
    },
}

impl CycleOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, CycleOutcome::Idle)
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            CycleOutcome::Idle => None,
            CycleOutcome::Succeeded { task_id, .. }
            | CycleOutcome::Retried { task_id, .. }
            | CycleOutcome::Exhausted { task_id, .. } => Some(*task_id),
        }
    }
}

/// Counters for one call to [`TaskExecutor::run`] or [`TaskExecutor::drain`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub exhausted: u64,
    pub boosted: u64,
}

impl std::ops::AddAssign for RunSummary {
    fn add_assign(&mut self, other: RunSummary) {
        self.cycles += other.cycles;
        self.idle_cycles += other.idle_cycles;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.exhausted += other.exhausted;
        self.boosted += other.boosted;
    }
}

impl RunSummary {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Idle => self.idle_cycles += 1,
            CycleOutcome::Succeeded { .. } => self.succeeded += 1,
            CycleOutcome::Retried { .. } => self.retried += 1,
            CycleOutcome::Exhausted { .. } => self.exhausted += 1,
        }
    }
}

/// Drains the priority and normal queues and owns the retry state machine.
pub struct TaskExecutor {
    normal: Arc<NormalQueue>,
    priority: Arc<PriorityQueue>,
    boost_threshold: chrono::Duration,
    idle_interval: Duration,
    task_timeout: Option<Duration>,
    retry: RetryPolicy,
    disposition: Arc<dyn TerminalDisposition>,
    metrics: Option<Arc<EngineMetrics>>,
    boosted: AtomicU64,
    span: Span,
}

impl TaskExecutor {
    pub fn new(
        normal: Arc<NormalQueue>,
        priority: Arc<PriorityQueue>,
        config: &ExecutorConfig,
    ) -> Self {
        TaskExecutor {
            normal,
            priority,
            boost_threshold: config.boost_threshold(),
            idle_interval: config.idle_interval(),
            task_timeout: config.task_timeout(),
            retry: config.retry_policy(),
            disposition: Arc::new(LogAndDrop),
            metrics: None,
            boosted: AtomicU64::new(0),
            span: info_span!("executor"),
        }
    }

    /// Replace the hook that receives tasks which failed for good
    pub fn with_disposition(mut self, disposition: Arc<dyn TerminalDisposition>) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Span that scopes every event this executor emits
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Total number of priority boosts performed by this executor
    pub fn boosted_total(&self) -> u64 {
        self.boosted.load(Ordering::Relaxed)
    }

    /// Run a single cycle.
    pub async fn execute_next(&self) -> CycleOutcome {
        self.cycle().instrument(self.span.clone()).await
    }

    /// Repeat cycles until `token` is cancelled or `max_cycles` cycles ran.
    ///
    /// Idle cycles sleep for the configured interval and count towards
    /// `max_cycles`. Cancellation is observed between cycles only, so a task
    /// that started executing is always classified before this returns.
    pub async fn run(&self, max_cycles: Option<u64>, token: CancellationToken) -> RunSummary {
        self.run_loop(max_cycles, token, false)
            .instrument(self.span.clone())
            .await
    }

    /// Like [`run`](Self::run), but returns at the first idle cycle instead of
    /// sleeping, i.e. once no task can be acquired and no retry is pending.
    pub async fn drain(&self, max_cycles: Option<u64>, token: CancellationToken) -> RunSummary {
        self.run_loop(max_cycles, token, true)
            .instrument(self.span.clone())
            .await
    }

    async fn run_loop(
        &self,
        max_cycles: Option<u64>,
        token: CancellationToken,
        until_idle: bool,
    ) -> RunSummary {
        let boosted_before = self.boosted_total();
        let mut summary = RunSummary::default();
        info!(?max_cycles, until_idle, "Executor loop started");

        while !token.is_cancelled() && max_cycles.map_or(true, |max| summary.cycles < max) {
            let outcome = self.cycle().await;
            summary.record(&outcome);

            if outcome.is_idle() {
                if until_idle {
                    break;
                }
                debug!("No tasks available, sleeping...");
                tokio::select! {
                    _ = tokio::time::sleep(self.idle_interval) => {}
                    _ = token.cancelled() => {}
                }
            }
        }

        summary.boosted = self.boosted_total() - boosted_before;
        info!(?summary, "Executor loop stopped");
        summary
    }

    /// Run the loop on a background tokio task.
    pub fn spawn(self: Arc<Self>, max_cycles: Option<u64>) -> ExecutorHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let join = tokio::spawn(async move { self.run(max_cycles, loop_token).await });
        ExecutorHandle { token, join }
    }

    async fn cycle(&self) -> CycleOutcome {
        let outcome = match self.acquire() {
            Some(task) => self.process(task).await,
            None => {
                if let Some(metrics) = &self.metrics {
                    metrics.idle_cycles_total.inc();
                }
                CycleOutcome::Idle
            }
        };
        self.update_queue_metrics();
        outcome
    }

    /// Take the next task: priority queue first, then the normal queue.
    ///
    /// Stale normal tasks are moved to the priority queue and acquisition
    /// starts over. A refused boost puts the task back at the tail of the
    /// normal queue and starts over too. A stale task only runs straight from
    /// the normal queue when both queues refuse it. Once the priority queue
    /// has refused as many boosts as there are queued normal tasks, nothing
    /// is acquired and the stale tasks stay queued.
    fn acquire(&self) -> Option<Task> {
        let mut refused = 0;
        loop {
            if let Ok(task) = self.priority.get() {
                return Some(task);
            }

            let task = self.normal.get().ok()?;
            if !self.is_stale(&task, Utc::now()) {
                return Some(task);
            }

            let rejected = match self.boost(task) {
                Ok(()) => continue,
                Err(rejected) => rejected,
            };
            refused += 1;
            warn!(error = %rejected, "Priority boost failed, returning task to normal queue");

            match self.normal.put(rejected.into_task()) {
                Ok(()) if refused >= self.normal.len() => {
                    warn!(refused, "Priority queue refuses every stale task, leaving them queued");
                    return None;
                }
                Ok(()) => {}
                Err(rejected) => {
                    // A producer refilled the normal queue meanwhile; run the
                    // task now rather than lose it.
                    warn!(
                        error = %rejected,
                        "Normal queue refilled, executing stale task directly"
                    );
                    return Some(rejected.into_task());
                }
            }
        }
    }

    /// Whether a task has waited longer than the boost threshold
    pub fn is_stale(&self, task: &Task, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(task.last_attempt_at()) > self.boost_threshold
    }

    fn boost(&self, task: Task) -> Result<(), Rejected> {
        info!(task_id = %task.id(), "Boosting priority for task: {}", task);
        self.priority.put(task)?;
        self.boosted.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.boosts_total.inc();
        }
        Ok(())
    }

    async fn process(&self, mut task: Task) -> CycleOutcome {
        task.mark_attempt(Utc::now());
        let task_id = task.id();
        let kind = task.kind();
        info!(task_id = %task_id, %kind, "Executing task: {}", task);

        let started = Instant::now();
        let result = self.run_body(&task).await;
        if let Some(metrics) = &self.metrics {
            metrics.observe_execution_duration(kind, started.elapsed().as_secs_f64());
        }

        match result {
            Ok(()) => {
                info!(task_id = %task_id, "Task executed successfully: {}", task);
                task.dispose();
                if let Some(metrics) = &self.metrics {
                    metrics.inc_tasks_total("succeeded", kind);
                }
                CycleOutcome::Succeeded { task_id, kind }
            }
            Err(failure) => self.handle_failure(task, failure),
        }
    }

    /// Run the task body on its own tokio task so a panic is contained.
    async fn run_body(&self, task: &Task) -> Result<(), ExecutionFailure> {
        let handler = task.handler();
        let payload = task.payload().clone();
        let mut handle = tokio::spawn(async move { handler.execute(&payload).await });

        let joined = match self.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(ExecutionFailure::Timeout(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(ExecutionFailure::Handler(message)),
            Err(join_error) if join_error.is_panic() => Err(ExecutionFailure::Panic(
                panic_message(join_error.into_panic()),
            )),
            Err(_) => Err(ExecutionFailure::Cancelled),
        }
    }

    fn handle_failure(&self, mut task: Task, failure: ExecutionFailure) -> CycleOutcome {
        let task_id = task.id();
        let kind = task.kind();
        error!(task_id = %task_id, "Error executing task: {}", failure);

        let attempts = task.record_failure();
        let max_attempts = self.retry.max_attempts();

        if !self.retry.should_retry(attempts) {
            return self.retire(task, failure, TerminalReason::AttemptsExhausted);
        }

        info!(task_id = %task_id, "Retrying task (attempt {}/{})", attempts, max_attempts);
        // Retries bypass the scheduler and re-enter as normal work.
        task.demote();
        match self.normal.put(task) {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_tasks_total("retried", kind);
                }
                CycleOutcome::Retried { task_id, attempts }
            }
            Err(rejected) => {
                warn!(task_id = %task_id, error = %rejected, "Cannot re-enqueue task for retry");
                self.retire(rejected.into_task(), failure, TerminalReason::RetryQueueFull)
            }
        }
    }

    fn retire(
        &self,
        mut task: Task,
        failure: ExecutionFailure,
        reason: TerminalReason,
    ) -> CycleOutcome {
        task.dispose();
        let report = TerminalReport {
            task_id: task.id(),
            kind: task.kind(),
            attempts: task.attempts(),
            last_error: failure.to_string(),
            reason,
        };
        if let Some(metrics) = &self.metrics {
            metrics.inc_tasks_total("exhausted", report.kind);
        }

        let outcome = CycleOutcome::Exhausted {
            task_id: report.task_id,
            attempts: report.attempts,
            reason,
        };
        self.disposition.retire(task, &report);
        outcome
    }

    fn update_queue_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_queue_depth(Lane::Normal, self.normal.len());
            metrics.set_queue_depth(Lane::Priority, self.priority.len());
        }
    }
}

/// Handle to an executor loop running on a background tokio task
pub struct ExecutorHandle {
    token: CancellationToken,
    join: JoinHandle<RunSummary>,
}

impl ExecutorHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal the loop to stop after the current cycle and wait for it.
    pub async fn stop(self) -> Result<RunSummary, JoinError> {
        self.token.cancel();
        self.join.await
    }

    /// Wait for the loop to end on its own (e.g. `max_cycles` reached).
    pub async fn join(self) -> Result<RunSummary, JoinError> {
        self.join.await
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map(|message| (*message).to_string())
            .unwrap_or_else(|| "Unknown panic".to_string()),
    }
}
