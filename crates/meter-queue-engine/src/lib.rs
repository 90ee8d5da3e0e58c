pub mod config;
pub mod disposition;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod scheduler;

pub use config::{EngineConfig, ExecutorConfig, QueueConfig};
pub use disposition::{
    LogAndDrop, MemoryDisposition, TerminalDisposition, TerminalReason, TerminalReport,
};
pub use error::{ConfigError, ExecutionFailure, QueueError, Rejected, SchedulerError};
pub use executor::{CycleOutcome, ExecutorHandle, RunSummary, TaskExecutor};
pub use metrics::EngineMetrics;
pub use queue::{BoundedQueue, Lane, NormalQueue, PriorityQueue};
pub use retry::RetryPolicy;
pub use scheduler::{DefaultUrgency, PayloadThreshold, TaskScheduler, UrgencyRule};
