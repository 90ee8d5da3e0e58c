use crate::queue::Lane;
use meter_queue_core::TaskKind;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

/// Prometheus metrics for the scheduling pipeline
pub struct EngineMetrics {
    pub registry: Registry,

    // Scheduling and execution outcomes
    pub tasks_total: IntCounterVec,

    pub boosts_total: IntCounter,
    pub idle_cycles_total: IntCounter,

    pub task_execution_duration: HistogramVec,

    // Queue depth
    pub queue_depth: IntGaugeVec,
}

impl EngineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tasks_total = IntCounterVec::new(
            Opts::new("mq_tasks_total", "Total number of tasks by outcome and kind"),
            &["outcome", "kind"],
        )?;
        registry.register(Box::new(tasks_total.clone()))?;

        let boosts_total = IntCounter::new(
            "mq_priority_boosts_total",
            "Normal tasks moved to the priority queue after waiting too long",
        )?;
        registry.register(Box::new(boosts_total.clone()))?;

        let idle_cycles_total = IntCounter::new(
            "mq_idle_cycles_total",
            "Executor cycles that found both queues empty",
        )?;
        registry.register(Box::new(idle_cycles_total.clone()))?;

        let task_execution_duration = HistogramVec::new(
            HistogramOpts::new(
                "mq_task_execution_duration_seconds",
                "Task execution duration in seconds",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(task_execution_duration.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("mq_queue_depth", "Queue depth by lane"),
            &["lane"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(EngineMetrics {
            registry,
            tasks_total,
            boosts_total,
            idle_cycles_total,
            task_execution_duration,
            queue_depth,
        })
    }

    /// Increment the outcome counter for a task kind
    pub fn inc_tasks_total(&self, outcome: &str, kind: TaskKind) {
        self.tasks_total
            .with_label_values(&[outcome, kind.as_str()])
            .inc();
    }

    pub fn observe_execution_duration(&self, kind: TaskKind, duration_secs: f64) {
        self.task_execution_duration
            .with_label_values(&[kind.as_str()])
            .observe(duration_secs);
    }

    pub fn set_queue_depth(&self, lane: Lane, depth: usize) {
        self.queue_depth
            .with_label_values(&[lane.as_str()])
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
