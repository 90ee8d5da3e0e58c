use crate::error::SchedulerError;
use crate::metrics::EngineMetrics;
use crate::queue::{Lane, NormalQueue, PriorityQueue};
use meter_queue_core::{Task, TaskKind};
use std::sync::Arc;
use tracing::{error, info, info_span, Span};

/// Decides whether a task belongs in the priority queue
pub trait UrgencyRule: Send + Sync {
    fn is_urgent(&self, task: &Task) -> bool;
}

impl<F> UrgencyRule for F
where
    F: Fn(&Task) -> bool + Send + Sync,
{
    fn is_urgent(&self, task: &Task) -> bool {
        self(task)
    }
}

/// Priority-flagged tasks and alerts are urgent
pub struct DefaultUrgency;

impl UrgencyRule for DefaultUrgency {
    fn is_urgent(&self, task: &Task) -> bool {
        task.is_priority() || task.kind() == TaskKind::Alert
    }
}

/// Urgent when a numeric payload field exceeds a threshold,
/// e.g. a meter reading above 1000.
pub struct PayloadThreshold {
    field: String,
    threshold: f64,
}

impl PayloadThreshold {
    pub fn new(field: impl Into<String>, threshold: f64) -> Self {
        PayloadThreshold {
            field: field.into(),
            threshold,
        }
    }
}

impl UrgencyRule for PayloadThreshold {
    fn is_urgent(&self, task: &Task) -> bool {
        task.payload()
            .get(&self.field)
            .and_then(serde_json::Value::as_f64)
            .is_some_and(|value| value > self.threshold)
    }
}

/// Routes constructed tasks to the normal or priority queue.
pub struct TaskScheduler {
    normal: Arc<NormalQueue>,
    priority: Arc<PriorityQueue>,
    urgency: Arc<dyn UrgencyRule>,
    metrics: Option<Arc<EngineMetrics>>,
    span: Span,
}

impl TaskScheduler {
    pub fn new(normal: Arc<NormalQueue>, priority: Arc<PriorityQueue>) -> Self {
        TaskScheduler {
            normal,
            priority,
            urgency: Arc::new(DefaultUrgency),
            metrics: None,
            span: info_span!("scheduler"),
        }
    }

    /// Replace the urgency predicate
    pub fn with_urgency<R: UrgencyRule + 'static>(mut self, rule: R) -> Self {
        self.urgency = Arc::new(rule);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Span that scopes every event this scheduler emits
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Place a task on its queue without blocking.
    ///
    /// On a full queue the task is returned inside the error; the caller owns
    /// any retry.
    pub fn schedule(&self, task: Task) -> Result<Lane, SchedulerError> {
        let _entered = self.span.enter();
        let task_id = task.id();
        let kind = task.kind();

        if task.is_disposed() {
            error!(task_id = %task_id, "Refusing to schedule disposed task");
            return Err(SchedulerError::Disposed { task_id });
        }

        let lane = if self.urgency.is_urgent(&task) {
            Lane::Priority
        } else {
            Lane::Normal
        };
        let result = match lane {
            Lane::Priority => self.priority.put(task),
            Lane::Normal => self.normal.put(task),
        };

        match result {
            Ok(()) => {
                info!(task_id = %task_id, %kind, %lane, "Scheduled task to {} queue", lane);
                if let Some(metrics) = &self.metrics {
                    metrics.inc_tasks_total("scheduled", kind);
                    metrics.set_queue_depth(Lane::Normal, self.normal.len());
                    metrics.set_queue_depth(Lane::Priority, self.priority.len());
                }
                Ok(lane)
            }
            Err(rejected) => {
                error!(
                    task_id = %task_id,
                    %lane,
                    "Failed to schedule task {}. Queue is full.",
                    task_id
                );
                if let Some(metrics) = &self.metrics {
                    metrics.inc_tasks_total("rejected", kind);
                }
                Err(SchedulerError::QueueFull {
                    task_id,
                    lane,
                    task: rejected.task,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_queue_core::TaskFactory;
    use serde_json::json;

    struct Fixture {
        normal: Arc<NormalQueue>,
        priority: Arc<PriorityQueue>,
        factory: TaskFactory,
    }

    impl Fixture {
        fn new(capacity: usize) -> Self {
            Fixture {
                normal: Arc::new(NormalQueue::new(capacity)),
                priority: Arc::new(PriorityQueue::new(capacity)),
                factory: TaskFactory::default(),
            }
        }

        fn scheduler(&self) -> TaskScheduler {
            TaskScheduler::new(Arc::clone(&self.normal), Arc::clone(&self.priority))
        }
    }

    #[test]
    fn test_schedule_meter_reading_task() {
        let fx = Fixture::new(10);
        let task = fx
            .factory
            .create("meter_reading", json!({"meter_id": "123", "reading": 100}))
            .unwrap();

        assert_eq!(fx.scheduler().schedule(task).unwrap(), Lane::Normal);
        assert_eq!(fx.normal.len(), 1);
        assert!(fx.priority.is_empty());
    }

    #[test]
    fn test_schedule_billing_task() {
        let fx = Fixture::new(10);
        let task = fx
            .factory
            .create("billing", json!({"client_id": "456", "amount": 50.0}))
            .unwrap();

        assert_eq!(fx.scheduler().schedule(task).unwrap(), Lane::Normal);
    }

    #[test]
    fn test_schedule_alert_task() {
        let fx = Fixture::new(10);
        let task = fx
            .factory
            .create("alert", json!({"alert_type": "high_usage", "client_id": "789"}))
            .unwrap();

        assert_eq!(fx.scheduler().schedule(task).unwrap(), Lane::Priority);
        assert_eq!(fx.priority.len(), 1);
        assert!(fx.normal.is_empty());
    }

    #[test]
    fn test_alert_without_priority_flag_still_urgent() {
        let fx = Fixture::new(10);
        let task = fx
            .factory
            .create_with_priority("alert", json!({"alert_type": "low_battery"}), false)
            .unwrap();

        assert_eq!(fx.scheduler().schedule(task).unwrap(), Lane::Priority);
    }

    #[test]
    fn test_schedule_priority_task() {
        let fx = Fixture::new(10);
        let task = fx
            .factory
            .create_with_priority("meter_reading", json!({"meter_id": "123"}), true)
            .unwrap();

        assert_eq!(fx.scheduler().schedule(task).unwrap(), Lane::Priority);
    }

    #[test]
    fn test_custom_urgency_rule() {
        let fx = Fixture::new(10);
        let scheduler = fx.scheduler().with_urgency(PayloadThreshold::new("reading", 1000.0));

        let low = fx
            .factory
            .create("meter_reading", json!({"meter_id": "123", "reading": 100}))
            .unwrap();
        assert_eq!(scheduler.schedule(low).unwrap(), Lane::Normal);

        let high = fx
            .factory
            .create("meter_reading", json!({"meter_id": "456", "reading": 1500}))
            .unwrap();
        assert_eq!(scheduler.schedule(high).unwrap(), Lane::Priority);

        // The custom rule replaces the default entirely.
        let alert = fx.factory.create("alert", json!({"alert_type": "x"})).unwrap();
        assert_eq!(scheduler.schedule(alert).unwrap(), Lane::Normal);
    }

    #[test]
    fn test_closure_urgency_rule() {
        let fx = Fixture::new(10);
        let scheduler = fx
            .scheduler()
            .with_urgency(|task: &Task| task.kind() == TaskKind::Billing);

        let bill = fx.factory.create("billing", json!({"amount": 1})).unwrap();
        assert_eq!(scheduler.schedule(bill).unwrap(), Lane::Priority);
    }

    #[test]
    fn test_queue_full_error() {
        let fx = Fixture::new(2);
        let scheduler = fx.scheduler();

        for _ in 0..2 {
            let task = fx.factory.create("meter_reading", json!({"reading": 1})).unwrap();
            scheduler.schedule(task).unwrap();
        }

        let third = fx.factory.create("meter_reading", json!({"reading": 3})).unwrap();
        let third_id = third.id();
        let err = scheduler.schedule(third).unwrap_err();

        assert_eq!(err.task_id(), third_id);
        assert!(matches!(err, SchedulerError::QueueFull { lane: Lane::Normal, .. }));
        assert!(err.to_string().contains(&third_id.to_string()));

        let returned = err.into_task().unwrap();
        assert_eq!(returned.id(), third_id);
        assert_eq!(fx.normal.len(), 2);
    }

    #[test]
    fn test_disposed_task_not_scheduled() {
        let fx = Fixture::new(2);
        let mut task = fx.factory.create("billing", json!({"amount": 1})).unwrap();
        task.dispose();

        let err = fx.scheduler().schedule(task).unwrap_err();
        assert!(matches!(err, SchedulerError::Disposed { .. }));
        assert!(fx.normal.is_empty());
    }

    #[test]
    fn test_metrics_updated() {
        let fx = Fixture::new(1);
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let scheduler = fx.scheduler().with_metrics(Arc::clone(&metrics));

        scheduler
            .schedule(fx.factory.create("billing", json!({"amount": 1})).unwrap())
            .unwrap();
        scheduler
            .schedule(fx.factory.create("billing", json!({"amount": 2})).unwrap())
            .unwrap_err();

        let kind = TaskKind::Billing.as_str();
        assert_eq!(metrics.tasks_total.with_label_values(&["scheduled", kind]).get(), 1);
        assert_eq!(metrics.tasks_total.with_label_values(&["rejected", kind]).get(), 1);
        assert_eq!(metrics.queue_depth.with_label_values(&["normal"]).get(), 1);
    }
}
