use crate::{Result, Task, TaskError, TaskHandlerRegistry, TaskKind, TaskPayload};
use std::sync::Arc;

/// Builds tasks from a kind tag and a payload, binding each one to the
/// handler registered for its kind.
#[derive(Clone)]
pub struct TaskFactory {
    registry: Arc<TaskHandlerRegistry>,
}

impl TaskFactory {
    pub fn new(registry: TaskHandlerRegistry) -> Self {
        Self::from_shared(Arc::new(registry))
    }

    pub fn from_shared(registry: Arc<TaskHandlerRegistry>) -> Self {
        TaskFactory { registry }
    }

    pub fn registry(&self) -> &TaskHandlerRegistry {
        &self.registry
    }

    /// Create a task with the kind's default priority.
    ///
    /// Alerts are priority tasks; every other kind is normal.
    pub fn create(&self, kind: &str, payload: TaskPayload) -> Result<Task> {
        self.create_with_override(kind, payload, None)
    }

    /// Create a task with an explicit priority flag, overriding the kind's default.
    pub fn create_with_priority(
        &self,
        kind: &str,
        payload: TaskPayload,
        is_priority: bool,
    ) -> Result<Task> {
        self.create_with_override(kind, payload, Some(is_priority))
    }

    pub fn create_with_override(
        &self,
        kind: &str,
        payload: TaskPayload,
        is_priority: Option<bool>,
    ) -> Result<Task> {
        let kind: TaskKind = kind.parse()?;
        let handler = self
            .registry
            .get(kind)
            .ok_or_else(|| TaskError::UnknownTaskKind(kind.to_string()))?;

        let is_priority = is_priority.unwrap_or_else(|| kind.default_priority());
        Ok(Task::new(kind, payload, is_priority, handler))
    }
}

impl Default for TaskFactory {
    fn default() -> Self {
        Self::new(TaskHandlerRegistry::with_builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_each_builtin_kind() {
        let factory = TaskFactory::default();

        let meter = factory
            .create("meter_reading", json!({"meter_id": "123", "reading": 100}))
            .unwrap();
        assert_eq!(meter.kind(), TaskKind::MeterReading);
        assert!(!meter.is_priority());

        let billing = factory
            .create("billing", json!({"client_id": "456", "amount": 50.0}))
            .unwrap();
        assert_eq!(billing.kind(), TaskKind::Billing);
        assert!(!billing.is_priority());

        let alert = factory
            .create("alert", json!({"alert_type": "high_usage", "client_id": "789"}))
            .unwrap();
        assert_eq!(alert.kind(), TaskKind::Alert);
        assert!(alert.is_priority());
    }

    #[test]
    fn test_create_unknown_task_kind() {
        let factory = TaskFactory::default();
        let err = factory.create("unknown_task_type", json!({})).unwrap_err();
        assert_eq!(err, TaskError::UnknownTaskKind("unknown_task_type".to_string()));
    }

    #[test]
    fn test_unregistered_kind_is_unknown() {
        let factory = TaskFactory::new(TaskHandlerRegistry::new());
        let err = factory.create("billing", json!({"amount": 1})).unwrap_err();
        assert_eq!(err, TaskError::UnknownTaskKind("billing".to_string()));
    }

    #[test]
    fn test_create_priority_task() {
        let factory = TaskFactory::default();
        let task = factory
            .create_with_priority("meter_reading", json!({"meter_id": "123"}), true)
            .unwrap();
        assert!(task.is_priority());
    }

    #[test]
    fn test_alert_priority_override() {
        let factory = TaskFactory::default();
        let task = factory
            .create_with_priority("alert", json!({"alert_type": "low_battery"}), false)
            .unwrap();
        assert_eq!(task.kind(), TaskKind::Alert);
        assert!(!task.is_priority());
    }

    #[test]
    fn test_fresh_state() {
        let factory = TaskFactory::default();
        let a = factory.create("billing", json!({"amount": 1})).unwrap();
        let b = factory.create("billing", json!({"amount": 1})).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.attempts(), 0);
        assert!(!a.is_disposed());
    }
}
