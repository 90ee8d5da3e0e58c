//! Turns inbound JSON envelopes into tasks.
//!
//! An envelope looks like `{"type": "meter_reading", "data": {...}}` with an
//! optional boolean `priority` that overrides the kind's default.

use crate::error::{InterpretError, Result};
use meter_queue_core::{Task, TaskFactory};
use serde_json::{Map, Value};

pub struct MessageInterpreter {
    factory: TaskFactory,
}

impl MessageInterpreter {
    pub fn new(factory: TaskFactory) -> Self {
        MessageInterpreter { factory }
    }

    /// Validate an envelope and build its task. Queues are not touched.
    pub fn interpret(&self, envelope: &Value) -> Result<Task> {
        let fields = envelope
            .as_object()
            .ok_or_else(|| invalid("message must be a JSON object"))?;

        let kind = required(fields, "type")?
            .as_str()
            .ok_or_else(|| invalid("'type' must be a string"))?;
        let data = required(fields, "data")?;

        let priority = match fields.get("priority") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(flag)) => Some(*flag),
            Some(_) => return Err(invalid("'priority' must be a boolean")),
        };

        Ok(self
            .factory
            .create_with_override(kind, data.clone(), priority)?)
    }

    /// Parse one line of JSON and interpret it
    pub fn interpret_str(&self, line: &str) -> Result<Task> {
        let envelope: Value = serde_json::from_str(line)
            .map_err(|e| invalid(format!("malformed JSON: {}", e)))?;
        self.interpret(&envelope)
    }
}

impl Default for MessageInterpreter {
    fn default() -> Self {
        Self::new(TaskFactory::default())
    }
}

fn required<'a>(fields: &'a Map<String, Value>, key: &str) -> Result<&'a Value> {
    fields
        .get(key)
        .filter(|value| !is_blank(value))
        .ok_or_else(|| invalid(format!("missing or empty '{}'", key)))
}

/// Missing-equivalent values: null, false, zero and empty containers
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

fn invalid(reason: impl Into<String>) -> InterpretError {
    InterpretError::InvalidMessageFormat(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_queue_core::{TaskError, TaskKind};
    use serde_json::json;

    #[test]
    fn test_interpret_meter_reading_message() {
        let interpreter = MessageInterpreter::default();
        let message = json!({
            "type": "meter_reading",
            "data": {"meter_id": "123", "reading": 100}
        });

        let task = interpreter.interpret(&message).unwrap();

        assert_eq!(task.kind(), TaskKind::MeterReading);
        assert_eq!(task.payload(), &json!({"meter_id": "123", "reading": 100}));
        assert!(!task.is_priority());
        assert_eq!(task.attempts(), 0);
    }

    #[test]
    fn test_interpret_alert_defaults_to_priority() {
        let interpreter = MessageInterpreter::default();
        let task = interpreter
            .interpret(&json!({"type": "alert", "data": {"alert_type": "high_usage"}}))
            .unwrap();
        assert!(task.is_priority());
    }

    #[test]
    fn test_priority_override() {
        let interpreter = MessageInterpreter::default();

        let alert = interpreter
            .interpret(&json!({"type": "alert", "data": {"a": 1}, "priority": false}))
            .unwrap();
        assert!(!alert.is_priority());

        let bill = interpreter
            .interpret(&json!({"type": "billing", "data": {"amount": 5}, "priority": true}))
            .unwrap();
        assert!(bill.is_priority());

        let err = interpreter
            .interpret(&json!({"type": "billing", "data": {"amount": 5}, "priority": "yes"}))
            .unwrap_err();
        assert!(matches!(err, InterpretError::InvalidMessageFormat(_)));
    }

    #[test]
    fn test_invalid_message_format() {
        let interpreter = MessageInterpreter::default();
        let err = interpreter.interpret(&json!({"invalid": "x"})).unwrap_err();
        assert!(matches!(err, InterpretError::InvalidMessageFormat(_)));
    }

    #[test]
    fn test_blank_fields_are_invalid() {
        let interpreter = MessageInterpreter::default();
        let cases = [
            json!({"type": "", "data": {"a": 1}}),
            json!({"type": "billing", "data": {}}),
            json!({"type": "billing", "data": []}),
            json!({"type": "billing", "data": null}),
            json!({"type": "billing", "data": 0}),
            json!({"type": "billing", "data": false}),
            json!({"type": 7, "data": {"a": 1}}),
            json!(["billing", {"a": 1}]),
        ];

        for message in cases {
            let err = interpreter.interpret(&message).unwrap_err();
            assert!(
                matches!(err, InterpretError::InvalidMessageFormat(_)),
                "{message} should be rejected"
            );
        }
    }

    #[test]
    fn test_scalar_data_is_accepted() {
        let interpreter = MessageInterpreter::default();
        let task = interpreter
            .interpret(&json!({"type": "billing", "data": 42}))
            .unwrap();
        assert_eq!(task.payload(), &json!(42));
    }

    #[test]
    fn test_unknown_task_kind() {
        let interpreter = MessageInterpreter::default();
        let err = interpreter
            .interpret(&json!({"type": "teleport", "data": {"a": 1}}))
            .unwrap_err();
        assert_eq!(
            err,
            InterpretError::UnknownTaskKind(TaskError::UnknownTaskKind("teleport".to_string()))
        );
    }

    #[test]
    fn test_interpret_str_malformed_json() {
        let interpreter = MessageInterpreter::default();
        let err = interpreter.interpret_str("{not json").unwrap_err();
        assert!(err.to_string().contains("malformed JSON"));
    }
}
