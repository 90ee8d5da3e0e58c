// Property tests for task construction and attempt bookkeeping

use meter_queue_core::{TaskFactory, TaskKind};
use proptest::prelude::*;
use serde_json::json;

fn kind_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["meter_reading", "billing", "alert"])
}

proptest! {
    #[test]
    fn alert_defaults_to_priority(reading in any::<i64>(), client in "[a-z0-9]{1,8}") {
        let factory = TaskFactory::default();
        let task = factory
            .create("alert", json!({"client_id": client, "reading": reading}))
            .unwrap();
        prop_assert!(task.is_priority());
    }

    #[test]
    fn explicit_override_always_wins(kind in kind_name(), flag in any::<bool>()) {
        let factory = TaskFactory::default();
        let task = factory.create_with_priority(kind, json!({"x": 1}), flag).unwrap();
        prop_assert_eq!(task.is_priority(), flag);
        prop_assert_eq!(task.kind().as_str(), kind);
    }

    #[test]
    fn non_alert_kinds_default_to_normal(
        kind in prop::sample::select(vec!["meter_reading", "billing"])
    ) {
        let factory = TaskFactory::default();
        let task = factory.create(kind, json!({"x": 1})).unwrap();
        prop_assert!(!task.is_priority());
        prop_assert_ne!(task.kind(), TaskKind::Alert);
    }

    #[test]
    fn attempts_never_decrease(failures in 0u32..50) {
        let factory = TaskFactory::default();
        let mut task = factory.create("billing", json!({"amount": 1})).unwrap();
        let mut previous = task.attempts();
        for _ in 0..failures {
            let now = task.record_failure();
            prop_assert!(now > previous);
            previous = now;
        }
        prop_assert_eq!(task.attempts(), failures);
    }
}

#[test]
fn unknown_kinds_are_rejected() {
    let factory = TaskFactory::default();
    for kind in ["", "METER_READING", "refund", "alert "] {
        assert!(factory.create(kind, json!({"x": 1})).is_err(), "{kind:?} accepted");
    }
}
