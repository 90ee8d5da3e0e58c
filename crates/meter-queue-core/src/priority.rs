use serde::{Deserialize, Serialize};

/// Coarse urgency bucket used by the priority queue.
/// Lower classes are dequeued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// Class 0
    Urgent,
    /// Class 1
    Normal,
}

impl PriorityClass {
    /// Map a task's priority flag to its class.
    pub fn from_flag(is_priority: bool) -> Self {
        if is_priority {
            PriorityClass::Urgent
        } else {
            PriorityClass::Normal
        }
    }
}
