mod error;
mod factory;
mod handler;
mod priority;
mod task;

pub use error::{Result, TaskError};
pub use factory::TaskFactory;
pub use handler::{
    AlertHandler, BillingHandler, FnHandler, MeterReadingHandler, TaskHandler,
    TaskHandlerRegistry, TaskResult,
};
pub use priority::PriorityClass;
pub use task::{Task, TaskId, TaskKind, TaskPayload};
