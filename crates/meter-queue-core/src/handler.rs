use crate::{TaskKind, TaskPayload};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Result type for task handlers
pub type TaskResult = Result<(), String>;

/// Execution behaviour bound to a task kind
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the task with the given payload
    async fn execute(&self, payload: &TaskPayload) -> TaskResult;
}

/// Registry of task handlers by task kind
pub struct TaskHandlerRegistry {
    handlers: RwLock<HashMap<TaskKind, Arc<dyn TaskHandler>>>,
}

impl TaskHandlerRegistry {
    /// Empty registry; every kind is unknown until registered
    pub fn new() -> Self {
        TaskHandlerRegistry {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the built-in handlers for every kind
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(TaskKind::MeterReading, MeterReadingHandler);
        registry.register(TaskKind::Billing, BillingHandler);
        registry.register(TaskKind::Alert, AlertHandler);
        registry
    }

    /// Register a task handler for a specific kind, replacing any previous one
    pub fn register<H: TaskHandler + 'static>(&self, kind: TaskKind, handler: H) {
        self.register_arc(kind, Arc::new(handler));
    }

    pub fn register_arc(&self, kind: TaskKind, handler: Arc<dyn TaskHandler>) {
        let mut handlers = self.handlers.write();
        handlers.insert(kind, handler);
    }

    /// Get a handler for a task kind
    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        let handlers = self.handlers.read();
        handlers.get(&kind).cloned()
    }

    pub fn has_handler(&self, kind: TaskKind) -> bool {
        let handlers = self.handlers.read();
        handlers.contains_key(&kind)
    }

    /// Get all registered kinds
    pub fn kinds(&self) -> Vec<TaskKind> {
        let handlers = self.handlers.read();
        let mut kinds: Vec<TaskKind> = handlers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }
}

impl Default for TaskHandlerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Handler backed by a plain closure
pub struct FnHandler<F> {
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&TaskPayload) -> TaskResult + Send + Sync,
{
    pub fn new(func: F) -> Self {
        FnHandler { func }
    }
}

#[async_trait]
impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(&TaskPayload) -> TaskResult + Send + Sync,
{
    async fn execute(&self, payload: &TaskPayload) -> TaskResult {
        (self.func)(payload)
    }
}

/// Records a meter reading reported by a client meter
pub struct MeterReadingHandler;

#[async_trait]
impl TaskHandler for MeterReadingHandler {
    async fn execute(&self, payload: &TaskPayload) -> TaskResult {
        info!(%payload, "Processing meter reading");
        Ok(())
    }
}

/// Computes a bill for a client
pub struct BillingHandler;

#[async_trait]
impl TaskHandler for BillingHandler {
    async fn execute(&self, payload: &TaskPayload) -> TaskResult {
        info!(%payload, "Processing billing");
        Ok(())
    }
}

/// Pushes an alert to the user, e.g. when the grid reports a problem
pub struct AlertHandler;

#[async_trait]
impl TaskHandler for AlertHandler {
    async fn execute(&self, payload: &TaskPayload) -> TaskResult {
        info!(%payload, "Sending alert");
        Ok(())
    }
}
