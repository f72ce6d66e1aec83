use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use task_queue_core::TaskMessage;

/// Result type for task handlers
pub type TaskResult = Result<Vec<u8>, String>;

/// Trait for task handlers
pub trait TaskHandler: Send + Sync {
    /// Execute the task carried by `message`
    fn handle(&self, message: &TaskMessage) -> TaskResult;
}

impl<F> TaskHandler for F
where
    F: Fn(&TaskMessage) -> TaskResult + Send + Sync,
{
    fn handle(&self, message: &TaskMessage) -> TaskResult {
        self(message)
    }
}

/// Registry of task handlers by task name
#[derive(Clone)]
pub struct TaskHandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn TaskHandler>>>>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        TaskHandlerRegistry {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a task handler for a specific task name
    pub fn register<H: TaskHandler + 'static>(&self, name: impl Into<String>, handler: H) {
        let mut handlers = self.handlers.write();
        handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        let handlers = self.handlers.read();
        handlers.get(name).cloned()
    }

    pub fn has_handler(&self, name: &str) -> bool {
        let handlers = self.handlers.read();
        handlers.contains_key(name)
    }

    /// Get all registered task names, sorted
    pub fn task_names(&self) -> Vec<String> {
        let handlers = self.handlers.read();
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for TaskHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Example task handler that just echoes the body
pub struct EchoHandler;

impl TaskHandler for EchoHandler {
    fn handle(&self, message: &TaskMessage) -> TaskResult {
        Ok(message.body.to_vec())
    }
}

/// Example task handler that always fails
pub struct FailHandler;

impl TaskHandler for FailHandler {
    fn handle(&self, message: &TaskMessage) -> TaskResult {
        Err(format!("task {} failed on purpose", message.id))
    }
}

/// Example task handler that processes JSON
pub struct JsonProcessorHandler;

impl TaskHandler for JsonProcessorHandler {
    fn handle(&self, message: &TaskMessage) -> TaskResult {
        let json = message
            .json_body()
            .map_err(|e| format!("Invalid JSON: {}", e))?;

        let result = if let Some(obj) = json.as_object() {
            serde_json::json!({
                "key_count": obj.len(),
                "original": json,
            })
        } else {
            serde_json::json!({
                "original": json,
            })
        };

        serde_json::to_vec(&result).map_err(|e| format!("Failed to serialize result: {}", e))
    }
}
