//! Tools exposed to the agent.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{CallToolResult, ToolDescriptor};
use crate::config::AgentSettings;
use crate::core::RendezvousQueue;

/// Tool errors
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Trait for tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the input schema (JSON Schema format)
    fn input_schema(&self) -> Value;

    /// Run the tool. May wait as long as it needs to.
    async fn call(&self, args: Value) -> Result<String, ToolError>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Descriptors for `tools/list`, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> =
            self.tools.values().map(|tool| tool.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Call a tool by name. Failures become error results, not protocol errors.
    pub async fn call(&self, name: &str, args: Value) -> CallToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!("Agent called unknown tool '{}'", name);
            return CallToolResult::error("Unknown tool");
        };

        match tool.call(args).await {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                tracing::warn!("Tool '{}' failed: {}", name, e);
                CallToolResult::error(e.to_string())
            }
        }
    }
}

/// The "get next input" tool: waits on the rendezvous queue for the
/// operator's next message.
pub struct GetInputTool {
    queue: RendezvousQueue,
    name: String,
    description: String,
}

impl GetInputTool {
    pub fn new(queue: RendezvousQueue, settings: &AgentSettings) -> Self {
        Self {
            queue,
            name: settings.tool_name.clone(),
            description: settings.tool_description.clone(),
        }
    }
}

#[async_trait]
impl Tool for GetInputTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn call(&self, args: Value) -> Result<String, ToolError> {
        if !(args.is_object() || args.is_null()) {
            return Err(ToolError::InvalidArguments(
                "arguments must be a JSON object".to_string(),
            ));
        }

        tracing::info!("Agent is waiting for operator input");
        let message = self
            .queue
            .fetch()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        tracing::info!(bytes = message.len(), "Returning operator input to agent");

        Ok(message.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Content;

    fn registry_with_input(queue: &RendezvousQueue) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(GetInputTool::new(
            queue.clone(),
            &AgentSettings::default(),
        )));
        registry
    }

    #[test]
    fn test_descriptor_advertises_empty_schema() {
        let queue = RendezvousQueue::new();
        let registry = registry_with_input(&queue);

        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "get_vscode_input");
        assert_eq!(descriptors[0].input_schema["type"], "object");
        assert_eq!(descriptors[0].input_schema["required"], json!([]));
    }

    #[tokio::test]
    async fn test_call_returns_queued_message() {
        let queue = RendezvousQueue::new();
        let registry = registry_with_input(&queue);
        queue.submit("next step please").unwrap();

        let result = registry.call("get_vscode_input", json!({})).await;
        assert!(!result.is_error);
        assert_eq!(
            result.content,
            vec![Content::Text {
                text: "next step please".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.call("missing", json!({})).await;
        assert!(result.is_error);
        assert_eq!(
            result.content,
            vec![Content::Text {
                text: "Unknown tool".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_rejects_non_object_arguments() {
        let queue = RendezvousQueue::new();
        let registry = registry_with_input(&queue);
        queue.submit("unused").unwrap();

        let result = registry.call("get_vscode_input", json!([1, 2])).await;
        assert!(result.is_error);
        assert_eq!(queue.stats().pending, 1);
    }

    #[tokio::test]
    async fn test_closed_queue_is_error_result() {
        let queue = RendezvousQueue::new();
        let registry = registry_with_input(&queue);
        queue.close();

        let result = registry.call("get_vscode_input", Value::Null).await;
        assert!(result.is_error);
    }
}
