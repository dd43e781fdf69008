//! Tool dispatch: a registry of named handlers the model may call
//!
//! New tools register a handler plus the argument schema advertised to the
//! model; the completion loop never branches on tool names itself.

pub mod release_notes;
pub mod store_extension;
pub mod versions;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use shopilot_copilot::{ChatMessage, FunctionDefinition, FunctionTool};
use shopilot_core::{ErrorContext, ShopilotError, ShopilotResult};
use tracing::info;

pub use release_notes::ReleaseNotesTool;
pub use store_extension::StoreExtensionTool;
pub use versions::VersionsTool;

/// A callable tool exposed to the model
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Name the model uses to call this tool
    fn name(&self) -> &str;

    /// Definition advertised to the model, including the argument schema
    fn definition(&self) -> FunctionDefinition;

    /// Run the tool against its JSON-encoded arguments
    async fn invoke(&self, arguments: &str) -> ShopilotResult<String>;
}

/// Registry of tool handlers, registration order preserved
#[derive(Default)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full tool catalog
    pub fn standard(github_api_url: &str) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VersionsTool::new(github_api_url)));
        registry.register(Arc::new(ReleaseNotesTool::default()));
        registry.register(Arc::new(StoreExtensionTool::default()));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Definitions for every tool whose name is not in `used`
    pub fn definitions_excluding(&self, used: &HashSet<String>) -> Vec<FunctionTool> {
        self.handlers
            .iter()
            .filter(|handler| !used.contains(handler.name()))
            .map(|handler| FunctionTool::function(handler.definition()))
            .collect()
    }

    /// Invoke the named tool and wrap its output as a conversation message
    pub async fn dispatch(&self, name: &str, arguments: &str) -> ShopilotResult<ChatMessage> {
        let handler = self
            .handlers
            .iter()
            .find(|handler| handler.name() == name)
            .ok_or_else(|| ShopilotError::Dispatch {
                tool: name.to_string(),
                message: "unknown tool".to_string(),
                source: None,
                context: ErrorContext::new("dispatcher").with_operation("dispatch"),
            })?;

        info!(tool = name, "Dispatching tool call");
        let content = handler
            .invoke(arguments)
            .await
            .map_err(|err| match err {
                already @ ShopilotError::Dispatch { .. } => already,
                other => ShopilotError::Dispatch {
                    tool: name.to_string(),
                    message: other.to_string(),
                    source: Some(Box::new(other)),
                    context: ErrorContext::new("dispatcher").with_operation("dispatch"),
                },
            })?;

        Ok(ChatMessage::system(format!(
            "The result of calling function {name} is: {content}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn definition(&self) -> FunctionDefinition {
            FunctionDefinition {
                name: "echo".to_string(),
                description: "Echo the arguments back".to_string(),
                parameters: None,
            }
        }

        async fn invoke(&self, arguments: &str) -> ShopilotResult<String> {
            Ok(arguments.to_string())
        }
    }

    #[tokio::test]
    async fn dispatch_wraps_output_as_a_system_message() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let message = registry.dispatch("echo", "{\"a\":1}").await.unwrap();
        assert_eq!(
            message.content,
            "The result of calling function echo is: {\"a\":1}"
        );
    }

    #[tokio::test]
    async fn dispatching_an_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let err = registry.dispatch("nope", "{}").await.unwrap_err();

        match err {
            ShopilotError::Dispatch { tool, .. } => assert_eq!(tool, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn used_tools_are_excluded_from_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let mut used = HashSet::new();
        assert_eq!(registry.definitions_excluding(&used).len(), 1);

        used.insert("echo".to_string());
        assert!(registry.definitions_excluding(&used).is_empty());
    }
}
