use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{ToolDefinition, ToolResult};

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition shown to the agent
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the arguments the agent supplied
    async fn execute(&self, params: Value) -> ToolResult;

    fn name(&self) -> String {
        self.definition().name
    }
}

/// Registry of the tools an agent may call.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        log::debug!("[TOOLS] Registered {}", name);
        self.tools.write().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Tool names, sorted so prompts are stable
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions of every registered tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self.tools.read().values().map(|t| t.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.to_string(),
                description: "Echoes its input".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn execute(&self, params: Value) -> ToolResult {
            ToolResult::success(params.to_string())
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(Echo("zeta")));
        registry.register(Arc::new(Echo("alpha")));

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert_eq!(registry.definitions()[0].name, "alpha");
        assert!(registry.get("missing").is_none());

        let result = registry.get("zeta").unwrap().execute(json!({"q": 1})).await;
        assert_eq!(result, ToolResult::success(r#"{"q":1}"#));
    }
}
