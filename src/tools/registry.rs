//! Name-to-executor registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::tool::ToolExecutor;
use crate::client::ToolSchema;

/// Closed map of capabilities resolved once per tool call.
///
/// The registry is populated at construction time and only read afterwards;
/// it never calls back into the orchestrator.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolExecutor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own name. Last registration wins.
    pub fn register(&mut self, tool: Arc<dyn ToolExecutor>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with(mut self, tool: Arc<dyn ToolExecutor>) -> Self {
        self.register(tool);
        self
    }

    /// Look up an executor by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.tools.get(name).cloned()
    }

    /// Schemas advertised to the model, sorted by name for stable prompts.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool::{FnTool, ToolOutcome};
    use crate::types::ToolResult;

    fn noop_tool(name: &str) -> Arc<dyn ToolExecutor> {
        Arc::new(FnTool::new(
            name,
            "noop",
            serde_json::json!({"type": "object", "properties": {}}),
            |_args, ctx| async move {
                Ok(ToolOutcome::Completed(ToolResult::ok(
                    ctx.tool_call_id.clone(),
                    "noop",
                    serde_json::Value::Null,
                )))
            },
        ))
    }

    #[test]
    fn resolve_finds_registered_tools() {
        let registry = ToolRegistry::new()
            .with(noop_tool("alpha"))
            .with(noop_tool("beta"));

        assert!(registry.resolve("alpha").is_some());
        assert!(registry.resolve("gamma").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn schemas_are_sorted_by_name() {
        let registry = ToolRegistry::new()
            .with(noop_tool("zeta"))
            .with(noop_tool("alpha"));

        let names: Vec<String> = registry.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
