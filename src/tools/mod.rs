//! Tool registry and dispatch.
//!
//! Every tool is a small struct implementing [`Tool`]. The registry owns them,
//! advertises their schemas to the model, and turns every outcome (success,
//! argument error, I/O failure, even a panic) into a plain string result.

mod browser;
mod context;
mod error;
mod files;
mod shell;
mod spreadsheet;
mod web;

pub use browser::Browser;
pub use context::{fix_path, ToolContext};
pub use error::ToolError;

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;

use crate::llm::{ToolCall, ToolResult, ToolSchema};

/// Maximum characters of each argument value shown in the trace line.
const ARG_PREVIEW_CHARS: usize = 50;

/// A local capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-schema object describing the accepted arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. Argument validation is the tool's own job.
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> Result<String, ToolError>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Registry of available tools, in registration order.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    ctx: ToolContext,
}

impl ToolRegistry {
    /// Registry with the full desktop tool set.
    pub fn new(ctx: ToolContext, browser: Arc<Browser>) -> Self {
        let mut registry = Self::empty(ctx);

        for tool in files::all() {
            registry.register(tool);
        }
        for tool in browser::all(browser) {
            registry.register(tool);
        }
        registry.register(Arc::new(web::ReadWebpage));
        for tool in spreadsheet::all() {
            registry.register(tool);
        }
        registry.register(Arc::new(shell::RunCommand));

        registry
    }

    /// Registry without any tools.
    pub fn empty(ctx: ToolContext) -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            ctx,
        }
    }

    /// Add a tool, replacing any tool registered under the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&pos) => self.tools[pos] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Schemas for every registered tool, as sent to the model.
    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Execute a tool call. Never fails: errors come back as the result text.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        tracing::info!("🔧 {}({})", call.name, preview_args(&call.arguments));

        let value = match self.index.get(&call.name) {
            None => format!("Unknown tool: {}", call.name),
            Some(&pos) => {
                let tool = &self.tools[pos];
                let outcome = AssertUnwindSafe(tool.execute(&call.arguments, &self.ctx))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => format!("Error: {}", e),
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        tracing::error!(tool = %call.name, "Tool panicked: {}", reason);
                        format!("Error: tool {} panicked: {}", call.name, reason)
                    }
                }
            }
        };

        ToolResult {
            name: call.name.clone(),
            value,
        }
    }
}

/// Render arguments as `key=value` pairs with each value truncated.
pub fn preview_args(args: &Value) -> String {
    match args {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, truncate_chars(&v.to_string(), ARG_PREVIEW_CHARS)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => truncate_chars(&other.to_string(), ARG_PREVIEW_CHARS),
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Truncate long tool output, marking the cut.
pub(crate) fn truncate_output(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n[truncated]", &s[..idx]),
        None => s.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }

        async fn execute(&self, args: &Value, _ctx: &ToolContext) -> Result<String, ToolError> {
            Ok(super::error::required_str(args, "text")?.to_string())
        }
    }

    struct Explode;

    #[async_trait]
    impl Tool for Explode {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "Always panics"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _args: &Value, _ctx: &ToolContext) -> Result<String, ToolError> {
            panic!("boom");
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::empty(ToolContext::new(std::env::temp_dir()));
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(Explode));
        registry
    }

    #[tokio::test]
    async fn unknown_tool_returns_sentinel() {
        let result = registry()
            .dispatch(&ToolCall::new("nonexistent_tool", json!({})))
            .await;
        assert_eq!(result.name, "nonexistent_tool");
        assert_eq!(result.value, "Unknown tool: nonexistent_tool");
    }

    #[tokio::test]
    async fn missing_argument_is_reported_as_text() {
        let result = registry().dispatch(&ToolCall::new("echo", json!({}))).await;
        assert!(result.value.starts_with("Error: "));
        assert!(result.value.contains("text"));
    }

    #[tokio::test]
    async fn known_tool_returns_output() {
        let result = registry()
            .dispatch(&ToolCall::new("echo", json!({"text": "hello"})))
            .await;
        assert_eq!(result.value, "hello");
    }

    #[tokio::test]
    async fn panicking_tool_is_captured() {
        let result = registry().dispatch(&ToolCall::new("explode", json!({}))).await;
        assert!(result.value.starts_with("Error: tool explode panicked"));
        assert!(result.value.contains("boom"));
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Arc::new(Echo));
        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo", "explode"]);
    }

    #[test]
    fn preview_truncates_each_value() {
        let long = "x".repeat(80);
        let preview = preview_args(&json!({"path": "a.txt", "content": long}));
        assert!(preview.contains("path=\"a.txt\""));
        let content = preview
            .split(", ")
            .find_map(|pair| pair.strip_prefix("content="))
            .unwrap();
        assert_eq!(content.chars().count(), ARG_PREVIEW_CHARS);
    }

    #[test]
    fn full_registry_schemas_are_objects() {
        let ctx = ToolContext::new(std::env::temp_dir());
        let browser = Arc::new(Browser::new(crate::config::BrowserConfig::default()));
        let registry = ToolRegistry::new(ctx, browser);

        let schemas = registry.get_tool_schemas();
        assert_eq!(schemas.len(), registry.len());
        for schema in &schemas {
            assert_eq!(schema.parameters["type"], "object", "{}", schema.name);
        }
        for name in ["read_file", "list_files", "browser_goto", "create_excel", "run_command"] {
            assert!(schemas.iter().any(|s| s.name == name), "missing {}", name);
        }
    }
}
