// Tool trait, registry and schema helpers

use crate::protocol::{CallToolResult, ToolAnnotations, ToolSchema};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use toolhouse_core::{ToolError, ToolResult};

/// Tool executor trait
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema for MCP
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult>;
}

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name.clone(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all tool schemas, sorted by name
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run a tool by name. Failures come back as `isError` results so the
    /// model can read them.
    pub async fn call(&self, name: &str, arguments: serde_json::Value) -> CallToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = %name, "Unknown tool requested");
            return CallToolResult::error(format!("Unknown tool: {}", name));
        };

        let started = Instant::now();
        match tool.execute(arguments).await {
            Ok(result) => {
                tracing::info!(
                    tool = %name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call succeeded"
                );
                result
            }
            Err(e) => {
                if e.is_caller_error() {
                    tracing::warn!(tool = %name, error = %e, "Tool call rejected");
                } else {
                    tracing::error!(
                        tool = %name,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Tool call failed"
                    );
                }
                CallToolResult::error(e.to_string())
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize tool arguments, treating a missing argument object as `{}`.
pub fn parse_arguments<T: DeserializeOwned>(
    tool: &str,
    arguments: serde_json::Value,
) -> ToolResult<T> {
    let arguments = if arguments.is_null() {
        serde_json::json!({})
    } else {
        arguments
    };

    serde_json::from_value(arguments)
        .map_err(|e| ToolError::invalid_input(format!("Invalid arguments for {}: {}", tool, e)))
}

/// Build a tool schema. `title` and `read_only` become client annotations.
pub fn tool_schema(
    name: &str,
    title: &str,
    description: &str,
    read_only: bool,
    input_schema: serde_json::Value,
) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
        annotations: Some(ToolAnnotations {
            title: Some(title.to_string()),
            read_only_hint: read_only,
        }),
    }
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: serde_json::Value, required: Vec<&str>) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_enum(values: &[&str], description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "string",
        "enum": values,
        "description": description
    })
}

pub fn json_schema_integer(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "integer",
        "description": description
    })
}

pub fn json_schema_number(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "number",
        "description": description
    })
}

pub fn json_schema_boolean(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "boolean",
        "description": description
    })
}

pub fn json_schema_array(items: serde_json::Value, description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "array",
        "items": items,
        "description": description
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    struct EchoTool;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
    }

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            tool_schema(
                "echo",
                "Echo",
                "Echo the input",
                true,
                json_schema_object(
                    serde_json::json!({"text": json_schema_string("Text to echo")}),
                    vec!["text"],
                ),
            )
        }

        async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
            let args: EchoArgs = parse_arguments("echo", arguments)?;
            if args.text.is_empty() {
                return Err(ToolError::invalid_input("text cannot be empty"));
            }
            Ok(CallToolResult::text(args.text))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    #[tokio::test]
    async fn test_call_success() {
        let result = registry()
            .call("echo", serde_json::json!({"text": "hi"}))
            .await;
        assert!(result.is_error.is_none());
        assert_eq!(result.joined_text(), "hi");
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let result = registry().call("nope", serde_json::json!({})).await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.joined_text(), "Error: Unknown tool: nope");
    }

    #[tokio::test]
    async fn test_tool_errors_become_error_results() {
        let result = registry()
            .call("echo", serde_json::json!({"text": ""}))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            result.joined_text(),
            "Error: Invalid input: text cannot be empty"
        );

        let result = registry().call("echo", serde_json::Value::Null).await;
        assert_eq!(result.is_error, Some(true));
        assert!(result
            .joined_text()
            .contains("Invalid arguments for echo: missing field `text`"));
    }

    #[test]
    fn test_schema_annotations() {
        let schema = registry().list_schemas().remove(0);
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["annotations"]["readOnlyHint"], true);
        assert_eq!(json["annotations"]["title"], "Echo");
        assert_eq!(json["inputSchema"]["required"][0], "text");
    }
}
