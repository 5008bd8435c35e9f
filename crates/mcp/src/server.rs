// MCP server: newline-delimited JSON-RPC over stdio

use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerInfo,
};
use crate::tools::ToolRegistry;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

pub struct McpServer {
    info: ServerInfo,
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(name: impl Into<String>, registry: ToolRegistry) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            registry,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve on stdin/stdout until the client closes stdin.
    pub async fn start(&self) -> io::Result<()> {
        info!(
            server = %self.info.name,
            tools = self.registry.len(),
            "MCP server listening on stdio"
        );
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve one request per line from `reader`, writing replies to `writer`.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }

            if let Some(reply) = self.handle_message(&line).await {
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!(server = %self.info.name, "MCP server shutting down");
        Ok(())
    }

    /// Handle one raw message. Notifications produce no reply.
    pub async fn handle_message(&self, message: &str) -> Option<String> {
        let response = match serde_json::from_str::<serde_json::Value>(message) {
            Err(e) => {
                warn!(error = %e, "Unparseable JSON-RPC message");
                Some(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    JsonRpcError::parse_error(),
                ))
            }
            Ok(raw) => match serde_json::from_value::<JsonRpcRequest>(raw) {
                Err(e) => {
                    warn!(error = %e, "Invalid JSON-RPC request");
                    Some(JsonRpcResponse::error(
                        serde_json::Value::Null,
                        JsonRpcError::invalid_request(),
                    ))
                }
                Ok(request) => self.handle_request(request).await,
            },
        };

        response.and_then(|r| match serde_json::to_string(&r) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "Failed to serialize response");
                None
            }
        })
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "Handling request");

        let Some(id) = request.id else {
            // Notifications (initialized, cancelled, ...) need no reply.
            debug!(method = %request.method, "Received notification");
            return None;
        };
        let params = request.params.unwrap_or(serde_json::Value::Null);

        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(params),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => to_result(&ListToolsResult {
                tools: self.registry.list_schemas(),
            }),
            "tools/call" => match serde_json::from_value::<CallToolParams>(params) {
                Ok(call) => {
                    info!(tool = %call.name, "Tool call");
                    let result = self.registry.call(&call.name, call.arguments).await;
                    to_result(&result)
                }
                Err(e) => Err(JsonRpcError::invalid_params(format!(
                    "Invalid tools/call params: {}",
                    e
                ))),
            },
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn initialize(&self, params: serde_json::Value) -> Result<serde_json::Value, JsonRpcError> {
        let params: InitializeParams = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e)))?;

        if let Some(client) = &params.client_info {
            info!(client = %client.name, version = %client.version, "Client connected");
        }

        to_result(&InitializeResult::negotiate(
            &params.protocol_version,
            self.info.clone(),
        ))
    }
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CallToolResult, ToolSchema};
    use crate::tools::{json_schema_object, tool_schema, Tool};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use toolhouse_core::{ToolError, ToolResult};

    struct StaticTool(&'static str);

    #[async_trait::async_trait]
    impl Tool for StaticTool {
        fn schema(&self) -> ToolSchema {
            tool_schema(self.0, self.0, "test tool", true, json_schema_object(json!({}), vec![]))
        }

        async fn execute(&self, _arguments: Value) -> ToolResult<CallToolResult> {
            if self.0 == "broken" {
                return Err(ToolError::upstream("fake", "HTTP 503"));
            }
            Ok(CallToolResult::text(format!("- **tool**: {}\n", self.0)))
        }
    }

    fn server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StaticTool("zeta")));
        registry.register(Arc::new(StaticTool("alpha")));
        registry.register(Arc::new(StaticTool("broken")));
        McpServer::new("test", registry)
    }

    async fn send(server: &McpServer, request: Value) -> Value {
        let reply = server.handle_message(&request.to_string()).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let reply = send(
            &server(),
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "agent", "version": "1.0"}
                }
            }),
        )
        .await;

        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(reply["result"]["serverInfo"]["name"], "test");
        assert_eq!(reply["result"]["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn test_tools_list_sorted() {
        let reply = send(
            &server(),
            json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"}),
        )
        .await;

        let names: Vec<&str> = reply["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alpha", "broken", "zeta"]);
        assert!(reply["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call() {
        let s = server();

        let ok = send(
            &s,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "alpha", "arguments": {}}}),
        )
        .await;
        assert_eq!(ok["result"]["content"][0]["text"], "- **tool**: alpha\n");
        assert!(ok["result"].get("isError").is_none());

        let failed = send(
            &s,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                   "params": {"name": "broken"}}),
        )
        .await;
        assert_eq!(failed["result"]["isError"], true);
        assert_eq!(
            failed["result"]["content"][0]["text"],
            "Error: fake error: HTTP 503"
        );

        let unknown = send(
            &s,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                   "params": {"name": "missing", "arguments": {}}}),
        )
        .await;
        assert_eq!(unknown["result"]["isError"], true);
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let s = server();

        let parse = s.handle_message("{not json").await.unwrap();
        let parse: Value = serde_json::from_str(&parse).unwrap();
        assert_eq!(parse["error"]["code"], -32700);
        assert_eq!(parse["id"], Value::Null);

        let missing = send(&s, json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"})).await;
        assert_eq!(missing["error"]["code"], -32601);

        let bad_params = send(
            &s,
            json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {"arguments": {}}}),
        )
        .await;
        assert_eq!(bad_params["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let reply = server()
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_serve_over_streams() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"zeta"}}"#,
            "\n"
        );
        let mut output = Vec::new();

        server()
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["result"], json!({}));
        assert_eq!(lines[1]["result"]["content"][0]["text"], "- **tool**: zeta\n");
    }
}
