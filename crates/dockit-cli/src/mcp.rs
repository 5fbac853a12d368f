//! MCP (Model Context Protocol) server implementation

use dockit::{Operation, Tool};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

/// JSON-RPC 2.0 request
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

struct McpServer {
    tool: Tool,
}

impl McpServer {
    fn new(tool: Tool) -> Self {
        Self { tool }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            _ => JsonRpcResponse::error(
                request.id,
                -32601,
                format!("Method not found: {}", request.method),
            ),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "dockit",
                    "version": env!("CARGO_PKG_VERSION")
                },
                "instructions": self.tool.description()
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let tools: Vec<Value> = Operation::ALL
            .into_iter()
            .map(|op| {
                json!({
                    "name": op.name(),
                    "description": op.description(),
                    "inputSchema": op.input_schema()
                })
            })
            .collect();
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let tool_name = params
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if Operation::from_name(tool_name).is_none() {
            return JsonRpcResponse::error(id, -32602, format!("Unknown tool: {}", tool_name));
        }

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let text = self.tool.call(tool_name, arguments).await;
        let is_error = text.starts_with("ERROR:");

        JsonRpcResponse::success(
            id,
            json!({
                "content": [{
                    "type": "text",
                    "text": text
                }],
                "isError": is_error
            }),
        )
    }

    /// Ingest the manifest named in the configuration, if any
    async fn ingest_configured_manifest(&self) {
        let Some(url) = self.tool.config().manifest_url.clone() else {
            return;
        };
        info!(url = %url, "Ingesting configured manifest");
        let output = self.tool.ingest_manifest(&url, None).await;
        if output.starts_with("ERROR:") {
            warn!(url = %url, "{}", output);
        } else {
            info!(url = %url, "Configured manifest ready");
        }
    }
}

/// Run the MCP server over stdio
pub async fn run_server(tool: Tool) {
    let server = McpServer::new(tool);
    server.ingest_configured_manifest().await;

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Error reading stdin");
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => {
                // Notifications carry no id and get no response
                if request.id.is_none() && request.method.starts_with("notifications/") {
                    continue;
                }
                server.handle_request(request).await
            }
            Err(e) => JsonRpcResponse::error(None, -32700, format!("Parse error: {}", e)),
        };

        let json = serde_json::to_string(&response).unwrap_or_default();
        if stdout.write_all(format!("{}\n", json).as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockit::Config;

    fn server(dir: &std::path::Path) -> McpServer {
        let tool = Tool::builder()
            .config(Config::with_cache_dir(dir.join("cache")))
            .build()
            .unwrap();
        McpServer::new(tool)
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(id)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_tools_list_exposes_every_operation() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let response = server.handle_request(request(1, "tools/list", json!({}))).await;
        let result = response.result.unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 8);
        assert!(names.contains(&"ingest_manifest"));
        assert!(names.contains(&"read_files"));
    }

    #[tokio::test]
    async fn test_tools_call_marks_errors() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let response = server
            .handle_request(request(
                2,
                "tools/call",
                json!({"name": "query_docs", "arguments": {"question": "what?"}}),
            ))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("ERROR: No active documentation source"));
    }

    #[tokio::test]
    async fn test_list_projects_call() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let response = server
            .handle_request(request(3, "tools/call", json!({"name": "list_projects"})))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let response = server
            .handle_request(request(4, "tools/call", json!({"name": "fetchall"})))
            .await;
        assert_eq!(response.error.unwrap().code, -32602);

        let response = server.handle_request(request(5, "resources/list", json!({}))).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let response = server.handle_request(request(6, "initialize", json!({}))).await;
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "dockit");
        assert_eq!(result["protocolVersion"], "2024-11-05");
    }
}
