//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Line-delimited stdio transport

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::{handle_tool_call, tool_error_text, SharedState};
use crate::error::McpError;
use crate::thought::ThoughtStage;

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// MCP protocol revision implemented by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "mcp-sequential-thinking";

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier, null when the request could not be read.
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Crate version.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool support.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// Negotiated MCP protocol version.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Advertised capabilities.
    pub capabilities: Capabilities,
    /// Name and version of this server.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP server speaking line-delimited JSON-RPC 2.0.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server on stdin/stdout until stdin closes.
    pub async fn run(&self) -> std::io::Result<()> {
        info!(
            session = %self.state.thinking.storage().paths().data.display(),
            "MCP sequential thinking server starting"
        );
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve(reader, writer).await
    }

    /// Serve requests from `reader`, writing one response line per request.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        -32700,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            // Notifications get no response
            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request.
    /// Returns None for notifications (requests without id).
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        if request.jsonrpc != "2.0" && !is_notification {
            warn!(version = %request.jsonrpc, "Unsupported JSON-RPC version");
            return Some(JsonRpcResponse::error(
                request.id,
                -32600,
                format!("Invalid request: unsupported jsonrpc version '{}'", request.jsonrpc),
            ));
        }

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" | "notifications/cancelled" => {
                debug!(method = %request.method, "Received notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        debug!("Handling tools/list request");
        JsonRpcResponse::success(id, serde_json::json!({ "tools": tool_definitions() }))
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        let (text, is_error) =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => match serde_json::to_string_pretty(&result) {
                    Ok(text) => (text, None),
                    Err(e) => {
                        error!(error = %e, "Failed to serialize tool result");
                        (tool_error_text(&McpError::Json(e)), Some(true))
                    }
                },
                Err(e) => {
                    warn!(tool = %params.name, error = %e, "Tool call failed");
                    (tool_error_text(&e), Some(true))
                }
            };

        let tool_result = ToolCallResult {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text,
            }],
            is_error,
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }
}

/// Every tool exposed by the server, in listing order.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        get_sequential_thinking_tool(),
        get_generate_summary_tool(),
        get_analyze_thought_tool(),
        get_clear_history_tool(),
        get_export_session_tool(),
        get_import_session_tool(),
    ]
}

// ============================================================================
// Thinking tools
// ============================================================================

fn get_sequential_thinking_tool() -> Tool {
    let stages: Vec<&str> = ThoughtStage::values().iter().map(|s| s.as_str()).collect();

    Tool {
        name: "sequential_thinking".to_string(),
        description: "Record one step of a structured, staged thinking process. Thoughts may revise earlier thoughts or branch into alternative paths; the estimate of total thoughts can be adjusted as understanding improves.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "The content of this thought"
                },
                "thoughtNumber": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Position of this thought in the sequence"
                },
                "totalThoughts": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Current estimate of the total number of thoughts"
                },
                "nextThoughtNeeded": {
                    "type": "boolean",
                    "description": "Whether another thought should follow"
                },
                "stage": {
                    "type": "string",
                    "enum": stages,
                    "description": "Thinking stage (case-insensitive)"
                },
                "tags": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Keywords categorizing the thought"
                },
                "axiomsUsed": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Principles or axioms this thought relies on"
                },
                "assumptionsChallenged": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Assumptions this thought questions"
                },
                "isRevision": {
                    "type": "boolean",
                    "description": "Whether this thought revises an earlier one"
                },
                "revisesThought": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of the thought being revised"
                },
                "branchFromThought": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of the thought this branch starts from"
                },
                "branchId": {
                    "type": "string",
                    "description": "Label of the alternative path"
                },
                "needsMoreThoughts": {
                    "type": "boolean",
                    "description": "Whether the estimate is expected to grow"
                },
                "score": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "description": "Optional quality score (0.0-1.0)"
                }
            },
            "required": ["thought", "thoughtNumber", "totalThoughts", "nextThoughtNeeded", "stage"]
        }),
    }
}

fn get_generate_summary_tool() -> Tool {
    Tool {
        name: "generate_summary".to_string(),
        description: "Summarize the current thinking session: counts per stage, revisions, branches, timeline, most common tags and completion.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {}
        }),
    }
}

fn get_analyze_thought_tool() -> Tool {
    Tool {
        name: "analyze_thought".to_string(),
        description: "Analyze one thought against the rest of the session: related thoughts, progress and whether it opens its stage.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "thoughtNumber": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of the thought to analyze (latest record with that number)"
                }
            },
            "required": ["thoughtNumber"]
        }),
    }
}

// ============================================================================
// Session tools
// ============================================================================

fn get_clear_history_tool() -> Tool {
    Tool {
        name: "clear_history".to_string(),
        description: "Discard every thought in the current session.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {}
        }),
    }
}

fn get_export_session_tool() -> Tool {
    Tool {
        name: "export_session".to_string(),
        description: "Write the current session, with summary metadata, to a JSON file.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "filePath": {
                    "type": "string",
                    "description": "Destination path of the export"
                }
            },
            "required": ["filePath"]
        }),
    }
}

fn get_import_session_tool() -> Tool {
    Tool {
        name: "import_session".to_string(),
        description: "Replace the current session with thoughts from an exported JSON file. Nothing changes if the file is invalid.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "filePath": {
                    "type": "string",
                    "description": "Path of the file to import"
                }
            },
            "required": ["filePath"]
        }),
    }
}
