//! Integration tests for MCP protocol handling
//!
//! Drives a real server over an in-memory line-delimited transport.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use mcp_sequential_thinking::config::{AnalysisConfig, Config, LoggingConfig, StorageConfig};
use mcp_sequential_thinking::server::{AppState, McpServer, PROTOCOL_VERSION, SERVER_NAME};
use mcp_sequential_thinking::storage::FileStorage;

/// Verify JSON-RPC 2.0 response structure
fn assert_valid_jsonrpc_response(response: &Value) {
    assert_eq!(response["jsonrpc"], "2.0", "Invalid JSON-RPC version");
    assert!(
        response.get("result").is_some() ^ response.get("error").is_some(),
        "Response must have exactly one of result or error"
    );
}

/// Feed `requests` to a fresh server and collect the response lines.
async fn exchange(dir: &TempDir, requests: &[Value]) -> Vec<Value> {
    let config = Config {
        storage: StorageConfig::new(dir.path()),
        logging: LoggingConfig::default(),
        analysis: AnalysisConfig::default(),
    };
    let storage = FileStorage::open(
        config.storage.session_paths(),
        config.storage.lock_timeout(),
    )
    .await
    .unwrap();
    let server = McpServer::new(Arc::new(AppState::new(config, storage)));

    let mut input = String::new();
    for request in requests {
        input.push_str(&request.to_string());
        input.push('\n');
    }

    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("Failed to parse JSON-RPC response"))
        .collect()
}

fn tool_call(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

fn tool_body(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[cfg(test)]
mod handshake_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_then_list_tools() {
        let dir = TempDir::new().unwrap();
        let responses = exchange(
            &dir,
            &[
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "initialize",
                    "params": {
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {},
                        "clientInfo": {"name": "test-client", "version": "1.0.0"}
                    }
                }),
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            ],
        )
        .await;

        assert_eq!(responses.len(), 2);
        for response in &responses {
            assert_valid_jsonrpc_response(response);
        }

        let init = &responses[0]["result"];
        assert_eq!(init["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["serverInfo"]["name"], SERVER_NAME);

        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 6);
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }
}

#[cfg(test)]
mod tool_call_tests {
    use super::*;

    #[tokio::test]
    async fn test_thinking_session_over_transport() {
        let dir = TempDir::new().unwrap();
        let responses = exchange(
            &dir,
            &[
                tool_call(
                    1,
                    "sequential_thinking",
                    json!({
                        "thought": "Frame the question",
                        "thoughtNumber": 1,
                        "totalThoughts": 2,
                        "nextThoughtNeeded": true,
                        "stage": "Problem Definition",
                        "tags": ["framing"]
                    }),
                ),
                tool_call(
                    2,
                    "sequential_thinking",
                    json!({
                        "thought": "Answer it",
                        "thoughtNumber": 2,
                        "totalThoughts": 2,
                        "nextThoughtNeeded": false,
                        "stage": "Conclusion"
                    }),
                ),
                tool_call(3, "generate_summary", json!({})),
            ],
        )
        .await;

        assert_eq!(responses.len(), 3);
        assert_eq!(tool_body(&responses[1])["thoughtHistoryLength"], 2);

        let summary = &tool_body(&responses[2])["summary"];
        assert_eq!(summary["totalThoughts"], 2);
        assert_eq!(summary["stages"]["Conclusion"], 1);
        assert_eq!(summary["topTags"][0]["tag"], "framing");
    }

    #[tokio::test]
    async fn test_failed_tool_call_is_result_not_error() {
        let dir = TempDir::new().unwrap();
        let responses = exchange(
            &dir,
            &[tool_call(
                9,
                "sequential_thinking",
                json!({
                    "thought": "Too far",
                    "thoughtNumber": 5,
                    "totalThoughts": 3,
                    "nextThoughtNeeded": true,
                    "stage": "Analysis"
                }),
            )],
        )
        .await;

        let response = &responses[0];
        assert_valid_jsonrpc_response(response);
        assert_eq!(response["id"], 9);
        assert_eq!(response["result"]["isError"], true);

        let body = tool_body(response);
        assert_eq!(body["status"], "failed");
        assert!(body["error"].as_str().unwrap().contains("totalThoughts"));
    }

    #[tokio::test]
    async fn test_unknown_method_and_parse_error() {
        let dir = TempDir::new().unwrap();
        let responses = exchange(
            &dir,
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "prompts/list"}),
                json!("not a request"),
            ],
        )
        .await;

        assert_eq!(responses[0]["error"]["code"], -32601);
        assert_eq!(responses[1]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], Value::Null);
    }
}
