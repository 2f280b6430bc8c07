use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::info;

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::thought::ThoughtInput;

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");
    let start = Instant::now();

    let result = match tool_name {
        "sequential_thinking" => handle_sequential_thinking(state, arguments).await,
        "generate_summary" => handle_generate_summary(state).await,
        "analyze_thought" => handle_analyze_thought(state, arguments).await,
        "clear_history" => handle_clear_history(state).await,
        "export_session" => handle_export_session(state, arguments).await,
        "import_session" => handle_import_session(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    };

    info!(
        tool = %tool_name,
        success = result.is_ok(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Tool call finished"
    );
    result
}

/// Render a tool failure as the JSON text returned to clients.
pub fn tool_error_text(error: &McpError) -> String {
    let message = match error {
        McpError::ExecutionFailed { message } => message.clone(),
        other => other.to_string(),
    };
    json!({ "error": message, "status": "failed" }).to_string()
}

// ============================================================================
// Tool parameters
// ============================================================================

/// Arguments for `analyze_thought`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeThoughtParams {
    /// Number of the thought to analyze; the latest record with it is used.
    #[serde(alias = "thought_number")]
    pub thought_number: u32,
}

/// Arguments for `export_session` and `import_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFileParams {
    /// Path of the export file.
    #[serde(alias = "file_path", alias = "path")]
    pub file_path: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_sequential_thinking(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("sequential_thinking", arguments, |input: ThoughtInput| {
        state.thinking.submit(input)
    })
    .await
}

async fn handle_generate_summary(state: &SharedState) -> McpResult<Value> {
    let summary = state.thinking.summary().await;
    Ok(json!({ "summary": summary }))
}

async fn handle_analyze_thought(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "analyze_thought",
        arguments,
        |params: AnalyzeThoughtParams| state.thinking.analyze(params.thought_number),
    )
    .await
}

async fn handle_clear_history(state: &SharedState) -> McpResult<Value> {
    state.thinking.clear().await.map_err(McpError::from)?;
    Ok(json!({
        "status": "success",
        "message": "Thought history cleared"
    }))
}

async fn handle_export_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionFileParams = parse_arguments("export_session", arguments)?;
    let count = state
        .thinking
        .export(&params.file_path)
        .await
        .map_err(McpError::from)?;

    Ok(json!({
        "status": "success",
        "filePath": params.file_path,
        "thoughtCount": count
    }))
}

async fn handle_import_session(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionFileParams = parse_arguments("import_session", arguments)?;
    let count = state
        .thinking
        .import(&params.file_path)
        .await
        .map_err(McpError::from)?;

    Ok(json!({
        "status": "success",
        "filePath": params.file_path,
        "thoughtCount": count
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse typed arguments, run the operation and serialize its result.
///
/// Operation errors become [`McpError::ExecutionFailed`] carrying the error's
/// display text.
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(result).map_err(McpError::Json)
}
