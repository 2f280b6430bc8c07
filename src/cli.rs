//! Command-line interface.
//!
//! With no subcommand the binary serves MCP over stdio. The session
//! subcommands inspect or modify the configured session offline and exit.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::analysis::SummaryReport;
use crate::thinking::SequentialThinking;

/// Top-level command line.
#[derive(Parser, Debug)]
#[command(name = "mcp-sequential-thinking", version, about = "Sequential thinking MCP server")]
pub struct Cli {
    /// Command to run; serves MCP over stdio when omitted.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve MCP over stdin/stdout
    Serve,

    #[allow(missing_docs)]
    #[command(flatten)]
    Session(SessionCommands),
}

/// Offline session subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// Print a summary of the session
    Summary {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the session to a JSON file
    Export {
        /// Destination file
        path: PathBuf,
    },

    /// Replace the session with an exported JSON file
    Import {
        /// Source file
        path: PathBuf,
    },

    /// Discard every thought in the session
    Clear,
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a session subcommand.
pub async fn execute_command(command: SessionCommands, thinking: &SequentialThinking) -> CliResult {
    match command {
        SessionCommands::Summary { json } => execute_summary(thinking, json).await,
        SessionCommands::Export { path } => match thinking.export(&path).await {
            Ok(count) => CliResult::success(format!(
                "Exported {} thoughts to {}",
                count,
                path.display()
            )),
            Err(e) => CliResult::error(format!("Export failed: {}", e)),
        },
        SessionCommands::Import { path } => match thinking.import(&path).await {
            Ok(count) => CliResult::success(format!(
                "Imported {} thoughts from {}",
                count,
                path.display()
            )),
            Err(e) => CliResult::error(format!("Import failed: {}", e)),
        },
        SessionCommands::Clear => match thinking.clear().await {
            Ok(()) => CliResult::success("Session cleared"),
            Err(e) => CliResult::error(format!("Clear failed: {}", e)),
        },
    }
}

async fn execute_summary(thinking: &SequentialThinking, json: bool) -> CliResult {
    let summary = thinking.summary().await;
    if json {
        return match serde_json::to_string_pretty(&summary) {
            Ok(text) => CliResult::success(text),
            Err(e) => CliResult::error(format!("Failed to serialize summary: {}", e)),
        };
    }
    CliResult::success(format_summary(&summary))
}

/// Human-readable rendering of a summary.
pub fn format_summary(summary: &SummaryReport) -> String {
    let mut output = String::new();

    output.push_str("\nSession Summary\n");
    output.push_str("═══════════════════════════════════════════════\n\n");
    output.push_str(&format!(
        "Thoughts: {}   Revisions: {}   Branches: {}\n",
        summary.total_thoughts, summary.revision_count, summary.branch_count
    ));
    output.push_str(&format!(
        "Completion: {:.0}%{}\n\n",
        summary.percent_complete * 100.0,
        if summary.has_all_stages {
            " (all stages covered)"
        } else {
            ""
        }
    ));

    output.push_str("Stages:\n");
    for (stage, count) in &summary.stages {
        output.push_str(&format!("  {:<20} {}\n", stage.as_str(), count));
    }

    if !summary.branches.is_empty() {
        output.push_str(&format!("\nBranches: {}\n", summary.branches.join(", ")));
    }

    if !summary.top_tags.is_empty() {
        let tags: Vec<String> = summary
            .top_tags
            .iter()
            .map(|t| format!("{} ({})", t.tag, t.count))
            .collect();
        output.push_str(&format!("\nTop tags: {}\n", tags.join(", ")));
    }

    output
}
