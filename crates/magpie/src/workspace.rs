use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ToolError, ToolResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::safety::CommandClassifier;
use crate::systems::System;

mod exec;
mod files;
mod search;
mod shell;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_COMMAND_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// A system that lets the agent operate on files inside a workspace root and
/// run shell commands, with every path checked for containment first.
pub struct WorkspaceSystem {
    root: PathBuf,
    tools: Vec<Tool>,
    classifier: Box<dyn CommandClassifier>,
    command_timeout: Duration,
    search_program: String,
}

impl WorkspaceSystem {
    pub fn new(root: impl AsRef<Path>, classifier: Box<dyn CommandClassifier>) -> Self {
        let root = root
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| root.as_ref().to_path_buf());

        let read_tool = Tool::new(
            "read",
            "Read a file from the workspace. Returns file contents with optional line range.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to read, absolute or relative to the workspace root."
                    },
                    "read_range": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "minItems": 2,
                        "maxItems": 2,
                        "description": "Optional [startLine, endLine] range (1-indexed)."
                    }
                }
            }),
        );

        let list_dir_tool = Tool::new(
            "list_dir",
            "List the files and directories in a given directory path.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the directory to list."
                    },
                    "ignore": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of glob patterns to ignore."
                    }
                }
            }),
        );

        let write_file_tool = Tool::new(
            "write_file",
            "Write content to a file, creating directories if needed.",
            json!({
                "type": "object",
                "required": ["path", "content"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to write."
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file."
                    },
                    "createDirs": {
                        "type": "boolean",
                        "default": true,
                        "description": "Create parent directories if they don't exist."
                    }
                }
            }),
        );

        let edit_file_tool = Tool::new(
            "edit_file",
            "Edit a file by finding and replacing text content.",
            json!({
                "type": "object",
                "required": ["path", "find", "replace"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the file to edit."
                    },
                    "find": {
                        "type": "string",
                        "description": "Text to find in the file. Matched literally."
                    },
                    "replace": {
                        "type": "string",
                        "description": "Text to replace the found text with."
                    },
                    "replaceAll": {
                        "type": "boolean",
                        "default": false,
                        "description": "Replace all occurrences (true) or just the first one (false)."
                    }
                }
            }),
        );

        let glob_tool = Tool::new(
            "glob",
            "Find files using glob patterns. Returns file paths sorted by modification time (newest first).",
            json!({
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern to match files (e.g., '**/*.rs', 'src/**/*.test.js')."
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search in (defaults to the workspace root)."
                    },
                    "limit": {
                        "type": "integer",
                        "default": 50,
                        "description": "Maximum number of results to return."
                    },
                    "offset": {
                        "type": "integer",
                        "default": 0,
                        "description": "Number of results to skip (for pagination)."
                    }
                }
            }),
        );

        let grep_tool = Tool::new(
            "grep",
            "Search for regex patterns in files using ripgrep. Returns matching lines with file paths and line numbers.",
            json!({
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regex pattern to search for."
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search in (defaults to the workspace root)."
                    },
                    "include": {
                        "type": ["string", "array"],
                        "description": "Glob pattern(s) of files to include in the search."
                    },
                    "exclude": {
                        "type": ["string", "array"],
                        "description": "Glob pattern(s) of files or directories to exclude."
                    },
                    "caseSensitive": {
                        "type": "boolean",
                        "default": false,
                        "description": "Whether to perform a case-sensitive search."
                    },
                    "limit": {
                        "type": "integer",
                        "default": 250,
                        "description": "Maximum number of matches to return across all files."
                    },
                    "offset": {
                        "type": "integer",
                        "default": 0,
                        "description": "Number of matches to skip (for pagination)."
                    }
                }
            }),
        );

        let bash_tool = Tool::new(
            "bash",
            "Execute shell commands and return the output.",
            json!({
                "type": "object",
                "required": ["cmd"],
                "properties": {
                    "cmd": {
                        "type": "string",
                        "description": "The shell command to execute."
                    },
                    "cwd": {
                        "type": "string",
                        "description": "Working directory for command execution (defaults to the workspace root)."
                    }
                }
            }),
        );

        Self {
            root,
            tools: vec![
                read_tool,
                list_dir_tool,
                write_file_tool,
                edit_file_tool,
                glob_tool,
                grep_tool,
                bash_tool,
            ],
            classifier,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            search_program: "rg".to_string(),
        }
    }

    /// Override the wall clock limit applied to shell commands and searches
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Override the external search binary used by the grep tool
    pub fn with_search_program<S: Into<String>>(mut self, program: S) -> Self {
        self.search_program = program.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl System for WorkspaceSystem {
    fn name(&self) -> &str {
        "workspace"
    }

    fn description(&self) -> &str {
        "A system that provides file and shell capabilities inside a workspace"
    }

    fn instructions(&self) -> &str {
        "Use the provided tools to read, search, and modify files in the workspace \
        and to run shell commands. All paths are resolved against the workspace root \
        and must stay inside it."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> ToolResult<Vec<Content>> {
        tracing::debug!(tool = %tool_call.name, "dispatching tool call");
        match tool_call.name.as_str() {
            "read" => {
                json_content(files::read(&self.root, parse_params(tool_call.arguments)?).await?)
            }
            "list_dir" => {
                json_content(files::list_dir(&self.root, parse_params(tool_call.arguments)?).await?)
            }
            "write_file" => json_content(
                files::write_file(&self.root, parse_params(tool_call.arguments)?).await?,
            ),
            "edit_file" => json_content(
                files::edit_file(&self.root, parse_params(tool_call.arguments)?).await?,
            ),
            "glob" => json_content(
                search::glob_files(&self.root, parse_params(tool_call.arguments)?).await?,
            ),
            "grep" => json_content(
                search::grep(
                    &self.root,
                    &self.search_program,
                    self.command_timeout,
                    parse_params(tool_call.arguments)?,
                )
                .await?,
            ),
            "bash" => json_content(
                shell::run(
                    self.classifier.as_ref(),
                    &self.root,
                    self.command_timeout,
                    MAX_COMMAND_OUTPUT_BYTES,
                    parse_params(tool_call.arguments)?,
                )
                .await?,
            ),
            _ => Err(ToolError::ToolNotFound(tool_call.name)),
        }
    }
}

/// Validate tool arguments against the expected parameter type
fn parse_params<T: DeserializeOwned>(arguments: serde_json::Value) -> ToolResult<T> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidParameters(e.to_string()))
}

/// Render a tool output struct as JSON text content
fn json_content<T: Serialize>(output: T) -> ToolResult<Vec<Content>> {
    let rendered = serde_json::to_string_pretty(&output)
        .map_err(|e| ToolError::Internal(format!("Failed to encode tool output: {}", e)))?;
    Ok(vec![Content::text(rendered)])
}
