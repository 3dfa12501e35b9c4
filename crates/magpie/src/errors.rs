use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Path escapes the workspace: {0}")]
    PathEscape(String),

    #[error("Failed to read file: {0}")]
    FileRead(String),

    #[error("Failed to read directory: {0}")]
    DirectoryRead(String),

    #[error("Failed to write file: {0}")]
    FileWrite(String),

    #[error("Failed to edit file: {0}")]
    FileEdit(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Command blocked as destructive: {0}")]
    UnsafeCommand(String),

    #[error("Command timed out after {0} seconds")]
    CommandTimeout(u64),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ToolResult<T> = Result<T, ToolError>;
