use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use super::exec::{self, ExecError};
use crate::containment::ensure_contained;
use crate::errors::{ToolError, ToolResult};
use crate::safety::{CommandClassifier, Verdict};

#[derive(Debug, Deserialize)]
pub(crate) struct BashParams {
    pub cmd: String,
    pub cwd: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BashOutput {
    pub cmd: String,
    pub cwd: String,
    pub stdout: String,
}

pub(crate) async fn run(
    classifier: &dyn CommandClassifier,
    root: &Path,
    timeout: Duration,
    max_output_bytes: usize,
    params: BashParams,
) -> ToolResult<BashOutput> {
    // The safety review runs first: a destructive command must never reach
    // working directory resolution, let alone a shell
    if classifier.classify(&params.cmd).await? == Verdict::Destructive {
        return Err(ToolError::UnsafeCommand(params.cmd));
    }

    let cwd = ensure_contained(params.cwd.as_deref().unwrap_or("."), root)?;

    let mut command = Command::new("sh");
    command.arg("-c").arg(&params.cmd).current_dir(&cwd);

    let output = exec::run_with_limits(command, timeout, max_output_bytes)
        .await
        .map_err(|e| match e {
            ExecError::TimedOut => ToolError::CommandTimeout(timeout.as_secs()),
            ExecError::OutputTooLarge => ToolError::CommandFailed(format!(
                "command output exceeded {} bytes",
                max_output_bytes
            )),
            ExecError::Io(e) => {
                ToolError::ExecutionError(format!("Failed to execute command: {}", e))
            }
        })?;

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::CommandFailed(format!(
            "Command failed with exit code {}{}",
            code,
            if stderr.trim().is_empty() {
                String::new()
            } else {
                format!(": {}", stderr.trim())
            }
        )));
    }

    Ok(BashOutput {
        cmd: params.cmd,
        cwd: cwd.display().to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}
