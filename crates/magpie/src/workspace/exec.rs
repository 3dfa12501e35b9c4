use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

#[derive(Debug)]
pub(crate) struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug)]
pub(crate) enum ExecError {
    TimedOut,
    OutputTooLarge,
    Io(std::io::Error),
}

/// Run a child process, capturing stdout and stderr with a combined size
/// limit enforced while the output is produced.
///
/// The child is killed as soon as the limit is crossed or the wall clock
/// timeout fires, so a fast producer cannot buffer more than the limit plus
/// one read chunk per stream in this process.
pub(crate) async fn run_with_limits(
    mut command: Command,
    timeout: Duration,
    max_output_bytes: usize,
) -> Result<CapturedOutput, ExecError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(ExecError::Io)?;
    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| ExecError::Io(std::io::Error::other("child stdout was not captured")))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| ExecError::Io(std::io::Error::other("child stderr was not captured")))?;

    let capture = async {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut stdout_chunk = [0u8; 8192];
        let mut stderr_chunk = [0u8; 8192];

        while stdout_open || stderr_open {
            tokio::select! {
                read = stdout_pipe.read(&mut stdout_chunk), if stdout_open => {
                    match read.map_err(ExecError::Io)? {
                        0 => stdout_open = false,
                        n => stdout.extend_from_slice(&stdout_chunk[..n]),
                    }
                }
                read = stderr_pipe.read(&mut stderr_chunk), if stderr_open => {
                    match read.map_err(ExecError::Io)? {
                        0 => stderr_open = false,
                        n => stderr.extend_from_slice(&stderr_chunk[..n]),
                    }
                }
            }

            if stdout.len() + stderr.len() > max_output_bytes {
                let _ = child.start_kill();
                return Err(ExecError::OutputTooLarge);
            }
        }

        let status = child.wait().await.map_err(ExecError::Io)?;
        Ok(CapturedOutput {
            status,
            stdout,
            stderr,
        })
    };

    match tokio::time::timeout(timeout, capture).await {
        Ok(result) => result,
        Err(_) => Err(ExecError::TimedOut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_status() {
        let output = run_with_limits(
            sh("echo out; >&2 echo err; exit 7"),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(output.status.code(), Some(7));
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
    }

    #[tokio::test]
    async fn test_limit_applies_to_combined_output() {
        let error = run_with_limits(
            sh("head -c 600 /dev/zero; >&2 head -c 600 /dev/zero"),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap_err();
        assert!(matches!(error, ExecError::OutputTooLarge));
    }

    #[tokio::test]
    async fn test_fast_producer_is_stopped_at_the_limit() {
        // An unbounded writer must be cut off as the limit is crossed, well
        // before the wall clock timeout
        let started = Instant::now();
        let error = run_with_limits(sh("yes"), Duration::from_secs(30), 4096)
            .await
            .unwrap_err();

        assert!(matches!(error, ExecError::OutputTooLarge));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_child() {
        let error = run_with_limits(sh("sleep 5"), Duration::from_millis(200), 1024)
            .await
            .unwrap_err();
        assert!(matches!(error, ExecError::TimedOut));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_io_error() {
        let error = run_with_limits(
            Command::new("/nonexistent/program-for-tests"),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap_err();

        match error {
            ExecError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io error, got {:?}", other),
        }
    }
}
