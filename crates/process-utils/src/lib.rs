//! Small process-related helpers shared across the workspace.
//!
//! Every external tool the relay drives (ffmpeg, ffprobe, aria2c, yt-dlp) goes
//! through [`run_to_completion`], which captures output, turns a non-zero exit
//! into an error carrying the tail of stderr, and kills the child when the
//! owning task is cancelled.

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Number of stderr lines kept in a [`ProcessError::Failed`].
pub const STDERR_TAIL_LINES: usize = 20;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

/// Errors produced while running an external tool.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {stderr}", describe_code(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Whether the process was stopped by cancellation rather than failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled { .. })
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Keep only the last `max_lines` non-empty lines of `text`.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(feature = "tokio")]
mod tokio_support {
    use std::process::Stdio;

    use tokio_util::sync::CancellationToken;
    use tracing::{debug, warn};

    use super::{NoWindowExt, ProcessError, ProcessOutput, STDERR_TAIL_LINES, tail_lines};

    impl NoWindowExt for tokio::process::Command {
        fn no_window(&mut self) {
            #[cfg(windows)]
            {
                use std::os::windows::process::CommandExt;
                self.as_std_mut().creation_flags(super::CREATE_NO_WINDOW);
            }
        }
    }

    /// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
    pub fn tokio_command(program: impl AsRef<std::ffi::OsStr>) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(program);
        cmd.no_window();
        cmd
    }

    /// Run `cmd` to completion, capturing stdout and stderr.
    ///
    /// The child is killed if `cancellation_token` fires before it exits.
    /// A non-zero exit status is reported as [`ProcessError::Failed`] with the
    /// tail of stderr attached.
    pub async fn run_to_completion(
        mut cmd: tokio::process::Command,
        cancellation_token: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        let program = cmd
            .as_std()
            .get_program()
            .to_string_lossy()
            .into_owned();

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %program, "Spawning process");

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Dropping the wait future drops the child, and `kill_on_drop` reaps it.
        let output = tokio::select! {
            _ = cancellation_token.cancelled() => {
                debug!(program = %program, "Process cancelled");
                return Err(ProcessError::Cancelled { program });
            }
            output = child.wait_with_output() => output,
        };

        let output = output.map_err(|source| ProcessError::Io {
            program: program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let code = output.status.code();
            warn!(program = %program, code = ?code, "Process exited unsuccessfully");
            return Err(ProcessError::Failed {
                program,
                code,
                stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
            });
        }

        Ok(ProcessOutput { stdout, stderr })
    }
}

#[cfg(feature = "tokio")]
pub use tokio_support::{run_to_completion, tokio_command};
