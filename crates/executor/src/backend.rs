//! Execution backends: one per language lane.
//!
//! A backend turns source text into result text. It never fails: spawn
//! errors, non-zero exits and timeouts all come back as text starting with
//! `Error:`.

use assay_core::error::ExecutorError;
use assay_config::InterpreterConfig;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// A pluggable interpreter.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Run `source` and return captured output, bounded by `timeout`.
    async fn run(&self, source: &str, timeout: Duration) -> String;

    /// A private instance for one session. Backends that keep state between
    /// invocations return one; stateless backends are shared.
    fn for_session(&self) -> Option<Arc<dyn Backend>> {
        None
    }
}

/// Text reported when an invocation exceeds its bound.
pub fn timeout_message(timeout: Duration) -> String {
    format!("Error: execution timed out after {timeout:?} and was stopped")
}

/// Runs an interpreter as a child process with the source on stdin.
pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
}

impl ProcessBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &InterpreterConfig) -> Self {
        Self::new(&config.program, config.args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn spawn_and_wait(&self, source: &str) -> Result<std::process::Output, ExecutorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        // Feed stdin while draining stdout/stderr: a script that prints a
        // lot before it has been fully read would otherwise block on a full
        // pipe while we block on its stdin.
        let stdin = child.stdin.take();
        let bytes = source.as_bytes();
        let program = self.program.as_str();
        let feed = async move {
            let Some(mut stdin) = stdin else { return };
            // The interpreter may exit before reading everything; its output
            // still explains what happened.
            if let Err(e) = stdin.write_all(bytes).await {
                debug!(program = %program, error = %e, "stdin closed early");
            }
        };

        let ((), output) = tokio::join!(feed, child.wait_with_output());
        output.map_err(|e| ExecutorError::Io {
            program: self.program.clone(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(&self, source: &str, timeout: Duration) -> String {
        debug!(program = %self.program, bytes = source.len(), "Starting interpreter");

        // Dropping the wait future on timeout kills the child.
        let output = match tokio::time::timeout(timeout, self.spawn_and_wait(source)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(program = %self.program, error = %e, "Interpreter failed");
                return format!("Error: {e}");
            }
            Err(_) => {
                warn!(program = %self.program, timeout_secs = timeout.as_secs(), "Interpreter timed out");
                return timeout_message(timeout);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            if stderr.trim().is_empty() {
                stdout.trim_end().to_string()
            } else {
                format!("{}\n{}", stdout.trim_end(), stderr.trim_end())
                    .trim()
                    .to_string()
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            debug!(program = %self.program, exit_code = code, "Interpreter exited with error");
            format!(
                "Error: process exited with status {code}\n{}\n{}",
                stdout.trim_end(),
                stderr.trim_end()
            )
            .trim_end()
            .to_string()
        }
    }
}
