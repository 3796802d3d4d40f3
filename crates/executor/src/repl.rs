//! Persistent Python lane.
//!
//! One long-lived interpreter runs a small driver loop. Each action is sent
//! as one JSON line on its stdin, executed in a namespace that survives
//! between actions, and answered with one JSON line carrying the captured
//! output. A timeout or a broken pipe discards the worker; the next action
//! starts a fresh one with an empty namespace.

use crate::backend::{Backend, timeout_message};
use assay_config::InterpreterConfig;
use assay_core::error::ExecutorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Driver loop. Replies go out on a private copy of the original stdout so
/// nothing the action prints can corrupt the framing.
const DRIVER: &str = r#"
import contextlib, io, json, os, sys, traceback
reply = os.fdopen(os.dup(1), "w")
os.dup2(2, 1)
namespace = {"__name__": "__main__"}
for line in sys.stdin:
    request = json.loads(line)
    captured = io.StringIO()
    ok = True
    with contextlib.redirect_stdout(captured), contextlib.redirect_stderr(captured):
        try:
            exec(compile(request["code"], "<action>", "exec"), namespace)
        except BaseException:
            ok = False
            traceback.print_exc()
    reply.write(json.dumps({"output": captured.getvalue(), "ok": ok}) + "\n")
    reply.flush()
"#;

#[derive(Serialize)]
struct Request<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct Reply {
    output: String,
    ok: bool,
}

impl Reply {
    fn render(self) -> String {
        let output = self.output.trim_end();
        if self.ok {
            output.to_string()
        } else {
            format!("Error: execution raised an exception\n{output}")
        }
    }
}

/// A running driver. Dropping it kills the interpreter.
struct Worker {
    _child: Child,
    stdin: ChildStdin,
    replies: Lines<BufReader<ChildStdout>>,
}

impl Worker {
    async fn exchange(&mut self, program: &str, source: &str) -> Result<Reply, ExecutorError> {
        let io_error = |reason: String| ExecutorError::Io {
            program: program.to_string(),
            reason,
        };

        let mut frame = serde_json::to_string(&Request { code: source })
            .map_err(|e| io_error(e.to_string()))?;
        frame.push('\n');
        self.stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| io_error(e.to_string()))?;
        self.stdin.flush().await.map_err(|e| io_error(e.to_string()))?;

        let line = self
            .replies
            .next_line()
            .await
            .map_err(|e| io_error(e.to_string()))?
            .ok_or_else(|| io_error("interpreter exited".into()))?;
        serde_json::from_str(&line).map_err(|e| io_error(format!("unreadable reply: {e}")))
    }
}

/// Python lane that keeps its variables between actions.
///
/// Each instance owns at most one worker; sessions get their own instance
/// through [`Backend::for_session`].
pub struct ReplBackend {
    program: String,
    worker: Mutex<Option<Worker>>,
}

impl ReplBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            worker: Mutex::new(None),
        }
    }

    /// Only the program is taken; the driver supplies its own arguments.
    pub fn from_config(config: &InterpreterConfig) -> Self {
        Self::new(&config.program)
    }

    fn spawn(&self) -> Result<Worker, ExecutorError> {
        let mut child = Command::new(&self.program)
            .args(["-u", "-c", DRIVER])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let missing = |pipe: &str| ExecutorError::Io {
            program: self.program.clone(),
            reason: format!("{pipe} not captured"),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        info!(program = %self.program, pid = child.id(), "Started persistent interpreter");
        Ok(Worker {
            _child: child,
            stdin,
            replies: BufReader::new(stdout).lines(),
        })
    }
}

#[async_trait]
impl Backend for ReplBackend {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(&self, source: &str, timeout: Duration) -> String {
        // Held for the whole exchange: one action at a time per worker.
        let mut slot = self.worker.lock().await;
        let mut worker = match slot.take() {
            Some(worker) => worker,
            None => match self.spawn() {
                Ok(worker) => worker,
                Err(e) => {
                    warn!(program = %self.program, error = %e, "Interpreter failed");
                    return format!("Error: {e}");
                }
            },
        };

        debug!(program = %self.program, bytes = source.len(), "Sending action to worker");
        match tokio::time::timeout(timeout, worker.exchange(&self.program, source)).await {
            Ok(Ok(reply)) => {
                *slot = Some(worker);
                reply.render()
            }
            Ok(Err(e)) => {
                warn!(program = %self.program, error = %e, "Worker lost, namespace discarded");
                format!("Error: {e}")
            }
            Err(_) => {
                warn!(
                    program = %self.program,
                    timeout_secs = timeout.as_secs(),
                    "Worker timed out, namespace discarded"
                );
                timeout_message(timeout)
            }
        }
    }

    fn for_session(&self) -> Option<Arc<dyn Backend>> {
        Some(Arc::new(Self::new(self.program.clone())))
    }
}
