//! Action execution for assay.
//!
//! [`ActionExecutor`] takes the code from an `execute` block, selects a lane
//! from its leading marker, runs it on that lane's [`Backend`] under a
//! timeout, and bounds the result with an [`OutputPolicy`]. It never fails;
//! every problem is reported as `Error:` text so the model can react to it
//! on its next turn.
//!
//! The Python lane keeps one worker per session (see [`repl`]), so a
//! session should run on [`ActionExecutor::for_session`].

pub mod backend;
pub mod output;
pub mod repl;

pub use backend::{Backend, ProcessBackend, timeout_message};
pub use output::OutputPolicy;
pub use repl::ReplBackend;

use assay_config::ExecutorConfig;
use assay_core::action::Language;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one execution.
#[derive(Debug, Clone)]
pub struct Execution {
    pub language: Language,
    /// Bounded output, ready to be wrapped as an observation.
    pub output: String,
    pub elapsed: Duration,
    pub timed_out: bool,
}

/// Lane dispatcher.
#[derive(Clone)]
pub struct ActionExecutor {
    backends: HashMap<Language, Arc<dyn Backend>>,
    timeout: Duration,
    policy: OutputPolicy,
}

impl ActionExecutor {
    /// An executor with no lanes registered.
    pub fn new(timeout: Duration, policy: OutputPolicy) -> Self {
        Self {
            backends: HashMap::new(),
            timeout,
            policy,
        }
    }

    /// Process-backed lanes from configuration.
    pub fn from_config(config: &ExecutorConfig) -> Self {
        let python: Arc<dyn Backend> = if config.persistent_python {
            Arc::new(ReplBackend::from_config(&config.python))
        } else {
            Arc::new(ProcessBackend::from_config(&config.python))
        };
        Self::new(
            Duration::from_secs(config.timeout_secs),
            OutputPolicy::from_config(config),
        )
        .with_backend(Language::Python, python)
        .with_backend(Language::R, Arc::new(ProcessBackend::from_config(&config.r)))
        .with_backend(Language::Bash, Arc::new(ProcessBackend::from_config(&config.shell)))
    }

    /// Register (or replace) the backend for a lane.
    pub fn with_backend(mut self, language: Language, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(language, backend);
        self
    }

    /// A copy whose stateful lanes are private to one session.
    pub fn for_session(&self) -> Self {
        let mut executor = self.clone();
        for backend in executor.backends.values_mut() {
            if let Some(own) = backend.for_session() {
                *backend = own;
            }
        }
        executor
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn policy(&self) -> OutputPolicy {
        self.policy
    }

    /// Run `code` (lane marker included) and return bounded output.
    ///
    /// The backend runs on its own task. If the caller stops awaiting, the
    /// invocation still runs until it finishes or hits its timeout.
    pub async fn execute(&self, code: &str) -> Execution {
        let (language, body) = Language::split_marker(code);
        let started = Instant::now();

        let Some(backend) = self.backends.get(&language).cloned() else {
            warn!(%language, "No backend registered for lane");
            return Execution {
                language,
                output: format!("Error: no interpreter configured for the {language} lane"),
                elapsed: started.elapsed(),
                timed_out: false,
            };
        };

        debug!(%language, backend = backend.name(), "Executing action");

        let timeout = self.timeout;
        let mut handle = tokio::spawn(async move { backend.run(&body, timeout).await });

        let (raw, timed_out) = match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(text)) => (text, false),
            Ok(Err(e)) => (format!("Error: execution task failed: {e}"), false),
            Err(_) => {
                handle.abort();
                (timeout_message(timeout), true)
            }
        };

        let elapsed = started.elapsed();
        let timed_out = timed_out || raw == timeout_message(timeout);
        if timed_out {
            warn!(%language, timeout_secs = timeout.as_secs(), "Execution timed out");
        } else {
            info!(%language, elapsed_ms = elapsed.as_millis() as u64, "Execution finished");
        }

        Execution {
            language,
            output: self.policy.bound(&raw),
            elapsed,
            timed_out,
        }
    }
}
