//! Conversation Controller: drives one session through the state machine.
//!
//! Each loop iteration turns the current [`State`] into a [`Signal`] by
//! calling the model, the executor, or the critic, feeds it to
//! [`transition`], and applies the resulting effects. Every appended
//! message is forwarded to the chunk channel rendered with its role header.

use assay_config::AppConfig;
use assay_core::action::parse_reply;
use assay_core::catalog::ResourceCatalog;
use assay_core::chunk::Chunk;
use assay_core::error::{Disposition, Error, ProviderError, Result};
use assay_core::message::{Message, SessionId};
use assay_core::provider::{Provider, ProviderRequest};
use assay_executor::ActionExecutor;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::machine::{EndReason, Effect, Limits, Signal, State, transition};
use crate::prompt::SystemPrompt;
use crate::recovery;
use crate::session::Session;

/// Sequences that end a model reply right after an action block.
const STOP_SEQUENCES: [&str; 2] = ["</execute>", "</solution>"];

/// Shared flag a caller sets to abandon a session.
///
/// Checked before every model call. An execution already running is left
/// to finish or hit its own timeout.
#[derive(Debug, Clone, Default)]
pub struct AbandonHandle(Arc<AtomicBool>);

impl AbandonHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abandon(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a finished session produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    pub reason: EndReason,
    /// Content of the last solution, if any.
    pub answer: Option<String>,
    pub transcript: Vec<Message>,
    pub steps: u32,
}

/// Forwards rendered messages to the orchestrator. A departed consumer is
/// noted once and then ignored.
struct ChunkSink {
    tx: Option<mpsc::Sender<Chunk>>,
}

impl ChunkSink {
    async fn send(&mut self, chunk: Chunk) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(chunk).await.is_err() {
            debug!("Chunk consumer dropped, continuing without streaming");
            self.tx = None;
        }
    }
}

/// Drives sessions against one provider and executor.
pub struct Controller {
    provider: Arc<dyn Provider>,
    executor: Arc<ActionExecutor>,
    catalog: Arc<ResourceCatalog>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    limits: Limits,
    recovery_keep_chars: usize,
}

impl Controller {
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<ActionExecutor>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            executor,
            catalog: Arc::new(ResourceCatalog::new()),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            limits: Limits::default(),
            recovery_keep_chars: recovery::DEFAULT_KEEP_CHARS,
        }
    }

    /// Build from configuration with the given provider and executor.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        executor: Arc<ActionExecutor>,
        catalog: Arc<ResourceCatalog>,
    ) -> Self {
        let critic_rounds = if config.agent.self_critic {
            config.agent.critic_rounds
        } else {
            0
        };
        Self::new(provider, executor, assay_providers::router::default_model(config))
            .with_catalog(catalog)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_limits(Limits {
                max_steps: config.agent.max_steps,
                parse_error_limit: config.agent.parse_error_limit,
                critic_rounds,
            })
            .with_recovery_keep_chars(config.agent.recovery_truncate_chars)
    }

    /// Build the provider, executor and catalog `config` names, then the
    /// controller on top of them.
    pub fn build(config: &AppConfig) -> Result<Self> {
        let router = assay_providers::router::build_from_config(config);
        let provider = router.default().ok_or_else(|| {
            Error::Provider(ProviderError::NotConfigured(config.default_provider.clone()))
        })?;
        let executor = Arc::new(ActionExecutor::from_config(&config.executor));
        let catalog = match &config.agent.catalog_path {
            Some(path) => ResourceCatalog::load_json(path)?,
            None => ResourceCatalog::new(),
        };
        Ok(Self::from_config(config, provider, executor, Arc::new(catalog)))
    }

    /// Install the catalog the next session's system prompt is built from.
    pub fn with_catalog(mut self, catalog: Arc<ResourceCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_recovery_keep_chars(mut self, chars: usize) -> Self {
        self.recovery_keep_chars = chars;
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn catalog(&self) -> &Arc<ResourceCatalog> {
        &self.catalog
    }

    /// The system prompt sessions start with.
    pub fn system_prompt(&self) -> String {
        SystemPrompt::new(&self.catalog)
            .with_self_critic(self.limits.critic_rounds > 0)
            .render()
    }

    /// Run one session to a terminal state.
    ///
    /// Messages are forwarded to `chunks` as they are appended; the sender is
    /// dropped on return, which tells the consumer the session is over.
    /// Fatal provider errors are pushed as [`Chunk::Failed`] and returned.
    pub async fn run(
        &self,
        task: &str,
        session_id: SessionId,
        chunks: Option<mpsc::Sender<Chunk>>,
        abandon: &AbandonHandle,
    ) -> Result<SessionOutcome> {
        let mut session = Session::new(session_id);
        let mut sink = ChunkSink { tx: chunks };
        let system_prompt = self.system_prompt();
        // Stateful lanes (the Python worker) live and die with the session.
        let executor = self.executor.for_session();

        info!(
            session_id = %session.id,
            provider = self.provider.name(),
            model = %self.model,
            "Session started"
        );
        append(&mut session, &mut sink, Message::user(task)).await;

        let mut state = State::Generate;
        let reason = loop {
            if let State::End(reason) = &state {
                break *reason;
            }

            let signal = if session.steps >= self.limits.max_steps {
                warn!(
                    session_id = %session.id,
                    max_steps = self.limits.max_steps,
                    "Step limit reached, ending session"
                );
                Signal::StepLimit(self.limits.max_steps)
            } else {
                session.steps += 1;
                let produced = self
                    .produce_signal(&state, &executor, &system_prompt, &mut session, abandon)
                    .await;
                match produced {
                    Ok(signal) => signal,
                    Err(e) => return Err(fail(session, &mut sink, e).await),
                }
            };

            let from = state.name();
            let step = transition(state, signal, session.counters, &self.limits);
            session.counters = step.counters;
            for Effect::Append(message) in step.effects {
                append(&mut session, &mut sink, message).await;
            }
            debug!(
                session_id = %session.id,
                step = session.steps,
                from,
                to = step.state.name(),
                parse_errors = session.counters.parse_errors,
                "Transition"
            );
            state = step.state;
        };

        info!(
            session_id = %session.id,
            reason = ?reason,
            steps = session.steps,
            messages = session.messages().len(),
            "Session finished"
        );

        let answer = session.final_answer();
        let steps = session.steps;
        Ok(SessionOutcome {
            session_id: session.id.clone(),
            reason,
            answer,
            steps,
            transcript: session.into_messages(),
        })
    }

    async fn produce_signal(
        &self,
        state: &State,
        executor: &ActionExecutor,
        system_prompt: &str,
        session: &mut Session,
        abandon: &AbandonHandle,
    ) -> std::result::Result<Signal, ProviderError> {
        match state {
            State::Generate | State::SelfCritic if abandon.is_abandoned() => {
                info!(session_id = %session.id, "Session abandoned by caller");
                Ok(Signal::Abandoned)
            }
            State::Generate => self.generate(system_prompt, session).await,
            State::Execute { code } => {
                let execution = executor.execute(code).await;
                debug!(
                    session_id = %session.id,
                    language = %execution.language,
                    elapsed_ms = execution.elapsed.as_millis() as u64,
                    timed_out = execution.timed_out,
                    "Execution finished"
                );
                Ok(Signal::Executed(execution.output))
            }
            State::SelfCritic => Ok(self.critique(system_prompt, session).await),
            // Terminal states absorb every signal.
            State::End(_) => Ok(Signal::Abandoned),
        }
    }

    /// One model turn, with a single truncate-and-retry on recoverable
    /// failures.
    async fn generate(
        &self,
        system_prompt: &str,
        session: &mut Session,
    ) -> std::result::Result<Signal, ProviderError> {
        let first = match self.complete(system_prompt, session.messages()).await {
            Ok(text) => return Ok(Signal::Replied(parse_reply(&text))),
            Err(e) => e,
        };
        if first.disposition() == Disposition::Fatal {
            return Err(first);
        }

        warn!(
            session_id = %session.id,
            error = %first,
            "Model call failed, shrinking context and retrying once"
        );
        recovery::truncate_last_observation(session, self.recovery_keep_chars);

        match self.complete(system_prompt, session.messages()).await {
            Ok(text) => Ok(Signal::Replied(parse_reply(&text))),
            Err(e) => {
                let class = e.failure_class();
                warn!(
                    session_id = %session.id,
                    error = %e,
                    class = ?class,
                    "Retry failed, ending session with a synthesized solution"
                );
                Ok(Signal::ModelUnavailable(recovery::synthesized_solution(class)))
            }
        }
    }

    /// Ask the model to critique the trajectory so far.
    async fn critique(&self, system_prompt: &str, session: &Session) -> Signal {
        let mut history = session.messages().to_vec();
        history.push(Message::user(critique_request(session.task().unwrap_or_default())));

        match self.complete(system_prompt, &history).await {
            Ok(text) if !text.trim().is_empty() => Signal::Critiqued(text.trim().to_string()),
            Ok(_) => {
                warn!(session_id = %session.id, "Critique came back empty, keeping the solution");
                Signal::CritiqueFailed
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Critique failed, keeping the solution");
                Signal::CritiqueFailed
            }
        }
    }

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
    ) -> std::result::Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system_prompt));
        messages.extend_from_slice(history);

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
        };
        let response = self.provider.complete(request).await?;
        Ok(response.content)
    }
}

/// The critic's instruction, restating the original request.
fn critique_request(task: &str) -> String {
    format!(
        "Here is a reminder of what is the user requested: {task}\n\
         Examine the previous executions, reactions and the solution, then give your honest critique. \
         Critic harshly: if any requested part is missing, unsupported by an observation, or could be \
         done better, say exactly what and suggest the next step. Reply with the critique only."
    )
}

async fn append(session: &mut Session, sink: &mut ChunkSink, message: Message) {
    let chunk = Chunk::from(session.push(message));
    sink.send(chunk).await;
}

/// Record a fatal failure and turn it into the error returned to the caller.
async fn fail(mut session: Session, sink: &mut ChunkSink, cause: ProviderError) -> Error {
    error!(session_id = %session.id, error = %cause, "Model call failed, stopping session");
    let text = format!("Error: the model call failed and the session was stopped: {cause}");
    session.push(Message::assistant(text.clone()));
    sink.send(Chunk::Failed(text)).await;
    Error::Provider(cause)
}
