//! The conversation state machine.
//!
//! [`transition`] is a pure function `state × signal → state × effects`.
//! The async driver in [`crate::controller`] produces signals (model replies,
//! execution results, critiques) and applies the returned effects to the
//! session; all routing decisions live here.

use assay_core::action::{NextAction, ParsedReply};
use assay_core::message::Message;
use serde::{Deserialize, Serialize};

/// Injected after a reply with no recognized tag.
pub const CORRECTIVE_MESSAGE: &str = "Each response must include thinking process followed by either <execute> or <solution> tag. But there are no tags in the current response. Please follow the instruction, fix and regenerate the response again.";

/// Appended when too many replies in a row had no recognized tag.
pub const PARSE_FAILURE_MESSAGE: &str = "Execution terminated due to repeated parsing errors. Please check your input and try again.";

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The agent gave a solution.
    Solved,
    /// Too many untagged replies in a row.
    ParseFailures,
    /// The transition bound was hit.
    StepLimit,
    /// The caller abandoned the session.
    Abandoned,
    /// The model stayed unavailable after recovery; a solution describing
    /// the failure was synthesized.
    ModelUnavailable,
}

/// Controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Generate,
    /// Run `code` (lane marker included).
    Execute { code: String },
    SelfCritic,
    End(EndReason),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Execute { .. } => "execute",
            Self::SelfCritic => "self_critic",
            Self::End(_) => "end",
        }
    }
}

/// Input to a transition.
#[derive(Debug, Clone)]
pub enum Signal {
    /// The model replied.
    Replied(ParsedReply),
    /// The model was unavailable even after recovery. Carries the
    /// synthesized `<solution>` text.
    ModelUnavailable(String),
    /// Execution finished with this bounded output.
    Executed(String),
    /// The self-critique call returned feedback.
    Critiqued(String),
    /// The self-critique call failed.
    CritiqueFailed,
    /// The transition bound was reached.
    StepLimit(u32),
    /// The caller abandoned the session.
    Abandoned,
}

/// Retry counters carried across transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Consecutive untagged replies
    pub parse_errors: u32,
    /// Self-critique rounds used
    pub critic_rounds: u32,
}

/// Static limits for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: u32,
    pub parse_error_limit: u32,
    /// Self-critique rounds allowed; zero disables self-critique.
    pub critic_rounds: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 500,
            parse_error_limit: 2,
            critic_rounds: 0,
        }
    }
}

/// A side effect the driver applies to the session.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Append to the transcript and forward to the chunk channel.
    Append(Message),
}

/// Result of one transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: State,
    pub counters: Counters,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(state: State, counters: Counters) -> Self {
        Self {
            state,
            counters,
            effects: Vec::new(),
        }
    }

    fn append(mut self, message: Message) -> Self {
        self.effects.push(Effect::Append(message));
        self
    }
}

/// Wrap execution output as an observation.
pub fn observation(output: &str) -> String {
    format!("<observation>{output}</observation>")
}

/// User-role message carrying critique feedback.
pub fn critique_message(feedback: &str) -> String {
    format!(
        "Wait... this is not enough to solve the task. Here are some feedbacks for improvement:\n{feedback}"
    )
}

pub fn step_limit_message(max_steps: u32) -> String {
    format!(
        "Execution stopped after reaching the limit of {max_steps} steps without a final solution."
    )
}

/// Apply one signal. Terminal states absorb every signal.
pub fn transition(state: State, signal: Signal, counters: Counters, limits: &Limits) -> Transition {
    match (state, signal) {
        (State::End(reason), _) => Transition::to(State::End(reason), counters),

        (_, Signal::Abandoned) => Transition::to(State::End(EndReason::Abandoned), counters),

        (_, Signal::StepLimit(max_steps)) => {
            Transition::to(State::End(EndReason::StepLimit), counters)
                .append(Message::assistant(step_limit_message(max_steps)))
        }

        (State::Generate, Signal::Replied(reply)) => on_reply(reply, counters, limits),

        (State::Generate, Signal::ModelUnavailable(solution)) => {
            Transition::to(State::End(EndReason::ModelUnavailable), counters)
                .append(Message::assistant(solution))
        }

        (State::Execute { .. }, Signal::Executed(output)) => {
            Transition::to(State::Generate, counters)
                .append(Message::tool_result(observation(&output)))
        }

        (State::SelfCritic, Signal::Critiqued(feedback)) => {
            let counters = Counters {
                critic_rounds: counters.critic_rounds + 1,
                ..counters
            };
            Transition::to(State::Generate, counters)
                .append(Message::user(critique_message(&feedback)))
        }

        (State::SelfCritic, Signal::CritiqueFailed) => {
            Transition::to(State::End(EndReason::Solved), counters)
        }

        // A signal that does not belong to the current state changes nothing.
        (state, _) => Transition::to(state, counters),
    }
}

fn on_reply(reply: ParsedReply, counters: Counters, limits: &Limits) -> Transition {
    let message = Message::assistant(reply.normalized.clone());

    match reply.next_action() {
        NextAction::Execute { code, .. } => {
            Transition::to(State::Execute { code }, Counters { parse_errors: 0, ..counters })
                .append(message)
        }
        NextAction::Solution { .. } => {
            let counters = Counters { parse_errors: 0, ..counters };
            let next = if counters.critic_rounds < limits.critic_rounds {
                State::SelfCritic
            } else {
                State::End(EndReason::Solved)
            };
            Transition::to(next, counters).append(message)
        }
        NextAction::Reasoning => {
            Transition::to(State::Generate, Counters { parse_errors: 0, ..counters })
                .append(message)
        }
        NextAction::Unparseable => {
            let counters = Counters {
                parse_errors: counters.parse_errors + 1,
                ..counters
            };
            let step = Transition::to(State::Generate, counters)
                .append(message)
                .append(Message::user(CORRECTIVE_MESSAGE));
            if counters.parse_errors >= limits.parse_error_limit {
                Transition {
                    state: State::End(EndReason::ParseFailures),
                    ..step
                }
                .append(Message::assistant(PARSE_FAILURE_MESSAGE))
            } else {
                step
            }
        }
    }
}
