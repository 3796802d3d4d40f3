//! Events handed to the UI-facing sink.
//!
//! On the wire an event is one flat JSON object:
//!
//! ```json
//! {"type":"tool_call","seq":3,"priority":"high","timestamp":"…",
//!  "correlation_id":"…","language":"python","code":"print(2+2)","tools_referenced":[]}
//! ```

use assay_core::action::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::PlanStep;

/// Delivery class. High-priority events overtake buffered normal ones when
/// the sink is congested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
}

/// Event payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Checklist found in a message.
    Planning { content: String, steps: Vec<PlanStep> },

    /// Free-form reasoning, or any text no other rule matched.
    Reasoning { content: String },

    /// Code the agent is about to run.
    ToolCall {
        language: Language,
        code: String,
        #[serde(default)]
        tools_referenced: Vec<String>,
    },

    /// Observation returned by execution, or a synthesized timeout.
    ToolOutput {
        content: String,
        #[serde(default)]
        timed_out: bool,
    },

    /// The session's answer.
    FinalAnswer { content: String },

    /// The producer failed.
    Error { message: String },

    /// The stream is complete.
    Done {
        session_id: String,
        events_emitted: u64,
    },
}

impl EventPayload {
    /// SSE event name for this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Planning { .. } => "planning",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolOutput { .. } => "tool_output",
            Self::FinalAnswer { .. } => "final_answer",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            Self::ToolCall { .. } | Self::ToolOutput { .. } | Self::FinalAnswer { .. } => {
                Priority::High
            }
            _ => Priority::Normal,
        }
    }
}

/// A sequenced, timestamped event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Emission order within the stream, starting at 1.
    pub seq: u64,

    pub priority: Priority,

    pub timestamp: DateTime<Utc>,

    /// Pairs a `tool_call` with its `tool_output`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(flatten)]
    pub payload: EventPayload,
}

impl StreamEvent {
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(payload: EventPayload) -> StreamEvent {
        StreamEvent {
            seq: 1,
            priority: payload.priority(),
            timestamp: Utc::now(),
            correlation_id: None,
            payload,
        }
    }

    #[test]
    fn tool_call_serializes_flat() {
        let mut e = event(EventPayload::ToolCall {
            language: Language::Python,
            code: "print(2+2)".into(),
            tools_referenced: vec![],
        });
        e.correlation_id = Some("call-1".into());
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["priority"], "high");
        assert_eq!(json["language"], "python");
        assert_eq!(json["code"], "print(2+2)");
        assert_eq!(json["correlation_id"], "call-1");
    }

    #[test]
    fn missing_correlation_id_is_omitted() {
        let json = serde_json::to_string(&event(EventPayload::Reasoning {
            content: "hmm".into(),
        }))
        .unwrap();
        assert!(!json.contains("correlation_id"));
        assert!(json.contains(r#""priority":"normal""#));
    }

    #[test]
    fn event_roundtrip() {
        let original = event(EventPayload::Done {
            session_id: "s-1".into(),
            events_emitted: 7,
        });
        let json = serde_json::to_string(&original).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn priorities_and_names() {
        let high = [
            EventPayload::ToolCall {
                language: Language::Bash,
                code: "ls".into(),
                tools_referenced: vec![],
            },
            EventPayload::ToolOutput {
                content: "x".into(),
                timed_out: false,
            },
            EventPayload::FinalAnswer { content: "4".into() },
        ];
        assert!(high.iter().all(|p| p.priority() == Priority::High));

        let planning = EventPayload::Planning {
            content: String::new(),
            steps: vec![],
        };
        assert_eq!(planning.priority(), Priority::Normal);
        assert_eq!(planning.event_type(), "planning");
        assert_eq!(
            EventPayload::Error { message: "x".into() }.event_type(),
            "error"
        );
    }
}
