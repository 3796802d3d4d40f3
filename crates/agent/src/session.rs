//! Session: one problem-solving run and its transcript.

use assay_core::action::{self, NextAction};
use assay_core::message::{Message, Role, SessionId};

use crate::machine::Counters;

/// Transcript plus counters, owned by exactly one controller run.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    messages: Vec<Message>,
    pub counters: Counters,
    /// Transitions taken so far
    pub steps: u32,
    next_seq: u64,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            messages: Vec::new(),
            counters: Counters::default(),
            steps: 0,
            next_seq: 1,
        }
    }

    /// Append a message, assigning the next sequence number.
    pub fn push(&mut self, mut message: Message) -> &Message {
        message.seq = self.next_seq;
        self.next_seq += 1;
        self.messages.push(message);
        // Just pushed, so the vector is non-empty.
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// The user's original request.
    pub fn task(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Index of the most recent message carrying an observation.
    pub fn last_observation_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|m| m.content.contains(&action::Tag::Observation.open()))
    }

    /// Replace the content of the message at `index`. Context recovery is
    /// the only caller; every other message stays as appended.
    pub(crate) fn rewrite_content(&mut self, index: usize, content: String) {
        if let Some(message) = self.messages.get_mut(index) {
            message.content = content;
        }
    }

    /// Content of the most recent `<solution>` the agent gave.
    pub fn final_answer(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .find_map(|m| match action::parse_reply(&m.content).next_action() {
                NextAction::Solution { content } => Some(content),
                _ => None,
            })
    }
}
