//! Action parsing: turning one model reply into typed action blocks.
//!
//! Replies use paired tags:
//!
//! ```text
//! <think> free-form reasoning </think>
//! <execute> code to run </execute>
//! <solution> final answer </solution>
//! ```
//!
//! Parsing is forgiving: an opening tag without its closing tag behaves as if
//! the closing tag were appended at end of text. Parsing never fails; a reply
//! with no recognized tag is reported as [`NextAction::Unparseable`] and its
//! whole text is kept as reasoning.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A delimited span kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Think,
    Execute,
    Solution,
    Observation,
    /// Alternate spelling of an observation span used in prompts.
    Observe,
}

impl Tag {
    pub fn name(self) -> &'static str {
        match self {
            Self::Think => "think",
            Self::Execute => "execute",
            Self::Solution => "solution",
            Self::Observation => "observation",
            Self::Observe => "observe",
        }
    }

    pub fn open(self) -> String {
        format!("<{}>", self.name())
    }

    pub fn close(self) -> String {
        format!("</{}>", self.name())
    }
}

/// Tags the controller auto-closes, in the order closings are appended.
const AUTO_CLOSED: [Tag; 3] = [Tag::Execute, Tag::Solution, Tag::Think];

/// A matched tag span inside a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpan {
    pub tag: Tag,
    /// Byte range of the whole span including both tags.
    pub outer: Range<usize>,
    /// Byte range of the content between the tags.
    pub inner: Range<usize>,
}

impl TagSpan {
    pub fn inner_text<'a>(&self, text: &'a str) -> &'a str {
        &text[self.inner.clone()]
    }
}

/// Find the first complete `<tag>…</tag>` span. The closing tag is the
/// first one after the opening tag.
pub fn find_span(text: &str, tag: Tag) -> Option<TagSpan> {
    find_span_from(text, tag, 0)
}

/// Like [`find_span`], starting the search at byte offset `from`.
pub fn find_span_from(text: &str, tag: Tag, from: usize) -> Option<TagSpan> {
    let open = tag.open();
    let close = tag.close();
    let start = from + text.get(from..)?.find(&open)?;
    let inner_start = start + open.len();
    let inner_end = inner_start + text[inner_start..].find(&close)?;
    Some(TagSpan {
        tag,
        outer: start..inner_end + close.len(),
        inner: inner_start..inner_end,
    })
}

/// Every complete span of `tag`, in document order.
pub fn find_all_spans(text: &str, tag: Tag) -> Vec<TagSpan> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(span) = find_span_from(text, tag, from) {
        from = span.outer.end;
        spans.push(span);
    }
    spans
}

/// Append the closing tag of every opened-but-unterminated block.
pub fn close_unterminated(text: &str) -> String {
    let mut out = text.to_string();
    for tag in AUTO_CLOSED {
        if text.contains(&tag.open()) && !text.contains(&tag.close()) {
            out.push_str(&tag.close());
        }
    }
    out
}

/// Execution lane for an `execute` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// General-purpose code (the default lane)
    Python,
    /// Statistical / columnar scripting
    R,
    /// Shell scripts and single CLI commands
    Bash,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Python => "python",
            Self::R => "r",
            Self::Bash => "bash",
        };
        f.write_str(name)
    }
}

const R_MARKERS: [&str; 3] = ["#!R", "# R code", "# R script"];
const BASH_MARKERS: [&str; 2] = ["#!BASH", "# Bash script"];
const CLI_MARKER: &str = "#!CLI";

impl Language {
    /// Lane named by the marker at the start of `source`, defaulting to Python.
    pub fn detect(source: &str) -> Self {
        Self::split_marker(source).0
    }

    /// Select the lane and return the runnable body with the marker removed.
    ///
    /// `#!CLI` sources are flattened to a single command line.
    pub fn split_marker(source: &str) -> (Self, String) {
        let trimmed = source.trim_start();
        if let Some(rest) = strip_any(trimmed, &R_MARKERS) {
            return (Self::R, dedent(rest));
        }
        if let Some(rest) = trimmed.strip_prefix(CLI_MARKER) {
            let command = rest.trim().replace('\n', " ");
            return (Self::Bash, command);
        }
        if let Some(rest) = strip_any(trimmed, &BASH_MARKERS) {
            return (Self::Bash, dedent(rest));
        }
        (Self::Python, dedent(source))
    }
}

fn strip_any<'a>(text: &'a str, markers: &[&str]) -> Option<&'a str> {
    markers.iter().find_map(|m| text.strip_prefix(m))
}

/// Drop leading/trailing blank lines and the indentation common to all
/// non-blank lines.
pub fn dedent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(first), Some(last)) = (first, last) else {
        return String::new();
    };
    let body = &lines[first..=last];
    let indent = body
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    body.iter()
        .map(|l| l.get(indent..).unwrap_or_else(|| l.trim_start()))
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A parsed fragment of an agent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionBlock {
    /// Explicit `<think>` reasoning.
    Reasoning { text: String },
    /// Code to run in the given lane. `code` keeps the lane marker.
    Execute { language: Language, code: String },
    /// Final answer.
    Solution { content: String },
}

/// What the controller should do after a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    Execute { language: Language, code: String },
    Solution { content: String },
    /// Only `<think>` reasoning was present.
    Reasoning,
    /// No recognized tag at all.
    Unparseable,
}

/// Result of parsing one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// The reply with unterminated tags closed. This is what gets appended to
    /// the transcript.
    pub normalized: String,
    /// Recognized blocks in document order.
    pub blocks: Vec<ActionBlock>,
    /// Text outside every block, trimmed.
    pub reasoning: String,
}

impl ParsedReply {
    pub fn is_recognized(&self) -> bool {
        !self.blocks.is_empty()
    }

    /// Routing decision. An `execute` block wins over a `solution` block.
    pub fn next_action(&self) -> NextAction {
        let execute = self.blocks.iter().find_map(|b| match b {
            ActionBlock::Execute { language, code } => Some(NextAction::Execute {
                language: *language,
                code: code.clone(),
            }),
            _ => None,
        });
        if let Some(action) = execute {
            return action;
        }
        let solution = self.blocks.iter().find_map(|b| match b {
            ActionBlock::Solution { content } => Some(NextAction::Solution {
                content: content.clone(),
            }),
            _ => None,
        });
        if let Some(action) = solution {
            return action;
        }
        if self.is_recognized() {
            NextAction::Reasoning
        } else {
            NextAction::Unparseable
        }
    }
}

/// Parse one reply. Never fails.
pub fn parse_reply(text: &str) -> ParsedReply {
    let normalized = close_unterminated(text);

    let mut spans: Vec<TagSpan> = [Tag::Think, Tag::Execute, Tag::Solution]
        .into_iter()
        .filter_map(|tag| find_span(&normalized, tag))
        .collect();
    spans.sort_by_key(|s| s.outer.start);

    let blocks = spans
        .iter()
        .map(|span| {
            let inner = span.inner_text(&normalized);
            match span.tag {
                Tag::Execute => ActionBlock::Execute {
                    language: Language::detect(inner),
                    code: inner.to_string(),
                },
                Tag::Solution => ActionBlock::Solution {
                    content: inner.trim().to_string(),
                },
                _ => ActionBlock::Reasoning {
                    text: inner.trim().to_string(),
                },
            }
        })
        .collect();

    ParsedReply {
        reasoning: outside_spans(&normalized, &spans),
        normalized,
        blocks,
    }
}

/// Concatenate the text not covered by any span. Overlapping spans (an
/// execute nested inside an unterminated think) are merged.
fn outside_spans(text: &str, spans: &[TagSpan]) -> String {
    let mut pieces = Vec::new();
    let mut cursor = 0;
    for span in spans {
        if span.outer.start > cursor {
            pieces.push(text[cursor..span.outer.start].trim());
        }
        cursor = cursor.max(span.outer.end);
    }
    if cursor < text.len() {
        pieces.push(text[cursor..].trim());
    }
    pieces
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
