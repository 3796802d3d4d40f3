//! Event Classifier: one raw message in, typed events out.
//!
//! Rules, applied to the same text and then merged by text position so the
//! result follows document order:
//!
//! 1. checklist lines before the first `<execute>`, outside any solution or
//!    observation span, become one `planning` event
//! 2. substantial free text before the first tag becomes `reasoning`
//! 3. `<think>` spans become `reasoning`
//! 4. an `<execute>` block becomes `tool_call`
//! 5. `<observation>`/`<observe>` spans become `tool_output`
//! 6. a `<solution>` block becomes `final_answer` (or `reasoning` when an
//!    `<execute>` block is also present, since the agent is still working)
//!
//! If nothing matched, the whole message is one `reasoning` event.

use assay_core::action::{self, Language, Tag, TagSpan};
use assay_core::catalog::ResourceCatalog;
use regex_lite::Regex;

use crate::event::EventPayload;
use crate::plan;

/// Leading free text shorter than this is not worth a reasoning event.
const MIN_REASONING_CHARS: usize = 50;

const ALL_TAGS: [Tag; 5] = [
    Tag::Think,
    Tag::Execute,
    Tag::Solution,
    Tag::Observation,
    Tag::Observe,
];

/// Stateless classifier, optionally aware of catalog tool names.
#[derive(Debug, Clone, Default)]
pub struct EventClassifier {
    tools: Vec<(String, Regex)>,
}

impl EventClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track references to the catalog's tools in `tool_call` events.
    pub fn with_catalog(catalog: &ResourceCatalog) -> Self {
        let tools = catalog
            .tool_names()
            .into_iter()
            .filter_map(|name| {
                let pattern = format!(r"\b{}\s*\(", regex_lite::escape(name));
                Regex::new(&pattern).ok().map(|re| (name.to_string(), re))
            })
            .collect();
        Self { tools }
    }

    /// Catalog tools invoked as `name(` in `code`.
    pub fn tools_referenced(&self, code: &str) -> Vec<String> {
        self.tools
            .iter()
            .filter(|(_, re)| re.is_match(code))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Classify one agent message. Never fails; whitespace-only text yields
    /// no events.
    pub fn classify(&self, text: &str) -> Vec<EventPayload> {
        let text = action::close_unterminated(text);
        let text = text.as_str();
        if text.trim().is_empty() {
            return Vec::new();
        }

        let execute = action::find_span(text, Tag::Execute);
        let first_tag = ALL_TAGS
            .iter()
            .filter_map(|tag| text.find(&tag.open()))
            .min()
            .unwrap_or(text.len());

        let mut found: Vec<(usize, EventPayload)> = Vec::new();

        // Leading free text, minus any checklist it runs into.
        let lead = &text[..first_tag];
        let lead_end = plan::first_checklist_offset(lead).unwrap_or(lead.len());
        let reasoning = lead[..lead_end].trim();
        if reasoning.chars().count() > MIN_REASONING_CHARS {
            found.push((
                0,
                EventPayload::Reasoning {
                    content: reasoning.to_string(),
                },
            ));
        }

        // Checklists echoed inside an answer or a tool result are not a plan.
        let masked = blank_spans(text, &[Tag::Solution, Tag::Observation, Tag::Observe]);
        let planning_span = &masked[..execute.as_ref().map_or(masked.len(), |s| s.outer.start)];
        if let Some(offset) = plan::first_checklist_offset(planning_span) {
            let steps = plan::extract_steps(planning_span);
            if !steps.is_empty() {
                found.push((
                    offset,
                    EventPayload::Planning {
                        content: planning_span[offset..].trim().to_string(),
                        steps,
                    },
                ));
            }
        }

        if let Some(span) = action::find_span(text, Tag::Think) {
            let content = span.inner_text(text).trim();
            if !content.is_empty() {
                found.push((
                    span.outer.start,
                    EventPayload::Reasoning {
                        content: content.to_string(),
                    },
                ));
            }
        }

        if let Some(span) = &execute {
            found.push((span.outer.start, self.tool_call(text, span)));
        }

        let mut observations: Vec<TagSpan> = action::find_all_spans(text, Tag::Observation);
        observations.extend(action::find_all_spans(text, Tag::Observe));
        for span in observations {
            found.push((
                span.outer.start,
                EventPayload::ToolOutput {
                    content: span.inner_text(text).trim().to_string(),
                    timed_out: false,
                },
            ));
        }

        if let Some(span) = action::find_span(text, Tag::Solution) {
            let content = span.inner_text(text).trim().to_string();
            let payload = if execute.is_some() {
                EventPayload::Reasoning { content }
            } else {
                EventPayload::FinalAnswer { content }
            };
            found.push((span.outer.start, payload));
        }

        if found.is_empty() {
            return vec![EventPayload::Reasoning {
                content: text.trim().to_string(),
            }];
        }

        found.sort_by_key(|(offset, _)| *offset);
        found.into_iter().map(|(_, payload)| payload).collect()
    }

    /// Classify an execution-result message. Only `tool_output` events come
    /// out; text without an observation tag is still an observation.
    pub fn classify_tool_message(&self, text: &str) -> Vec<EventPayload> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let mut spans = action::find_all_spans(text, Tag::Observation);
        spans.extend(action::find_all_spans(text, Tag::Observe));
        spans.sort_by_key(|span| span.outer.start);

        let contents: Vec<&str> = if spans.is_empty() {
            vec![text]
        } else {
            spans.iter().map(|span| span.inner_text(text)).collect()
        };
        contents
            .into_iter()
            .map(|content| EventPayload::ToolOutput {
                content: content.trim().to_string(),
                timed_out: false,
            })
            .collect()
    }

    fn tool_call(&self, text: &str, span: &TagSpan) -> EventPayload {
        let raw = span.inner_text(text);
        let code = action::dedent(raw);
        EventPayload::ToolCall {
            language: Language::detect(raw),
            tools_referenced: self.tools_referenced(&code),
            code,
        }
    }
}

/// `text` with the given spans replaced by spaces of the same byte length,
/// so offsets into the result are offsets into `text`.
fn blank_spans(text: &str, tags: &[Tag]) -> String {
    let mut masked = text.to_string();
    for &tag in tags {
        for span in action::find_all_spans(text, tag) {
            masked.replace_range(span.outer.clone(), &" ".repeat(span.outer.len()));
        }
    }
    masked
}
