//! Plan Step extraction from checklist-style text.
//!
//! Recognized line shapes:
//!
//! ```text
//! 1. [ ] Load the expression matrix
//! - [✓] Normalize counts
//! [✗] Cluster cells (failed because ...)
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    fn from_marker(marker: &str) -> Self {
        match marker.trim() {
            "✓" | "✔" | "x" | "X" | "done" => Self::Completed,
            "✗" | "✕" | "✖" | "failed" => Self::Failed,
            "~" | ">" | "→" | "-" => Self::InProgress,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: String,
    pub status: StepStatus,
}

/// Longest text accepted between the brackets of a status marker.
const MAX_MARKER_CHARS: usize = 6;

/// Parse one checklist line.
fn parse_line(line: &str) -> Option<PlanStep> {
    let mut rest = line.trim_start();

    // Optional "12." or "-"/"*"/"+" prefix.
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        rest = rest[digits..].strip_prefix('.')?.trim_start();
    } else if let Some(stripped) = rest.strip_prefix(['-', '*', '+']) {
        rest = stripped.trim_start();
    }

    let inner_and_tail = rest.strip_prefix('[')?;
    let close = inner_and_tail.find(']')?;
    let marker = &inner_and_tail[..close];
    if marker.chars().count() > MAX_MARKER_CHARS {
        return None;
    }

    let step = inner_and_tail[close + 1..].trim();
    // `[text](url)` is a link, not a checklist item.
    if step.is_empty() || step.starts_with('(') {
        return None;
    }

    Some(PlanStep {
        step: step.to_string(),
        status: StepStatus::from_marker(marker),
    })
}

/// All plan steps in `text`, in order.
pub fn extract_steps(text: &str) -> Vec<PlanStep> {
    text.lines().filter_map(parse_line).collect()
}

/// Byte offset of the first checklist line, if any.
pub fn first_checklist_offset(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if parse_line(line.trim_end_matches(['\r', '\n'])).is_some() {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_and_bulleted_steps() {
        let text = "Plan:\n1. [ ] Load data\n2. [✓] Inspect columns\n- [✗] Fit model (diverged)\n* [~] Retry with priors";
        let steps = extract_steps(text);
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].step, "Load data");
        assert_eq!(steps[0].status, StepStatus::Pending);
        assert_eq!(steps[1].status, StepStatus::Completed);
        assert_eq!(steps[2].status, StepStatus::Failed);
        assert_eq!(steps[2].step, "Fit model (diverged)");
        assert_eq!(steps[3].status, StepStatus::InProgress);
    }

    #[test]
    fn bare_bracket_lines() {
        let steps = extract_steps("[x] first\n[done] second\n[ ] third");
        let statuses: Vec<_> = steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Completed, StepStatus::Completed, StepStatus::Pending]
        );
    }

    #[test]
    fn links_and_prose_are_not_steps() {
        assert!(extract_steps("See [the docs](https://example.com) for details.").is_empty());
        assert!(extract_steps("Array access a[0] is fine").is_empty());
        assert!(extract_steps("1. First do this\n2. Then that").is_empty());
        assert!(extract_steps("[this is a long bracketed phrase] trailing").is_empty());
    }

    #[test]
    fn offset_points_at_first_step_line() {
        let text = "I will do the following.\n\n1. [ ] a\n2. [ ] b";
        let offset = first_checklist_offset(text).unwrap();
        assert!(text[offset..].starts_with("1. [ ] a"));
        assert!(first_checklist_offset("no plan here").is_none());
    }
}
