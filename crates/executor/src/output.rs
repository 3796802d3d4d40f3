//! Output-size policy for observations.
//!
//! Observations go back into the model's context on every later turn, so
//! their size is bounded here:
//!
//! - above `max_chars`: cut to `max_chars` behind a header giving the true
//!   length (and a record count for FASTA-like output)
//! - above `summary_threshold`: kept whole, prefixed with its length

use assay_config::ExecutorConfig;

/// Width of the rule separating the truncation header from the output.
const RULE_WIDTH: usize = 50;

/// Only this many leading characters are inspected for record markers.
const RECORD_SNIFF_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPolicy {
    pub max_chars: usize,
    pub summary_threshold: usize,
}

impl Default for OutputPolicy {
    fn default() -> Self {
        Self {
            max_chars: 10_000,
            summary_threshold: 5_000,
        }
    }
}

impl OutputPolicy {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            max_chars: config.max_output_chars,
            summary_threshold: config.summary_threshold_chars,
        }
    }

    /// Apply the policy to raw output. Lengths are counted in characters.
    pub fn bound(&self, text: &str) -> String {
        let total = text.chars().count();

        if total > self.max_chars {
            let records = record_count(text);
            let kept: String = text.chars().take(self.max_chars).collect();
            return format!("{}{kept}", self.truncation_header(total, records));
        }

        if total > self.summary_threshold {
            return format!("[Output length: {total} characters]\n{text}");
        }

        text.to_string()
    }

    /// Header placed in front of truncated output.
    pub fn truncation_header(&self, total: usize, records: Option<usize>) -> String {
        let mut header = format!("[OUTPUT TRUNCATED: {total} total characters]\n");
        if let Some(records) = records {
            header.push_str(&format!("[Contains {records} sequences/entries]\n"));
        }
        header.push_str(&format!(
            "[First {} characters shown below]\n{}\n",
            self.max_chars,
            "=".repeat(RULE_WIDTH)
        ));
        header
    }
}

/// Count `>`-prefixed lines when the output looks like a record format.
fn record_count(text: &str) -> Option<usize> {
    let head: String = text.chars().take(RECORD_SNIFF_CHARS).collect();
    if !head.contains('>') {
        return None;
    }
    Some(text.lines().filter(|l| l.starts_with('>')).count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_is_untouched() {
        let policy = OutputPolicy::default();
        assert_eq!(policy.bound("4"), "4");
        let exactly = "x".repeat(5_000);
        assert_eq!(policy.bound(&exactly), exactly);
    }

    #[test]
    fn medium_output_gets_length_annotation() {
        let policy = OutputPolicy::default();
        let text = "y".repeat(6_000);
        let bounded = policy.bound(&text);
        assert!(bounded.starts_with("[Output length: 6000 characters]\n"));
        assert!(bounded.ends_with(&text));
    }

    #[test]
    fn long_output_is_truncated_with_true_length() {
        let policy = OutputPolicy::default();
        let text = "z".repeat(12_000);
        let bounded = policy.bound(&text);
        let header = policy.truncation_header(12_000, None);

        assert!(bounded.starts_with("[OUTPUT TRUNCATED: 12000 total characters]"));
        assert!(!bounded.contains("sequences/entries"));
        assert_eq!(bounded.chars().count(), header.chars().count() + 10_000);
    }

    #[test]
    fn fasta_output_reports_record_count() {
        let policy = OutputPolicy {
            max_chars: 100,
            summary_threshold: 50,
        };
        let text = (0..20)
            .map(|i| format!(">seq{i}\nACGTACGTAC"))
            .collect::<Vec<_>>()
            .join("\n");
        let bounded = policy.bound(&text);
        assert!(bounded.contains("[Contains 20 sequences/entries]"));
        assert_eq!(
            bounded.chars().count(),
            policy.truncation_header(text.chars().count(), Some(20)).chars().count() + 100
        );
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundary() {
        let policy = OutputPolicy {
            max_chars: 10,
            summary_threshold: 5,
        };
        let bounded = policy.bound(&"✓".repeat(30));
        assert!(bounded.ends_with(&"✓".repeat(10)));
        assert!(bounded.contains("30 total characters"));
    }
}
