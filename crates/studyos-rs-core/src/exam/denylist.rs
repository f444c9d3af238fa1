//! Case-insensitive phrase detection in free-text answers.

use regex::{Regex, RegexBuilder};

/// Warning reason for a denylisted answer.
pub const DENYLIST_REASON: &str =
    "Unauthorized linguistic pattern detected (Possible Agent Injection).";

#[derive(Debug, Clone)]
pub struct AnswerDenylist {
    pattern: Option<Regex>,
}

impl AnswerDenylist {
    /// Compile phrases into one alternation; blank phrases are skipped.
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = phrases
            .iter()
            .map(|phrase| phrase.as_ref().trim())
            .filter(|phrase| !phrase.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }
        let pattern = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn matches(&self, answer: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(answer))
    }
}
