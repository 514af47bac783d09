//! Content inspection: pattern tables applied to header and body lines.
//!
//! Rule files contain one rule per line, first match wins:
//!
//! ```text
//! # reject obvious executable attachments
//! REJECT (?i)^content-type:.*name=.*\.exe
//! IGNORE (?i)^x-internal-trace:
//! ```

use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, ScrubError};

/// Verdict for one inspected line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Emit the line unchanged.
    Pass,
    /// Latch a content-rejection status; the message drains but will not
    /// be delivered.
    Reject,
    /// Drop just this line.
    Ignore,
}

/// A pattern table classifying one line at a time.
pub trait Inspector {
    fn classify(&self, line: &str) -> Verdict;
}

/// Ordered list of pre-compiled regex rules; the first matching rule wins.
pub struct RegexInspector {
    rules: Vec<(Regex, Verdict)>,
}

impl RegexInspector {
    pub fn new(rules: Vec<(Regex, Verdict)>) -> Self {
        Self { rules }
    }

    /// Load and compile a rule file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ScrubError::io(path, e))?;
        Self::parse(&text)
    }

    /// Parse rule text: `REJECT <pattern>` or `IGNORE <pattern>` per line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (verdict, pattern) = match line.split_once(char::is_whitespace) {
                Some((action, pattern)) if action.eq_ignore_ascii_case("reject") => {
                    (Verdict::Reject, pattern)
                }
                Some((action, pattern)) if action.eq_ignore_ascii_case("ignore") => {
                    (Verdict::Ignore, pattern)
                }
                _ => {
                    return Err(ScrubError::BadRule {
                        line: i + 1,
                        reason: "expected 'REJECT <pattern>' or 'IGNORE <pattern>'".into(),
                    })
                }
            };
            let regex = Regex::new(pattern.trim()).map_err(|e| ScrubError::BadRule {
                line: i + 1,
                reason: e.to_string(),
            })?;
            rules.push((regex, verdict));
        }
        Ok(Self { rules })
    }
}

impl Inspector for RegexInspector {
    fn classify(&self, line: &str) -> Verdict {
        for (regex, verdict) in &self.rules {
            if regex.is_match(line) {
                debug!(pattern = %regex, verdict = ?verdict, "Inspection rule matched");
                return *verdict;
            }
        }
        Verdict::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let inspector = RegexInspector::parse(
            "IGNORE ^X-Trace:\n\
             REJECT ^X-",
        )
        .unwrap();
        assert_eq!(inspector.classify("X-Trace: abc"), Verdict::Ignore);
        assert_eq!(inspector.classify("X-Spam: yes"), Verdict::Reject);
        assert_eq!(inspector.classify("Subject: hi"), Verdict::Pass);
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let inspector = RegexInspector::parse("# comment\n\nREJECT viagra").unwrap();
        assert_eq!(inspector.classify("buy viagra now"), Verdict::Reject);
    }

    #[test]
    fn test_bad_action_rejected() {
        assert!(matches!(
            RegexInspector::parse("DISCARD ^X-"),
            Err(ScrubError::BadRule { line: 1, .. })
        ));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        assert!(RegexInspector::parse("REJECT ((").is_err());
    }
}
