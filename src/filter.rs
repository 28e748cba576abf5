use crate::config::{compile_otp_pattern, FilterConfig};

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Forward,
    Drop,
}

/// The rule that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchedRule {
    ForwardAll,
    ImportantSender,
    ImportantKeyword,
    NumericCode,
    SpamKeyword,
    Default,
    /// Sender or body missing; no rule was evaluated
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub decision: Decision,
    pub matched_rule: MatchedRule,
}

impl Classification {
    fn forward(rule: MatchedRule) -> Self {
        Self {
            decision: Decision::Forward,
            matched_rule: rule,
        }
    }

    fn drop(rule: MatchedRule) -> Self {
        Self {
            decision: Decision::Drop,
            matched_rule: rule,
        }
    }

    pub fn should_forward(&self) -> bool {
        self.decision == Decision::Forward
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:?})", self.decision, self.matched_rule)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("OTP pattern '{pattern}' failed to compile: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Decide whether a message should be forwarded.
///
/// Rules are evaluated in a fixed priority order and the first match wins:
/// forward-all, important sender, important keyword, numeric code, spam keyword.
/// Substring checks are case-insensitive; the OTP pattern runs against the raw
/// body. A missing or empty sender or body is dropped without evaluating rules.
pub fn classify(
    sender: Option<&str>,
    body: Option<&str>,
    config: &FilterConfig,
) -> Result<Classification, FilterError> {
    let (sender, body) = match (sender, body) {
        (Some(s), Some(b)) if !s.is_empty() && !b.is_empty() => (s, b),
        _ => return Ok(Classification::drop(MatchedRule::Malformed)),
    };

    if config.forward_all {
        return Ok(Classification::forward(MatchedRule::ForwardAll));
    }

    let sender_lower = sender.to_lowercase();
    let body_lower = body.to_lowercase();

    if contains_any(&sender_lower, &config.important_senders) {
        return Ok(Classification::forward(MatchedRule::ImportantSender));
    }

    if contains_any(&body_lower, &config.important_keywords) {
        return Ok(Classification::forward(MatchedRule::ImportantKeyword));
    }

    if contains_numeric_code(body, &config.otp_pattern)? {
        return Ok(Classification::forward(MatchedRule::NumericCode));
    }

    if contains_any(&body_lower, &config.spam_keywords) {
        return Ok(Classification::drop(MatchedRule::SpamKeyword));
    }

    Ok(Classification::drop(MatchedRule::Default))
}

// `haystack` is already lowercased
fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .any(|n| haystack.contains(&n.to_lowercase()))
}

fn contains_numeric_code(body: &str, pattern: &str) -> Result<bool, FilterError> {
    let regex = compile_otp_pattern(pattern).map_err(|source| FilterError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(regex.is_match(body.as_bytes()))
}
