//! Rule table construction errors.

/// Errors raised while building a [`crate::RuleTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("rule #{duplicate} duplicates rule #{first} ({pattern})")]
    DuplicateRule {
        first: usize,
        duplicate: usize,
        pattern: String,
    },

    #[error("rule #{index}: invalid pattern {pattern}: {reason}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        reason: String,
    },

    #[error("rule #{index}: handler chain is empty")]
    EmptyChain { index: usize },
}

impl RuleError {
    /// Machine-readable code, mirroring the explain output.
    pub fn to_code(&self) -> String {
        match self {
            RuleError::DuplicateRule { first, duplicate, .. } => {
                format!("DUPLICATE_RULE:{}=={}", duplicate, first)
            }
            RuleError::InvalidPattern { index, .. } => format!("INVALID_PATTERN:{}", index),
            RuleError::EmptyChain { index } => format!("EMPTY_CHAIN:{}", index),
        }
    }
}
