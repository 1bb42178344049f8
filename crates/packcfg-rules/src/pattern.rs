//! File identifier patterns.

use globset::{Glob, GlobMatcher};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Declared form of a pattern.
///
/// Serializes externally tagged (`{"suffix": ".css"}`). A bare string is
/// accepted on input and read as a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "PatternRepr")]
pub enum PatternSpec {
    /// Identifier ends with the given string.
    Suffix(String),

    /// Unanchored regex search (regex-lite syntax).
    Regex(String),

    /// Glob matched against the whole identifier.
    Glob(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternRepr {
    Bare(String),
    Tagged(TaggedPattern),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum TaggedPattern {
    Suffix(String),
    Regex(String),
    Glob(String),
}

impl From<PatternRepr> for PatternSpec {
    fn from(repr: PatternRepr) -> Self {
        match repr {
            PatternRepr::Bare(s) => PatternSpec::Regex(s),
            PatternRepr::Tagged(TaggedPattern::Suffix(s)) => PatternSpec::Suffix(s),
            PatternRepr::Tagged(TaggedPattern::Regex(s)) => PatternSpec::Regex(s),
            PatternRepr::Tagged(TaggedPattern::Glob(s)) => PatternSpec::Glob(s),
        }
    }
}

impl PatternSpec {
    pub fn suffix(s: impl Into<String>) -> Self {
        PatternSpec::Suffix(s.into())
    }

    pub fn regex(s: impl Into<String>) -> Self {
        PatternSpec::Regex(s.into())
    }

    pub fn glob(s: impl Into<String>) -> Self {
        PatternSpec::Glob(s.into())
    }

    /// Short `kind:source` form used in errors and explain output.
    pub fn describe(&self) -> String {
        match self {
            PatternSpec::Suffix(s) => format!("suffix:{}", s),
            PatternSpec::Regex(s) => format!("regex:{}", s),
            PatternSpec::Glob(s) => format!("glob:{}", s),
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Suffix(String),
    Regex(Regex),
    Glob(GlobMatcher),
}

/// A compiled pattern, ready for matching.
#[derive(Debug, Clone)]
pub struct Pattern {
    spec: PatternSpec,
    matcher: Matcher,
}

impl Pattern {
    /// Compile a declared pattern. The error string is the compiler's reason.
    pub fn compile(spec: &PatternSpec) -> Result<Self, String> {
        let matcher = match spec {
            PatternSpec::Suffix(s) => {
                if s.is_empty() {
                    return Err("suffix cannot be empty".to_string());
                }
                Matcher::Suffix(s.clone())
            }
            PatternSpec::Regex(s) => Matcher::Regex(Regex::new(s).map_err(|e| e.to_string())?),
            PatternSpec::Glob(s) => Matcher::Glob(
                Glob::new(s)
                    .map_err(|e| e.to_string())?
                    .compile_matcher(),
            ),
        };

        Ok(Self {
            spec: spec.clone(),
            matcher,
        })
    }

    pub fn spec(&self) -> &PatternSpec {
        &self.spec
    }

    /// Test a normalized identifier.
    pub fn is_match(&self, identifier: &str) -> bool {
        match &self.matcher {
            Matcher::Suffix(s) => identifier.ends_with(s.as_str()),
            Matcher::Regex(re) => re.is_match(identifier),
            Matcher::Glob(glob) => glob.is_match(identifier),
        }
    }
}
