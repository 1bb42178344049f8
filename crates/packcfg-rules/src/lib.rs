//! First-match rule table for build pipelines.
//!
//! A table is an ordered list of (pattern, handler chain) rules. Matching a
//! file identifier walks the table in construction order and returns the
//! first rule whose test matches and whose exclude does not. Handler options
//! are opaque here and are handed back untouched.

mod chain;
mod error;
mod explain;
mod pattern;

pub use chain::{Handler, HandlerChain};
pub use error::RuleError;
pub use explain::{MatchExplanation, RuleEvaluation, RuleVerdict};
pub use pattern::{Pattern, PatternSpec};

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Declared rule, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Optional chain name for reports. Defaults to the joined handler names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub test: PatternSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<PatternSpec>,

    #[serde(rename = "use")]
    pub chain: HandlerChain,
}

impl RuleSpec {
    pub fn new(test: PatternSpec, chain: HandlerChain) -> Self {
        Self {
            name: None,
            test,
            exclude: None,
            chain,
        }
    }

    pub fn with_exclude(mut self, exclude: PatternSpec) -> Self {
        self.exclude = Some(exclude);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn same_patterns(&self, other: &RuleSpec) -> bool {
        self.test == other.test && self.exclude == other.exclude
    }
}

/// How the table treats two rules declaring the same test and exclude.
///
/// Matching is always first-wins; the policy only decides which duplicates
/// are a construction error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Structurally identical rules are an error; same patterns with a
    /// different chain are kept and the later one is shadowed.
    #[default]
    RejectIdentical,
    /// Any rule shadowed by an earlier rule with the same patterns is an error.
    RejectShadowed,
    /// Keep everything; shadowed rules are only reported.
    FirstWins,
}

/// A rule whose patterns are compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub index: usize,
    pub spec: RuleSpec,
    test: Pattern,
    exclude: Option<Pattern>,
}

impl CompiledRule {
    fn compile(index: usize, spec: RuleSpec) -> Result<Self, RuleError> {
        if spec.chain.is_empty() {
            return Err(RuleError::EmptyChain { index });
        }

        let compile = |p: &PatternSpec| {
            Pattern::compile(p).map_err(|reason| RuleError::InvalidPattern {
                index,
                pattern: p.describe(),
                reason,
            })
        };

        let test = compile(&spec.test)?;
        let exclude = spec.exclude.as_ref().map(compile).transpose()?;

        Ok(Self {
            index,
            spec,
            test,
            exclude,
        })
    }

    /// Whether this rule applies to a normalized identifier.
    pub fn applies_to(&self, identifier: &str) -> bool {
        self.test.is_match(identifier)
            && !self.exclude.as_ref().is_some_and(|ex| ex.is_match(identifier))
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.spec.chain
    }

    /// Report name: the declared name, else the chain's display name.
    pub fn chain_name(&self) -> String {
        self.spec
            .name
            .clone()
            .unwrap_or_else(|| self.spec.chain.display_name())
    }
}

/// A rule kept in the table that can never be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shadowed {
    pub index: usize,
    pub shadowed_by: usize,
}

/// Result of a successful match.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatch<'a> {
    pub index: usize,
    pub rule: &'a CompiledRule,
}

impl<'a> RuleMatch<'a> {
    pub fn chain(&self) -> &'a HandlerChain {
        self.rule.chain()
    }
}

/// Ordered, read-only rule table.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<CompiledRule>,
    shadowed: Vec<Shadowed>,
    policy: DuplicatePolicy,
}

impl RuleTable {
    /// Compile and validate rules, keeping their declaration order.
    pub fn new(specs: Vec<RuleSpec>, policy: DuplicatePolicy) -> Result<Self, RuleError> {
        let mut rules: Vec<CompiledRule> = Vec::with_capacity(specs.len());
        let mut shadowed = Vec::new();

        for (index, spec) in specs.into_iter().enumerate() {
            if let Some(first) = rules.iter().find(|r| r.spec.same_patterns(&spec)) {
                let identical = first.spec.chain == spec.chain;
                let reject = match policy {
                    DuplicatePolicy::RejectIdentical => identical,
                    DuplicatePolicy::RejectShadowed => true,
                    DuplicatePolicy::FirstWins => false,
                };

                if reject {
                    return Err(RuleError::DuplicateRule {
                        first: first.index,
                        duplicate: index,
                        pattern: spec.test.describe(),
                    });
                }

                tracing::warn!(
                    rule = index,
                    shadowed_by = first.index,
                    pattern = %spec.test.describe(),
                    "rule can never be selected"
                );
                shadowed.push(Shadowed {
                    index,
                    shadowed_by: first.index,
                });
            }

            rules.push(CompiledRule::compile(index, spec)?);
        }

        Ok(Self {
            rules,
            shadowed,
            policy,
        })
    }

    /// First rule applying to `identifier`, or `None` (no rule match).
    pub fn match_rule(&self, identifier: &str) -> Option<RuleMatch<'_>> {
        let normalized = normalize_identifier(identifier);
        let found = self
            .rules
            .iter()
            .find(|rule| rule.applies_to(&normalized))
            .map(|rule| RuleMatch {
                index: rule.index,
                rule,
            });

        tracing::debug!(
            file = %normalized,
            rule = ?found.map(|m| m.index),
            "rule lookup"
        );
        found
    }

    /// Per-rule evaluation of `identifier`, for diagnostics.
    pub fn explain(&self, identifier: &str) -> MatchExplanation {
        MatchExplanation::build(self, identifier)
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn get(&self, index: usize) -> Option<&CompiledRule> {
        self.rules.get(index)
    }

    pub fn shadowed(&self) -> &[Shadowed] {
        &self.shadowed
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Normalize a relative path identifier: forward slashes, no leading `./`.
pub fn normalize_identifier(identifier: &str) -> Cow<'_, str> {
    let mut id: Cow<'_, str> = if identifier.contains('\\') {
        Cow::Owned(identifier.replace('\\', "/"))
    } else {
        Cow::Borrowed(identifier)
    };

    while id.starts_with("./") {
        id = match id {
            Cow::Borrowed(s) => Cow::Borrowed(&s[2..]),
            Cow::Owned(s) => Cow::Owned(s[2..].to_string()),
        };
    }
    id
}
