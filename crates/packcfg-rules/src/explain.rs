//! Explain output for rule matching
//!
//! Shows, for one identifier, how every rule in the table evaluated and
//! which one was selected.

use serde::{Deserialize, Serialize};

use crate::RuleTable;

/// How a single rule evaluated against the identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleVerdict {
    /// This rule was selected.
    Selected,
    /// Test matched but an earlier rule already won.
    Shadowed,
    /// Test matched but the exclude pattern removed the identifier.
    Excluded,
    /// Test did not match.
    NoMatch,
}

/// Per-rule line of the explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub index: usize,
    pub chain: String,
    pub test: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    pub verdict: RuleVerdict,
}

/// Full explanation for one identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchExplanation {
    /// Identifier after normalization.
    pub identifier: String,

    /// Index of the selected rule, if any.
    pub selected: Option<usize>,

    pub rules: Vec<RuleEvaluation>,
}

impl MatchExplanation {
    pub(crate) fn build(table: &RuleTable, identifier: &str) -> Self {
        let normalized = crate::normalize_identifier(identifier);
        let mut selected = None;
        let mut rules = Vec::with_capacity(table.len());

        for rule in table.rules() {
            let verdict = if !rule.test.is_match(&normalized) {
                RuleVerdict::NoMatch
            } else if rule
                .exclude
                .as_ref()
                .is_some_and(|ex| ex.is_match(&normalized))
            {
                RuleVerdict::Excluded
            } else if selected.is_some() {
                RuleVerdict::Shadowed
            } else {
                selected = Some(rule.index);
                RuleVerdict::Selected
            };

            rules.push(RuleEvaluation {
                index: rule.index,
                chain: rule.chain_name(),
                test: rule.spec.test.describe(),
                exclude: rule.spec.exclude.as_ref().map(|p| p.describe()),
                verdict,
            });
        }

        Self {
            identifier: normalized.into_owned(),
            selected,
            rules,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_human(&self) -> String {
        let mut lines = vec![format!("File: {}", self.identifier), String::new()];

        match self.selected {
            Some(index) => {
                let chain = self
                    .rules
                    .iter()
                    .find(|r| r.index == index)
                    .map(|r| r.chain.as_str())
                    .unwrap_or("?");
                lines.push(format!("Decision: rule #{} ({})", index, chain));
            }
            None => lines.push("Decision: NO RULE MATCH".to_string()),
        }

        lines.push(String::new());
        lines.push("Rules:".to_string());
        for rule in &self.rules {
            let verdict = match rule.verdict {
                RuleVerdict::Selected => "selected",
                RuleVerdict::Shadowed => "shadowed",
                RuleVerdict::Excluded => "excluded",
                RuleVerdict::NoMatch => "-",
            };
            lines.push(format!(
                "  #{:<2} {:<9} {} [{}]",
                rule.index, verdict, rule.chain, rule.test
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use crate::{DuplicatePolicy, HandlerChain, PatternSpec, RuleSpec, RuleTable};

    use super::*;

    fn table() -> RuleTable {
        RuleTable::new(
            vec![
                RuleSpec::new(PatternSpec::suffix(".js"), HandlerChain::of(&["babel"]))
                    .with_exclude(PatternSpec::regex("node_modules")),
                RuleSpec::new(PatternSpec::suffix(".css"), HandlerChain::of(&["style", "css"])),
                RuleSpec::new(PatternSpec::suffix(".css"), HandlerChain::of(&["raw"])),
            ],
            DuplicatePolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_explain_selected_and_shadowed() {
        let explain = table().explain("./src/app.css");
        assert_eq!(explain.identifier, "src/app.css");
        assert_eq!(explain.selected, Some(1));
        assert_eq!(explain.rules[0].verdict, RuleVerdict::NoMatch);
        assert_eq!(explain.rules[1].verdict, RuleVerdict::Selected);
        assert_eq!(explain.rules[2].verdict, RuleVerdict::Shadowed);
    }

    #[test]
    fn test_explain_excluded() {
        let explain = table().explain("node_modules/lib/index.js");
        assert_eq!(explain.selected, None);
        assert_eq!(explain.rules[0].verdict, RuleVerdict::Excluded);
        assert!(explain.to_human().contains("NO RULE MATCH"));
    }

    #[test]
    fn test_explain_json() {
        let json = table().explain("a.css").to_json().unwrap();
        assert!(json.contains("\"selected\": 1"));
        assert!(json.contains("\"verdict\": \"shadowed\""));
    }
}
