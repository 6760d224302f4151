//! Pattern-based resolution of false conflicts.
//!
//! diff3 reports a conflict whenever both sides touch the same base region,
//! even when one side's change already contains the other's. Each rule here
//! has:
//! - A **predicate** that checks if the conflict matches the pattern
//! - A **transform** that produces the resolved lines
//!
//! The rules are heuristics. Conflicts no rule matches are left for the user.

use crate::types::{Diff3Hunk, MergeOutput, MergeScenario};

/// A pattern rule that can match and resolve a conflict region.
pub trait PatternRule: Send + Sync {
    /// Human-readable name for the rule.
    fn name(&self) -> &str;

    /// Check if this rule matches the given conflict region.
    fn matches(&self, scenario: &MergeScenario<&[String]>) -> bool;

    /// Produce the resolved lines. Only called if `matches` returned true.
    fn resolve(&self, scenario: &MergeScenario<&[String]>) -> Vec<String>;
}

/// Registry of pattern rules, tried in order.
pub struct PatternRegistry {
    rules: Vec<Box<dyn PatternRule>>,
}

impl PatternRegistry {
    /// Create a registry with all built-in rules.
    pub fn new() -> Self {
        Self {
            rules: vec![Box::new(PrefixExtensionRule)],
        }
    }

    /// Create a registry with no rules; every conflict is reported.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: Box<dyn PatternRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Try all rules against a conflict, returning the first match.
    pub fn try_resolve(&self, scenario: &MergeScenario<&[String]>) -> Option<Vec<String>> {
        self.rules
            .iter()
            .find(|rule| rule.matches(scenario))
            .map(|rule| rule.resolve(scenario))
    }

    /// Rewrite every conflict hunk some rule can resolve into a clean hunk.
    ///
    /// Returns the number of conflicts resolved and refreshes `output.conflict`.
    pub fn resolve_false_conflicts(&self, output: &mut MergeOutput) -> usize {
        let mut resolved = 0;
        for hunk in output.hunks.iter_mut() {
            let Diff3Hunk::Conflict { base, left, right } = hunk else {
                continue;
            };
            let scenario = MergeScenario::new(&base[..], &left[..], &right[..]);
            if let Some(lines) = self.try_resolve(&scenario) {
                *hunk = Diff3Hunk::BothChanged {
                    base: std::mem::take(base),
                    lines,
                };
                resolved += 1;
            }
        }
        output.refresh();
        resolved
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Both sides added lines where base had nothing (or only blank lines), and
/// one side's addition starts with the whole of the other's: keep the longer one.
pub struct PrefixExtensionRule;

impl PatternRule for PrefixExtensionRule {
    fn name(&self) -> &str {
        "prefix-extension"
    }

    fn matches(&self, scenario: &MergeScenario<&[String]>) -> bool {
        scenario.base.iter().all(|line| line.is_empty())
            && (scenario.left.starts_with(scenario.right)
                || scenario.right.starts_with(scenario.left))
    }

    fn resolve(&self, scenario: &MergeScenario<&[String]>) -> Vec<String> {
        if scenario.left.len() >= scenario.right.len() {
            scenario.left.to_vec()
        } else {
            scenario.right.to_vec()
        }
    }
}
