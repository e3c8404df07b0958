//! Keyword matching.
//!
//! Matching is case-insensitive substring containment, not word matching: a
//! rule for "art" matches "smart". The first matching rule in storage order
//! wins.

use tracing::trace;

use crate::rule::Rule;

/// First-match keyword lookup over the enabled rules of a snapshot.
#[derive(Debug, Clone, Default)]
pub struct KeywordMatcher {
    /// Enabled, well-formed rules with their case-folded keyword.
    entries: Vec<(String, Rule)>,
}

impl KeywordMatcher {
    /// Build a matcher from rules in storage order.
    ///
    /// Disabled rules and rules with an empty or whitespace-only keyword are
    /// dropped; the order of the rest is kept.
    #[must_use]
    pub fn new<'a>(rules: impl IntoIterator<Item = &'a Rule>) -> Self {
        let entries = rules
            .into_iter()
            .filter(|rule| rule.enabled)
            .filter(|rule| {
                let malformed = rule.is_malformed();
                if malformed {
                    trace!(id = %rule.id, "Skipping rule with empty keyword");
                }
                !malformed
            })
            .map(|rule| (rule.keyword.to_lowercase(), rule.clone()))
            .collect();
        Self { entries }
    }

    /// Number of rules that can match.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no rule can match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first rule whose keyword occurs in `text`.
    #[must_use]
    pub fn find(&self, text: &str) -> Option<&Rule> {
        let text = text.to_lowercase();
        self.entries
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, rule)| rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Action, RuleId};

    fn rule(id: i64, keyword: &str) -> Rule {
        Rule::new(id, keyword, Action::Blur)
    }

    #[test]
    fn test_first_match_follows_input_order() {
        let text = "a dog and cat";

        let rules = vec![rule(1, "cat"), rule(2, "dog")];
        assert_eq!(KeywordMatcher::new(&rules).find(text).unwrap().keyword, "cat");

        let rules = vec![rule(1, "dog"), rule(2, "cat")];
        assert_eq!(KeywordMatcher::new(&rules).find(text).unwrap().keyword, "dog");
    }

    #[test]
    fn test_order_beats_id_and_alphabet() {
        let rules = vec![rule(9, "zebra"), rule(1, "apple")];
        let matcher = KeywordMatcher::new(&rules);
        assert_eq!(matcher.find("apple zebra").unwrap().id, RuleId::Number(9));
    }

    #[test]
    fn test_case_insensitive_substring() {
        let rules = vec![rule(1, "NEWS")];
        let matcher = KeywordMatcher::new(&rules);
        assert!(matcher.find("breaking newsflash").is_some());
        assert!(matcher.find("BREAKING NEWSFLASH").is_some());
    }

    #[test]
    fn test_substring_not_word_boundary() {
        let rules = vec![rule(1, "art")];
        assert!(KeywordMatcher::new(&rules).find("smart phones").is_some());
    }

    #[test]
    fn test_no_match() {
        let rules = vec![rule(1, "cat")];
        assert!(KeywordMatcher::new(&rules).find("a dog").is_none());
    }

    #[test]
    fn test_disabled_rules_never_match() {
        let rules = vec![rule(1, "cat").with_enabled(false), rule(2, "a")];
        let matcher = KeywordMatcher::new(&rules);
        assert_eq!(matcher.len(), 1);
        assert_eq!(matcher.find("cat").unwrap().keyword, "a");
    }

    #[test]
    fn test_malformed_rules_skipped() {
        let rules = vec![rule(1, ""), rule(2, "   "), rule(3, "cat")];
        let matcher = KeywordMatcher::new(&rules);
        assert_eq!(matcher.len(), 1);
        assert_eq!(matcher.find("a cat sat").unwrap().keyword, "cat");
        // An empty keyword would otherwise match everything.
        assert!(matcher.find("dog").is_none());
    }

    #[test]
    fn test_empty_matcher() {
        let matcher = KeywordMatcher::default();
        assert!(matcher.is_empty());
        assert!(matcher.find("anything").is_none());
    }
}
