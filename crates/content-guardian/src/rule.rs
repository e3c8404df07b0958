//! Rules, settings and the snapshot a rule source delivers.
//!
//! The JSON shapes follow the collaborator's storage layout: the rule list lives
//! under `keywords`, field names are camelCase, ids are numbers or strings and
//! `createdAt` is a millisecond timestamp.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Site tag that enables filtering everywhere.
pub const ALL_SITES: &str = "all";

/// Category given to rules that do not name one.
pub const DEFAULT_CATEGORY: &str = "General";

/// Stable identifier of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleId {
    /// Numeric id (creation timestamp).
    Number(i64),
    /// Textual id.
    Text(String),
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RuleId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for RuleId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

/// What to do with content that matches a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Remove the container from view.
    Hide,
    /// Blur the container behind a one-shot reveal control.
    #[default]
    Blur,
    /// Mark the container with a keyword indicator.
    Flag,
}

impl Action {
    /// Every action, in table order.
    pub const ALL: [Action; 3] = [Action::Hide, Action::Blur, Action::Flag];

    /// Position of the action in strategy and statistics tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Hide => 0,
            Self::Blur => 1,
            Self::Flag => 2,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hide => write!(f, "hide"),
            Self::Blur => write!(f, "blur"),
            Self::Flag => write!(f, "flag"),
        }
    }
}

/// A keyword rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Stable identifier.
    pub id: RuleId,

    /// Keyword, matched case-insensitively as a substring.
    pub keyword: String,

    /// Free-form grouping label.
    #[serde(default = "default_category")]
    pub category: String,

    /// Action applied on match.
    #[serde(default)]
    pub action: Action,

    /// Disabled rules never match.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Creation time.
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Create an enabled rule in the default category.
    #[must_use]
    pub fn new(id: impl Into<RuleId>, keyword: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            keyword: keyword.into(),
            category: default_category(),
            action,
            enabled: true,
            created_at: Some(Utc::now()),
        }
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// A rule whose keyword is empty or whitespace never matches.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.keyword.trim().is_empty()
    }
}

/// User settings. Only `enabled` and `enabled_sites` affect the engine; the rest
/// is carried for the collaborators that own them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Master switch.
    pub enabled: bool,

    /// Action preselected when a rule is created.
    pub default_action: Action,

    /// Opaque sensitivity level.
    pub sensitivity: String,

    /// Site tags filtering is enabled for; `"all"` enables every site.
    pub enabled_sites: Vec<String>,

    /// Whether the popup shows statistics.
    pub show_stats: bool,

    /// Whether notifications are shown.
    pub enable_notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_action: Action::Blur,
            sensitivity: "medium".to_string(),
            enabled_sites: vec![ALL_SITES.to_string()],
            show_stats: true,
            enable_notifications: false,
        }
    }
}

impl Settings {
    /// Whether filtering should run on a host carrying `site_tags`.
    #[must_use]
    pub fn allows<S: AsRef<str>>(&self, site_tags: &[S]) -> bool {
        self.enabled
            && self.enabled_sites.iter().any(|enabled| {
                enabled == ALL_SITES || site_tags.iter().any(|tag| tag.as_ref() == enabled)
            })
    }
}

/// Rules and settings as delivered by a rule source, in storage order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSnapshot {
    /// Rules in storage order.
    #[serde(rename = "keywords", alias = "rules")]
    pub rules: Vec<Rule>,

    /// Settings.
    pub settings: Settings,
}

impl RuleSnapshot {
    /// Create a snapshot.
    #[must_use]
    pub fn new(rules: Vec<Rule>, settings: Settings) -> Self {
        Self { rules, settings }
    }

    /// Enabled rules, in storage order.
    pub fn enabled_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.enabled)
    }

    /// Parse the JSON storage form.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display_and_index() {
        for (i, action) in Action::ALL.iter().enumerate() {
            assert_eq!(action.index(), i);
        }
        assert_eq!(Action::Hide.to_string(), "hide");
        assert_eq!(Action::Blur.to_string(), "blur");
        assert_eq!(Action::Flag.to_string(), "flag");
    }

    #[test]
    fn test_action_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Flag).unwrap(), "\"flag\"");
        let action: Action = serde_json::from_str("\"hide\"").unwrap();
        assert_eq!(action, Action::Hide);
        assert!(serde_json::from_str::<Action>("\"delete\"").is_err());
    }

    #[test]
    fn test_rule_id_accepts_numbers_and_strings() {
        let id: RuleId = serde_json::from_str("1717171717171").unwrap();
        assert_eq!(id, RuleId::Number(1_717_171_717_171));
        let id: RuleId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id, RuleId::Text("abc".to_string()));
        assert_eq!(RuleId::from(5).to_string(), "5");
    }

    #[test]
    fn test_rule_deserialize_defaults() {
        let json = r#"{"id": 1, "keyword": "politics"}"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.category, "General");
        assert_eq!(rule.action, Action::Blur);
        assert!(rule.enabled);
        assert!(rule.created_at.is_none());
    }

    #[test]
    fn test_rule_created_at_millis() {
        let json = r#"{"id": 1, "keyword": "x", "action": "flag", "enabled": false, "createdAt": 1700000000000}"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert!(!rule.enabled);
        assert_eq!(rule.created_at.unwrap().timestamp(), 1_700_000_000);

        let out = serde_json::to_string(&rule).unwrap();
        assert!(out.contains("\"createdAt\":1700000000000"));
    }

    #[test]
    fn test_rule_is_malformed() {
        assert!(Rule::new(1, "", Action::Hide).is_malformed());
        assert!(Rule::new(1, "  \t", Action::Hide).is_malformed());
        assert!(!Rule::new(1, "cat", Action::Hide).is_malformed());
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(settings.enabled);
        assert_eq!(settings.default_action, Action::Blur);
        assert_eq!(settings.sensitivity, "medium");
        assert_eq!(settings.enabled_sites, vec!["all"]);
        assert!(settings.show_stats);
        assert!(!settings.enable_notifications);
    }

    #[test]
    fn test_settings_camel_case() {
        let json = r#"{"enabledSites": ["youtube"], "showStats": false, "unknownField": 1}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.enabled_sites, vec!["youtube"]);
        assert!(!settings.show_stats);
        assert!(settings.enabled);
    }

    #[test]
    fn test_settings_allows() {
        let mut settings = Settings::default();
        assert!(settings.allows::<&str>(&[]));

        settings.enabled_sites = vec!["youtube".to_string()];
        assert!(settings.allows(&["youtube"]));
        assert!(!settings.allows(&["reddit"]));
        assert!(!settings.allows::<&str>(&[]));

        settings.enabled_sites.clear();
        assert!(!settings.allows(&["youtube"]));

        settings.enabled_sites = vec!["all".to_string()];
        settings.enabled = false;
        assert!(!settings.allows(&["youtube"]));
    }

    #[test]
    fn test_snapshot_storage_layout() {
        let json = r#"{
            "keywords": [
                {"id": 2, "keyword": "dog", "action": "hide"},
                {"id": 1, "keyword": "cat", "enabled": false}
            ],
            "settings": {"sensitivity": "high"},
            "exportedAt": "2024-01-01T00:00:00Z",
            "version": "1.0"
        }"#;
        let snapshot = RuleSnapshot::from_json(json).unwrap();
        assert_eq!(snapshot.rules.len(), 2);
        assert_eq!(snapshot.rules[0].keyword, "dog");
        assert_eq!(snapshot.settings.sensitivity, "high");

        let enabled: Vec<_> = snapshot.enabled_rules().map(|r| r.keyword.as_str()).collect();
        assert_eq!(enabled, vec!["dog"]);
    }

    #[test]
    fn test_snapshot_accepts_rules_alias_and_empty() {
        let snapshot = RuleSnapshot::from_json(r#"{"rules": [{"id": "a", "keyword": "x"}]}"#).unwrap();
        assert_eq!(snapshot.rules.len(), 1);

        let empty = RuleSnapshot::from_json("{}").unwrap();
        assert!(empty.rules.is_empty());
        assert_eq!(empty.settings, Settings::default());
    }
}
