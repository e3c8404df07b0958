//! Error types for content-guardian.
//!
//! This module defines all error types used throughout the crate. Most of them
//! never escape the engine: rule fetch failures degrade to an empty rule set and
//! host problems leave the document untouched.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::tree::NodeId;

/// The main error type for content-guardian operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Tree Host Errors ===
    /// The tree host root never became available.
    #[error("tree host root unavailable after waiting {waited:?}")]
    HostUnavailable {
        /// How long the engine waited before giving up.
        waited: Duration,
    },

    /// A node handle does not refer to a node of this tree.
    #[error("unknown node {node}")]
    UnknownNode {
        /// The offending handle.
        node: NodeId,
    },

    /// A structural operation needed a parent the node does not have.
    #[error("node {node} has no parent")]
    DetachedNode {
        /// The offending handle.
        node: NodeId,
    },

    // === Selector Errors ===
    /// A structural selector could not be parsed.
    #[error("invalid selector '{selector}': {message}")]
    Selector {
        /// The selector text.
        selector: String,
        /// What is wrong with it.
        message: String,
    },

    // === Rule Source Errors ===
    /// The rule source failed to deliver rules and settings.
    #[error("failed to fetch rules: {message}")]
    RuleFetch {
        /// Description of what went wrong.
        message: String,
    },

    /// The rules file could not be read.
    #[error("failed to read rules file {path}: {source}")]
    RuleFileRead {
        /// Path to the rules file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for content-guardian operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a rule fetch error.
    #[must_use]
    pub fn rule_fetch(message: impl Into<String>) -> Self {
        Self::RuleFetch {
            message: message.into(),
        }
    }

    /// Create a selector parse error.
    #[must_use]
    pub fn selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Check if this error means the tree host never became available.
    #[must_use]
    pub fn is_host_unavailable(&self) -> bool {
        matches!(self, Self::HostUnavailable { .. })
    }

    /// Check if this error came from the rule source.
    #[must_use]
    pub fn is_rule_fetch_failure(&self) -> bool {
        matches!(self, Self::RuleFetch { .. } | Self::RuleFileRead { .. })
    }
}
