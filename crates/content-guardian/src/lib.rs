//! `content-guardian` - Keyword-driven content filtering for mutating document trees
//!
//! The engine scans a document for text-bearing nodes, matches their text
//! against user keyword rules and hides, blurs or flags the enclosing content
//! unit. It keeps up with a live document by debouncing change notifications
//! and starts over whenever the rules change.
//!
//! The document is reached through the [`tree::TreeHost`] traits and rules
//! through [`source::RuleSource`]; [`tree::MemoryTree`] and the sources in
//! [`source`] are the bundled implementations.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod applier;
pub mod cli;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod extract;
pub mod logging;
pub mod matcher;
pub mod profile;
pub mod rule;
pub mod scheduler;
pub mod source;
pub mod tree;

pub use config::Config;
pub use engine::{Engine, EngineState, ScanReport};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use matcher::KeywordMatcher;
pub use profile::ProfileResolver;
pub use rule::{Action, Rule, RuleId, RuleSnapshot, Settings};
pub use source::{FileRuleSource, MemoryRuleSource, RuleSource};
pub use tree::{MemoryTree, NodeId, SharedTree, TreeHost};
