//! Engine controller.
//!
//! One [`Engine`] per document. It owns the rule snapshot, the scheduler and
//! the tree host, and drives the lifecycle:
//!
//! ```text
//! Uninitialized -> AwaitingHost -> Active -> Resetting -> Active
//! ```
//!
//! Scan passes run to completion one at a time on the caller's task; nothing
//! here is shared across threads.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::applier::{self, is_engine_node, StripReport};
use crate::config::{Config, EngineConfig};
use crate::container::ContainerResolver;
use crate::error::{Error, Result};
use crate::extract::extract_text;
use crate::matcher::KeywordMatcher;
use crate::profile::{ProfileResolver, ResolvedProfile};
use crate::rule::{Action, RuleSnapshot};
use crate::scheduler::{sleep_until_deadline, MutationScheduler};
use crate::source::{fetch_or_empty, RuleSource};
use crate::tree::{MutationBatch, NodeId, NodeMutation, NodeQuery, TreeHost};

/// Lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Constructed, not started.
    Uninitialized,
    /// Waiting for the document root.
    AwaitingHost,
    /// Scanning and observing mutations.
    Active,
    /// Re-fetching rules and stripping annotations.
    Resetting,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::AwaitingHost => write!(f, "awaiting_host"),
            Self::Active => write!(f, "active"),
            Self::Resetting => write!(f, "resetting"),
        }
    }
}

/// Per-action filter counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    /// Containers hidden.
    pub hide: usize,
    /// Containers blurred.
    pub blur: usize,
    /// Containers flagged.
    pub flag: usize,
}

impl ActionCounts {
    /// Count one application of `action`.
    pub fn record(&mut self, action: Action) {
        *self.slot(action) += 1;
    }

    /// Count for `action`.
    #[must_use]
    pub fn get(&self, action: Action) -> usize {
        match action {
            Action::Hide => self.hide,
            Action::Blur => self.blur,
            Action::Flag => self.flag,
        }
    }

    fn slot(&mut self, action: Action) -> &mut usize {
        match action {
            Action::Hide => &mut self.hide,
            Action::Blur => &mut self.blur,
            Action::Flag => &mut self.flag,
        }
    }
}

/// Outcome of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Nodes returned by the profile selectors, duplicates included.
    pub candidates: usize,
    /// Candidates whose text matched a rule.
    pub matched: usize,
    /// Containers newly annotated.
    pub filtered: usize,
    /// Candidates skipped because they were already processed.
    pub skipped_processed: usize,
    /// Newly annotated containers per action.
    pub by_action: ActionCounts,
}

/// What happened to one candidate.
enum Outcome {
    NoMatch,
    AlreadyAnnotated,
    Filtered(Action),
}

/// The content filter for one document.
#[derive(Debug)]
pub struct Engine<H, S> {
    config: EngineConfig,
    host_name: String,
    profile: ResolvedProfile,
    containers: ContainerResolver,
    tree: H,
    source: S,
    state: EngineState,
    snapshot: RuleSnapshot,
    matcher: KeywordMatcher,
    scheduler: MutationScheduler,
    filtered_count: usize,
    scans: u64,
}

impl<H: TreeHost, S: RuleSource> Engine<H, S> {
    /// Create an engine for the document of `host_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate, including an
    /// invalid profile or selector.
    pub fn new(config: &Config, host_name: &str, tree: H, source: S) -> Result<Self> {
        config.validate()?;
        let profile = ProfileResolver::with_custom(&config.profiles)?.resolve(host_name);
        let containers = ContainerResolver::new(&config.container)?;

        Ok(Self {
            config: config.engine.clone(),
            host_name: host_name.to_string(),
            profile,
            containers,
            tree,
            source,
            state: EngineState::Uninitialized,
            snapshot: RuleSnapshot::default(),
            matcher: KeywordMatcher::default(),
            scheduler: MutationScheduler::new(config.engine.scan_debounce()),
            filtered_count: 0,
            scans: 0,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Host name the engine was created for.
    #[must_use]
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// The resolved platform profile.
    #[must_use]
    pub fn profile(&self) -> &ResolvedProfile {
        &self.profile
    }

    /// The rules and settings in effect.
    #[must_use]
    pub fn snapshot(&self) -> &RuleSnapshot {
        &self.snapshot
    }

    /// The tree host.
    #[must_use]
    pub fn tree(&self) -> &H {
        &self.tree
    }

    /// The tree host, mutably.
    pub fn tree_mut(&mut self) -> &mut H {
        &mut self.tree
    }

    /// Consume the engine, returning the tree host.
    #[must_use]
    pub fn into_tree(self) -> H {
        self.tree
    }

    /// Containers annotated since the last full reset.
    #[must_use]
    pub fn filtered_count(&self) -> usize {
        self.filtered_count
    }

    /// Scan passes run so far.
    #[must_use]
    pub fn scan_count(&self) -> u64 {
        self.scans
    }

    /// The debounce scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &MutationScheduler {
        &self.scheduler
    }

    fn transition(&mut self, state: EngineState) {
        if self.state != state {
            info!(from = %self.state, to = %state, host = %self.host_name, "Engine state change");
            self.state = state;
        }
    }

    /// Wait for the document root, polling at the configured interval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostUnavailable`] if the configured wait elapses first.
    /// The engine then stays in [`EngineState::AwaitingHost`].
    pub async fn wait_for_host(&mut self) -> Result<NodeId> {
        self.transition(EngineState::AwaitingHost);
        let started = Instant::now();
        let mut ticker = time::interval(self.config.host_poll_interval());

        loop {
            ticker.tick().await;
            if let Some(root) = self.tree.root() {
                debug!(%root, waited_ms = started.elapsed().as_millis(), "Tree host ready");
                return Ok(root);
            }
            if let Some(timeout) = self.config.host_wait_timeout() {
                let waited = started.elapsed();
                if waited >= timeout {
                    error!(
                        host = %self.host_name,
                        waited_ms = waited.as_millis(),
                        "Tree host root never became available"
                    );
                    return Err(Error::HostUnavailable { waited });
                }
            }
            trace!("Tree host root not available yet");
        }
    }

    /// Fetch rules and settings, replacing the current snapshot. A failed
    /// fetch leaves the engine with no rules.
    pub async fn load_rules(&mut self) {
        let snapshot = fetch_or_empty(&self.source).await;
        self.install(snapshot);
    }

    fn install(&mut self, snapshot: RuleSnapshot) {
        self.matcher = KeywordMatcher::new(&snapshot.rules);
        info!(
            rules = snapshot.rules.len(),
            active = self.matcher.len(),
            enabled = snapshot.settings.enabled,
            "Rules loaded"
        );
        self.snapshot = snapshot;
    }

    /// Wait for the host, load rules and run the initial scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the host never becomes available.
    pub async fn start(&mut self) -> Result<ScanReport> {
        self.wait_for_host().await?;
        self.load_rules().await;
        self.transition(EngineState::Active);
        Ok(self.scan())
    }

    /// Whether the current settings allow filtering on this host.
    #[must_use]
    pub fn site_enabled(&self) -> bool {
        self.snapshot.settings.allows(&self.profile.site_tags)
    }

    /// Run one scan pass over the current document.
    ///
    /// Failures on individual nodes are logged and skipped.
    pub fn scan(&mut self) -> ScanReport {
        let mut report = ScanReport::default();
        self.scans += 1;

        if !self.site_enabled() {
            debug!(
                host = %self.host_name,
                sites = ?self.profile.site_tags,
                "Filtering disabled for this site"
            );
            return report;
        }
        if self.matcher.is_empty() {
            debug!("No active rules, skipping scan");
            return report;
        }

        for node in self.tree.query(&self.profile.selectors) {
            report.candidates += 1;
            if self.tree.is_processed(node) {
                report.skipped_processed += 1;
                continue;
            }
            if is_engine_node(&self.tree, node) {
                continue;
            }
            match self.filter_node(node) {
                Ok(Outcome::NoMatch) => {}
                Ok(Outcome::AlreadyAnnotated) => report.matched += 1,
                Ok(Outcome::Filtered(action)) => {
                    report.matched += 1;
                    report.filtered += 1;
                    report.by_action.record(action);
                }
                Err(e) => warn!(%node, error = %e, "Failed to filter node"),
            }
        }

        self.filtered_count += report.filtered;
        debug!(
            candidates = report.candidates,
            matched = report.matched,
            filtered = report.filtered,
            skipped = report.skipped_processed,
            total = self.filtered_count,
            "Scan complete"
        );
        report
    }

    fn filter_node(&mut self, node: NodeId) -> Result<Outcome> {
        let text = extract_text(&self.tree, node);
        let Some(rule) = self.matcher.find(&text).cloned() else {
            return Ok(Outcome::NoMatch);
        };

        self.tree.mark_processed(node)?;
        let container = self.containers.resolve(&self.tree, node);
        if container != node && self.tree.is_processed(container) {
            trace!(%node, %container, "Container already annotated");
            return Ok(Outcome::AlreadyAnnotated);
        }
        self.tree.mark_processed(container)?;

        debug!(%node, %container, keyword = %rule.keyword, "Keyword matched");
        applier::apply_filter(&mut self.tree, container, &rule)?;
        Ok(Outcome::Filtered(rule.action))
    }

    /// Strip every annotation, wrapper, control and processed mark.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree rejects a mutation.
    pub fn reset(&mut self) -> Result<StripReport> {
        self.scheduler.cancel();
        let report = applier::strip_annotations(&mut self.tree)?;
        self.filtered_count = 0;
        Ok(report)
    }

    /// Re-fetch rules, reset the document and scan it again.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub async fn refresh(&mut self) -> Result<ScanReport> {
        self.transition(EngineState::Resetting);
        self.load_rules().await;
        self.reset()?;
        self.transition(EngineState::Active);
        Ok(self.scan())
    }

    /// Activate a control node; see [`applier::activate_control`].
    ///
    /// # Errors
    ///
    /// Returns an error if the tree rejects a mutation.
    pub fn activate_control(&mut self, node: NodeId) -> Result<bool> {
        applier::activate_control(&mut self.tree, node)
    }

    /// Feed a change batch to the scheduler.
    pub fn observe(&mut self, batch: MutationBatch) -> bool {
        self.scheduler.observe(batch, Instant::now())
    }

    /// Run the engine until `shutdown` changes.
    ///
    /// Starts the engine, then reacts to rule changes with a full refresh and
    /// to structural additions with a debounced scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the host never becomes available.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut changes = self.source.subscribe();
        let mut mutations = self.tree.observe_mutations();

        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                info!("Engine stopped before becoming active");
                return Ok(());
            }
            started = self.start() => {
                let report = started?;
                info!(filtered = report.filtered, "Initial scan complete");
            }
        }

        loop {
            let deadline = self.scheduler.deadline();
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!(filtered = self.filtered_count, scans = self.scans, "Engine stopping");
                    return Ok(());
                }
                Some(change) = changes.recv() => {
                    debug!(?change, "Rules changed, refreshing");
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "Refresh failed");
                    }
                }
                Some(batch) = mutations.recv() => {
                    self.observe(batch);
                }
                () = sleep_until_deadline(deadline) => {
                    if self.scheduler.fire(Instant::now()) {
                        self.scan();
                    }
                }
            }
        }
    }
}
