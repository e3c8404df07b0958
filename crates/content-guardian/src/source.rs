//! Rule sources.
//!
//! A rule source hands the engine the current rules and settings and tells it
//! when they change. The engine never diffs: every change notification means
//! "fetch again and reset".

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::rule::RuleSnapshot;

/// Why a rule source announced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleChange {
    /// The snapshot was replaced programmatically.
    Replaced,
    /// The backing file changed on disk.
    FileChanged,
}

/// Supplier of rules and settings.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Fetch the current snapshot, rules in storage order.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    async fn fetch(&self) -> Result<RuleSnapshot>;

    /// Subscribe to change notifications.
    ///
    /// Every call returns an independent receiver.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<RuleChange>;
}

#[async_trait]
impl<T: RuleSource + ?Sized> RuleSource for Arc<T> {
    async fn fetch(&self) -> Result<RuleSnapshot> {
        (**self).fetch().await
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<RuleChange> {
        (**self).subscribe()
    }
}

/// Fan-out list of change subscribers.
#[derive(Debug, Default)]
struct Subscribers {
    senders: Mutex<Vec<mpsc::UnboundedSender<RuleChange>>>,
}

impl Subscribers {
    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<RuleChange>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<RuleChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    fn notify(&self, change: RuleChange) {
        let mut senders = self.lock();
        senders.retain(|tx| tx.send(change).is_ok());
        debug!(?change, subscribers = senders.len(), "Rule change notified");
    }
}

/// Rule source holding its snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryRuleSource {
    snapshot: Mutex<RuleSnapshot>,
    fail_next: AtomicBool,
    fetches: AtomicU64,
    subscribers: Subscribers,
}

impl MemoryRuleSource {
    /// Create a source serving `snapshot`.
    #[must_use]
    pub fn new(snapshot: RuleSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Replace the snapshot and notify subscribers.
    pub fn replace(&self, snapshot: RuleSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
        self.subscribers.notify(RuleChange::Replaced);
    }

    /// Make the next fetch fail.
    pub fn fail_next_fetch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of fetches served or failed so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleSource for MemoryRuleSource {
    async fn fetch(&self) -> Result<RuleSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::rule_fetch("injected failure"));
        }
        Ok(self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<RuleChange> {
        self.subscribers.subscribe()
    }
}

/// Rule source reading a JSON snapshot from disk.
#[derive(Debug, Clone)]
pub struct FileRuleSource {
    path: PathBuf,
    subscribers: Arc<Subscribers>,
}

impl FileRuleSource {
    /// Create a source for the file at `path`. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            subscribers: Arc::new(Subscribers::default()),
        }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start polling the file every `poll_interval`, notifying subscribers when
    /// its content hash changes. A file appearing or disappearing counts as a
    /// change.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_watcher(&self, poll_interval: Duration) -> RuleWatcher {
        let path = self.path.clone();
        let subscribers = Arc::clone(&self.subscribers);

        debug!(
            path = %path.display(),
            interval_ms = poll_interval.as_millis(),
            "Starting rules file watcher"
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            let mut last_hash = content_hash(&path).await;

            loop {
                ticker.tick().await;
                let hash = content_hash(&path).await;
                if hash == last_hash {
                    trace!("Rules file unchanged");
                    continue;
                }
                debug!(hash = ?hash, "Rules file changed");
                last_hash = hash;
                subscribers.notify(RuleChange::FileChanged);
            }
        });

        RuleWatcher { task }
    }
}

#[async_trait]
impl RuleSource for FileRuleSource {
    async fn fetch(&self) -> Result<RuleSnapshot> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| Error::RuleFileRead {
                path: self.path.clone(),
                source,
            })?;
        let snapshot = RuleSnapshot::from_json(&contents).map_err(|e| {
            Error::rule_fetch(format!("{} is not a rule snapshot: {e}", self.path.display()))
        })?;
        debug!(
            path = %self.path.display(),
            rules = snapshot.rules.len(),
            "Loaded rules file"
        );
        Ok(snapshot)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<RuleChange> {
        self.subscribers.subscribe()
    }
}

/// Handle to a running rules file watcher. Dropping it stops the watcher.
#[derive(Debug)]
pub struct RuleWatcher {
    task: JoinHandle<()>,
}

impl RuleWatcher {
    /// Stop the watcher.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for RuleWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Hash of the file's bytes, `None` if it cannot be read.
async fn content_hash(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(blake3::hash(&bytes).to_hex().to_string()),
        Err(e) => {
            trace!(path = %path.display(), error = %e, "Rules file unreadable");
            None
        }
    }
}

/// Fetch from `source`, substituting an empty snapshot on failure.
pub async fn fetch_or_empty(source: &dyn RuleSource) -> RuleSnapshot {
    match source.fetch().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Rule fetch failed, continuing without rules");
            RuleSnapshot::default()
        }
    }
}
