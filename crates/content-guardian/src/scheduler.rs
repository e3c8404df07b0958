//! Mutation scheduling.
//!
//! Bursts of structural changes collapse into one scan. Every batch with
//! additions pushes the deadline out to `now + delay`; the scan runs once the
//! tree has been quiet for the full delay. Batches without additions are
//! ignored.

use std::future;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

use crate::tree::MutationBatch;

/// Debouncer turning change batches into scan deadlines.
#[derive(Debug, Clone)]
pub struct MutationScheduler {
    delay: Duration,
    deadline: Option<Instant>,
    observed: u64,
    ignored: u64,
    fired: u64,
}

impl MutationScheduler {
    /// Create a scheduler with the given quiet period.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            observed: 0,
            ignored: 0,
            fired: 0,
        }
    }

    /// The quiet period.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record a batch seen at `now`. Returns whether the deadline moved.
    pub fn observe(&mut self, batch: MutationBatch, now: Instant) -> bool {
        if !batch.has_structural_additions() {
            self.ignored += 1;
            trace!(?batch, "Ignoring batch without additions");
            return false;
        }
        self.observed += 1;
        let deadline = now + self.delay;
        trace!(
            added = batch.added_nodes,
            restarted = self.deadline.is_some(),
            "Scan deadline reset"
        );
        self.deadline = Some(deadline);
        true
    }

    /// When the pending scan is due, if one is pending.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether a scan is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the pending deadline if it has passed at `now`.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                self.fired += 1;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending scan.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Qualifying batches observed.
    #[must_use]
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Batches ignored for lacking additions.
    #[must_use]
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    /// Scans released.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

/// Sleep until `deadline`; never completes when there is none.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
