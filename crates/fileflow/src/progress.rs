use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::result::OutcomeKind;

/// Emitted once per finished file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// Files finished so far, including this one. Strictly increasing
    /// across the updates of one run.
    pub completed: usize,
    pub total: usize,
    pub current_file: PathBuf,
    pub outcome: OutcomeKind,
}

/// Receives progress from the executor.
///
/// Called from the executor's aggregating thread; implementations should
/// return quickly. A panicking sink is logged and otherwise ignored.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: &ProgressUpdate);
}

/// No-op sink for unit tests.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _update: &ProgressUpdate) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: &ProgressUpdate) {
        self(update)
    }
}

/// Fans progress out to any number of subscribers without ever blocking
/// the run. Slow subscribers lose the oldest updates.
#[derive(Clone)]
pub struct BroadcastProgress {
    sender: broadcast::Sender<ProgressUpdate>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ProgressSink for BroadcastProgress {
    fn report(&self, update: &ProgressUpdate) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(update.clone());
    }
}
