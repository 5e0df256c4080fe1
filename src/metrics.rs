use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of a single run. A fresh instance is created per run and handed to the stages
/// which update it; nothing is kept in global state.
#[derive(Debug, Default)]
pub struct RunMetrics {
    users_merged: AtomicU64,
    users_scored: AtomicU64,
    users_missing_features: AtomicU64,
    recommendations_emitted: AtomicU64,
    blocks_succeeded: AtomicU64,
    blocks_failed: AtomicU64,
}

/// Point-in-time copy of the counters of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub users_merged: u64,
    pub users_scored: u64,
    pub users_missing_features: u64,
    pub recommendations_emitted: u64,
    pub blocks_succeeded: u64,
    pub blocks_failed: u64,
}

impl RunMetrics {

    pub fn new() -> Self {
        Default::default()
    }

    pub fn user_merged(&self) {
        self.users_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn user_scored(&self, num_recommendations: usize) {
        self.users_scored.fetch_add(1, Ordering::Relaxed);
        self.recommendations_emitted.fetch_add(num_recommendations as u64, Ordering::Relaxed);
    }

    pub fn user_missing_features(&self) {
        self.users_missing_features.fetch_add(1, Ordering::Relaxed);
    }

    pub fn block_finished(&self, succeeded: bool) {
        if succeeded {
            self.blocks_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.blocks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            users_merged: self.users_merged.load(Ordering::Relaxed),
            users_scored: self.users_scored.load(Ordering::Relaxed),
            users_missing_features: self.users_missing_features.load(Ordering::Relaxed),
            recommendations_emitted: self.recommendations_emitted.load(Ordering::Relaxed),
            blocks_succeeded: self.blocks_succeeded.load(Ordering::Relaxed),
            blocks_failed: self.blocks_failed.load(Ordering::Relaxed),
        }
    }
}
