//! Progress tracking for account synchronization.
//!
//! This module provides the `SyncProgressTracker`, which records what a run has processed:
//! pages fetched, transactions persisted, batches completed, reorganizations recovered, and
//! the highest block height reached. The tracker is used by the synchronizer to log progress
//! periodically and to report final statistics on completion.

use tracing::info;

/// Log progress every this many fetched pages.
const PAGES_PER_PROGRESS_LOG: usize = 10;

/// Service for tracking synchronization progress
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
    pages_fetched: usize,
    transactions_processed: usize,
    new_operations: usize,
    batches_completed: u32,
    reorgs_recovered: usize,
    highest_block_height: u64,
    last_logged_pages: usize,
}

impl SyncProgressTracker {
    /// Create a new progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fetched and persisted page.
    pub fn record_page(&mut self, transactions: usize, newly_inserted: usize) {
        self.pages_fetched += 1;
        self.transactions_processed += transactions;
        self.new_operations += newly_inserted;
    }

    /// Record a completed batch.
    pub fn record_batch(&mut self) {
        self.batches_completed += 1;
    }

    /// Record a recovered reorganization.
    pub fn record_reorg(&mut self) {
        self.reorgs_recovered += 1;
    }

    /// Record the highest block height a checkpoint advanced to.
    pub fn record_block_height(&mut self, height: u64) {
        self.highest_block_height = self.highest_block_height.max(height);
    }

    /// Log progress at regular intervals or when forced
    pub fn log_progress(&mut self, force: bool) {
        let pages_since_last_log = self.pages_fetched.saturating_sub(self.last_logged_pages);
        if force || pages_since_last_log >= PAGES_PER_PROGRESS_LOG {
            info!(
                "Sync progress: {} transactions over {} pages, up to block height {}",
                self.transactions_processed, self.pages_fetched, self.highest_block_height
            );
            self.last_logged_pages = self.pages_fetched;
        }
    }

    /// Get sync statistics as a SyncStats struct
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            pages_fetched: self.pages_fetched,
            transactions_processed: self.transactions_processed,
            new_operations: self.new_operations,
            batches_completed: self.batches_completed,
            reorgs_recovered: self.reorgs_recovered,
            highest_block_height: self.highest_block_height,
        }
    }
}

/// Statistics about a synchronization run
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub pages_fetched: usize,
    pub transactions_processed: usize,
    pub new_operations: usize,
    pub batches_completed: u32,
    pub reorgs_recovered: usize,
    pub highest_block_height: u64,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "{} transactions ({} new) over {} pages in {} batches, up to height {}{}",
            self.transactions_processed,
            self.new_operations,
            self.pages_fetched,
            self.batches_completed,
            self.highest_block_height,
            if self.reorgs_recovered == 0 {
                String::new()
            } else {
                format!(" ({} reorgs recovered)", self.reorgs_recovered)
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_counts_across_pages() {
        let mut tracker = SyncProgressTracker::new();
        tracker.record_page(3, 3);
        tracker.record_page(3, 1);
        tracker.record_block_height(105);
        tracker.record_block_height(100);
        tracker.record_batch();

        let stats = tracker.stats();
        assert_eq!(stats.pages_fetched, 2);
        assert_eq!(stats.transactions_processed, 6);
        assert_eq!(stats.new_operations, 4);
        assert_eq!(stats.batches_completed, 1);
        assert_eq!(stats.highest_block_height, 105);
    }

    #[test]
    fn summary_mentions_reorgs_only_when_present() {
        let mut tracker = SyncProgressTracker::new();
        tracker.record_page(1, 1);
        tracker.record_batch();
        assert!(!tracker.stats().summary().contains("reorg"));

        tracker.record_reorg();
        assert!(tracker.stats().summary().contains("1 reorgs recovered"));
    }
}
