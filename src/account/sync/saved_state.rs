//! Persisted synchronization checkpoints.
//!
//! One [`SavedState`] is kept per account and committed back to the preferences store after
//! every batch, so a crash mid-run loses at most one batch of progress. Each
//! [`BatchSavedState`] records the highest block successfully synchronized for one address
//! window; it doubles as the pagination cursor and as the reorg-detection anchor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk version of the saved-state envelope.
pub const SAVED_STATE_VERSION: u32 = 1;

/// Checkpoint of one address window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSavedState {
    /// Highest block height synchronized for this window.
    pub block_height: u64,
    /// Hash of that block; empty until the window has seen a confirmed transaction.
    pub block_hash: String,
}

/// Per-account synchronization state, persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    /// The address-window granularity in effect when this state was produced.
    pub half_batch_size: u32,
    /// One checkpoint per address window covered so far.
    pub batches: Vec<BatchSavedState>,
    /// Transactions observed unconfirmed as of the last run, keyed by transaction hash with
    /// the operation uid as value. Distinguishes "still pending, leave alone" from "never
    /// confirmed, safe to delete".
    pub pending_txs_hash: BTreeMap<String, String>,
}

impl SavedState {
    /// Pre-run repair: reset every batch whose checkpoint height is at or above
    /// `failed_height` to the given recovery point.
    pub fn reset_batches_at_or_above(
        &mut self,
        failed_height: u64,
        recovery_height: u64,
        recovery_hash: &str,
    ) {
        for batch in &mut self.batches {
            if batch.block_height >= failed_height {
                batch.block_height = recovery_height;
                batch.block_hash = recovery_hash.to_string();
            }
        }
    }

    /// Mid-run reorg rollback: pull every checkpoint strictly above `last_height` down to
    /// the last surviving block.
    pub fn rollback_above(&mut self, last_height: u64, last_hash: &str) {
        for batch in &mut self.batches {
            if batch.block_height > last_height {
                batch.block_height = last_height;
                batch.block_hash = last_hash.to_string();
            }
        }
    }
}

/// Versioned envelope wrapping [`SavedState`] on disk, so future shape changes can be
/// migrated instead of silently misread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedStateEnvelope {
    pub version: u32,
    /// When the state was written, RFC 3339.
    pub saved_at: String,
    pub state: SavedState,
}

/// Bring a loaded state (or its absence) in line with the configured window granularity.
///
/// A fresh state is seeded with `half_batch_size` and no batches. When the configured
/// granularity differs from the persisted one, the old batches are redistributed: the new
/// state gets `ceil(covered_addresses / new_half_batch_size) + 1` entries, all collapsed to
/// the most conservative (lowest) checkpoint known across the old batches, forcing a wider
/// resync rather than risking gaps.
pub fn initialize_saved_state(saved: Option<SavedState>, half_batch_size: u32) -> SavedState {
    match saved {
        Some(mut state) if state.half_batch_size != half_batch_size => {
            let floor = state
                .batches
                .iter()
                .min_by_key(|batch| batch.block_height)
                .cloned()
                .unwrap_or_default();
            let covered = state.batches.len() as u64 * u64::from(state.half_batch_size);
            let count = covered.div_ceil(u64::from(half_batch_size)) + 1;
            state.batches = vec![floor; count as usize];
            state.half_batch_size = half_batch_size;
            state
        }
        Some(state) => state,
        None => SavedState {
            half_batch_size,
            ..SavedState::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn batch(height: u64, hash: &str) -> BatchSavedState {
        BatchSavedState {
            block_height: height,
            block_hash: hash.to_string(),
        }
    }

    #[test]
    fn fresh_state_is_seeded_with_configured_granularity() {
        let state = initialize_saved_state(None, 20);
        assert_eq!(state.half_batch_size, 20);
        assert!(state.batches.is_empty());
        assert!(state.pending_txs_hash.is_empty());
    }

    #[test]
    fn unchanged_granularity_keeps_batches() {
        let saved = SavedState {
            half_batch_size: 20,
            batches: vec![batch(100, "b100"), batch(90, "b90")],
            ..SavedState::default()
        };
        let state = initialize_saved_state(Some(saved.clone()), 20);
        assert_eq!(state, saved);
    }

    #[test]
    fn redistributes_to_new_granularity_at_minimum_checkpoint() {
        // 5 windows of 20 addresses cover indices 0..=99; at a granularity of 50 that is
        // ceil(100 / 50) + 1 = 3 entries.
        let saved = SavedState {
            half_batch_size: 20,
            batches: vec![
                batch(120, "b120"),
                batch(80, "b80"),
                batch(200, "b200"),
                batch(150, "b150"),
                batch(95, "b95"),
            ],
            ..SavedState::default()
        };

        let state = initialize_saved_state(Some(saved), 50);

        assert_eq!(state.half_batch_size, 50);
        assert_eq!(state.batches.len(), 3);
        for entry in &state.batches {
            assert_eq!(entry.block_height, 80);
            assert_eq!(entry.block_hash, "b80");
        }
    }

    #[test]
    fn redistribution_preserves_pending_transactions() {
        let mut saved = SavedState {
            half_batch_size: 10,
            batches: vec![batch(5, "b5")],
            ..SavedState::default()
        };
        saved
            .pending_txs_hash
            .insert("tx1".to_string(), "op1".to_string());

        let state = initialize_saved_state(Some(saved), 40);
        assert_eq!(state.pending_txs_hash.get("tx1").map(String::as_str), Some("op1"));
    }

    #[test]
    fn reset_at_or_above_is_inclusive() {
        let mut state = SavedState {
            half_batch_size: 20,
            batches: vec![batch(50, "b50"), batch(80, "b80"), batch(120, "b120")],
            ..SavedState::default()
        };

        state.reset_batches_at_or_above(80, 50, "b50");

        assert_eq!(state.batches[0], batch(50, "b50"));
        assert_eq!(state.batches[1], batch(50, "b50"));
        assert_eq!(state.batches[2], batch(50, "b50"));
    }

    #[test]
    fn rollback_above_is_exclusive() {
        let mut state = SavedState {
            half_batch_size: 20,
            batches: vec![batch(95, "b95"), batch(100, "b100"), batch(130, "b130")],
            ..SavedState::default()
        };

        state.rollback_above(95, "b95");

        assert_eq!(state.batches[0], batch(95, "b95"));
        assert_eq!(state.batches[1], batch(95, "b95"));
        assert_eq!(state.batches[2], batch(95, "b95"));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = SavedStateEnvelope {
            version: SAVED_STATE_VERSION,
            saved_at: "2020-03-02T10:39:04Z".to_string(),
            state: SavedState {
                half_batch_size: 20,
                batches: vec![batch(1745, "b1745")],
                ..SavedState::default()
            },
        };

        let serialized = serde_json::to_string(&envelope).unwrap();
        let restored: SavedStateEnvelope = serde_json::from_str(&serialized).unwrap();
        assert_eq!(restored.version, SAVED_STATE_VERSION);
        assert_eq!(restored.state, envelope.state);
    }

    proptest! {
        #[test]
        fn redistribution_covers_old_range_at_minimum_height(
            heights in proptest::collection::vec(0u64..1_000_000, 0..20),
            old_half in 1u32..64,
            new_half in 1u32..64,
        ) {
            prop_assume!(old_half != new_half);

            let saved = SavedState {
                half_batch_size: old_half,
                batches: heights
                    .iter()
                    .map(|&height| batch(height, &format!("b{height}")))
                    .collect(),
                ..SavedState::default()
            };
            let min_height = heights.iter().copied().min().unwrap_or(0);

            let state = initialize_saved_state(Some(saved), new_half);

            let covered = heights.len() as u64 * u64::from(old_half);
            prop_assert_eq!(
                state.batches.len() as u64,
                covered.div_ceil(u64::from(new_half)) + 1
            );
            for entry in &state.batches {
                prop_assert_eq!(entry.block_height, min_height);
            }
        }
    }
}
