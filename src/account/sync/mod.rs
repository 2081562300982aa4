//! Account Synchronization Module
//!
//! This module provides all the core logic and services for synchronizing an account with a
//! remote blockchain explorer. It is composed of several submodules, each responsible for a
//! specific aspect of the sync process:
//!
//! - `synchronizer`: The batch/reorg engine. Gates one run per account, iterates address
//!   windows, paginates the explorer, persists page by page and recovers from chain
//!   reorganizations.
//! - `saved_state`: The persisted checkpoint state, its versioned envelope, and the
//!   redistribution logic applied when the window granularity changes.
//! - `repositories`: Persistence collaborators: the chain store contract (blocks and
//!   operations) and the per-account saved-state repository.
//! - `events`: Event types and the dispatcher decoupling the engine from upstream consumers.
//! - `progress_tracker`: Tracks run progress and produces final statistics.
//! - `notifier`: The completion handle callers subscribe to.
//!
//! Checkpoints are committed after every batch, not only at run end, so an interrupted run
//! resumes near where it stopped.

/// Event system for decoupled communication during sync
pub mod events;
/// Completion notification for synchronization runs
pub mod notifier;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Persistence collaborators: chain store and saved-state repository
pub mod repositories;
/// Persisted checkpoint state and redistribution
pub mod saved_state;
/// The batch/reorg synchronization engine
pub mod synchronizer;

pub use synchronizer::*;
