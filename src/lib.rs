//! Multi-currency wallet account synchronization engine.
//!
//! This crate implements the synchronization core of a wallet engine: it fetches transaction
//! history from a remote blockchain explorer in batches, reconciles it against locally
//! persisted state, detects and recovers from chain reorganizations, and maintains resumable
//! per-account progress checkpoints.
//!
//! The entry point is [`account::AccountSynchronizer::synchronize_account`], which gates one
//! run per account and returns a [`account::sync::notifier::ProgressNotifier`] resolving with
//! the run's outcome. Address derivation, transaction serialization and the SQL layer are
//! external collaborators consumed through the [`keychain::Keychain`],
//! [`explorer::Explorer`] and [`account::sync::repositories::ChainStore`] interfaces.

pub mod account;
pub mod explorer;
pub mod keychain;
pub mod utils;

pub use account::sync::notifier::{ProgressNotifier, SyncOutcome};
pub use account::sync::repositories::{
    ChainStore, FileSavedStateRepository, MemoryChainStore, MemorySavedStateRepository,
    SavedStateRepository, StoreError,
};
pub use account::sync::saved_state::{BatchSavedState, SavedState};
pub use account::{Account, AccountSynchronizer, AddressModel, SyncError};
pub use account::sync::SyncConfig;
pub use explorer::{Explorer, ExplorerError, HttpExplorer};
pub use keychain::{IndexedKeychain, Keychain};
