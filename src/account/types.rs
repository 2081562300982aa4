use crate::account::sync::repositories::StoreError;
use crate::explorer::ExplorerError;

/// Error types for account synchronization
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("explorer error: {0}")]
    ExplorerError(#[from] ExplorerError),

    #[error("storage error: {0}")]
    StoreError(#[from] StoreError),

    #[error("this synchronizer is already in use")]
    SynchronizerBusy,

    #[error("synchronization ended before completion")]
    Aborted,
}
