//! Types for the blockchain explorer API

use serde::{Deserialize, Serialize};

/// A block as reported by the explorer or stored locally.
///
/// The `(height, hash)` pair is what the synchronizer checkpoints on; `time` is kept as the
/// RFC 3339 string the explorer returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block hash.
    pub hash: String,
    /// The block height.
    pub height: u64,
    /// Block timestamp, RFC 3339.
    pub time: String,
}

/// A transaction as returned by the explorer for a set of watched addresses.
///
/// Serialization details of the transaction body are handled elsewhere; the synchronizer only
/// needs the hash, the confirmation block (absent while the transaction sits in the mempool)
/// and a few descriptive fields carried through to persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerTransaction {
    /// The transaction hash.
    pub hash: String,
    /// When the explorer first saw the transaction, RFC 3339.
    #[serde(rename = "receivedAt")]
    pub received_at: String,
    /// The block including this transaction, or `None` while unconfirmed.
    pub block: Option<Block>,
    /// Optional fee amount, as a decimal string.
    pub fees: Option<String>,
    /// Optional transaction memo.
    pub memo: Option<String>,
}

/// One page of transaction history for a batch of addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsBulk {
    /// The transactions of this page, oldest first.
    #[serde(rename = "txs")]
    pub transactions: Vec<ExplorerTransaction>,
    /// Whether another page must be fetched to exhaust the history.
    #[serde(rename = "truncated")]
    pub has_next: bool,
}

/// Opaque session handle returned by the explorer to scope a sequence of paginated requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token for request headers.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Error types for explorer operations and session management
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("explorer error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("block not found at height {height}")]
    BlockNotFound { height: u64 },

    #[error("no data returned")]
    NoData,

    #[error("session error: {0}")]
    SessionError(String),
}
