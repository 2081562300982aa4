//! Blockchain explorer integration module
//!
//! This module provides the client and types for interacting with a remote transaction-indexing
//! explorer. The explorer tracks chain state and exposes paginated transaction history for a set
//! of watched addresses, the current chain head, and a session mechanism scoping paginated
//! queries.

/// HTTP client for the explorer service
mod client;
/// Type definitions for explorer data structures
mod types;

pub use client::HttpExplorer;
pub use types::*;

/// Interface the synchronizer consumes from an explorer service.
///
/// [`HttpExplorer`] is the production implementation; tests script their own.
#[async_trait::async_trait]
pub trait Explorer: Send + Sync {
    /// Open a session and return its opaque token.
    async fn start_session(&self) -> Result<SessionToken, ExplorerError>;

    /// Close a previously opened session.
    async fn kill_session(&self, token: &SessionToken) -> Result<(), ExplorerError>;

    /// Fetch one page of transaction history for `addresses`, starting after `from_height`.
    async fn get_transactions(
        &self,
        addresses: &[String],
        from_height: u64,
        token: Option<&SessionToken>,
    ) -> Result<TransactionsBulk, ExplorerError>;

    /// Fetch the current chain head.
    async fn get_current_block(&self) -> Result<Block, ExplorerError>;
}
