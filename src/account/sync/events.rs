//! Event system for account synchronization.
//!
//! This module defines the event types, the event handler trait, and the dispatcher used
//! throughout a synchronization run. Events decouple the engine from upstream consumers
//! (UI refresh, metrics, logging): the synchronizer emits them at meaningful points and
//! registered handlers react independently.

use crate::account::sync::progress_tracker::SyncStats;
use crate::account::SyncError;
use std::sync::Arc;

/// Events that occur during account synchronization
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A synchronization run has started
    SyncStarted { account_uid: String },
    /// One page of transactions was fetched and persisted
    OperationsSynchronized {
        account_uid: String,
        batch_index: u32,
        /// Transactions in the page.
        count: usize,
        /// Operation rows newly created by the page.
        newly_inserted: usize,
    },
    /// An error occurred during sync; `recoverable` is true for reorg recovery
    SyncError { error: String, recoverable: bool },
    /// Sync has completed
    SyncCompleted {
        account_uid: String,
        stats: SyncStats,
    },
}

/// Trait for handling sync events.
///
/// Implementors receive all sync events and can perform side effects or state updates.
/// Handlers are shared across a run, so interior mutability is on the implementor.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    /// Handle a sync event.
    async fn handle(&self, event: &SyncEvent) -> Result<(), SyncError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order for each event. Errors from handlers are
/// logged but do not stop other handlers from running.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn SyncEventHandler>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher over an existing handler set.
    pub fn with_handlers(handlers: Vec<Arc<dyn SyncEventHandler>>) -> Self {
        Self { handlers }
    }

    /// Register a new event handler.
    pub fn register_handler(&mut self, handler: Arc<dyn SyncEventHandler>) {
        self.handlers.push(handler);
    }

    /// Dispatch an event to all registered handlers.
    pub async fn dispatch(&self, event: &SyncEvent) {
        for handler in &self.handlers {
            if let Err(e) = handler.handle(event).await {
                tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
                // Continue processing with other handlers
            }
        }
    }
}
