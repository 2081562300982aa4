//! Account synchronizer: the batch/reorg engine.
//!
//! One synchronizer instance serializes all synchronization work for one account at a time.
//! A run loads the persisted checkpoint state, repairs damage left by reorganizations that
//! happened between runs, then walks the address space in fixed-size windows. Each window is
//! paginated through the explorer and persisted page by page, with the checkpoint state
//! committed back after every batch so a crash loses at most one batch of progress. A
//! mid-run "block not found" signal is handled as a chain reorganization: stale local blocks
//! are deleted, every checkpoint is rolled back to the last surviving block, and the same
//! batch is retried.

use crate::account::sync::events::{EventDispatcher, SyncEvent, SyncEventHandler};
use crate::account::sync::notifier::{self, ProgressNotifier};
use crate::account::sync::progress_tracker::SyncProgressTracker;
use crate::account::sync::repositories::{ChainStore, SavedStateRepository};
use crate::account::sync::saved_state::{initialize_saved_state, BatchSavedState, SavedState};
use crate::account::{Account, SyncError};
use crate::explorer::{Explorer, ExplorerError, SessionToken};
use crate::utils::format_duration;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Configuration for the synchronizer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Width of one address window, in consecutive derivation indices.
    pub half_batch_size: u32,
    /// How far past the last discovered address the keychain lookahead extends.
    pub observable_range: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            half_batch_size: 20,
            observable_range: 20,
        }
    }
}

/// Outcome of synchronizing one batch.
enum BatchOutcome {
    /// The batch was paginated to exhaustion.
    Completed { had_transactions: bool },
    /// The explorer no longer knows the checkpoint block: a reorganization happened at or
    /// below `height`.
    Reorg { height: u64 },
}

/// Per-run context threading together the account, its checkpoint state, the explorer
/// session and the pending-transaction bookkeeping.
///
/// Owned by the run task; all mutation happens there, so no field needs a lock.
struct SynchronizationBuddy {
    account: Account,
    start_date: DateTime<Utc>,
    half_batch_size: u32,
    saved_state: SavedState,
    token: Option<SessionToken>,
    /// Operations stored without a block as of run start, keyed by transaction hash with
    /// the operation uid as value. Candidates for deletion unless re-observed.
    transactions_to_drop: BTreeMap<String, String>,
    progress: SyncProgressTracker,
    events: EventDispatcher,
}

struct ActiveRun {
    account_uid: String,
    notifier: ProgressNotifier,
}

/// Drives synchronization runs for one account at a time.
///
/// Cheap to clone; clones share the single-flight gate and the registered handlers.
#[derive(Clone)]
pub struct AccountSynchronizer {
    inner: Arc<SynchronizerInner>,
}

struct SynchronizerInner {
    explorer: Arc<dyn Explorer>,
    chain_store: Arc<dyn ChainStore>,
    saved_states: Arc<dyn SavedStateRepository>,
    config: SyncConfig,
    handlers: Mutex<Vec<Arc<dyn SyncEventHandler>>>,
    /// The one piece of state shared between call sites and the run task: which account is
    /// currently running, and the notifier callers join on.
    current: Mutex<Option<ActiveRun>>,
}

impl AccountSynchronizer {
    pub fn new(
        explorer: Arc<dyn Explorer>,
        chain_store: Arc<dyn ChainStore>,
        saved_states: Arc<dyn SavedStateRepository>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SynchronizerInner {
                explorer,
                chain_store,
                saved_states,
                config,
                handlers: Mutex::new(Vec::new()),
                current: Mutex::new(None),
            }),
        }
    }

    /// Register an event handler notified by every subsequent run.
    pub fn register_handler(&self, handler: Arc<dyn SyncEventHandler>) {
        self.inner.handlers.lock().unwrap().push(handler);
    }

    /// Start synchronizing `account`, or join the run already in flight for it.
    ///
    /// Returns a notifier resolving with the run's outcome. If the synchronizer is busy
    /// with a *different* account, fails immediately with
    /// [`SyncError::SynchronizerBusy`] without starting any work.
    pub fn synchronize_account(&self, account: &Account) -> Result<ProgressNotifier, SyncError> {
        let mut current = self.inner.current.lock().unwrap();
        if let Some(run) = current.as_ref() {
            if run.account_uid == account.uid {
                return Ok(run.notifier.clone());
            }
            return Err(SyncError::SynchronizerBusy);
        }

        let (handle, notifier) = notifier::channel();
        *current = Some(ActiveRun {
            account_uid: account.uid.clone(),
            notifier: notifier.clone(),
        });
        drop(current);

        let inner = Arc::clone(&self.inner);
        let account = account.clone();
        tokio::spawn(async move {
            let result = inner.perform_synchronization(account).await;
            // Clear the active-run marker before resolving, so a new run can start as soon
            // as the notifier fires.
            inner.current.lock().unwrap().take();
            handle.resolve(result);
        });

        Ok(notifier)
    }
}

impl SynchronizerInner {
    fn dispatcher_snapshot(&self) -> EventDispatcher {
        EventDispatcher::with_handlers(self.handlers.lock().unwrap().clone())
    }

    async fn perform_synchronization(&self, account: Account) -> Result<(), SyncError> {
        let start_date = Utc::now();
        let half_batch_size = self.config.half_batch_size.max(1);
        info!(
            "Starting synchronization for account#{} ({}) of wallet {}",
            account.index,
            account.keychain().restore_key(),
            account.wallet_name
        );

        let mut saved_state = self.saved_states.load(&account.uid).await?;
        if let Some(state) = saved_state.as_mut() {
            self.repair_checkpoints(&account, state).await?;
        }
        let saved_state = initialize_saved_state(saved_state, half_batch_size);

        let transactions_to_drop = self.chain_store.unconfirmed_operations(&account.uid).await?;
        debug!(
            "{} unconfirmed operations are candidates for dropping",
            transactions_to_drop.len()
        );

        let mut buddy = SynchronizationBuddy {
            start_date,
            half_batch_size,
            saved_state,
            token: None,
            transactions_to_drop,
            progress: SyncProgressTracker::new(),
            events: self.dispatcher_snapshot(),
            account,
        };

        let started = SyncEvent::SyncStarted {
            account_uid: buddy.account.uid.clone(),
        };
        buddy.events.dispatch(&started).await;

        self.update_current_block().await;

        let token = self.explorer.start_session().await?;
        info!("Synchronization token obtained");
        buddy.token = Some(token);

        let sync_result = self.synchronize_batches(&mut buddy).await;

        // The session is closed on every exit path; teardown failures do not decide the
        // run's outcome.
        if let Some(token) = buddy.token.take() {
            if let Err(err) = self.explorer.kill_session(&token).await {
                warn!("Failed to close explorer session: {err}");
            }
        }

        match sync_result {
            Ok(()) => {
                self.purge_dropped_transactions(&buddy).await?;

                let duration = (Utc::now() - buddy.start_date).num_milliseconds();
                buddy.progress.log_progress(true);
                let stats = buddy.progress.stats();
                info!(
                    "End synchronization for account#{} of wallet {} in {}: {}",
                    buddy.account.index,
                    buddy.account.wallet_name,
                    format_duration(duration),
                    stats.summary()
                );

                let completed = SyncEvent::SyncCompleted {
                    account_uid: buddy.account.uid.clone(),
                    stats,
                };
                buddy.events.dispatch(&completed).await;
                Ok(())
            }
            Err(err) => {
                let duration = (Utc::now() - buddy.start_date).num_milliseconds();
                error!(
                    "Error during synchronization for account#{} of wallet {} in {}: {err}",
                    buddy.account.index,
                    buddy.account.wallet_name,
                    format_duration(duration)
                );

                let failed = SyncEvent::SyncError {
                    error: err.to_string(),
                    recoverable: false,
                };
                buddy.events.dispatch(&failed).await;
                Err(err)
            }
        }
    }

    /// Repair checkpoint drift from reorganizations that happened between runs.
    ///
    /// Walks the batches by ascending checkpoint height; the first whose block hash is no
    /// longer stored locally marks the failed height. Every batch at or above it is reset
    /// to the most recent local block still carrying operations of this account.
    async fn repair_checkpoints(
        &self,
        account: &Account,
        state: &mut SavedState,
    ) -> Result<(), SyncError> {
        let mut sorted = state.batches.clone();
        sorted.sort_by_key(|batch| batch.block_height);

        // A reorg cannot reach below the genesis block, so 0 means "no failure".
        let mut failed_height = 0u64;
        for batch in &sorted {
            if !self.chain_store.block_exists(&batch.block_hash).await? {
                failed_height = batch.block_height;
                break;
            }
        }
        if failed_height == 0 {
            return Ok(());
        }

        warn!(
            "Checkpoints reference a block missing locally; repairing batches from height {}",
            failed_height
        );
        let recovery = self
            .chain_store
            .last_block_with_operations(&account.uid)
            .await?;
        let (recovery_height, recovery_hash) = recovery
            .map(|block| (block.height, block.hash))
            .unwrap_or((0, String::new()));
        state.reset_batches_at_or_above(failed_height, recovery_height, &recovery_hash);

        Ok(())
    }

    /// Iterate over address windows until the account's address space is exhausted.
    async fn synchronize_batches(&self, buddy: &mut SynchronizationBuddy) -> Result<(), SyncError> {
        let mut batch_index: u32 = 0;
        loop {
            debug!("Synchronizing batch {batch_index}");
            let batches = &mut buddy.saved_state.batches;
            let done = !batches.is_empty() && batch_index as usize >= batches.len() - 1;
            if batch_index as usize >= batches.len() {
                batches.push(BatchSavedState::default());
            }

            match self.synchronize_batch(batch_index, buddy).await? {
                BatchOutcome::Completed { had_transactions } => {
                    self.saved_states
                        .save(&buddy.account.uid, &buddy.saved_state)
                        .await?;
                    buddy.progress.record_batch();

                    // Sync stops when no further batches exist and the last one was empty,
                    // unless the configured observable range still extends past the
                    // discovered addresses. Single-address account models never extend.
                    let discovered_addresses = batch_index * buddy.half_batch_size;
                    let last_discoverable_address = self.config.observable_range;
                    if buddy.account.has_multiple_addresses()
                        && (!done
                            || had_transactions
                            || last_discoverable_address > discovered_addresses)
                    {
                        batch_index += 1;
                        continue;
                    }
                    return Ok(());
                }
                BatchOutcome::Reorg { height } => {
                    info!("Recovering from reorganization at height {height}");
                    let recovering = SyncEvent::SyncError {
                        error: format!("block not found at height {height}"),
                        recoverable: true,
                    };
                    buddy.events.dispatch(&recovering).await;

                    if height == 0 {
                        // Nothing to roll back below genesis; the fresh checkpoints
                        // already force a full resync.
                        return Ok(());
                    }

                    let deleted = self.chain_store.delete_blocks_from(height).await?;
                    debug!("Deleted {deleted} local blocks at height >= {height}");

                    let last_block = self.chain_store.last_block().await?;
                    let (last_height, last_hash) = last_block
                        .map(|block| (block.height, block.hash))
                        .unwrap_or((0, String::new()));
                    buddy.saved_state.rollback_above(last_height, &last_hash);
                    self.saved_states
                        .save(&buddy.account.uid, &buddy.saved_state)
                        .await?;
                    buddy.progress.record_reorg();

                    // Retry the same batch. If this checkpoint was not the deepest block
                    // of the reorg, the next attempt fails again and digs deeper.
                    info!("Relaunching synchronization of batch {batch_index}");
                }
            }
        }
    }

    /// Paginate one address window through the explorer until exhausted, persisting each
    /// page and advancing the batch checkpoint.
    async fn synchronize_batch(
        &self,
        batch_index: u32,
        buddy: &mut SynchronizationBuddy,
    ) -> Result<BatchOutcome, SyncError> {
        let from_index = batch_index * buddy.half_batch_size;
        let to_index = (batch_index + 1) * buddy.half_batch_size - 1;
        let addresses = buddy
            .account
            .keychain()
            .get_all_observable_addresses(from_index, to_index);

        let mut had_transactions = false;
        loop {
            let from_height = buddy.saved_state.batches[batch_index as usize].block_height;
            let bulk = match self
                .explorer
                .get_transactions(&addresses, from_height, buddy.token.as_ref())
                .await
            {
                Ok(bulk) => bulk,
                Err(ExplorerError::BlockNotFound { .. }) => {
                    return Ok(BatchOutcome::Reorg {
                        height: from_height,
                    });
                }
                Err(err) => return Err(err.into()),
            };
            debug!(
                "Got {} transactions for batch {batch_index}",
                bulk.transactions.len()
            );

            let newly_inserted = self
                .chain_store
                .put_transactions(&buddy.account.uid, &bulk.transactions)
                .await?;

            for tx in &bulk.transactions {
                if let Some(operation_uid) = buddy.transactions_to_drop.remove(&tx.hash) {
                    if tx.block.is_some() {
                        // Confirmed after all: no longer pending.
                        buddy.saved_state.pending_txs_hash.remove(&tx.hash);
                    } else {
                        // Still in the mempool: keep it across the end-of-run cleanup.
                        buddy
                            .saved_state
                            .pending_txs_hash
                            .insert(tx.hash.clone(), operation_uid);
                    }
                }
            }

            let synchronized = SyncEvent::OperationsSynchronized {
                account_uid: buddy.account.uid.clone(),
                batch_index,
                count: bulk.transactions.len(),
                newly_inserted,
            };
            buddy.events.dispatch(&synchronized).await;
            buddy.progress.record_page(bulk.transactions.len(), newly_inserted);
            buddy.progress.log_progress(false);

            if let Some(block) = bulk.transactions.last().and_then(|tx| tx.block.as_ref()) {
                let batch_state = &mut buddy.saved_state.batches[batch_index as usize];
                batch_state.block_height = block.height;
                batch_state.block_hash = block.hash.clone();
                buddy.progress.record_block_height(block.height);
            }

            had_transactions = had_transactions || !bulk.transactions.is_empty();
            if bulk.has_next {
                // Step past the checkpoint block before the next page; a block only
                // partially covered by this page is refetched on the next run.
                buddy.saved_state.batches[batch_index as usize].block_height += 1;
                continue;
            }
            return Ok(BatchOutcome::Completed { had_transactions });
        }
    }

    /// Best-effort refresh of the locally cached chain head; failure never aborts the run.
    async fn update_current_block(&self) {
        match self.explorer.get_current_block().await {
            Ok(block) => {
                if let Err(err) = self.chain_store.put_block(&block).await {
                    warn!("Failed to store current block: {err}");
                }
            }
            Err(err) => warn!("Failed to refresh current block: {err}"),
        }
    }

    /// Delete operations that were unconfirmed at run start, were never re-observed, and
    /// are not known to still be pending.
    async fn purge_dropped_transactions(
        &self,
        buddy: &SynchronizationBuddy,
    ) -> Result<(), SyncError> {
        for (tx_hash, operation_uid) in &buddy.transactions_to_drop {
            if buddy.saved_state.pending_txs_hash.contains_key(tx_hash) {
                continue;
            }
            info!("Dropping transaction {tx_hash}, deleting operation {operation_uid}");
            self.chain_store.delete_operation(operation_uid).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_keychain_observable_range() {
        let config = SyncConfig::default();
        assert_eq!(config.half_batch_size, 20);
        assert_eq!(config.observable_range, 20);
    }
}
