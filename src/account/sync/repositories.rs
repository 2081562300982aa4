//! Persistence collaborators for account synchronization.
//!
//! Two stores back a synchronization run: the chain store, a durable table of blocks and
//! per-account operations (the relational store in production deployments), and the
//! saved-state repository, a small per-account preferences store holding the checkpoint
//! state between runs. Both are abstracted behind traits so the engine and its tests run
//! against the same contract the SQL layer implements.

use crate::account::sync::saved_state::{SavedState, SavedStateEnvelope, SAVED_STATE_VERSION};
use crate::explorer::{Block, ExplorerTransaction};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// Error types for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("unsupported saved state version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// One row of the operations table: a transaction as it affects one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRecord {
    /// Stable operation identifier, derived from account uid and transaction hash.
    pub uid: String,
    pub account_uid: String,
    pub tx_hash: String,
    /// Hash of the including block, or `None` while the transaction is unconfirmed.
    pub block_hash: Option<String>,
}

/// Derive the stable uid under which a transaction's effect on an account is stored.
pub fn operation_uid(account_uid: &str, tx_hash: &str) -> String {
    format!("{account_uid}+{tx_hash}")
}

/// Durable store of blocks and per-account operations.
///
/// Upserts are idempotent: storing the same transaction twice for the same account must not
/// create a duplicate operation, only refresh its block association. `put_transactions`
/// commits a whole page atomically, which bounds the blast radius of a crash to one page.
#[async_trait::async_trait]
pub trait ChainStore: Send + Sync {
    /// Upsert a block. Returns whether the block was newly inserted.
    async fn put_block(&self, block: &Block) -> Result<bool, StoreError>;

    /// Upsert one transaction for an account, recording its block when confirmed.
    /// Returns whether a new operation row was created.
    async fn put_transaction(
        &self,
        account_uid: &str,
        tx: &ExplorerTransaction,
    ) -> Result<bool, StoreError>;

    /// Upsert a full page of transactions atomically. Returns the number of newly created
    /// operation rows.
    async fn put_transactions(
        &self,
        account_uid: &str,
        txs: &[ExplorerTransaction],
    ) -> Result<usize, StoreError>;

    /// Whether a block with the given hash is stored locally.
    async fn block_exists(&self, hash: &str) -> Result<bool, StoreError>;

    /// The highest stored block, if any.
    async fn last_block(&self) -> Result<Option<Block>, StoreError>;

    /// The highest stored block still referenced by one of the account's operations.
    async fn last_block_with_operations(
        &self,
        account_uid: &str,
    ) -> Result<Option<Block>, StoreError>;

    /// Delete every block with `height >= height`. Returns the number of deleted blocks.
    async fn delete_blocks_from(&self, height: u64) -> Result<u64, StoreError>;

    /// All operations of the account with no block association, keyed by transaction hash
    /// with the operation uid as value.
    async fn unconfirmed_operations(
        &self,
        account_uid: &str,
    ) -> Result<BTreeMap<String, String>, StoreError>;

    /// Delete one operation row. Returns whether it existed.
    async fn delete_operation(&self, operation_uid: &str) -> Result<bool, StoreError>;
}

/// Per-account store for the synchronization checkpoint state.
#[async_trait::async_trait]
pub trait SavedStateRepository: Send + Sync {
    async fn load(&self, account_uid: &str) -> Result<Option<SavedState>, StoreError>;
    async fn save(&self, account_uid: &str, state: &SavedState) -> Result<(), StoreError>;
}

#[derive(Default)]
struct ChainStoreInner {
    /// Blocks keyed by height.
    blocks: BTreeMap<u64, Block>,
    /// Operations keyed by operation uid.
    operations: BTreeMap<String, OperationRecord>,
}

impl ChainStoreInner {
    fn upsert_transaction(&mut self, account_uid: &str, tx: &ExplorerTransaction) -> bool {
        if let Some(block) = &tx.block {
            self.blocks.entry(block.height).or_insert_with(|| block.clone());
        }

        let uid = operation_uid(account_uid, &tx.hash);
        let block_hash = tx.block.as_ref().map(|block| block.hash.clone());
        match self.operations.get_mut(&uid) {
            Some(operation) => {
                if operation.block_hash != block_hash {
                    operation.block_hash = block_hash;
                }
                false
            }
            None => {
                self.operations.insert(
                    uid.clone(),
                    OperationRecord {
                        uid,
                        account_uid: account_uid.to_string(),
                        tx_hash: tx.hash.clone(),
                        block_hash,
                    },
                );
                true
            }
        }
    }
}

/// In-memory implementation of [`ChainStore`].
///
/// Reference implementation of the contract the relational store provides in production;
/// also what the engine's tests run against.
#[derive(Default)]
pub struct MemoryChainStore {
    inner: Mutex<ChainStoreInner>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations stored for the account.
    pub fn operation_count(&self, account_uid: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .operations
            .values()
            .filter(|operation| operation.account_uid == account_uid)
            .count()
    }

    /// Look up one operation row by uid.
    pub fn operation(&self, operation_uid: &str) -> Option<OperationRecord> {
        self.inner.lock().unwrap().operations.get(operation_uid).cloned()
    }

    /// Snapshot of all stored block heights, ascending.
    pub fn block_heights(&self) -> Vec<u64> {
        self.inner.lock().unwrap().blocks.keys().copied().collect()
    }
}

#[async_trait::async_trait]
impl ChainStore for MemoryChainStore {
    async fn put_block(&self, block: &Block) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let newly = !inner.blocks.contains_key(&block.height);
        inner.blocks.insert(block.height, block.clone());
        Ok(newly)
    }

    async fn put_transaction(
        &self,
        account_uid: &str,
        tx: &ExplorerTransaction,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.upsert_transaction(account_uid, tx))
    }

    async fn put_transactions(
        &self,
        account_uid: &str,
        txs: &[ExplorerTransaction],
    ) -> Result<usize, StoreError> {
        // One lock acquisition per page stands in for the SQL layer's one transaction per
        // page.
        let mut inner = self.inner.lock().unwrap();
        let newly = txs
            .iter()
            .filter(|tx| inner.upsert_transaction(account_uid, tx))
            .count();
        Ok(newly)
    }

    async fn block_exists(&self, hash: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.blocks.values().any(|block| block.hash == hash))
    }

    async fn last_block(&self) -> Result<Option<Block>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.blocks.values().next_back().cloned())
    }

    async fn last_block_with_operations(
        &self,
        account_uid: &str,
    ) -> Result<Option<Block>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let referenced: Vec<&str> = inner
            .operations
            .values()
            .filter(|operation| operation.account_uid == account_uid)
            .filter_map(|operation| operation.block_hash.as_deref())
            .collect();

        Ok(inner
            .blocks
            .values()
            .rev()
            .find(|block| referenced.contains(&block.hash.as_str()))
            .cloned())
    }

    async fn delete_blocks_from(&self, height: u64) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.blocks.split_off(&height);
        Ok(removed.len() as u64)
    }

    async fn unconfirmed_operations(
        &self,
        account_uid: &str,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .operations
            .values()
            .filter(|operation| {
                operation.account_uid == account_uid && operation.block_hash.is_none()
            })
            .map(|operation| (operation.tx_hash.clone(), operation.uid.clone()))
            .collect())
    }

    async fn delete_operation(&self, operation_uid: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.operations.remove(operation_uid).is_some())
    }
}

/// File-based implementation of [`SavedStateRepository`].
///
/// One versioned JSON file per account under `data_dir`.
pub struct FileSavedStateRepository {
    data_dir: PathBuf,
}

impl FileSavedStateRepository {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn state_filename(&self, account_uid: &str) -> PathBuf {
        self.data_dir
            .join(format!("sync_state_{}.json", hex::encode(account_uid)))
    }
}

#[async_trait::async_trait]
impl SavedStateRepository for FileSavedStateRepository {
    async fn load(&self, account_uid: &str) -> Result<Option<SavedState>, StoreError> {
        let filename = self.state_filename(account_uid);
        if !filename.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&filename).await?;
        let envelope: SavedStateEnvelope = serde_json::from_str(&content)?;
        if envelope.version != SAVED_STATE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: envelope.version,
                expected: SAVED_STATE_VERSION,
            });
        }

        debug!("Loaded synchronization state from {:?}", filename);
        Ok(Some(envelope.state))
    }

    async fn save(&self, account_uid: &str, state: &SavedState) -> Result<(), StoreError> {
        let envelope = SavedStateEnvelope {
            version: SAVED_STATE_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            state: state.clone(),
        };

        let filename = self.state_filename(account_uid);
        let content = serde_json::to_string_pretty(&envelope)?;
        tokio::fs::write(&filename, content).await?;

        info!("Saved synchronization state to {:?}", filename);
        Ok(())
    }
}

/// In-memory implementation of [`SavedStateRepository`].
#[derive(Default)]
pub struct MemorySavedStateRepository {
    states: Mutex<HashMap<String, SavedState>>,
}

impl MemorySavedStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SavedStateRepository for MemorySavedStateRepository {
    async fn load(&self, account_uid: &str) -> Result<Option<SavedState>, StoreError> {
        Ok(self.states.lock().unwrap().get(account_uid).cloned())
    }

    async fn save(&self, account_uid: &str, state: &SavedState) -> Result<(), StoreError> {
        self.states
            .lock()
            .unwrap()
            .insert(account_uid.to_string(), state.clone());
        Ok(())
    }
}
