pub mod sync;
pub mod types;

pub use sync::AccountSynchronizer;
pub use types::*;

use crate::keychain::Keychain;
use rand::Rng;
use std::sync::Arc;

/// How an account's keychain maps to observable addresses.
///
/// Some currencies derive one address per account (the account-based model) while others
/// discover funds across a growing range of derived addresses. The synchronizer only extends
/// past the first address window for the latter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressModel {
    /// One address per account; batch iteration never extends past the first window.
    Single,
    /// Multiple discoverable addresses; batch iteration follows activity and lookahead.
    Multiple,
}

/// An account handed to the synchronizer.
///
/// This is a data holder: keys, balances and transaction building live elsewhere. The uid is
/// the stable identifier under which operations and checkpoints are persisted.
#[derive(Clone)]
pub struct Account {
    pub uid: String,
    pub index: u32,
    pub wallet_name: String,
    pub currency: String,
    pub address_model: AddressModel,
    keychain: Arc<dyn Keychain>,
}

impl Account {
    pub fn new(
        uid: impl Into<String>,
        index: u32,
        wallet_name: impl Into<String>,
        currency: impl Into<String>,
        address_model: AddressModel,
        keychain: Arc<dyn Keychain>,
    ) -> Self {
        Self {
            uid: uid.into(),
            index,
            wallet_name: wallet_name.into(),
            currency: currency.into(),
            address_model,
            keychain,
        }
    }

    pub fn keychain(&self) -> &Arc<dyn Keychain> {
        &self.keychain
    }

    pub fn has_multiple_addresses(&self) -> bool {
        self.address_model == AddressModel::Multiple
    }
}

pub fn generate_account_uid() -> String {
    let mut uid = [0u8; 16];
    rand::rng().fill(&mut uid);
    hex::encode(uid)
}
