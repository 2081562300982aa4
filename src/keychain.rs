//! Keychain collaborator interface.
//!
//! Address derivation itself (BIP32-style key trees, address codecs) lives in dedicated format
//! libraries; the synchronizer only needs the ability to enumerate the observable addresses of
//! a contiguous window of derivation indices.

/// Deterministic address source for an account.
pub trait Keychain: Send + Sync {
    /// Return the observable address strings for derivation indices `from..=to`.
    fn get_all_observable_addresses(&self, from: u32, to: u32) -> Vec<String>;

    /// The key the account can be restored from, used for logging and diagnostics.
    fn restore_key(&self) -> &str;
}

/// Keychain deriving one address string per index under a fixed prefix.
///
/// This is a format-only stand-in for a real derivation scheme: the address at index `i` is
/// `"{prefix}{i}"`. Sufficient for driving window-based synchronization and for account models
/// whose real keychain is injected by the embedding wallet.
pub struct IndexedKeychain {
    restore_key: String,
    prefix: String,
}

impl IndexedKeychain {
    pub fn new(restore_key: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            restore_key: restore_key.into(),
            prefix: prefix.into(),
        }
    }
}

impl Keychain for IndexedKeychain {
    fn get_all_observable_addresses(&self, from: u32, to: u32) -> Vec<String> {
        (from..=to).map(|i| format!("{}{}", self.prefix, i)).collect()
    }

    fn restore_key(&self) -> &str {
        &self.restore_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_the_requested_window() {
        let keychain = IndexedKeychain::new("xpub-test", "addr");
        let addresses = keychain.get_all_observable_addresses(20, 39);
        assert_eq!(addresses.len(), 20);
        assert_eq!(addresses.first().map(String::as_str), Some("addr20"));
        assert_eq!(addresses.last().map(String::as_str), Some("addr39"));
    }
}
