use std::collections::HashMap;

use parking_lot::RwLock;

/// In-memory state shared by the wallet and its discovery task.
///
/// Both maps are add-only: an entry, once written, is never replaced or
/// evicted. Locks are held only for the map operation itself.
#[derive(Debug, Default)]
pub struct KeyStore {
    /// P2SH address -> redeem script.
    redeem_scripts: RwLock<HashMap<String, Vec<u8>>>,
    /// Issued address -> derivation round that produced its key.
    address_rounds: RwLock<HashMap<String, u32>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `redeem_script` for `address`. Returns `false` if the address
    /// already had one (which is kept).
    pub fn insert_redeem_script(&self, address: &str, redeem_script: Vec<u8>) -> bool {
        let mut scripts = self.redeem_scripts.write();
        if scripts.contains_key(address) {
            return false;
        }
        scripts.insert(address.to_string(), redeem_script);
        true
    }

    pub fn redeem_script(&self, address: &str) -> Option<Vec<u8>> {
        self.redeem_scripts.read().get(address).cloned()
    }

    pub fn has_redeem_script(&self, address: &str) -> bool {
        self.redeem_scripts.read().contains_key(address)
    }

    pub fn redeem_script_count(&self) -> usize {
        self.redeem_scripts.read().len()
    }

    /// Record that `address` was issued from derivation round `round`.
    /// Returns `false` if the address was already recorded.
    pub fn record_round(&self, address: &str, round: u32) -> bool {
        let mut rounds = self.address_rounds.write();
        if rounds.contains_key(address) {
            return false;
        }
        rounds.insert(address.to_string(), round);
        true
    }

    pub fn round_for(&self, address: &str) -> Option<u32> {
        self.address_rounds.read().get(address).copied()
    }

    pub fn is_issued(&self, address: &str) -> bool {
        self.address_rounds.read().contains_key(address)
    }

    pub fn issued_count(&self) -> usize {
        self.address_rounds.read().len()
    }
}
