//! Contract with the node RPC client.
//!
//! The signer never talks to the network itself; everything it needs from
//! the chain goes through [`NodeClient`]. Calls are blocking from the
//! signer's point of view and timeouts belong to the implementation.

use chain_btc::utxo::Utxo;
use serde::Deserialize;

use crate::error::NodeError;

/// Result of the node's `createmultisig`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MultisigDescriptor {
    pub address: String,
    /// Hex-encoded redeem script.
    #[serde(rename = "redeemScript")]
    pub redeem_script: String,
}

pub trait NodeClient: Send + Sync {
    /// Unspent outputs of `addresses` with a confirmation count in
    /// `min_confirmations..=max_confirmations`, in node order.
    fn list_unspent(
        &self,
        addresses: &[String],
        min_confirmations: u32,
        max_confirmations: u32,
    ) -> Result<Vec<Utxo>, NodeError>;

    /// Raw transaction hex for `txid`.
    fn get_raw_transaction(&self, txid: &str) -> Result<String, NodeError>;

    /// Broadcast a raw transaction and return its txid.
    fn send_raw_transaction(&self, tx_hex: &str) -> Result<String, NodeError>;

    /// Chain name as reported by `getblockchaininfo` (`main`, `test`, ...).
    fn chain_name(&self) -> Result<String, NodeError>;

    /// Start watching `address`.
    fn import_address(&self, address: &str, label: &str, rescan: bool) -> Result<(), NodeError>;

    /// Canonical M-of-N descriptor for `public_keys` (hex).
    fn create_multisig(
        &self,
        required: usize,
        public_keys: &[String],
    ) -> Result<MultisigDescriptor, NodeError>;

    /// Every address the node currently watches.
    fn list_watched_addresses(&self) -> Result<Vec<String>, NodeError>;

    /// Hex redeem script the node knows for a P2SH address, if any.
    fn get_redeem_script(&self, address: &str) -> Result<Option<String>, NodeError>;
}
