//! Bitcoin-family chain support for the custodial signing service.
//!
//! Provides the legacy (non-SegWit) wire codec for transactions, scripts and
//! variable-length integers, deterministic key and base58check address
//! derivation, greedy UTXO selection with size-based fee estimation, and the
//! staged signing engine for P2PKH and P2SH multisig inputs.

pub mod address;
pub mod error;
pub mod keys;
pub mod network;
pub mod script;
pub mod signing;
pub mod transaction;
pub mod utxo;
pub mod varint;
