//! Orchestration layer of the custodial signing service.
//!
//! [`Wallet`] ties the chain primitives in `chain-btc` to a node RPC client:
//! it issues deterministic per-user addresses, builds spends, and runs the
//! staged signing protocol in which each cosigner contributes signatures
//! independently. Redeem scripts for P2SH addresses live in a shared
//! [`KeyStore`](store::KeyStore) that a background task keeps in sync with
//! the node.

pub mod config;
pub mod discovery;
pub mod error;
pub mod node;
pub mod store;
pub mod types;
pub mod wallet;

pub use config::WalletConfig;
pub use error::{NodeError, WalletError};
pub use node::{MultisigDescriptor, NodeClient};
pub use types::TransactionView;
pub use wallet::Wallet;
