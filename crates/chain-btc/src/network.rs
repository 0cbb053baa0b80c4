use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BtcError;

/// Version byte for mainnet pay-to-pubkey-hash addresses (`1...`).
pub const P2PKH_MAINNET: u8 = 0x00;
/// Version byte for testnet pay-to-pubkey-hash addresses (`m...`/`n...`).
pub const P2PKH_TESTNET: u8 = 0x6F;
/// Version byte for mainnet pay-to-script-hash addresses (`3...`).
pub const P2SH_MAINNET: u8 = 0x05;
/// Version byte for testnet pay-to-script-hash addresses (`2...`).
pub const P2SH_TESTNET: u8 = 0xC4;
/// Version byte for mainnet WIF private keys.
pub const PRIVATE_KEY_MAINNET: u8 = 0x80;
/// Version byte for testnet WIF private keys.
pub const PRIVATE_KEY_TESTNET: u8 = 0xEF;

/// Supported Bitcoin networks.
///
/// Signet and regtest share the testnet version bytes and map to `Testnet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
}

impl BtcNetwork {
    /// Map a node's reported chain name (`getblockchaininfo.chain`) to a network.
    pub fn from_chain_name(chain: &str) -> Option<Self> {
        match chain.trim().to_ascii_lowercase().as_str() {
            "main" | "mainnet" | "bitcoin" => Some(BtcNetwork::Mainnet),
            "test" | "testnet" | "testnet3" | "testnet4" | "signet" | "regtest" => {
                Some(BtcNetwork::Testnet)
            }
            _ => None,
        }
    }

    pub fn p2pkh_version(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => P2PKH_MAINNET,
            BtcNetwork::Testnet => P2PKH_TESTNET,
        }
    }

    pub fn p2sh_version(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => P2SH_MAINNET,
            BtcNetwork::Testnet => P2SH_TESTNET,
        }
    }

    pub fn private_key_version(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => PRIVATE_KEY_MAINNET,
            BtcNetwork::Testnet => PRIVATE_KEY_TESTNET,
        }
    }

    /// Network owning a private-key version byte, if any.
    pub fn from_private_key_version(version: u8) -> Option<Self> {
        match version {
            PRIVATE_KEY_MAINNET => Some(BtcNetwork::Mainnet),
            PRIVATE_KEY_TESTNET => Some(BtcNetwork::Testnet),
            _ => None,
        }
    }
}

impl FromStr for BtcNetwork {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BtcNetwork::from_chain_name(s).ok_or_else(|| BtcError::InvalidNetwork(s.to_string()))
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
        }
    }
}
