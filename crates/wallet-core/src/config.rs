//! Signer configuration, parsed from TOML with environment overrides.
//!
//! Priority: environment variables > config file > defaults.

use std::path::Path;
use std::time::Duration;

use chain_btc::network::BtcNetwork;
use crypto_utils::zeroizing::SecretHex;
use serde::{Deserialize, Deserializer};

use crate::error::WalletError;

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Shared hex secret mixed into every derived key.
    #[serde(deserialize_with = "deserialize_secret")]
    pub server_secret: SecretHex,

    /// Network to use. When absent the node's chain name decides.
    #[serde(default)]
    pub network: Option<BtcNetwork>,

    /// Upper bound on derivation rounds searched per identifier.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Fee rate in satoshis per started kilobyte.
    #[serde(default = "default_fee_per_kb")]
    pub fee_per_kb: i64,

    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u32,

    #[serde(default = "default_max_confirmations")]
    pub max_confirmations: u32,

    /// Seconds between redeem-script discovery passes.
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,
}

fn default_max_rounds() -> u32 {
    100
}

fn default_fee_per_kb() -> i64 {
    10_000
}

fn default_min_confirmations() -> u32 {
    1
}

fn default_max_confirmations() -> u32 {
    9_999_999
}

fn default_discovery_interval() -> u64 {
    60
}

fn deserialize_secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretHex, D::Error> {
    String::deserialize(deserializer).map(SecretHex::new)
}

impl WalletConfig {
    /// Defaults for everything except the secret.
    pub fn new(server_secret: impl Into<String>) -> Self {
        Self {
            server_secret: SecretHex::new(server_secret),
            network: None,
            max_rounds: default_max_rounds(),
            fee_per_kb: default_fee_per_kb(),
            min_confirmations: default_min_confirmations(),
            max_confirmations: default_max_confirmations(),
            discovery_interval_secs: default_discovery_interval(),
        }
    }

    pub fn with_network(mut self, network: BtcNetwork) -> Self {
        self.network = Some(network);
        self
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, WalletError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            WalletError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, WalletError> {
        toml::from_str(contents).map_err(|e| WalletError::Config(format!("invalid TOML: {e}")))
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `SIGNER_SERVER_SECRET`
    /// - `SIGNER_NETWORK`
    /// - `SIGNER_FEE_PER_KB`
    /// - `SIGNER_MAX_ROUNDS`
    /// - `SIGNER_DISCOVERY_INTERVAL`
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SIGNER_SERVER_SECRET") {
            self.server_secret = SecretHex::new(v);
        }
        if let Ok(v) = std::env::var("SIGNER_NETWORK") {
            match v.parse() {
                Ok(network) => self.network = Some(network),
                Err(e) => tracing::warn!(error = %e, "ignoring SIGNER_NETWORK"),
            }
        }
        if let Ok(v) = std::env::var("SIGNER_FEE_PER_KB") {
            match v.parse() {
                Ok(fee) => self.fee_per_kb = fee,
                Err(_) => tracing::warn!(value = %v, "ignoring SIGNER_FEE_PER_KB"),
            }
        }
        if let Ok(v) = std::env::var("SIGNER_MAX_ROUNDS") {
            match v.parse() {
                Ok(rounds) => self.max_rounds = rounds,
                Err(_) => tracing::warn!(value = %v, "ignoring SIGNER_MAX_ROUNDS"),
            }
        }
        if let Ok(v) = std::env::var("SIGNER_DISCOVERY_INTERVAL") {
            match v.parse() {
                Ok(secs) => self.discovery_interval_secs = secs,
                Err(_) => tracing::warn!(value = %v, "ignoring SIGNER_DISCOVERY_INTERVAL"),
            }
        }
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<(), WalletError> {
        if self.server_secret.is_empty() {
            return Err(WalletError::Config("server_secret must not be empty".into()));
        }
        self.server_secret
            .integer_bytes()
            .map_err(|e| WalletError::Config(format!("server_secret: {e}")))?;

        if self.max_rounds == 0 {
            return Err(WalletError::Config("max_rounds must be > 0".into()));
        }
        if self.fee_per_kb <= 0 {
            return Err(WalletError::Config("fee_per_kb must be > 0".into()));
        }
        if self.min_confirmations > self.max_confirmations {
            return Err(WalletError::Config(
                "min_confirmations must not exceed max_confirmations".into(),
            ));
        }
        if self.discovery_interval_secs == 0 {
            return Err(WalletError::Config(
                "discovery_interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }
}
