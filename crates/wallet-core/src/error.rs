use thiserror::Error;

/// Failures reported by the node RPC collaborator.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node unreachable: {0}")]
    Unreachable(String),

    #[error("node rejected request: {0}")]
    Rejected(String),

    #[error("unexpected node response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("No redeem script known for {0}")]
    MissingRedeemScript(String),

    #[error("Invalid multisig descriptor: {0}")]
    InvalidMultisig(String),

    #[error("No async runtime: {0}")]
    NoRuntime(String),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("BTC: {0}")]
    Btc(#[from] chain_btc::error::BtcError),
}
