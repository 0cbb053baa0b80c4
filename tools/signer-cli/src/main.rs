//! signer-cli: offline inspection tools for the signing service.
//!
//! Derives addresses from a server secret, decodes raw transactions and
//! computes signature hashes without talking to a node.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chain_btc::keys::derive_private_key;
use chain_btc::network::BtcNetwork;
use chain_btc::signing::signature_hash;
use chain_btc::transaction::RawTransaction;
use chain_btc::utxo::estimate_fee;
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use wallet_core::{TransactionView, WalletConfig};

#[derive(Parser)]
#[command(name = "signer-cli")]
#[command(version, about = "Offline tools for the custodial signing service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the address and public key of an identifier.
    DeriveAddress(DeriveArgs),
    /// Decode a raw transaction into JSON.
    Decode(DecodeArgs),
    /// Compute the SIGHASH_ALL digest of one input.
    Sighash(SighashArgs),
    /// Estimate the fee of a transaction shape.
    Fee(FeeArgs),
}

#[derive(Args)]
struct DeriveArgs {
    /// Hex identifier of the user.
    identifier: String,

    /// Derivation round (1-based).
    #[arg(short, long, default_value_t = 1)]
    round: u32,

    /// TOML config carrying `server_secret`. SIGNER_* env vars override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network (mainnet or testnet), used when the config names none.
    #[arg(short, long, default_value = "testnet")]
    network: String,
}

#[derive(Args)]
struct DecodeArgs {
    /// Raw transaction hex.
    tx: String,

    #[arg(short, long, default_value = "testnet")]
    network: String,
}

#[derive(Args)]
struct SighashArgs {
    /// Raw transaction hex.
    tx: String,

    /// Index of the input being signed.
    #[arg(short, long)]
    input: usize,

    /// Hex script code: the spent scriptPubKey, or the redeem script for P2SH.
    #[arg(short, long)]
    script_code: String,
}

#[derive(Args)]
struct FeeArgs {
    #[arg(long)]
    inputs: usize,

    /// Output count, change included.
    #[arg(long)]
    outputs: usize,

    /// Satoshis per started kilobyte.
    #[arg(long, default_value_t = 10_000)]
    fee_per_kb: i64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DeriveAddress(args) => derive_address(args),
        Commands::Decode(args) => decode(args),
        Commands::Sighash(args) => sighash(args),
        Commands::Fee(args) => fee(args),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<WalletConfig> {
    let mut config = match path {
        Some(path) => WalletConfig::from_file(&path)?,
        None => WalletConfig::new(""),
    };
    config.apply_env_overrides();
    config
        .validate()
        .context("set server_secret in the config file or SIGNER_SERVER_SECRET")?;
    Ok(config)
}

fn derive_address(args: DeriveArgs) -> Result<()> {
    let config = load_config(args.config)?;
    let network = match config.network {
        Some(network) => network,
        None => parse_network(&args.network)?,
    };
    debug!(%network, round = args.round, "deriving key");

    let Some(key) = derive_private_key(&args.identifier, &config.server_secret, args.round, network)
    else {
        bail!("identifier must be non-empty hex: {}", args.identifier);
    };

    println!("address:    {}", key.address()?);
    println!("public key: {}", hex::encode(key.public_key()?));
    Ok(())
}

fn decode(args: DecodeArgs) -> Result<()> {
    let network = parse_network(&args.network)?;
    let tx = RawTransaction::from_hex(&args.tx).context("failed to parse transaction")?;
    println!("{}", TransactionView::new(&tx, network).to_json()?);
    Ok(())
}

fn sighash(args: SighashArgs) -> Result<()> {
    let tx = RawTransaction::from_hex(&args.tx).context("failed to parse transaction")?;
    let script_code = hex::decode(args.script_code.trim()).context("script code is not hex")?;
    let hash = signature_hash(&tx, args.input, &script_code)?;
    println!("{}", hex::encode(hash));
    Ok(())
}

fn fee(args: FeeArgs) -> Result<()> {
    if args.fee_per_kb <= 0 {
        bail!("fee rate must be positive");
    }
    println!("{}", estimate_fee(args.inputs, args.outputs, args.fee_per_kb));
    Ok(())
}

fn parse_network(s: &str) -> Result<BtcNetwork> {
    s.parse()
        .with_context(|| format!("unknown network '{s}' (expected mainnet or testnet)"))
}
