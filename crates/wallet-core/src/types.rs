use chain_btc::address::{encode_address, AddressKind};
use chain_btc::network::BtcNetwork;
use chain_btc::script::classify_script_pubkey;
use chain_btc::transaction::RawTransaction;
use serde::Serialize;

/// Human-readable rendering of a raw transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionView {
    pub txid: String,
    pub version: i32,
    pub lock_time: u32,
    pub inputs: Vec<InputView>,
    pub outputs: Vec<OutputView>,
    /// Sum of all output amounts in satoshis; `None` when it overflows.
    pub total_output: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputView {
    pub previous_txid: String,
    pub previous_output_index: u32,
    /// Hex scriptSig; empty while unsigned.
    pub script_sig: String,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputView {
    pub index: usize,
    pub amount: i64,
    pub script_pub_key: String,
    /// `None` for non-standard scripts.
    pub address: Option<String>,
    pub kind: Option<OutputKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    PubKeyHash,
    ScriptHash,
}

impl From<AddressKind> for OutputKind {
    fn from(kind: AddressKind) -> Self {
        match kind {
            AddressKind::PayToPubKeyHash => OutputKind::PubKeyHash,
            AddressKind::PayToScriptHash => OutputKind::ScriptHash,
        }
    }
}

impl TransactionView {
    pub fn new(tx: &RawTransaction, network: BtcNetwork) -> Self {
        let inputs = tx
            .inputs
            .iter()
            .map(|input| InputView {
                previous_txid: input.previous_txid(),
                previous_output_index: input.previous_output_index,
                script_sig: hex::encode(&input.script),
                sequence: input.sequence,
            })
            .collect();

        let outputs = tx
            .outputs
            .iter()
            .enumerate()
            .map(|(index, output)| {
                let classified = classify_script_pubkey(&output.script);
                OutputView {
                    index,
                    amount: output.amount,
                    script_pub_key: hex::encode(&output.script),
                    address: classified.map(|(kind, hash)| {
                        let version = match kind {
                            AddressKind::PayToPubKeyHash => network.p2pkh_version(),
                            AddressKind::PayToScriptHash => network.p2sh_version(),
                        };
                        encode_address(&hash, version)
                    }),
                    kind: classified.map(|(kind, _)| kind.into()),
                }
            })
            .collect();

        Self {
            txid: tx.txid(),
            version: tx.version,
            lock_time: tx.lock_time,
            inputs,
            outputs,
            total_output: tx.total_output(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
