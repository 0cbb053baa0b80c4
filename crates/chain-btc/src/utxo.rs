//! Node UTXOs and greedy input selection with a size-based fee.

use serde::{Deserialize, Deserializer};

use crate::error::BtcError;
use crate::script::script_pubkey_for_address;
use crate::transaction::{RawInput, RawOutput, RawTransaction};

/// Satoshis per whole coin.
pub const SATS_PER_BTC: i64 = 100_000_000;

/// Projected serialized size of one signed input.
pub const INPUT_BYTES: u64 = 181;
/// Projected serialized size of one output.
pub const OUTPUT_BYTES: u64 = 34;
/// Version, counts and lock time.
pub const TX_OVERHEAD_BYTES: u64 = 10;

/// An unspent output as reported by the node (`listunspent`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Utxo {
    /// Display-order transaction id.
    pub txid: String,
    pub vout: u32,
    /// Value in satoshis. Node JSON carries whole coins.
    #[serde(deserialize_with = "deserialize_btc_amount")]
    pub amount: i64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: String,
    #[serde(rename = "redeemScript", default)]
    pub redeem_script: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub confirmations: u32,
}

/// Outcome of a successful selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Spent outputs, in the order they were pulled.
    pub selected: Vec<Utxo>,
    /// Recipient payments, in request order.
    pub payments: Vec<(String, i64)>,
    /// Change returned to the sender, or `None` when the leftover is all fee.
    pub change: Option<(String, i64)>,
    pub fee: i64,
}

impl Selection {
    pub fn total_in(&self) -> i64 {
        self.selected.iter().map(|u| u.amount).sum()
    }

    /// Unsigned transaction spending every selected output, paying each
    /// recipient and then the change (if any).
    pub fn build_transaction(&self) -> Result<RawTransaction, BtcError> {
        let inputs = self
            .selected
            .iter()
            .map(|utxo| RawInput::spending(&utxo.txid, utxo.vout))
            .collect::<Result<Vec<_>, _>>()?;

        let mut outputs = Vec::with_capacity(self.payments.len() + 1);
        for (address, amount) in self.payments.iter().chain(self.change.iter()) {
            outputs.push(RawOutput {
                amount: *amount,
                script: script_pubkey_for_address(address)?,
            });
        }

        Ok(RawTransaction::new(inputs, outputs))
    }
}

/// Fee for a transaction of the given shape: projected size rounded up to
/// the next kilobyte, charged at `fee_per_kb`.
pub fn estimate_fee(inputs: usize, outputs: usize, fee_per_kb: i64) -> i64 {
    let bytes = TX_OVERHEAD_BYTES
        .saturating_add(INPUT_BYTES.saturating_mul(inputs as u64))
        .saturating_add(OUTPUT_BYTES.saturating_mul(outputs as u64));
    let kilobytes = i64::try_from(bytes.div_ceil(1000)).unwrap_or(i64::MAX);
    kilobytes.saturating_mul(fee_per_kb)
}

/// Greedy selection in node order.
///
/// Outputs are pulled until the running total strictly exceeds the current
/// recipient's amount; the remainder carries over to the next recipient.
/// Once every recipient is paid the fee is estimated with a change output
/// counted, and change goes to `change_address` only when the carry exceeds
/// it. A carry below the fee pulls further outputs.
///
/// Returns `Ok(None)` when the outputs run out, and `Err` for malformed
/// recipients.
pub fn select_utxos(
    utxos: &[Utxo],
    recipients: &[(String, i64)],
    change_address: &str,
    fee_per_kb: i64,
) -> Result<Option<Selection>, BtcError> {
    if recipients.is_empty() {
        return Err(BtcError::TransactionBuildError("no recipients".into()));
    }
    for (address, amount) in recipients {
        if *amount <= 0 {
            return Err(BtcError::InvalidAmount(format!(
                "amount for {address} must be positive, got {amount}"
            )));
        }
        script_pubkey_for_address(address)?;
    }
    script_pubkey_for_address(change_address)?;

    let mut pool = utxos.iter();
    let mut selected = Vec::new();
    let mut carry: i64 = 0;

    let mut pull = |selected: &mut Vec<Utxo>, carry: &mut i64| -> Result<bool, BtcError> {
        let Some(utxo) = pool.next() else {
            return Ok(false);
        };
        *carry = carry
            .checked_add(utxo.amount)
            .ok_or_else(|| BtcError::InvalidAmount("input total overflows".into()))?;
        selected.push(utxo.clone());
        Ok(true)
    };

    for (_, amount) in recipients {
        while carry <= *amount {
            if !pull(&mut selected, &mut carry)? {
                return Ok(None);
            }
        }
        carry -= amount;
    }

    let fee = loop {
        let fee = estimate_fee(selected.len(), recipients.len() + 1, fee_per_kb);
        if carry >= fee {
            break fee;
        }
        if !pull(&mut selected, &mut carry)? {
            return Ok(None);
        }
    };

    let change = (carry > fee).then(|| (change_address.to_string(), carry - fee));
    let fee = if change.is_some() { fee } else { carry };

    Ok(Some(Selection {
        selected,
        payments: recipients.to_vec(),
        change,
        fee,
    }))
}

/// Parse a decimal coin amount (`"0.5"`, `"12"`, `"0.00000001"`) into
/// satoshis without going through floating point.
pub fn parse_btc_amount(amount: &str) -> Result<i64, BtcError> {
    let amount = amount.trim();
    let invalid = || BtcError::InvalidAmount(format!("not a coin amount: {amount:?}"));

    let (whole, frac) = amount.split_once('.').unwrap_or((amount, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.len() > 8 || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<8}").parse().map_err(|_| invalid())?
    };

    whole
        .checked_mul(SATS_PER_BTC)
        .and_then(|sats| sats.checked_add(frac))
        .ok_or_else(invalid)
}

/// Convert a floating-point coin amount, as found in node JSON, to satoshis.
pub fn btc_to_sat(btc: f64) -> Result<i64, BtcError> {
    let sats = (btc * SATS_PER_BTC as f64).round();
    if !sats.is_finite() || sats < 0.0 || sats > i64::MAX as f64 {
        return Err(BtcError::InvalidAmount(format!("{btc} is out of range")));
    }
    Ok(sats as i64)
}

fn deserialize_btc_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let btc = f64::deserialize(deserializer)?;
    btc_to_sat(btc).map_err(serde::de::Error::custom)
}
