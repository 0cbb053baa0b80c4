//! The wallet orchestrator: sequences derivation, selection and signing and
//! owns the redeem-script store.

use std::sync::Arc;

use chain_btc::address::is_multisig_address;
use chain_btc::address::script_hash_address;
use chain_btc::keys::{derive_private_key, PrivateKey};
use chain_btc::network::BtcNetwork;
use chain_btc::script::{multisig_redeem_script, parse_multisig_redeem_script};
use chain_btc::signing::{self, SignatureEntry, SignatureRequest, SpendTemplate};
use chain_btc::transaction::RawTransaction;
use chain_btc::utxo::{select_utxos, Utxo};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::WalletConfig;
use crate::discovery::{self, verified_redeem_script, DiscoveryHandle};
use crate::error::{NodeError, WalletError};
use crate::node::NodeClient;
use crate::store::KeyStore;
use crate::types::TransactionView;

/// Label attached to addresses imported into the node.
const ADDRESS_LABEL: &str = "signer";

pub struct Wallet<N: NodeClient + 'static> {
    node: Arc<N>,
    store: Arc<KeyStore>,
    network: BtcNetwork,
    config: WalletConfig,
    discovery: Mutex<Option<DiscoveryHandle>>,
}

impl<N: NodeClient + 'static> Wallet<N> {
    /// Validate `config` and bind to `node`. The network comes from the
    /// config, or from the node's chain name when the config leaves it out.
    pub fn new(config: WalletConfig, node: Arc<N>) -> Result<Self, WalletError> {
        config.validate()?;
        let network = match config.network {
            Some(network) => network,
            None => {
                let chain = node.chain_name()?;
                BtcNetwork::from_chain_name(&chain)
                    .ok_or(WalletError::UnsupportedChain(chain))?
            }
        };
        info!(%network, max_rounds = config.max_rounds, "wallet ready");

        Ok(Self {
            node,
            store: Arc::new(KeyStore::new()),
            network,
            config,
            discovery: Mutex::new(None),
        })
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    pub fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    fn derive(&self, identifier: &str, round: u32) -> Option<PrivateKey> {
        derive_private_key(identifier, &self.config.server_secret, round, self.network)
    }

    /// Issue a fresh P2PKH address for `identifier`: the first round whose
    /// address has not been issued yet. The address is recorded and watched
    /// on the node.
    ///
    /// `Ok(None)` when the identifier is malformed or every round up to
    /// `max_rounds` is taken.
    pub fn generate_address(&self, identifier: &str) -> Result<Option<String>, WalletError> {
        for round in 1..=self.config.max_rounds {
            let Some(key) = self.derive(identifier, round) else {
                return Ok(None);
            };
            let address = key.address()?;
            if self.store.is_issued(&address) {
                continue;
            }
            // Recorded only once the node watches it, so a failed import
            // leaves the round free for the next call.
            self.node.import_address(&address, ADDRESS_LABEL, false)?;
            if !self.store.record_round(&address, round) {
                continue;
            }
            info!(%address, round, "issued address");
            return Ok(Some(address));
        }
        warn!(max_rounds = self.config.max_rounds, "address rounds exhausted");
        Ok(None)
    }

    /// Hex public key of `identifier` at `round`, for exchange with cosigners.
    pub fn public_key(&self, identifier: &str, round: u32) -> Result<Option<String>, WalletError> {
        match self.derive(identifier, round) {
            Some(key) => Ok(Some(hex::encode(key.public_key()?))),
            None => Ok(None),
        }
    }

    /// Build an M-of-N P2SH address from `identifier`'s first-round key
    /// followed by `cosigner_keys` (hex). The redeem script is cached and the
    /// address watched on the node.
    pub fn create_multisig_address(
        &self,
        identifier: &str,
        cosigner_keys: &[String],
        required: usize,
    ) -> Result<Option<String>, WalletError> {
        let Some(key) = self.derive(identifier, 1) else {
            return Ok(None);
        };

        let mut public_keys = Vec::with_capacity(cosigner_keys.len() + 1);
        public_keys.push(key.public_key()?);
        for cosigner in cosigner_keys {
            public_keys.push(hex::decode(cosigner).map_err(|e| {
                WalletError::InvalidMultisig(format!("cosigner key is not hex: {e}"))
            })?);
        }

        let redeem_script = multisig_redeem_script(required, &public_keys)?;
        let address = script_hash_address(&redeem_script, self.network);
        self.store.insert_redeem_script(&address, redeem_script);
        self.store.record_round(&address, 1);
        self.node.import_address(&address, ADDRESS_LABEL, false)?;
        info!(%address, required, total = public_keys.len(), "created multisig address");
        Ok(Some(address))
    }

    /// Ask the node for the canonical descriptor of an M-of-N set created
    /// elsewhere, check it and cache its redeem script.
    pub fn register_multisig(
        &self,
        required: usize,
        public_keys: &[String],
    ) -> Result<String, WalletError> {
        let descriptor = self.node.create_multisig(required, public_keys)?;
        let redeem_script =
            verified_redeem_script(&descriptor.address, &descriptor.redeem_script, self.network)
                .ok_or_else(|| {
                    WalletError::InvalidMultisig(format!(
                        "redeem script does not hash to {}",
                        descriptor.address
                    ))
                })?;

        match parse_multisig_redeem_script(&redeem_script) {
            Some((m, keys)) if m == required && keys.len() == public_keys.len() => {}
            _ => {
                return Err(WalletError::InvalidMultisig(format!(
                    "descriptor for {} is not {required}-of-{}",
                    descriptor.address,
                    public_keys.len()
                )))
            }
        }

        self.store
            .insert_redeem_script(&descriptor.address, redeem_script);
        info!(address = %descriptor.address, "registered multisig");
        Ok(descriptor.address)
    }

    /// Build an unsigned spend from `from` paying `recipients`, with change
    /// to the first sender address. `Ok(None)` on insufficient funds.
    pub fn create_transaction(
        &self,
        from: &[String],
        recipients: &[(String, i64)],
    ) -> Result<Option<RawTransaction>, WalletError> {
        let change_address = from
            .first()
            .ok_or_else(|| WalletError::InvalidAddress("no sender address".into()))?;
        let utxos = self.node.list_unspent(
            from,
            self.config.min_confirmations,
            self.config.max_confirmations,
        )?;

        let Some(selection) =
            select_utxos(&utxos, recipients, change_address, self.config.fee_per_kb)?
        else {
            info!(available = utxos.len(), "insufficient funds");
            return Ok(None);
        };
        debug!(
            inputs = selection.selected.len(),
            fee = selection.fee,
            "selected inputs"
        );
        Ok(Some(selection.build_transaction()?))
    }

    /// Redeem script for a P2SH address: the store first, then the node.
    fn redeem_script_for(&self, address: &str) -> Result<Vec<u8>, WalletError> {
        if let Some(script) = self.store.redeem_script(address) {
            return Ok(script);
        }
        let fetched = self
            .node
            .get_redeem_script(address)?
            .and_then(|redeem_hex| verified_redeem_script(address, &redeem_hex, self.network))
            .ok_or_else(|| WalletError::MissingRedeemScript(address.to_string()))?;
        self.store.insert_redeem_script(address, fetched.clone());
        Ok(fetched)
    }

    /// `Some(redeem script)` for P2SH addresses, `None` for P2PKH.
    fn redeem_for(&self, address: &str) -> Result<Option<Vec<u8>>, WalletError> {
        if is_multisig_address(address) {
            Ok(Some(self.redeem_script_for(address)?))
        } else {
            Ok(None)
        }
    }

    fn spendable(&self, address: &str) -> Result<Vec<Utxo>, WalletError> {
        Ok(self.node.list_unspent(
            &[address.to_string()],
            self.config.min_confirmations,
            self.config.max_confirmations,
        )?)
    }

    /// Digests `address`'s owner must sign for `tx`.
    pub fn get_signature_data(
        &self,
        tx: &RawTransaction,
        address: &str,
    ) -> Result<Vec<SignatureRequest>, WalletError> {
        let redeem = self.redeem_for(address)?;
        let utxos = self.spendable(address)?;
        Ok(signing::get_signature_data(
            tx,
            address,
            &utxos,
            template(redeem.as_deref()),
        )?)
    }

    /// Merge signatures contributed for `address` into `tx`.
    pub fn apply_signature(
        &self,
        tx: &mut RawTransaction,
        address: &str,
        entries: &[SignatureEntry],
    ) -> Result<usize, WalletError> {
        let redeem = self.redeem_for(address)?;
        Ok(signing::apply_signature(
            tx,
            template(redeem.as_deref()),
            entries,
        )?)
    }

    /// Sign every input of `tx` spending `address`'s outputs with
    /// `identifier`'s key.
    ///
    /// When no round up to `max_rounds` yields a key for `address`, the
    /// transaction is returned unchanged.
    pub fn sign_transaction(
        &self,
        tx: &RawTransaction,
        identifier: &str,
        address: &str,
    ) -> Result<RawTransaction, WalletError> {
        let redeem = self.redeem_for(address)?;
        let Some(key) = self.find_key(identifier, address, redeem.as_deref())? else {
            info!(%address, "no key for address, transaction left unsigned");
            return Ok(tx.clone());
        };

        let spend = template(redeem.as_deref());
        let utxos = self.spendable(address)?;
        let requests = signing::get_signature_data(tx, address, &utxos, spend)?;
        let entries = signing::sign_requests(&requests, &key)?;

        let mut signed = tx.clone();
        let applied = signing::apply_signature(&mut signed, spend, &entries)?;
        debug!(%address, applied, "signed inputs");
        Ok(signed)
    }

    /// The round key of `identifier` that controls `address`, trying the
    /// recorded round before searching `1..=max_rounds`.
    fn find_key(
        &self,
        identifier: &str,
        address: &str,
        redeem_script: Option<&[u8]>,
    ) -> Result<Option<PrivateKey>, WalletError> {
        let signer_keys = redeem_script
            .and_then(parse_multisig_redeem_script)
            .map(|(_, keys)| keys);
        let controls = |key: &PrivateKey| -> Result<bool, WalletError> {
            Ok(match &signer_keys {
                Some(keys) => keys.contains(&key.public_key()?),
                None => key.address()? == address,
            })
        };

        let recorded = self.store.round_for(address);
        let rounds = recorded
            .into_iter()
            .chain((1..=self.config.max_rounds).filter(|r| Some(*r) != recorded));
        for round in rounds {
            let Some(key) = self.derive(identifier, round) else {
                return Ok(None);
            };
            if controls(&key)? {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    pub fn decode_transaction(&self, tx_hex: &str) -> Result<TransactionView, WalletError> {
        let tx = RawTransaction::from_hex(tx_hex)?;
        Ok(TransactionView::new(&tx, self.network))
    }

    /// Broadcast `tx` and return the node's txid.
    pub fn send_transaction(&self, tx: &RawTransaction) -> Result<String, WalletError> {
        let txid = self.node.send_raw_transaction(&tx.to_hex())?;
        info!(%txid, "broadcast transaction");
        Ok(txid)
    }

    pub fn fetch_transaction(&self, txid: &str) -> Result<RawTransaction, WalletError> {
        let tx_hex = self.node.get_raw_transaction(txid)?;
        Ok(RawTransaction::from_hex(&tx_hex)?)
    }

    /// Confirmed balance of `addresses` in satoshis.
    pub fn balance(&self, addresses: &[String]) -> Result<i64, WalletError> {
        let utxos = self.node.list_unspent(
            addresses,
            self.config.min_confirmations,
            self.config.max_confirmations,
        )?;
        utxos
            .iter()
            .try_fold(0i64, |total, u| total.checked_add(u.amount))
            .ok_or_else(|| NodeError::InvalidResponse("unspent amounts overflow".into()).into())
    }

    /// Run one discovery pass on the calling thread.
    pub fn refresh_redeem_scripts(&self) -> Result<usize, WalletError> {
        discovery::rescan(&*self.node, &self.store, self.network)
    }

    /// Start the background discovery task on the current tokio runtime.
    /// Does nothing if it is already running; fails outside a runtime.
    pub fn start_discovery(&self) -> Result<(), WalletError> {
        let mut slot = self.discovery.lock();
        if slot.is_some() {
            return Ok(());
        }
        *slot = Some(DiscoveryHandle::spawn(
            Arc::clone(&self.node),
            Arc::clone(&self.store),
            self.network,
            self.config.discovery_interval(),
        )?);
        Ok(())
    }

    /// Stop the background discovery task, if running.
    pub fn shutdown(&self) {
        if let Some(handle) = self.discovery.lock().take() {
            handle.stop();
            info!("discovery stopped");
        }
    }
}

fn template(redeem_script: Option<&[u8]>) -> SpendTemplate<'_> {
    match redeem_script {
        Some(redeem_script) => SpendTemplate::Multisig { redeem_script },
        None => SpendTemplate::PayToPubKeyHash,
    }
}
