//! Periodic rediscovery of multisig redeem scripts known to the node.
//!
//! Redeem scripts cannot be recovered from a P2SH address, so after a
//! restart (or when another signer created the address) the store is
//! repopulated from the node's watched addresses.

use std::sync::Arc;
use std::time::Duration;

use chain_btc::address::{is_multisig_address, script_hash_address};
use chain_btc::network::BtcNetwork;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::WalletError;
use crate::node::NodeClient;
use crate::store::KeyStore;

/// Decode `redeem_hex` and keep it only if it hashes to `address`.
pub(crate) fn verified_redeem_script(
    address: &str,
    redeem_hex: &str,
    network: BtcNetwork,
) -> Option<Vec<u8>> {
    let script = hex::decode(redeem_hex.trim()).ok()?;
    (script_hash_address(&script, network) == address).then_some(script)
}

/// One discovery pass: fetch the redeem script of every watched P2SH address
/// missing from `store`. Per-address node failures are logged and skipped;
/// only a failure to list the watched addresses aborts the pass.
///
/// Returns the number of scripts added.
pub fn rescan<N: NodeClient + ?Sized>(
    node: &N,
    store: &KeyStore,
    network: BtcNetwork,
) -> Result<usize, WalletError> {
    let watched = node.list_watched_addresses()?;
    let mut added = 0;

    for address in watched.iter().filter(|a| is_multisig_address(a)) {
        if store.has_redeem_script(address) {
            continue;
        }
        match node.get_redeem_script(address) {
            Ok(Some(redeem_hex)) => match verified_redeem_script(address, &redeem_hex, network) {
                Some(script) => {
                    if store.insert_redeem_script(address, script) {
                        added += 1;
                    }
                }
                None => warn!(%address, "node returned a redeem script that does not match"),
            },
            Ok(None) => debug!(%address, "node has no redeem script"),
            Err(e) => warn!(%address, error = %e, "redeem script lookup failed"),
        }
    }

    Ok(added)
}

/// Handle to the background discovery task. The task stops when
/// [`stop`](Self::stop) is called or the handle is dropped.
pub struct DiscoveryHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl DiscoveryHandle {
    /// Spawn the task on the current tokio runtime. The first pass runs
    /// immediately, then once per `interval`.
    ///
    /// Fails with [`WalletError::NoRuntime`] when called outside a runtime.
    pub fn spawn<N: NodeClient + 'static>(
        node: Arc<N>,
        store: Arc<KeyStore>,
        network: BtcNetwork,
        interval: Duration,
    ) -> Result<Self, WalletError> {
        let runtime = Handle::try_current().map_err(|e| WalletError::NoRuntime(e.to_string()))?;
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let node = Arc::clone(&node);
                let store = Arc::clone(&store);
                let pass = tokio::task::spawn_blocking(move || rescan(&*node, &store, network));
                match pass.await {
                    Ok(Ok(0)) => debug!("discovery pass found nothing new"),
                    Ok(Ok(added)) => info!(added, "discovered multisig redeem scripts"),
                    Ok(Err(e)) => warn!(error = %e, "discovery pass failed"),
                    Err(e) => error!(error = %e, "discovery pass panicked"),
                }
            }

            debug!("discovery task stopped");
        });

        Ok(Self {
            shutdown,
            task: Some(task),
        })
    }

    /// Signal the task to stop after its current pass.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "discovery task ended abnormally");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for DiscoveryHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
