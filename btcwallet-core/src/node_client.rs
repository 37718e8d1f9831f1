//! Bitcoin network collaborator
//!
//! [`NodeClient`] is the boundary for everything that touches the network:
//! balance scans and broadcasts. Two implementations exist:
//!
//! - [`RpcNodeClient`] talks to a Bitcoin Core node over JSON-RPC. The RPC
//!   client is blocking, so calls run on tokio's blocking pool.
//! - [`InMemoryNode`] is a simulated peer with a fundable ledger, used when no
//!   node is configured. Its broadcast honours the [`NetworkMonitor`]'s
//!   availability and congestion signals.
//!
//! Every call is bounded by [`with_timeout`]. A timed out call fails and is not retried.

use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{Address, OutPoint, ScriptBuf, Transaction, Txid};
use bitcoincore_rpc::json::ScanTxOutRequest;
use bitcoincore_rpc::{Auth, Client, RpcApi};
use log::{debug, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::NodeConfig;
use crate::error::{network_failure_with_source, BtcWalletError, WalletResult};
use crate::logging::{log_network, log_params, LogLevel, SafeLog};
use crate::network_status::{NetworkMonitor, CONGESTION_REJECT_THRESHOLD};
use crate::types::{Utxo, WalletBalance};
use crate::wallet_store::Wallet;

/// Failures reported by the network collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Bitcoin network is unavailable")]
    NetworkUnavailable,

    #[error("Network congestion: {0}")]
    Congestion(String),

    #[error("Node request timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("Node client is disabled")]
    Disabled,

    #[error("Node request failed: {0}")]
    Failed(String),
}

impl From<BroadcastError> for BtcWalletError {
    fn from(err: BroadcastError) -> Self {
        network_failure_with_source(err.to_string(), err)
    }
}

/// Run a node call with a deadline
pub async fn with_timeout<T, F>(duration: Duration, fut: F) -> Result<T, BroadcastError>
where
    F: Future<Output = Result<T, BroadcastError>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(BroadcastError::Timeout {
            millis: duration.as_millis() as u64,
        }),
    }
}

/// Network collaborator used for balance scans and broadcasts
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Establish (or verify) connectivity
    async fn connect(&self) -> Result<(), BroadcastError>;

    fn is_connected(&self) -> bool;

    /// Submit a signed transaction
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, BroadcastError>;

    /// Scan the chain for the wallet's address
    async fn scan_balance(&self, wallet: &Wallet) -> Result<WalletBalance, BroadcastError>;
}

/// Bitcoin Core JSON-RPC client
pub struct RpcNodeClient {
    client: Arc<Client>,
    timeout: Duration,
    permits: Arc<Semaphore>,
    connected: AtomicBool,
}

impl RpcNodeClient {
    pub fn new(config: &NodeConfig) -> WalletResult<Self> {
        let auth = match (&config.rpc_user, &config.rpc_password) {
            (Some(user), Some(password)) => Auth::UserPass(user.clone(), password.clone()),
            _ => Auth::None,
        };

        let url = config.rpc_url();
        let client = Client::new(&url, auth)
            .map_err(|e| network_failure_with_source(format!("Cannot create RPC client for {}", url), e))?;

        Ok(Self {
            client: Arc::new(client),
            timeout: config.timeout(),
            permits: Arc::new(Semaphore::new(config.max_connections as usize)),
            connected: AtomicBool::new(false),
        })
    }

    async fn call<T, F>(&self, f: F) -> Result<T, BroadcastError>
    where
        F: FnOnce(&Client) -> Result<T, bitcoincore_rpc::Error> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let client = Arc::clone(&self.client);

        with_timeout(self.timeout, async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| BroadcastError::Disabled)?;
            tokio::task::spawn_blocking(move || f(&client))
                .await
                .map_err(|e| BroadcastError::Failed(format!("RPC task failed: {}", e)))?
                .map_err(map_rpc_error)
        })
        .await
    }
}

fn map_rpc_error(err: bitcoincore_rpc::Error) -> BroadcastError {
    use bitcoincore_rpc::jsonrpc;

    match err {
        bitcoincore_rpc::Error::JsonRpc(jsonrpc::Error::Transport(_)) => BroadcastError::NetworkUnavailable,
        bitcoincore_rpc::Error::JsonRpc(jsonrpc::Error::Rpc(rpc)) => {
            let message = rpc.message.to_lowercase();
            if message.contains("mempool full") || message.contains("min relay fee") {
                BroadcastError::Congestion(rpc.message)
            } else {
                BroadcastError::Failed(rpc.message)
            }
        }
        other => BroadcastError::Failed(other.to_string()),
    }
}

#[async_trait]
impl NodeClient for RpcNodeClient {
    async fn connect(&self) -> Result<(), BroadcastError> {
        let height = self.call(|c| c.get_block_count()).await?;
        self.connected.store(true, Ordering::SeqCst);
        log_network(
            LogLevel::Info,
            "Connected to Bitcoin node",
            Some(log_params(vec![("height", height.to_string())])),
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, BroadcastError> {
        let tx = tx.clone();
        let txid = self.call(move |c| c.send_raw_transaction(&tx)).await?;
        log_network(
            LogLevel::Info,
            "Transaction broadcast",
            Some(log_params(vec![("txid", txid.safe_log_format())])),
        );
        Ok(txid)
    }

    async fn scan_balance(&self, wallet: &Wallet) -> Result<WalletBalance, BroadcastError> {
        let descriptor = format!("addr({})", wallet.address());
        let (tip, scan) = self
            .call(move |c| {
                let tip = c.get_block_count()?;
                let scan = c.scan_tx_out_set_blocking(&[ScanTxOutRequest::Single(descriptor)])?;
                Ok((tip, scan))
            })
            .await?;

        let chain_height = scan.height.unwrap_or(tip);
        let utxos = scan
            .unspents
            .iter()
            .map(|u| {
                let confirmations = chain_height.saturating_sub(u.height).saturating_add(1);
                Utxo::new(
                    u.txid,
                    u.vout,
                    u.amount.to_sat(),
                    hex::encode(u.script_pub_key.as_bytes()),
                    u32::try_from(confirmations).unwrap_or(u32::MAX),
                )
            })
            .collect();

        // scantxoutset only sees the UTXO set, so everything it reports is confirmed
        WalletBalance::new(wallet.wallet_id(), scan.total_amount.to_sat(), 0, chain_height, utxos)
            .map_err(|e| BroadcastError::Failed(e.to_string()))
    }
}

/// Simulated peer with an in-memory ledger
///
/// Outputs are keyed by locking script. A successful broadcast spends the
/// transaction's inputs from the ledger and credits its outputs as unconfirmed.
pub struct InMemoryNode {
    monitor: Arc<dyn NetworkMonitor>,
    connected: AtomicBool,
    chain_height: AtomicU64,
    latency: Option<Duration>,
    ledger: RwLock<HashMap<ScriptBuf, Vec<Utxo>>>,
    broadcasts: RwLock<Vec<Transaction>>,
    scan_count: AtomicUsize,
    broadcast_count: AtomicUsize,
}

impl InMemoryNode {
    pub fn new(monitor: Arc<dyn NetworkMonitor>) -> Self {
        Self {
            monitor,
            connected: AtomicBool::new(true),
            chain_height: AtomicU64::new(800_000),
            latency: None,
            ledger: RwLock::new(HashMap::new()),
            broadcasts: RwLock::new(Vec::new()),
            scan_count: AtomicUsize::new(0),
            broadcast_count: AtomicUsize::new(0),
        }
    }

    /// Delay every response, for exercising timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Credit an output to `address` with a random txid
    pub fn fund(&self, address: &Address, value: u64, confirmations: u32) -> Utxo {
        let txid = Txid::from_byte_array(rand::random::<[u8; 32]>());
        let script = address.script_pubkey();
        let utxo = Utxo::new(txid, 0, value, hex::encode(script.as_bytes()), confirmations);

        let mut ledger = self.ledger.write().unwrap_or_else(|e| e.into_inner());
        ledger.entry(script).or_default().push(utxo.clone());
        utxo
    }

    /// Advance the simulated chain tip, confirming mempool outputs
    pub fn mine_blocks(&self, count: u32) {
        self.chain_height.fetch_add(u64::from(count), Ordering::SeqCst);
        let mut ledger = self.ledger.write().unwrap_or_else(|e| e.into_inner());
        for utxo in ledger.values_mut().flatten() {
            utxo.confirmations = utxo.confirmations.saturating_add(count);
        }
    }

    pub fn chain_height(&self) -> u64 {
        self.chain_height.load(Ordering::SeqCst)
    }

    /// Number of balance scans served
    pub fn scan_count(&self) -> usize {
        self.scan_count.load(Ordering::SeqCst)
    }

    /// Number of broadcast attempts, accepted or not
    pub fn broadcast_count(&self) -> usize {
        self.broadcast_count.load(Ordering::SeqCst)
    }

    /// Transactions accepted so far
    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn apply(&self, tx: &Transaction) {
        let txid = tx.txid();
        let spent: Vec<OutPoint> = tx.input.iter().map(|i| i.previous_output).collect();

        let mut ledger = self.ledger.write().unwrap_or_else(|e| e.into_inner());
        for utxos in ledger.values_mut() {
            utxos.retain(|u| !spent.contains(&u.outpoint()));
        }

        for (vout, output) in tx.output.iter().enumerate() {
            let utxo = Utxo::new(txid, vout as u32, output.value, hex::encode(output.script_pubkey.as_bytes()), 0);
            ledger.entry(output.script_pubkey.clone()).or_default().push(utxo);
        }
    }
}

#[async_trait]
impl NodeClient for InMemoryNode {
    async fn connect(&self) -> Result<(), BroadcastError> {
        self.monitor.connect();
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, BroadcastError> {
        self.broadcast_count.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if !self.is_connected() || !self.monitor.is_available() {
            warn!("Broadcast refused: network unavailable");
            return Err(BroadcastError::NetworkUnavailable);
        }

        let mempool_size = self.monitor.mempool_size();
        if mempool_size > CONGESTION_REJECT_THRESHOLD {
            warn!("Broadcast refused: mempool at {}", mempool_size);
            return Err(BroadcastError::Congestion(format!(
                "mempool holds {} transactions",
                mempool_size
            )));
        }

        self.apply(tx);
        self.broadcasts.write().unwrap_or_else(|e| e.into_inner()).push(tx.clone());

        let txid = tx.txid();
        debug!("Simulated peer accepted {}", txid.safe_log_format());
        Ok(txid)
    }

    async fn scan_balance(&self, wallet: &Wallet) -> Result<WalletBalance, BroadcastError> {
        self.scan_count.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let utxos = {
            let ledger = self.ledger.read().unwrap_or_else(|e| e.into_inner());
            ledger.get(&wallet.address().script_pubkey()).cloned().unwrap_or_default()
        };

        let (confirmed, unconfirmed) = utxos.iter().fold((0u64, 0u64), |(c, u), utxo| {
            if utxo.is_confirmed() {
                (c.saturating_add(utxo.value), u)
            } else {
                (c, u.saturating_add(utxo.value))
            }
        });

        WalletBalance::new(wallet.wallet_id(), confirmed, unconfirmed, self.chain_height(), utxos)
            .map_err(|e| BroadcastError::Failed(e.to_string()))
    }
}
