//! Wallet balances backed by the TTL cache
//!
//! Reads go through the [`BalanceCache`]. A miss or an expired entry costs
//! exactly one balance scan on the [`NodeClient`], and the result is stored
//! for the next TTL window.
//!
//! A background task started with [`BalanceService::spawn_background_refresh`]
//! rescans every known wallet once per TTL. Each tick is best effort: failures
//! are logged and the schedule continues, with no backoff and no retry.

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::balance_cache::BalanceCache;
use crate::error::{balance_failure, balance_failure_with_source, BtcWalletError, WalletResult};
use crate::logging::{log_balance, log_params, LogLevel};
use crate::node_client::{with_timeout, BroadcastError, NodeClient};
use crate::types::{Utxo, WalletBalance};
use crate::wallet_store::WalletStore;

/// Balance lookups, refreshes and the background refresher
pub struct BalanceService {
    store: Arc<WalletStore>,
    cache: Arc<BalanceCache>,
    node: Arc<dyn NodeClient>,
    timeout: Duration,
}

impl BalanceService {
    pub fn new(
        store: Arc<WalletStore>,
        cache: Arc<BalanceCache>,
        node: Arc<dyn NodeClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            node,
            timeout,
        }
    }

    pub fn cache(&self) -> &Arc<BalanceCache> {
        &self.cache
    }

    /// Cached balance, scanning on a miss
    pub async fn get_wallet_balance(&self, wallet_id: &str) -> WalletResult<WalletBalance> {
        if let Some(balance) = self.cache.get(wallet_id) {
            debug!("Balance cache hit for {}", wallet_id);
            return Ok(balance);
        }
        self.refresh_wallet_balance(wallet_id).await
    }

    /// Scan now and replace whatever is cached
    pub async fn refresh_wallet_balance(&self, wallet_id: &str) -> WalletResult<WalletBalance> {
        let wallet = self
            .store
            .get(wallet_id)
            .ok_or_else(|| balance_failure(format!("Wallet not found: {}", wallet_id)))?;

        let balance = with_timeout(self.timeout, self.node.scan_balance(&wallet))
            .await
            .map_err(|e| scan_error(wallet_id, e))?;

        log_balance(
            LogLevel::Debug,
            "Balance scanned",
            Some(log_params(vec![
                ("wallet_id", wallet_id.to_string()),
                ("total", balance.total().to_string()),
                ("utxos", balance.utxo_count().to_string()),
            ])),
        );

        self.cache.put(wallet_id, balance.clone());
        Ok(balance)
    }

    /// UTXOs of the current snapshot, in scan order
    pub async fn utxos(&self, wallet_id: &str) -> WalletResult<Vec<Utxo>> {
        Ok(self.get_wallet_balance(wallet_id).await?.utxos().to_vec())
    }

    pub async fn has_sufficient_funds(&self, wallet_id: &str, amount: u64) -> WalletResult<bool> {
        Ok(self.get_wallet_balance(wallet_id).await?.has_sufficient_funds(amount))
    }

    pub async fn has_sufficient_confirmed_funds(&self, wallet_id: &str, amount: u64) -> WalletResult<bool> {
        Ok(self
            .get_wallet_balance(wallet_id)
            .await?
            .has_sufficient_confirmed_funds(amount))
    }

    /// Sum of every stored wallet's total balance
    pub async fn total_balance(&self) -> WalletResult<u64> {
        let mut total = 0u64;
        for wallet_id in self.store.wallet_ids() {
            let balance = self.get_wallet_balance(&wallet_id).await?;
            total = total
                .checked_add(balance.total())
                .ok_or_else(|| balance_failure("Total balance overflow"))?;
        }
        Ok(total)
    }

    /// Rescan every stored wallet; returns how many refreshed successfully
    pub async fn refresh_all_balances(&self) -> usize {
        let mut refreshed = 0;
        for wallet_id in self.store.wallet_ids() {
            match self.refresh_wallet_balance(&wallet_id).await {
                Ok(_) => refreshed += 1,
                Err(e) => warn!("Background balance refresh failed for {}: {}", wallet_id, e),
            }
        }
        refreshed
    }

    pub fn clear_balance_cache(&self, wallet_id: &str) {
        self.cache.invalidate(wallet_id);
    }

    pub fn clear_all_balance_cache(&self) {
        self.cache.clear_all();
    }

    /// Refresh all balances once per cache TTL until the handle is shut down
    ///
    /// The first refresh happens one TTL after spawning, not immediately.
    pub fn spawn_background_refresh(self: &Arc<Self>) -> RefreshHandle {
        self.spawn_refresh_every(self.cache.ttl())
    }

    /// Same as [`Self::spawn_background_refresh`] with an explicit period
    pub fn spawn_refresh_every(self: &Arc<Self>, period: Duration) -> RefreshHandle {
        let service = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!("Background balance refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let refreshed = service.refresh_all_balances().await;
                        debug!("Background refresh updated {} wallets", refreshed);
                    }
                }
            }
        });

        log_balance(
            LogLevel::Info,
            "Background balance refresh started",
            Some(log_params(vec![("period_secs", period.as_secs().to_string())])),
        );

        RefreshHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

fn scan_error(wallet_id: &str, err: BroadcastError) -> BtcWalletError {
    match err {
        BroadcastError::Failed(_) => {
            balance_failure_with_source(format!("Balance scan failed for {}", wallet_id), err)
        }
        other => BtcWalletError::from(other),
    }
}

/// Handle to the background refresh task
pub struct RefreshHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop the refresher and wait for the current tick to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Background refresh task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}
