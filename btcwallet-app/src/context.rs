//! Service wiring shared by the CLI and the HTTP server

use anyhow::Result;
use log::info;
use std::sync::Arc;

use btcwallet_core::node_client::with_timeout;
use btcwallet_core::{
    BalanceCache, BalanceService, Config, FeeCalculator, InMemoryNode, NetworkMonitor, NodeClient, RefreshHandle,
    RpcNodeClient, SimulatedNetworkMonitor, TransactionService, WalletResult, WalletService, WalletStore,
};

/// Every service of one wallet process, built from a [`Config`]
pub struct AppContext {
    pub config: Config,
    pub monitor: Arc<dyn NetworkMonitor>,
    pub wallets: WalletService,
    pub balances: Arc<BalanceService>,
    pub transactions: Arc<TransactionService>,
    node: Arc<dyn NodeClient>,
    simulated_node: Option<Arc<InMemoryNode>>,
}

impl AppContext {
    pub fn from_config(config: Config) -> Result<Self> {
        Self::with_monitor(config, Arc::new(SimulatedNetworkMonitor::new()))
    }

    /// Build the services around a specific network monitor
    pub fn with_monitor(config: Config, monitor: Arc<dyn NetworkMonitor>) -> Result<Self> {
        config.validate()?;
        let network = config.network()?;
        let store = Arc::new(WalletStore::new(network));

        let (node, simulated_node): (Arc<dyn NodeClient>, _) = if config.node.enabled {
            info!("Using Bitcoin node at {}", config.node.rpc_url());
            (Arc::new(RpcNodeClient::new(&config.node)?), None)
        } else {
            info!("No node configured; using the simulated peer");
            let node = Arc::new(InMemoryNode::new(Arc::clone(&monitor)));
            (Arc::clone(&node) as Arc<dyn NodeClient>, Some(node))
        };

        let cache = Arc::new(BalanceCache::with_ttl(config.balance.ttl()));
        let balances = Arc::new(BalanceService::new(
            Arc::clone(&store),
            cache,
            Arc::clone(&node),
            config.node.timeout(),
        ));

        let transactions = TransactionService::new(
            Arc::clone(&store),
            Arc::clone(&balances),
            FeeCalculator::new(Arc::clone(&monitor)),
            Arc::clone(&node),
            config.node.timeout(),
        )
        .with_fee_priority(config.fee_priority()?)
        .with_wallet_locks(config.wallet.lock_per_wallet);

        Ok(Self {
            config,
            monitor,
            wallets: WalletService::new(store),
            balances,
            transactions: Arc::new(transactions),
            node,
            simulated_node,
        })
    }

    /// Verify the node is reachable
    pub async fn connect(&self) -> WalletResult<()> {
        with_timeout(self.config.node.timeout(), self.node.connect()).await?;
        Ok(())
    }

    /// The simulated peer, when no real node is configured
    pub fn simulated_node(&self) -> Option<&Arc<InMemoryNode>> {
        self.simulated_node.as_ref()
    }

    /// Start the balance refresher if the configuration asks for it
    pub fn start_background_refresh(&self) -> Option<RefreshHandle> {
        self.config
            .balance
            .background_refresh
            .then(|| self.balances.spawn_background_refresh())
    }
}
