//! Shared fixtures for the integration tests
//!
//! Each test file pulls this in with `mod test_utils;`.

#![allow(dead_code)]

use bitcoin::hashes::Hash;
use bitcoin::{Network, Txid};
use std::sync::{Arc, Once};
use std::time::Duration;

use btcwallet_core::logging::{self, LogConfig, LogLevel};
use btcwallet_core::{
    BalanceCache, BalanceService, FeeCalculator, InMemoryNode, MockNetworkMonitor, NetworkMonitor, NodeClient,
    TransactionService, Utxo, Wallet, WalletService, WalletStore,
};

static GLOBAL_TEST_INIT: Once = Once::new();

/// Initialize logging once across all tests in a binary
pub fn init_test_environment() {
    GLOBAL_TEST_INIT.call_once(|| {
        let config = LogConfig {
            level: LogLevel::Error,
            file: None,
            timestamps: false,
            source_location: false,
            json: false,
        };
        let _ = logging::init(&config);
    });
}

/// Deterministic txid for fixtures
pub fn txid(n: u8) -> Txid {
    Txid::from_byte_array([n; 32])
}

/// A confirmed UTXO with a fixture txid
pub fn utxo(n: u8, value: u64) -> Utxo {
    Utxo::new(txid(n), 0, value, "76a914", 6)
}

/// Options for building a [`Harness`]
pub struct HarnessOptions {
    pub mempool_size: u32,
    pub cache_ttl: Duration,
    pub node_latency: Option<Duration>,
    pub timeout: Duration,
    pub wallet_locks: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            mempool_size: 1_000,
            cache_ttl: Duration::from_secs(300),
            node_latency: None,
            timeout: Duration::from_secs(5),
            wallet_locks: false,
        }
    }
}

/// Every service wired against the simulated node and a mock monitor
pub struct Harness {
    pub monitor: Arc<MockNetworkMonitor>,
    pub node: Arc<InMemoryNode>,
    pub store: Arc<WalletStore>,
    pub wallets: WalletService,
    pub balances: Arc<BalanceService>,
    pub fees: FeeCalculator,
    pub transactions: TransactionService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        init_test_environment();

        let monitor = Arc::new(MockNetworkMonitor::new().with_mempool_size(options.mempool_size));
        let shared_monitor: Arc<dyn NetworkMonitor> = monitor.clone();

        let mut node = InMemoryNode::new(Arc::clone(&shared_monitor));
        if let Some(latency) = options.node_latency {
            node = node.with_latency(latency);
        }
        let node = Arc::new(node);
        let client: Arc<dyn NodeClient> = node.clone();

        let store = Arc::new(WalletStore::new(Network::Regtest));
        let balances = Arc::new(BalanceService::new(
            Arc::clone(&store),
            Arc::new(BalanceCache::with_ttl(options.cache_ttl)),
            Arc::clone(&client),
            options.timeout,
        ));
        let fees = FeeCalculator::new(shared_monitor);
        let transactions = TransactionService::new(
            Arc::clone(&store),
            Arc::clone(&balances),
            fees.clone(),
            client,
            options.timeout,
        )
        .with_wallet_locks(options.wallet_locks);

        Self {
            monitor,
            node,
            wallets: WalletService::new(Arc::clone(&store)),
            store,
            balances,
            fees,
            transactions,
        }
    }

    /// A new wallet funded with one confirmed output per value
    pub fn funded_wallet(&self, values: &[u64]) -> Arc<Wallet> {
        let wallet = self.wallets.generate_wallet().expect("wallet generation");
        for value in values {
            self.node.fund(wallet.address(), *value, 6);
        }
        wallet
    }

    /// Address of a fresh wallet on the harness network
    pub fn recipient(&self) -> String {
        self.wallets
            .generate_wallet()
            .expect("wallet generation")
            .address()
            .to_string()
    }
}
