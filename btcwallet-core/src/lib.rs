//! BTC Wallet Core Library
//!
//! Transaction construction and the balance and fee subsystem of a single-key
//! Bitcoin wallet: coin selection, fee estimation under network congestion,
//! balance caching, and the orchestration that turns a payment request into a
//! signed, simulated or broadcast transaction.
//!
//! # Modules
//!
//! - `types`: Value objects shared by every service
//! - `error`: The wallet error type and its categories
//! - `logging`: Security-aware logging infrastructure
//! - `config`: TOML configuration
//! - `keys`: Key generation, import, derivation and signing
//! - `wallet_store`: The in-memory wallet store and wallet service
//! - `network_status`: Network availability and congestion signals
//! - `fee_estimation`: Congestion-adjusted fee rates
//! - `utxo_selection`: Greedy in-order coin selection
//! - `balance_cache`: TTL cache of balance snapshots
//! - `balance_service`: Cached balance lookups and background refresh
//! - `node_client`: Bitcoin node collaborator (RPC or simulated peer)
//! - `transaction`: The transaction orchestrator
//!
//! # Security Considerations
//!
//! - Private keys never leave [`wallet_store::Wallet`] except as a signing handle
//!   or an explicit WIF export wrapped in [`types::SensitiveString`]
//! - Logs and error messages never carry key material
//! - Nothing is persisted; wallets and balances live for the process lifetime

/// Core domain types
pub mod types;

/// Error handling
pub mod error;

/// Secure logging functionality
pub mod logging;

/// Configuration management
pub mod config;

/// Key generation, import and signing
pub mod keys;

/// In-memory wallet store
pub mod wallet_store;

/// Bitcoin network status tracking
pub mod network_status;

/// Fee estimation
pub mod fee_estimation;

/// UTXO selection
pub mod utxo_selection;

/// Balance cache
pub mod balance_cache;

/// Balance service
pub mod balance_service;

/// Bitcoin node client
pub mod node_client;

/// Transaction orchestration
pub mod transaction;

pub use balance_cache::BalanceCache;
pub use balance_service::{BalanceService, RefreshHandle};
pub use config::Config;
pub use error::{BtcWalletError, ErrorCategory, WalletResult};
pub use fee_estimation::FeeCalculator;
pub use network_status::{MockNetworkMonitor, NetworkMonitor, NetworkSnapshot, SimulatedNetworkMonitor};
pub use node_client::{BroadcastError, InMemoryNode, NodeClient, RpcNodeClient};
pub use transaction::{FeeEstimateReport, TransactionRecord, TransactionService};
pub use utxo_selection::{CoinSelector, SelectionResult};
pub use wallet_store::{Wallet, WalletService, WalletStore, WalletSummary};

pub use bitcoin::{Address, Network, Transaction, Txid};

/// Re-export common types for convenience
pub use types::{
    sanitize_for_display, FeeEstimate, FeePriority, SensitiveString, TransactionStatus, Utxo, WalletBalance,
    DUST_THRESHOLD, MAX_BITCOIN_SUPPLY, SATS_PER_BTC, TYPICAL_TX_SIZE,
};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::sync::Once;

static INIT: Once = Once::new();

/// Library initialization with default logging
///
/// Safe to call any number of times; only the first call configures logging.
pub fn init() -> Result<(), String> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = logging::init(&logging::LogConfig::default())
            .map_err(|e| format!("Failed to initialize logging: {}", e));
    });
    result
}

/// Bitcoin utility functions for common operations
///
/// Address validation and exact BTC/satoshi conversions. Amounts are converted
/// with `rust_decimal` so no value passes through a float.
pub mod bitcoin_utils {
    use crate::error::{invalid_input, invalid_input_with_source, WalletResult};
    use crate::types::{MAX_BITCOIN_SUPPLY, SATS_PER_BTC};
    use bitcoin::address::NetworkUnchecked;
    use bitcoin::{Address, Network, Txid};
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    /// Parse an address and require it to be valid on `network`
    pub fn parse_address(address: &str, network: Network) -> WalletResult<Address> {
        let unchecked = Address::<NetworkUnchecked>::from_str(address.trim())?;
        if !unchecked.is_valid_for_network(network) {
            return Err(invalid_input(format!(
                "Invalid Bitcoin address: address does not belong to {}",
                network
            )));
        }
        Ok(unchecked.assume_checked())
    }

    /// Check if a string is a valid Bitcoin address for the specified network
    ///
    /// # Examples
    ///
    /// ```
    /// use bitcoin::Network;
    /// use btcwallet_core::bitcoin_utils;
    ///
    /// assert!(bitcoin_utils::is_valid_bitcoin_address(
    ///     "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
    ///     Network::Bitcoin
    /// ));
    ///
    /// // Wrong network should return false
    /// assert!(!bitcoin_utils::is_valid_bitcoin_address(
    ///     "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
    ///     Network::Bitcoin
    /// ));
    ///
    /// assert!(!bitcoin_utils::is_valid_bitcoin_address("invalid-address", Network::Bitcoin));
    /// ```
    pub fn is_valid_bitcoin_address(address: &str, network: Network) -> bool {
        parse_address(address, network).is_ok()
    }

    /// Validate if a string is a valid transaction ID
    pub fn is_valid_txid(txid: &str) -> bool {
        Txid::from_str(txid).is_ok()
    }

    /// Satoshis as a BTC decimal with eight places
    pub fn satoshis_to_btc(sats: u64) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(sats), 8)
    }

    /// BTC decimal to satoshis; rejects negatives, sub-satoshi precision and
    /// anything above the maximum supply
    pub fn btc_to_satoshis(btc: Decimal) -> WalletResult<u64> {
        if btc.is_sign_negative() && !btc.is_zero() {
            return Err(invalid_input(format!("Amount cannot be negative: {}", btc)));
        }

        let sats = btc * Decimal::from(SATS_PER_BTC);
        if !sats.fract().is_zero() {
            return Err(invalid_input(format!(
                "Amount has more than 8 decimal places: {}",
                btc
            )));
        }

        sats.to_u64()
            .filter(|s| *s <= MAX_BITCOIN_SUPPLY)
            .ok_or_else(|| invalid_input(format!("Amount exceeds the Bitcoin supply: {}", btc)))
    }

    /// Signed satoshi amount of a payment request
    ///
    /// Non-positive values pass through unchanged so the orchestrator can reject
    /// them as invalid transactions; positive values must be exact satoshis.
    pub fn requested_amount_sats(btc: Decimal) -> WalletResult<i64> {
        if btc <= Decimal::ZERO {
            let sats = (btc * Decimal::from(SATS_PER_BTC)).trunc();
            return Ok(sats.to_i64().unwrap_or(i64::MIN));
        }
        let sats = btc_to_satoshis(btc)?;
        i64::try_from(sats).map_err(|e| invalid_input_with_source("Amount out of range", e))
    }

    /// Render satoshis as e.g. `0.00100000 BTC`
    pub fn format_btc(sats: u64) -> String {
        format!("{} BTC", satoshis_to_btc(sats))
    }

    /// Parse a user-entered amount into satoshis
    ///
    /// Accepts `"<n> sat"`/`"<n> sats"`, `"<x> BTC"` or a bare BTC decimal.
    ///
    /// ```
    /// use btcwallet_core::bitcoin_utils::parse_bitcoin_amount;
    ///
    /// assert_eq!(parse_bitcoin_amount("0.001").unwrap(), 100_000);
    /// assert_eq!(parse_bitcoin_amount("1.5 BTC").unwrap(), 150_000_000);
    /// assert_eq!(parse_bitcoin_amount("2500 sats").unwrap(), 2_500);
    /// assert!(parse_bitcoin_amount("0.000000001").is_err());
    /// ```
    pub fn parse_bitcoin_amount(input: &str) -> WalletResult<u64> {
        let s = input.trim().to_lowercase();
        if s.is_empty() {
            return Err(invalid_input("Empty amount string"));
        }

        if let Some(sats) = s.strip_suffix("sats").or_else(|| s.strip_suffix("sat")) {
            let sats = sats.trim();
            return sats
                .parse::<u64>()
                .map_err(|e| invalid_input_with_source(format!("Invalid satoshi value: {}", sats), e));
        }

        let btc = s.strip_suffix("btc").unwrap_or(&s).trim();
        let value = Decimal::from_str(btc)
            .map_err(|e| invalid_input_with_source(format!("Could not parse amount: {}", btc), e))?;
        btc_to_satoshis(value)
    }

}
