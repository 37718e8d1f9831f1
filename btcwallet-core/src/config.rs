//! Configuration management for the BTC wallet.
//!
//! Settings live in a TOML file. Every section has defaults so a partial (or
//! empty) file is a valid configuration.
//!
//! ```toml
//! [wallet]
//! network = "testnet"
//! fee_priority = "high"
//!
//! [node]
//! enabled = true
//! port = 18332
//! ```

use anyhow::{anyhow, Result};
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogConfig;
use crate::types::FeePriority;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub balance: BalanceConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Wallet-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// bitcoin, testnet, signet or regtest
    #[serde(default = "default_network")]
    pub network: String,

    /// Priority used when a transaction request does not name one (low, medium, high)
    #[serde(default = "default_fee_priority")]
    pub fee_priority: String,

    /// Serialize transaction construction per wallet so concurrent spends cannot
    /// select the same outputs
    #[serde(default)]
    pub lock_per_wallet: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            fee_priority: default_fee_priority(),
            lock_per_wallet: false,
        }
    }
}

/// Bitcoin node connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// When false, broadcasts and balance scans go to the simulated in-memory node
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    /// JSON-RPC port of the node
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub rpc_user: Option<String>,

    #[serde(default)]
    pub rpc_password: Option<String>,

    /// Timeout applied to every connect, scan and broadcast
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound on concurrent RPC calls
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
            rpc_user: None,
            rpc_password: None,
            timeout_ms: default_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl NodeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Balance cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Refresh every known wallet once per TTL window
    #[serde(default = "default_true")]
    pub background_refresh: bool,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            background_refresh: default_true(),
        }
    }
}

impl BalanceConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path.as_ref(), content).map_err(|e| anyhow!("Failed to write config file: {}", e))?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.node.timeout_ms == 0 {
            return Err(anyhow!("Invalid node timeout: must be greater than 0"));
        }

        if self.node.max_connections == 0 {
            return Err(anyhow!("Invalid node max_connections: must be greater than 0"));
        }

        if self.node.port == 0 {
            return Err(anyhow!("Invalid node port: must be greater than 0"));
        }

        if self.balance.cache_ttl_secs == 0 {
            return Err(anyhow!("Invalid cache TTL: must be greater than 0"));
        }

        self.network()?;

        if self.fee_priority()? == FeePriority::Custom {
            anyhow::bail!("Default fee priority cannot be custom");
        }

        Ok(())
    }

    /// The Bitcoin network wallets are created for
    pub fn network(&self) -> Result<Network> {
        match self.wallet.network.to_lowercase().as_str() {
            "bitcoin" | "mainnet" | "main" => Ok(Network::Bitcoin),
            "testnet" | "test" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            other => anyhow::bail!("Invalid network type: {}", other),
        }
    }

    /// The default priority for new transactions
    pub fn fee_priority(&self) -> Result<FeePriority> {
        self.wallet
            .fee_priority
            .parse::<FeePriority>()
            .map_err(|e| anyhow!("{}", e))
    }
}

/// Default location of the config file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("btcwallet")
        .join("config.toml")
}

/// Ensure a configuration file exists at the specified path
/// If it doesn't exist, create it with default values
pub fn ensure_config_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;
            }
        }

        Config::default().save(path)?;
    }

    Ok(())
}

// Default value functions

fn default_network() -> String {
    "bitcoin".to_string()
}

fn default_fee_priority() -> String {
    "medium".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8332
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_connections() -> u32 {
    3
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}
