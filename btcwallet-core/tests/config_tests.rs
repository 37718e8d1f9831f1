use bitcoin::Network;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

use btcwallet_core::config::{ensure_config_exists, Config};
use btcwallet_core::logging::LogLevel;
use btcwallet_core::FeePriority;

mod test_utils;
use test_utils::init_test_environment;

#[test]
fn test_defaults() {
    init_test_environment();

    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.network().unwrap(), Network::Bitcoin);
    assert_eq!(config.fee_priority().unwrap(), FeePriority::Medium);
    assert!(!config.wallet.lock_per_wallet);
    assert!(!config.node.enabled);
    assert_eq!(config.node.port, 8332);
    assert_eq!(config.node.timeout(), Duration::from_secs(30));
    assert_eq!(config.node.rpc_url(), "http://localhost:8332");
    assert_eq!(config.balance.ttl(), Duration::from_secs(300));
    assert!(config.balance.background_refresh);
}

#[test]
fn test_partial_file_fills_defaults() {
    init_test_environment();

    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[wallet]
network = "regtest"
fee_priority = "high"
lock_per_wallet = true

[node]
enabled = true
port = 18443
rpc_user = "alice"
rpc_password = "secret"

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.network().unwrap(), Network::Regtest);
    assert_eq!(config.fee_priority().unwrap(), FeePriority::High);
    assert!(config.wallet.lock_per_wallet);
    assert_eq!(config.node.rpc_url(), "http://localhost:18443");
    assert_eq!(config.node.rpc_user.as_deref(), Some("alice"));
    assert_eq!(config.node.max_connections, 3);
    assert_eq!(config.balance.cache_ttl_secs, 300);
    assert_eq!(config.logging.level, LogLevel::Debug);
}

#[test]
fn test_save_and_reload() {
    init_test_environment();

    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.wallet.network = "testnet".to_string();
    config.balance.cache_ttl_secs = 60;
    config.server.bind = "0.0.0.0:9000".to_string();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.network().unwrap(), Network::Testnet);
    assert_eq!(loaded.balance.ttl(), Duration::from_secs(60));
    assert_eq!(loaded.server.bind, "0.0.0.0:9000");
}

#[test]
fn test_invalid_values_are_rejected() {
    init_test_environment();

    let dir = tempdir().unwrap();
    let cases = [
        "[wallet]\nnetwork = \"moonnet\"\n",
        "[wallet]\nfee_priority = \"urgent\"\n",
        "[wallet]\nfee_priority = \"custom\"\n",
        "[node]\ntimeout_ms = 0\n",
        "[node]\nmax_connections = 0\n",
        "[balance]\ncache_ttl_secs = 0\n",
        "this is not toml",
    ];

    for (i, content) in cases.iter().enumerate() {
        let path = dir.path().join(format!("bad-{}.toml", i));
        fs::write(&path, content).unwrap();
        assert!(Config::load(&path).is_err(), "accepted: {}", content);
    }
}

#[test]
fn test_missing_file() {
    init_test_environment();

    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    assert!(Config::load(&path).is_err());
    assert!(Config::load_or_default(&path).unwrap().validate().is_ok());

    ensure_config_exists(&path).unwrap();
    assert!(path.exists());
    assert!(Config::load(&path).is_ok());
}
