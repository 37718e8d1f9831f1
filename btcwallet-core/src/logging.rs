//! Security-aware logging infrastructure for the BTC wallet
//!
//! Thin layer over the `log` facade and `env_logger`:
//! - Never logs private keys, WIF strings or mnemonic words
//! - Truncates addresses and transaction ids before they reach the log
//! - Tags events with the subsystem they came from
//!
//! # Usage
//!
//! ```
//! use btcwallet_core::logging::{self, LogConfig, LogLevel};
//!
//! logging::init(&LogConfig::default()).expect("Failed to initialize logging");
//! logging::log_core(LogLevel::Info, "wallet service ready", None);
//! ```

use chrono::Local;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::sync::Once;

use crate::types::SensitiveString;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Log context categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogContext {
    /// Key generation and import
    Security,
    /// Wallet store and service wiring
    Core,
    /// Node client and network monitor
    Network,
    /// Transaction construction, signing, broadcasting
    Transaction,
    /// Balance scans and cache refresh
    Balance,
}

/// `[logging]` section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: LogLevel,
    /// Append to this file instead of stderr
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Append `[file:line]` to the level tag
    #[serde(default)]
    pub source_location: bool,
    /// One JSON object per line
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            timestamps: true,
            source_location: false,
            json: false,
        }
    }
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

fn default_true() -> bool {
    true
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

static LOGGING_INIT: Once = Once::new();

/// Install the process logger
///
/// Only the first call has an effect. `RUST_LOG` overrides the configured level.
pub fn init(config: &LogConfig) -> Result<(), String> {
    let mut result = Ok(());
    LOGGING_INIT.call_once(|| {
        result = build_logger(config).map(|mut builder| {
            if let Err(e) = builder.try_init() {
                // Another logger won the race, usually in tests
                debug!("Logger already initialized: {}", e);
            }
        });
    });
    result
}

fn build_logger(config: &LogConfig) -> Result<env_logger::Builder, String> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log::Level::from(config.level).to_level_filter());
    builder.parse_default_env();

    let format = config.clone();
    builder.format(move |buf, record| {
        let timestamp = format
            .timestamps
            .then(|| Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string());
        let location = format
            .source_location
            .then(|| format!("{}:{}", record.file().unwrap_or("unknown"), record.line().unwrap_or(0)));

        if format.json {
            let line = json!({
                "timestamp": timestamp,
                "level": record.level().to_string(),
                "target": record.target(),
                "location": location,
                "message": record.args().to_string(),
            });
            return writeln!(buf, "{}", line);
        }

        let mut style = buf.style();
        style.set_bold(true);
        if let Some(timestamp) = timestamp {
            write!(buf, "{} ", timestamp)?;
        }
        match location {
            Some(location) => writeln!(buf, "[{} {}] {}", style.value(record.level()), location, record.args()),
            None => writeln!(buf, "[{}] {}", style.value(record.level()), record.args()),
        }
    });

    if let Some(path) = &config.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("Failed to open log file {}: {}", path, e))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    Ok(builder)
}

/// Sanitize a potentially sensitive string for logging
///
/// Keeps the first and last four characters of anything longer than eight.
pub fn sanitize_for_logging(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= 8 {
        return "*****".to_string();
    }

    let first: String = chars[..4].iter().collect();
    let last: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", first, last)
}

/// Trait for types that can be safely logged
pub trait SafeLog {
    /// Return a sanitized string representation safe for logging
    fn safe_log_format(&self) -> String;
}

impl SafeLog for str {
    fn safe_log_format(&self) -> String {
        sanitize_for_logging(self)
    }
}

impl SafeLog for String {
    fn safe_log_format(&self) -> String {
        sanitize_for_logging(self)
    }
}

impl SafeLog for SensitiveString {
    fn safe_log_format(&self) -> String {
        "[REDACTED]".to_string()
    }
}

impl SafeLog for bitcoin::Txid {
    fn safe_log_format(&self) -> String {
        sanitize_for_logging(&self.to_string())
    }
}

impl SafeLog for bitcoin::Address {
    fn safe_log_format(&self) -> String {
        sanitize_for_logging(&self.to_string())
    }
}

/// Build a JSON object of parameters that have already been made safe
pub fn log_params(params: Vec<(&str, String)>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in params {
        map.insert(name.to_string(), serde_json::Value::String(value));
    }
    serde_json::Value::Object(map)
}

fn log_with_context(level: LogLevel, context: LogContext, message: &str, params: Option<serde_json::Value>) {
    match params {
        Some(params) => log::log!(level.into(), "[{:?}] {} {}", context, message, params),
        None => log::log!(level.into(), "[{:?}] {}", context, message),
    }
}

/// Log a security-related message (key generation, import)
pub fn log_security(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context(level, LogContext::Security, message, params);
}

/// Log a core wallet event
pub fn log_core(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context(level, LogContext::Core, message, params);
}

/// Log a network event
pub fn log_network(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context(level, LogContext::Network, message, params);
}

/// Log a transaction event
pub fn log_transaction(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context(level, LogContext::Transaction, message, params);
}

/// Log a balance scan or cache event
pub fn log_balance(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context(level, LogContext::Balance, message, params);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_for_logging() {
        assert_eq!(sanitize_for_logging(""), "");
        assert_eq!(sanitize_for_logging("short"), "*****");
        assert_eq!(
            sanitize_for_logging("1BoatSLRHtKNngkdXEeobR76b53LETtpyT"),
            "1Boa...tpyT"
        );
    }

    #[test]
    fn test_sensitive_values_never_leak() {
        let secret = SensitiveString::new("L1aW4aubDFB7yfras2S1mN3bqg9nwySY8nkoLmJebSLD5BWv3ENZ");
        assert_eq!(secret.safe_log_format(), "[REDACTED]");
    }

    #[test]
    fn test_log_params_builds_object() {
        let params = log_params(vec![("wallet_id", "WALLET-1".to_string())]);
        assert_eq!(params["wallet_id"], "WALLET-1");
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: LogConfig = toml::from_str("level = \"warn\"\njson = true").unwrap();
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.json);
        assert!(config.timestamps);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_unwritable_log_file_is_reported() {
        let config = LogConfig {
            file: Some("/nonexistent-dir/btcwallet.log".to_string()),
            ..LogConfig::default()
        };
        assert!(build_logger(&config).is_err());
    }

    #[test]
    fn test_init_is_idempotent() {
        assert!(init(&LogConfig::default()).is_ok());
        assert!(init(&LogConfig::default()).is_ok());
    }
}
