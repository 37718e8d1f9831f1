//! Standardized error handling for the BTC wallet
//!
//! Every failure that crosses a service boundary is a [`BtcWalletError`]. The
//! variants map one-to-one onto the error kinds callers are expected to match on
//! (input validation, transaction construction, signing, network, fees, balances).
//!
//! # Security Considerations
//!
//! - Contexts never carry private keys, WIF strings or mnemonic words
//! - [`BtcWalletError::user_message`] produces text safe to show in a CLI or HTTP body
//!
//! # Usage
//!
//! ```
//! use btcwallet_core::error::{invalid_transaction, ErrorCategory};
//!
//! let err = invalid_transaction("Amount must be positive");
//! assert_eq!(err.category(), ErrorCategory::InvalidTransaction);
//! assert!(err.user_message().contains("Amount must be positive"));
//! ```

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// The main error type for the wallet services
#[derive(Debug, Error)]
pub enum BtcWalletError {
    /// Malformed private key, mnemonic or address supplied for import or validation
    #[error("Invalid input: {context}")]
    InvalidInput {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Non-positive amount, unknown wallet, malformed recipient or insufficient funds
    #[error("Invalid transaction: {context}")]
    InvalidTransaction {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// The key collaborator could not produce a signature
    #[error("Transaction signing failed: {context}")]
    SigningFailure {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Node unavailable, timed out or congested during broadcast or balance scan
    #[error("Network error during transaction: {context}")]
    NetworkFailure {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// A malformed payload prevented size based fee computation
    #[error("Fee calculation failed: {context}")]
    FeeCalculationFailure {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Wallet not found or the underlying scan failed
    #[error("Balance operation failed: {context}")]
    BalanceFailure {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {context}")]
    Config {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// I/O errors
    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

/// Type alias for a Result with BtcWalletError
pub type WalletResult<T> = Result<T, BtcWalletError>;

/// Error category for logging and metrics purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidInput,
    InvalidTransaction,
    Signing,
    Network,
    FeeCalculation,
    Balance,
    Config,
    Io,
    Serialization,
}

impl ErrorCategory {
    /// Convert the error category to a string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidInput => "InvalidInput",
            ErrorCategory::InvalidTransaction => "InvalidTransaction",
            ErrorCategory::Signing => "Signing",
            ErrorCategory::Network => "Network",
            ErrorCategory::FeeCalculation => "FeeCalculation",
            ErrorCategory::Balance => "Balance",
            ErrorCategory::Config => "Config",
            ErrorCategory::Io => "Io",
            ErrorCategory::Serialization => "Serialization",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidInput => "[INPUT ERROR]",
            ErrorCategory::InvalidTransaction => "[TRANSACTION ERROR]",
            ErrorCategory::Signing => "[SIGNING ERROR]",
            ErrorCategory::Network => "[NETWORK ERROR]",
            ErrorCategory::FeeCalculation => "[FEE ERROR]",
            ErrorCategory::Balance => "[BALANCE ERROR]",
            ErrorCategory::Config => "[CONFIG ERROR]",
            ErrorCategory::Io | ErrorCategory::Serialization => "[WALLET ERROR]",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BtcWalletError {
    /// Get the category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            BtcWalletError::InvalidInput { .. } => ErrorCategory::InvalidInput,
            BtcWalletError::InvalidTransaction { .. } => ErrorCategory::InvalidTransaction,
            BtcWalletError::SigningFailure { .. } => ErrorCategory::Signing,
            BtcWalletError::NetworkFailure { .. } => ErrorCategory::Network,
            BtcWalletError::FeeCalculationFailure { .. } => ErrorCategory::FeeCalculation,
            BtcWalletError::BalanceFailure { .. } => ErrorCategory::Balance,
            BtcWalletError::Config { .. } => ErrorCategory::Config,
            BtcWalletError::Io { .. } => ErrorCategory::Io,
            BtcWalletError::Serialization { .. } => ErrorCategory::Serialization,
        }
    }

    /// The technical context attached to this error
    pub fn context(&self) -> &str {
        match self {
            BtcWalletError::InvalidInput { context, .. }
            | BtcWalletError::InvalidTransaction { context, .. }
            | BtcWalletError::SigningFailure { context, .. }
            | BtcWalletError::NetworkFailure { context, .. }
            | BtcWalletError::FeeCalculationFailure { context, .. }
            | BtcWalletError::BalanceFailure { context, .. }
            | BtcWalletError::Config { context, .. }
            | BtcWalletError::Io { context, .. }
            | BtcWalletError::Serialization { context, .. } => context,
        }
    }

    /// Render a human-readable message: category prefix, friendly text, then the
    /// technical detail.
    pub fn user_message(&self) -> String {
        let category = self.category();
        format!(
            "{} {} (Technical details: {})",
            category.prefix(),
            self.friendly_text(),
            self.context()
        )
    }

    fn friendly_text(&self) -> &'static str {
        match self.category() {
            ErrorCategory::InvalidInput => {
                let lowered = self.context().to_lowercase();
                if lowered.contains("private key") || lowered.contains("wif") {
                    "The private key format is invalid. Please check that you've entered a valid hexadecimal or WIF private key."
                } else if lowered.contains("mnemonic") || lowered.contains("seed phrase") {
                    "The seed phrase (mnemonic) is invalid. Please verify that all words are spelled correctly and in the right order."
                } else {
                    "The input data is invalid. Please check your input and try again."
                }
            }
            ErrorCategory::InvalidTransaction => {
                "The transaction could not be created. Please check the wallet, recipient and amount."
            }
            ErrorCategory::Signing => "The transaction could not be signed with this wallet's key.",
            ErrorCategory::Network => {
                "Network operation failed. Please check your connection to the Bitcoin node."
            }
            ErrorCategory::FeeCalculation => "The transaction fee could not be calculated.",
            ErrorCategory::Balance => "The wallet balance could not be retrieved.",
            ErrorCategory::Config => "The configuration is invalid.",
            ErrorCategory::Io | ErrorCategory::Serialization => {
                "An unexpected error occurred while processing your wallet request."
            }
        }
    }

    /// Whether this is the "insufficient funds" flavour of an invalid transaction
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, BtcWalletError::InvalidTransaction { context, .. }
            if context.to_lowercase().contains("insufficient funds"))
    }

    /// Whether a balance lookup failed because the wallet id is unknown
    pub fn is_wallet_not_found(&self) -> bool {
        matches!(self, BtcWalletError::BalanceFailure { context, .. }
            if context.starts_with("Wallet not found"))
    }
}

/// Create a new invalid input error with context
pub fn invalid_input<S: Into<String>>(context: S) -> BtcWalletError {
    BtcWalletError::InvalidInput {
        context: context.into(),
        source: None,
    }
}

/// Create a new invalid input error with context and source
pub fn invalid_input_with_source<S: Into<String>, E: StdError + Send + Sync + 'static>(
    context: S,
    source: E,
) -> BtcWalletError {
    BtcWalletError::InvalidInput {
        context: context.into(),
        source: Some(Box::new(source)),
    }
}

/// Create a new invalid transaction error with context
pub fn invalid_transaction<S: Into<String>>(context: S) -> BtcWalletError {
    BtcWalletError::InvalidTransaction {
        context: context.into(),
        source: None,
    }
}

/// Create a new invalid transaction error with context and source
pub fn invalid_transaction_with_source<S: Into<String>, E: StdError + Send + Sync + 'static>(
    context: S,
    source: E,
) -> BtcWalletError {
    BtcWalletError::InvalidTransaction {
        context: context.into(),
        source: Some(Box::new(source)),
    }
}

/// Create a new signing error with context and source
pub fn signing_failure_with_source<S: Into<String>, E: StdError + Send + Sync + 'static>(
    context: S,
    source: E,
) -> BtcWalletError {
    BtcWalletError::SigningFailure {
        context: context.into(),
        source: Some(Box::new(source)),
    }
}

/// Create a new network error with context
pub fn network_failure<S: Into<String>>(context: S) -> BtcWalletError {
    BtcWalletError::NetworkFailure {
        context: context.into(),
        source: None,
    }
}

/// Create a new network error with context and source
pub fn network_failure_with_source<S: Into<String>, E: StdError + Send + Sync + 'static>(
    context: S,
    source: E,
) -> BtcWalletError {
    BtcWalletError::NetworkFailure {
        context: context.into(),
        source: Some(Box::new(source)),
    }
}

/// Create a new fee calculation error with context and source
pub fn fee_calculation_failure_with_source<S: Into<String>, E: StdError + Send + Sync + 'static>(
    context: S,
    source: E,
) -> BtcWalletError {
    BtcWalletError::FeeCalculationFailure {
        context: context.into(),
        source: Some(Box::new(source)),
    }
}

/// Create a new balance error with context
pub fn balance_failure<S: Into<String>>(context: S) -> BtcWalletError {
    BtcWalletError::BalanceFailure {
        context: context.into(),
        source: None,
    }
}

/// Create a new balance error with context and source
pub fn balance_failure_with_source<S: Into<String>, E: StdError + Send + Sync + 'static>(
    context: S,
    source: E,
) -> BtcWalletError {
    BtcWalletError::BalanceFailure {
        context: context.into(),
        source: Some(Box::new(source)),
    }
}

/// Create a new configuration error with context
pub fn config_error<S: Into<String>>(context: S) -> BtcWalletError {
    BtcWalletError::Config {
        context: context.into(),
        source: None,
    }
}

// Implement From<io::Error> for BtcWalletError
impl From<io::Error> for BtcWalletError {
    fn from(err: io::Error) -> Self {
        BtcWalletError::Io {
            context: err.to_string(),
            source: err,
        }
    }
}

// Implement From<serde_json::Error> for BtcWalletError
impl From<serde_json::Error> for BtcWalletError {
    fn from(err: serde_json::Error) -> Self {
        BtcWalletError::Serialization {
            context: format!("JSON serialization error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

// Implement From<toml::de::Error> for BtcWalletError
impl From<toml::de::Error> for BtcWalletError {
    fn from(err: toml::de::Error) -> Self {
        BtcWalletError::Config {
            context: format!("TOML deserialization error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

// Implement From<bitcoin::consensus::encode::Error> for BtcWalletError
impl From<bitcoin::consensus::encode::Error> for BtcWalletError {
    fn from(err: bitcoin::consensus::encode::Error) -> Self {
        BtcWalletError::FeeCalculationFailure {
            context: format!("Bitcoin serialization error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

// Implement From for bitcoin::address::Error
impl From<bitcoin::address::Error> for BtcWalletError {
    fn from(err: bitcoin::address::Error) -> Self {
        invalid_input_with_source(format!("Invalid Bitcoin address: {}", err), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(invalid_input("x").category(), ErrorCategory::InvalidInput);
        assert_eq!(invalid_transaction("x").category(), ErrorCategory::InvalidTransaction);
        assert_eq!(network_failure("x").category(), ErrorCategory::Network);
        assert_eq!(balance_failure("x").category(), ErrorCategory::Balance);
        assert_eq!(config_error("x").category(), ErrorCategory::Config);
    }

    #[test]
    fn test_user_message_picks_input_flavour() {
        let key_err = invalid_input("Invalid private key: odd number of digits");
        assert!(key_err.user_message().starts_with("[INPUT ERROR] The private key format is invalid"));

        let mnemonic_err = invalid_input("Invalid mnemonic: unknown word");
        assert!(mnemonic_err.user_message().contains("seed phrase (mnemonic) is invalid"));

        let other = invalid_input("Invalid address: nope");
        assert!(other.user_message().contains("The input data is invalid"));
        assert!(other.user_message().ends_with("(Technical details: Invalid address: nope)"));
    }

    #[test]
    fn test_insufficient_funds_detection() {
        assert!(invalid_transaction("Insufficient funds: needed 10, available 5").is_insufficient_funds());
        assert!(!invalid_transaction("Amount must be positive").is_insufficient_funds());
        assert!(!network_failure("insufficient funds").is_insufficient_funds());
    }
}
