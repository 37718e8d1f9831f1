//! Common data types for the BTC wallet
//!
//! These types represent the value objects passed between the balance cache,
//! coin selector, fee estimator and transaction orchestrator. Balance snapshots
//! and UTXOs are immutable once built; a refresh replaces them wholesale.
//!
//! IMPORTANT: Apart from [`SensitiveString`], these types MUST NOT contain private
//! keys, seeds, or other sensitive material.

use bitcoin::{OutPoint, Txid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

use crate::error::{balance_failure, invalid_input, WalletResult};

// Constants for Bitcoin-specific values

/// Constant for dust threshold (minimum output value)
pub const DUST_THRESHOLD: u64 = 546;

/// Constant for satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Constant for maximum Bitcoin supply in satoshis
pub const MAX_BITCOIN_SUPPLY: u64 = 21_000_000 * SATS_PER_BTC;

/// Size in bytes of a typical one-input, two-output P2PKH transaction
pub const TYPICAL_TX_SIZE: usize = 226;

/// A string that contains sensitive data that should be zeroed when dropped
///
/// Used for mnemonics and WIF exports handed back to the caller.
///
/// ```
/// use btcwallet_core::types::SensitiveString;
///
/// let phrase = SensitiveString::new("abandon abandon ...");
/// assert_eq!(format!("{}", phrase), "[REDACTED]");
/// ```
#[derive(Zeroize)]
pub struct SensitiveString {
    inner: String,
}

impl SensitiveString {
    /// Create a new SensitiveString
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    /// Expose the secret value
    ///
    /// # Security
    ///
    /// Only use it when absolutely necessary and ensure the returned reference
    /// is not persisted or logged.
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    /// Get the length of the string
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the string is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Clone for SensitiveString {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString([REDACTED], length={})", self.len())
    }
}

impl PartialEq for SensitiveString {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}
impl Eq for SensitiveString {}

impl From<String> for SensitiveString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for SensitiveString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

/// Fee priority levels
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeePriority {
    /// Slow confirmation, cheap fee
    Low,
    /// Normal confirmation time
    Medium,
    /// Fast confirmation, expensive fee
    High,
    /// Caller-chosen rate; base rate 10 sat/byte when no explicit rate is given
    Custom,
}

impl FeePriority {
    /// The three tiers reported in a fee estimate
    pub const TIERS: [FeePriority; 3] = [FeePriority::Low, FeePriority::Medium, FeePriority::High];
}

impl fmt::Display for FeePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeePriority::Low => write!(f, "LOW"),
            FeePriority::Medium => write!(f, "MEDIUM"),
            FeePriority::High => write!(f, "HIGH"),
            FeePriority::Custom => write!(f, "CUSTOM"),
        }
    }
}

impl FromStr for FeePriority {
    type Err = crate::error::BtcWalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(FeePriority::Low),
            "medium" => Ok(FeePriority::Medium),
            "high" => Ok(FeePriority::High),
            "custom" => Ok(FeePriority::Custom),
            other => Err(invalid_input(format!(
                "Invalid fee priority: {}. Valid options: low, medium, high, custom",
                other
            ))),
        }
    }
}

/// Fee amounts in satoshis for the three priority tiers at one transaction size
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimate {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl FeeEstimate {
    /// Get the fee for the specified priority level
    pub fn for_priority(&self, priority: FeePriority) -> Option<u64> {
        match priority {
            FeePriority::Low => Some(self.low),
            FeePriority::Medium => Some(self.medium),
            FeePriority::High => Some(self.high),
            FeePriority::Custom => None,
        }
    }
}

impl fmt::Display for FeeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Low: {} sat, Medium: {} sat, High: {} sat",
            self.low, self.medium, self.high
        )
    }
}

/// Lifecycle status of a transaction record
///
/// `Confirming`, `Confirmed` and `Failed` are reserved for chain observation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Created but not signed
    Pending,
    /// Signed but not dispatched
    Signed,
    /// Accepted by the network collaborator
    Broadcasted,
    /// In the mempool awaiting confirmations
    Confirming,
    /// Confirmed in a block
    Confirmed,
    /// Rejected or dropped
    Failed,
    /// Built, signed and validated without being broadcast
    Simulated,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Signed => "SIGNED",
            TransactionStatus::Broadcasted => "BROADCASTED",
            TransactionStatus::Confirming => "CONFIRMING",
            TransactionStatus::Confirmed => "CONFIRMED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Simulated => "SIMULATED",
        };
        f.write_str(label)
    }
}

/// An unspent output as reported by a balance scan
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Hash of the transaction that created this output
    pub txid: Txid,
    /// Index of the output within that transaction
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
    /// Locking script descriptor (hex or descriptor string)
    pub script_pubkey: String,
    /// Confirmation depth, 0 for mempool outputs
    pub confirmations: u32,
}

impl Utxo {
    pub fn new(txid: Txid, vout: u32, value: u64, script_pubkey: impl Into<String>, confirmations: u32) -> Self {
        Self {
            txid,
            vout,
            value,
            script_pubkey: script_pubkey.into(),
            confirmations,
        }
    }

    /// The outpoint spending this UTXO refers to
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmations > 0
    }
}

/// Balance snapshot of a single wallet
///
/// `total` is always `confirmed + unconfirmed`; it is computed at construction and
/// cannot be set independently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WalletBalance {
    wallet_id: String,
    confirmed: u64,
    unconfirmed: u64,
    total: u64,
    last_updated: DateTime<Utc>,
    chain_height: u64,
    utxos: Vec<Utxo>,
}

impl WalletBalance {
    /// Build a snapshot, stamping it with the current time
    pub fn new(
        wallet_id: impl Into<String>,
        confirmed: u64,
        unconfirmed: u64,
        chain_height: u64,
        utxos: Vec<Utxo>,
    ) -> WalletResult<Self> {
        Self::at(wallet_id, confirmed, unconfirmed, Utc::now(), chain_height, utxos)
    }

    /// Build a snapshot with an explicit timestamp
    pub fn at(
        wallet_id: impl Into<String>,
        confirmed: u64,
        unconfirmed: u64,
        last_updated: DateTime<Utc>,
        chain_height: u64,
        utxos: Vec<Utxo>,
    ) -> WalletResult<Self> {
        let total = confirmed
            .checked_add(unconfirmed)
            .filter(|t| *t <= MAX_BITCOIN_SUPPLY)
            .ok_or_else(|| {
                balance_failure(format!(
                    "Balance out of range: confirmed {} + unconfirmed {}",
                    confirmed, unconfirmed
                ))
            })?;

        Ok(Self {
            wallet_id: wallet_id.into(),
            confirmed,
            unconfirmed,
            total,
            last_updated,
            chain_height,
            utxos,
        })
    }

    /// An empty snapshot for a wallet with no outputs
    pub fn empty(wallet_id: impl Into<String>, chain_height: u64) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            confirmed: 0,
            unconfirmed: 0,
            total: 0,
            last_updated: Utc::now(),
            chain_height,
            utxos: Vec::new(),
        }
    }

    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    pub fn confirmed(&self) -> u64 {
        self.confirmed
    }

    pub fn unconfirmed(&self) -> u64 {
        self.unconfirmed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn chain_height(&self) -> u64 {
        self.chain_height
    }

    /// UTXOs in the order the scan reported them
    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    pub fn utxo_count(&self) -> usize {
        self.utxos.len()
    }

    /// Sum of all UTXO values (may differ from `total` if the scan reported
    /// balances and outputs from different views)
    pub fn utxo_total(&self) -> u64 {
        self.utxos.iter().map(|u| u.value).sum()
    }

    pub fn has_sufficient_funds(&self, amount: u64) -> bool {
        self.total >= amount
    }

    pub fn has_sufficient_confirmed_funds(&self, amount: u64) -> bool {
        self.confirmed >= amount
    }

    pub fn total_btc(&self) -> String {
        crate::bitcoin_utils::format_btc(self.total)
    }

    pub fn confirmed_btc(&self) -> String {
        crate::bitcoin_utils::format_btc(self.confirmed)
    }

    pub fn unconfirmed_btc(&self) -> String {
        crate::bitcoin_utils::format_btc(self.unconfirmed)
    }
}

/// Sanitize a string for display (to avoid leaking sensitive data)
///
/// This function keeps the first `prefix_chars` characters and replaces
/// the rest with asterisks.
pub fn sanitize_for_display(input: &str, prefix_chars: usize) -> String {
    if input.chars().count() <= prefix_chars {
        return input.to_string();
    }

    let visible: String = input.chars().take(prefix_chars).collect();
    let hidden = "*".repeat(input.chars().count() - prefix_chars);
    format!("{}{}", visible, hidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn utxo(value: u64) -> Utxo {
        Utxo::new(Txid::all_zeros(), 0, value, "76a914", 1)
    }

    #[test]
    fn test_total_is_sum_of_parts() {
        let balance = WalletBalance::new("W", 70_000, 30_000, 800_000, vec![utxo(70_000), utxo(30_000)]).unwrap();
        assert_eq!(balance.total(), 100_000);
        assert_eq!(balance.utxo_total(), 100_000);
        assert_eq!(balance.utxo_count(), 2);
        assert!(balance.has_sufficient_funds(100_000));
        assert!(!balance.has_sufficient_confirmed_funds(80_000));
    }

    #[test]
    fn test_overflowing_balance_is_rejected() {
        assert!(WalletBalance::new("W", u64::MAX, 1, 0, vec![]).is_err());
        assert!(WalletBalance::new("W", MAX_BITCOIN_SUPPLY, 1, 0, vec![]).is_err());
    }

    #[test]
    fn test_fee_priority_parsing() {
        assert_eq!("Medium".parse::<FeePriority>().unwrap(), FeePriority::Medium);
        assert_eq!(" high ".parse::<FeePriority>().unwrap(), FeePriority::High);
        assert!("urgent".parse::<FeePriority>().is_err());
        assert_eq!(FeePriority::Low.to_string(), "LOW");
    }

    #[test]
    fn test_sensitive_string_redacts() {
        let secret = SensitiveString::new("abandon ability able");
        assert_eq!(secret.to_string(), "[REDACTED]");
        assert!(!format!("{:?}", secret).contains("abandon"));
        assert_eq!(secret.expose_secret(), "abandon ability able");
    }

    #[test]
    fn test_sanitize_for_display() {
        assert_eq!(sanitize_for_display("1BoatSLRHtKNngkdXEeobR76b53LETtpyT", 6), format!("1BoatS{}", "*".repeat(28)));
        assert_eq!(sanitize_for_display("abc", 6), "abc");
    }
}
