//! Transaction construction, signing and dispatch
//!
//! [`TransactionService::create_transaction`] runs the whole lifecycle in one call:
//!
//! ```text
//! PENDING -> SIGNED -> SIMULATED | BROADCASTED
//! ```
//!
//! Validation order is part of the contract. The amount is checked before the
//! wallet is looked up, and the wallet before the recipient address. Funds are
//! checked last.
//!
//! Coin selection runs against a fee estimated for an empty transaction. The fee
//! recorded on the result is recomputed from the serialized size of the populated
//! unsigned transaction. Outputs are not rebuilt with that final fee.
//!
//! Without per-wallet locking, two concurrent spends from one wallet can select
//! the same outputs, because selection reads a balance snapshot without reserving
//! anything. Enable [`TransactionService::with_wallet_locks`] to serialize the
//! select, sign and broadcast sequence per wallet.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode;
use bitcoin::{Address, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::balance_service::BalanceService;
use crate::bitcoin_utils::{format_btc, satoshis_to_btc};
use crate::error::{invalid_transaction, invalid_transaction_with_source, BtcWalletError, WalletResult};
use crate::fee_estimation::FeeCalculator;
use crate::keys;
use crate::logging::{log_params, log_transaction, LogLevel, SafeLog};
use crate::network_status::NetworkSnapshot;
use crate::node_client::{with_timeout, NodeClient};
use crate::types::{FeeEstimate, FeePriority, TransactionStatus, Utxo};
use crate::utxo_selection::CoinSelector;
use crate::wallet_store::WalletStore;

/// Immutable record of a constructed transaction
///
/// Status changes produce a new record through [`TransactionRecord::with_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    transaction_id: String,
    wallet_id: String,
    recipient_address: String,
    amount: u64,
    fee: u64,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    is_simulation: bool,
    #[serde(skip)]
    raw_transaction: Transaction,
}

impl TransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transaction_id: impl Into<String>,
        wallet_id: impl Into<String>,
        recipient_address: impl Into<String>,
        amount: u64,
        fee: u64,
        status: TransactionStatus,
        is_simulation: bool,
        raw_transaction: Transaction,
    ) -> WalletResult<Self> {
        let transaction_id = transaction_id.into();
        let wallet_id = wallet_id.into();
        let recipient_address = recipient_address.into();

        if transaction_id.trim().is_empty() {
            return Err(invalid_transaction("Transaction ID cannot be empty"));
        }
        if wallet_id.trim().is_empty() {
            return Err(invalid_transaction("Wallet ID cannot be empty"));
        }
        if recipient_address.trim().is_empty() {
            return Err(invalid_transaction("Recipient address cannot be empty"));
        }
        if amount == 0 {
            return Err(invalid_transaction("Amount must be positive"));
        }

        Ok(Self {
            transaction_id,
            wallet_id,
            recipient_address,
            amount,
            fee,
            status,
            created_at: Utc::now(),
            is_simulation,
            raw_transaction,
        })
    }

    /// Same record with a new status
    pub fn with_status(&self, status: TransactionStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    pub fn recipient_address(&self) -> &str {
        &self.recipient_address
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_simulation(&self) -> bool {
        self.is_simulation
    }

    pub fn raw_transaction(&self) -> &Transaction {
        &self.raw_transaction
    }

    /// Consensus serialization of the signed transaction, hex encoded
    pub fn raw_hex(&self) -> String {
        hex::encode(encode::serialize(&self.raw_transaction))
    }

    /// Amount plus fee
    pub fn total_amount(&self) -> u64 {
        self.amount.saturating_add(self.fee)
    }

    pub fn amount_btc(&self) -> String {
        format_btc(self.amount)
    }

    pub fn fee_btc(&self) -> String {
        format_btc(self.fee)
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == TransactionStatus::Confirmed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TransactionStatus::Failed
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction[id={}, wallet={}, recipient={}, amount={}, fee={}, status={}, simulation={}]",
            self.transaction_id,
            self.wallet_id,
            self.recipient_address,
            self.amount_btc(),
            self.fee_btc(),
            self.status,
            self.is_simulation
        )
    }
}

/// Fee tiers for a typical transaction together with the network state they came from
#[derive(Debug, Clone, Serialize)]
pub struct FeeEstimateReport {
    pub low: u64,
    pub low_btc: String,
    pub medium: u64,
    pub medium_btc: String,
    pub high: u64,
    pub high_btc: String,
    pub recommended_priority: FeePriority,
    pub network_status: String,
    pub network: NetworkSnapshot,
}

impl FeeEstimateReport {
    pub fn new(estimate: FeeEstimate, network: NetworkSnapshot) -> Self {
        Self {
            low: estimate.low,
            low_btc: satoshis_to_btc(estimate.low).to_string(),
            medium: estimate.medium,
            medium_btc: satoshis_to_btc(estimate.medium).to_string(),
            high: estimate.high,
            high_btc: satoshis_to_btc(estimate.high).to_string(),
            recommended_priority: network.recommended_priority,
            network_status: network.summary.clone(),
            network,
        }
    }
}

/// Structural checks applied before a transaction is simulated or broadcast
pub fn validate_structure(tx: &Transaction) -> WalletResult<()> {
    if tx.input.is_empty() {
        return Err(invalid_transaction("Transaction has no inputs"));
    }
    if tx.output.is_empty() {
        return Err(invalid_transaction("Transaction has no outputs"));
    }
    let total_output: u64 = tx.output.iter().map(|o| o.value).fold(0u64, u64::saturating_add);
    if total_output == 0 {
        return Err(invalid_transaction("Transaction has no value"));
    }
    Ok(())
}

/// The zero-input, zero-output transaction used to size the placeholder fee
pub fn empty_transaction() -> Transaction {
    Transaction {
        version: 2,
        lock_time: LockTime::ZERO,
        input: Vec::new(),
        output: Vec::new(),
    }
}

fn build_unsigned(
    selected: &[Utxo],
    recipient: &Address,
    amount: u64,
    change: u64,
    change_address: &Address,
) -> Transaction {
    let input = selected
        .iter()
        .map(|utxo| TxIn {
            previous_output: utxo.outpoint(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        })
        .collect();

    let mut output = vec![TxOut {
        value: amount,
        script_pubkey: recipient.script_pubkey(),
    }];

    if change > 0 {
        output.push(TxOut {
            value: change,
            script_pubkey: change_address.script_pubkey(),
        });
    }

    Transaction {
        version: 2,
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

type WalletLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Builds, signs, simulates and broadcasts spend transactions
pub struct TransactionService {
    store: Arc<WalletStore>,
    balances: Arc<BalanceService>,
    fees: FeeCalculator,
    node: Arc<dyn NodeClient>,
    selector: CoinSelector,
    priority: FeePriority,
    timeout: Duration,
    wallet_locks: Option<WalletLocks>,
}

impl TransactionService {
    pub fn new(
        store: Arc<WalletStore>,
        balances: Arc<BalanceService>,
        fees: FeeCalculator,
        node: Arc<dyn NodeClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            balances,
            fees,
            node,
            selector: CoinSelector::new(),
            priority: FeePriority::Medium,
            timeout,
            wallet_locks: None,
        }
    }

    /// Priority used for both fee passes
    pub fn with_fee_priority(mut self, priority: FeePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Serialize transaction construction per wallet
    pub fn with_wallet_locks(mut self, enabled: bool) -> Self {
        self.wallet_locks = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn fee_priority(&self) -> FeePriority {
        self.priority
    }

    pub fn fee_calculator(&self) -> &FeeCalculator {
        &self.fees
    }

    fn wallet_lock(&self, wallet_id: &str) -> Option<Arc<tokio::sync::Mutex<()>>> {
        let locks = self.wallet_locks.as_ref()?;
        let mut locks = locks.lock().unwrap_or_else(|e| e.into_inner());
        Some(Arc::clone(locks.entry(wallet_id.to_string()).or_default()))
    }

    /// Build, sign and either simulate or broadcast a payment
    ///
    /// `amount` is signed so a non-positive request is rejected as invalid before
    /// anything else is looked at.
    pub async fn create_transaction(
        &self,
        wallet_id: &str,
        recipient_address: &str,
        amount: i64,
        simulate: bool,
    ) -> WalletResult<TransactionRecord> {
        if amount <= 0 {
            return Err(invalid_transaction("Amount must be positive"));
        }
        let amount = amount as u64;

        let wallet = self
            .store
            .get(wallet_id)
            .ok_or_else(|| invalid_transaction(format!("Wallet not found: {}", wallet_id)))?;

        let recipient = self.store.parse_address(recipient_address).map_err(|e| {
            invalid_transaction_with_source(format!("Invalid recipient address: {}", recipient_address.trim()), e)
        })?;

        let lock = self.wallet_lock(wallet_id);
        let _guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let utxos = self.balances.utxos(wallet_id).await?;

        let placeholder_fee = self.fees.calculate_fee(&empty_transaction(), self.priority);
        let (selected, change) = self
            .selector
            .select_inputs(&utxos, amount, placeholder_fee)
            .into_inputs()?;

        let mut tx = build_unsigned(&selected, &recipient, amount, change, wallet.address());
        let final_fee = self.fees.calculate_fee(&tx, self.priority);

        keys::sign_p2pkh_inputs(&mut tx, wallet.signing_key())?;

        let record = TransactionRecord::new(
            tx.txid().to_string(),
            wallet_id,
            recipient.to_string(),
            amount,
            final_fee,
            TransactionStatus::Signed,
            simulate,
            tx,
        )?;

        log_transaction(
            LogLevel::Info,
            "Transaction signed",
            Some(log_params(vec![
                ("wallet_id", wallet_id.to_string()),
                ("txid", record.transaction_id().safe_log_format()),
                ("inputs", selected.len().to_string()),
                ("placeholder_fee", placeholder_fee.to_string()),
                ("fee", final_fee.to_string()),
            ])),
        );

        if simulate {
            self.handle_simulation(record)
        } else {
            self.handle_broadcast(record).await
        }
    }

    fn handle_simulation(&self, record: TransactionRecord) -> WalletResult<TransactionRecord> {
        validate_structure(record.raw_transaction())?;
        log_transaction(LogLevel::Info, "Transaction simulated, not broadcast", None);
        Ok(record.with_status(TransactionStatus::Simulated))
    }

    async fn handle_broadcast(&self, record: TransactionRecord) -> WalletResult<TransactionRecord> {
        validate_structure(record.raw_transaction())?;

        with_timeout(self.timeout, self.node.broadcast(record.raw_transaction()))
            .await
            .map_err(|e| {
                log_transaction(
                    LogLevel::Warn,
                    "Broadcast failed",
                    Some(log_params(vec![("error", e.to_string())])),
                );
                BtcWalletError::from(e)
            })?;

        // Spent outputs must not be offered to the next selection
        self.balances.clear_balance_cache(record.wallet_id());

        log_transaction(
            LogLevel::Info,
            "Transaction broadcast",
            Some(log_params(vec![("txid", record.transaction_id().safe_log_format())])),
        );
        Ok(record.with_status(TransactionStatus::Broadcasted))
    }

    /// Not backed by chain observation yet; always reports `CONFIRMING`
    pub fn get_transaction_status(&self, _transaction_id: &str) -> TransactionStatus {
        TransactionStatus::Confirming
    }

    /// Not backed by transaction storage yet; always empty
    pub fn list_transactions(&self, _wallet_id: &str) -> Vec<TransactionRecord> {
        Vec::new()
    }

    /// Fee tiers for a typical transaction and the network state behind them
    pub fn fee_estimate_report(&self) -> FeeEstimateReport {
        let network = self.fees.monitor().snapshot();
        FeeEstimateReport::new(self.fees.typical_fee_estimates(), network)
    }
}
