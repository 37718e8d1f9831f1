//! UTXO selection for spend transactions
//!
//! Selection is greedy and runs in the order the balance snapshot reports the
//! outputs. There is no sorting by value. UTXOs are accumulated until the running
//! total covers `amount + fee`.
//!
//! Any surplus at or below the dust threshold is not returned as change. It is
//! absorbed into the fee, so no output is created and no error is raised.
//!
//! # Examples
//!
//! ```
//! use btcwallet_core::types::Utxo;
//! use btcwallet_core::utxo_selection::{CoinSelector, SelectionResult};
//! use bitcoin::hashes::Hash;
//! use bitcoin::Txid;
//!
//! let utxos = vec![Utxo::new(Txid::all_zeros(), 0, 200_000, "", 6)];
//!
//! match CoinSelector::new().select_inputs(&utxos, 100_000, 5_000) {
//!     SelectionResult::Success { selected, change_amount, .. } => {
//!         assert_eq!(selected.len(), 1);
//!         assert_eq!(change_amount, 95_000);
//!     }
//!     SelectionResult::InsufficientFunds { .. } => unreachable!(),
//! }
//! ```

use log::debug;
use serde::Serialize;

use crate::error::{invalid_transaction, BtcWalletError};
use crate::types::{Utxo, DUST_THRESHOLD};

/// Result of a UTXO selection operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SelectionResult {
    /// Selection successful
    Success {
        /// Selected UTXOs, in snapshot order
        selected: Vec<Utxo>,
        /// Fee actually paid: the requested fee plus any absorbed dust surplus
        fee_amount: u64,
        /// Value of the change output, 0 when no change output is created
        change_amount: u64,
    },
    /// Insufficient funds
    InsufficientFunds {
        /// Sum of every UTXO offered
        available: u64,
        /// `amount + fee`
        required: u64,
    },
}

impl SelectionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SelectionResult::Success { .. })
    }

    /// Whether a change output should be appended
    pub fn has_change(&self) -> bool {
        matches!(self, SelectionResult::Success { change_amount, .. } if *change_amount > 0)
    }

    /// Total value of the selected inputs
    pub fn selected_total(&self) -> u64 {
        match self {
            SelectionResult::Success { selected, .. } => selected.iter().map(|u| u.value).sum(),
            SelectionResult::InsufficientFunds { .. } => 0,
        }
    }

    /// Convert into the selected inputs and change, or an "insufficient funds" error
    pub fn into_inputs(self) -> Result<(Vec<Utxo>, u64), BtcWalletError> {
        match self {
            SelectionResult::Success {
                selected,
                change_amount,
                ..
            } => Ok((selected, change_amount)),
            SelectionResult::InsufficientFunds { available, required } => Err(invalid_transaction(format!(
                "Insufficient funds: required {} sat, available {} sat",
                required, available
            ))),
        }
    }
}

/// Greedy in-order coin selector
#[derive(Debug, Clone, Copy)]
pub struct CoinSelector {
    dust_threshold: u64,
}

impl Default for CoinSelector {
    fn default() -> Self {
        Self {
            dust_threshold: DUST_THRESHOLD,
        }
    }
}

impl CoinSelector {
    /// Create a selector using the protocol dust threshold of 546 sat
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dust_threshold(dust_threshold: u64) -> Self {
        Self { dust_threshold }
    }

    pub fn dust_threshold(&self) -> u64 {
        self.dust_threshold
    }

    /// Select inputs covering `amount + fee`
    ///
    /// Stops at the first prefix of `utxos` whose sum reaches the target. Change is
    /// reported only when the surplus is strictly greater than the dust threshold.
    pub fn select_inputs(&self, utxos: &[Utxo], amount: u64, fee: u64) -> SelectionResult {
        let available: u64 = utxos.iter().map(|u| u.value).fold(0u64, u64::saturating_add);

        let required = match amount.checked_add(fee) {
            Some(required) => required,
            None => {
                return SelectionResult::InsufficientFunds {
                    available,
                    required: u64::MAX,
                }
            }
        };

        let mut selected = Vec::new();
        let mut total_selected = 0u64;

        for utxo in utxos {
            if total_selected >= required {
                break;
            }
            total_selected = total_selected.saturating_add(utxo.value);
            selected.push(utxo.clone());
        }

        if total_selected < required {
            debug!("Selection failed: required {} sat, available {} sat", required, available);
            return SelectionResult::InsufficientFunds { available, required };
        }

        let surplus = total_selected - required;
        let (change_amount, fee_amount) = if surplus > self.dust_threshold {
            (surplus, fee)
        } else {
            // Dust surplus goes to the miner
            (0, fee + surplus)
        };

        debug!(
            "Selected {} of {} UTXOs: total {} sat, change {} sat, fee {} sat",
            selected.len(),
            utxos.len(),
            total_selected,
            change_amount,
            fee_amount
        );

        SelectionResult::Success {
            selected,
            fee_amount,
            change_amount,
        }
    }
}

/// Select with the default dust threshold
pub fn select_inputs(utxos: &[Utxo], amount: u64, fee: u64) -> SelectionResult {
    CoinSelector::new().select_inputs(utxos, amount, fee)
}
