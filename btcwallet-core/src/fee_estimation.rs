//! Fee estimation
//!
//! Fees are `size_in_bytes × rate`, where the rate is a per-priority base rate
//! bumped for mempool congestion as reported by the [`NetworkMonitor`].
//!
//! The congestion bumps compose sequentially and each step truncates:
//!
//! ```
//! use btcwallet_core::fee_estimation::adjust_rate_for_mempool;
//!
//! assert_eq!(adjust_rate_for_mempool(5, 4_000), 5);
//! assert_eq!(adjust_rate_for_mempool(5, 6_000), 7);   // ⌊5 × 1.5⌋
//! assert_eq!(adjust_rate_for_mempool(5, 12_000), 14); // ⌊⌊5 × 1.5⌋ × 2⌋
//! ```

use bitcoin::consensus::encode;
use bitcoin::Transaction;
use log::debug;
use std::sync::Arc;

use crate::error::{fee_calculation_failure_with_source, WalletResult};
use crate::network_status::NetworkMonitor;
use crate::types::{FeeEstimate, FeePriority, TYPICAL_TX_SIZE};

/// Default fee rates and congestion thresholds
pub mod defaults {
    use crate::types::FeePriority;

    /// Mempool size above which rates are multiplied by 1.5
    pub const CONGESTION_THRESHOLD: u32 = 5_000;

    /// Mempool size above which rates are additionally doubled
    pub const HIGH_CONGESTION_THRESHOLD: u32 = 10_000;

    /// Base rate in sat/byte before congestion adjustment
    pub fn base_fee_rate(priority: FeePriority) -> u64 {
        match priority {
            FeePriority::Low => 1,
            FeePriority::Medium => 5,
            FeePriority::High => 20,
            FeePriority::Custom => 10,
        }
    }
}

/// Apply the congestion multipliers to a base rate
pub fn adjust_rate_for_mempool(base_rate: u64, mempool_size: u32) -> u64 {
    let mut rate = base_rate;

    if mempool_size > defaults::CONGESTION_THRESHOLD {
        // ⌊rate × 1.5⌋
        rate = rate * 3 / 2;
    }

    if mempool_size > defaults::HIGH_CONGESTION_THRESHOLD {
        rate *= 2;
    }

    rate
}

/// Serialized size of a transaction in bytes
pub fn serialized_size(tx: &Transaction) -> usize {
    encode::serialize(tx).len()
}

/// Computes fees from transaction size, priority and network congestion
#[derive(Clone)]
pub struct FeeCalculator {
    monitor: Arc<dyn NetworkMonitor>,
}

impl FeeCalculator {
    pub fn new(monitor: Arc<dyn NetworkMonitor>) -> Self {
        Self { monitor }
    }

    /// Congestion-adjusted rate in sat/byte for a priority
    pub fn fee_rate(&self, priority: FeePriority) -> u64 {
        let mempool_size = self.monitor.mempool_size();
        let rate = adjust_rate_for_mempool(defaults::base_fee_rate(priority), mempool_size);
        debug!("Fee rate for {} at mempool {}: {} sat/byte", priority, mempool_size, rate);
        rate
    }

    /// Fee in satoshis for a transaction of `tx_size` bytes
    pub fn estimate_fee(&self, tx_size: usize, priority: FeePriority) -> u64 {
        tx_size as u64 * self.fee_rate(priority)
    }

    /// Fee for a concrete transaction, sized by its consensus serialization
    pub fn calculate_fee(&self, tx: &Transaction, priority: FeePriority) -> u64 {
        self.estimate_fee(serialized_size(tx), priority)
    }

    /// Fee for a raw payload; fails if the bytes do not decode as a transaction
    pub fn calculate_fee_for_raw(&self, raw_tx: &[u8], priority: FeePriority) -> WalletResult<u64> {
        let tx: Transaction = encode::deserialize(raw_tx).map_err(|e| {
            fee_calculation_failure_with_source(
                format!("Cannot size transaction payload of {} bytes", raw_tx.len()),
                e,
            )
        })?;
        Ok(self.calculate_fee(&tx, priority))
    }

    /// Fee at an explicit rate, ignoring congestion
    pub fn calculate_custom_fee(&self, tx: &Transaction, sat_per_byte: u64) -> u64 {
        serialized_size(tx) as u64 * sat_per_byte
    }

    /// Low/medium/high fees for one size, all computed from a single mempool reading
    pub fn fee_estimates(&self, tx_size: usize) -> FeeEstimate {
        let mempool_size = self.monitor.mempool_size();
        let fee = |priority| tx_size as u64 * adjust_rate_for_mempool(defaults::base_fee_rate(priority), mempool_size);
        FeeEstimate {
            low: fee(FeePriority::Low),
            medium: fee(FeePriority::Medium),
            high: fee(FeePriority::High),
        }
    }

    /// Tier estimates for a typical 226-byte transaction
    pub fn typical_fee_estimates(&self) -> FeeEstimate {
        self.fee_estimates(TYPICAL_TX_SIZE)
    }

    pub fn monitor(&self) -> &Arc<dyn NetworkMonitor> {
        &self.monitor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_status::MockNetworkMonitor;
    use bitcoin::absolute::LockTime;

    fn calculator(mempool: u32) -> FeeCalculator {
        FeeCalculator::new(Arc::new(MockNetworkMonitor::new().with_mempool_size(mempool)))
    }

    #[test]
    fn test_base_rates_without_congestion() {
        let calc = calculator(1_000);
        assert_eq!(calc.fee_rate(FeePriority::Low), 1);
        assert_eq!(calc.fee_rate(FeePriority::Medium), 5);
        assert_eq!(calc.fee_rate(FeePriority::High), 20);
        assert_eq!(calc.fee_rate(FeePriority::Custom), 10);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        assert_eq!(adjust_rate_for_mempool(5, 5_000), 5);
        assert_eq!(adjust_rate_for_mempool(5, 5_001), 7);
        assert_eq!(adjust_rate_for_mempool(5, 10_000), 7);
        assert_eq!(adjust_rate_for_mempool(5, 10_001), 14);
        // Sequential truncation, not a single 3x factor
        assert_eq!(adjust_rate_for_mempool(1, 12_000), 2);
        assert_eq!(adjust_rate_for_mempool(20, 12_000), 60);
    }

    #[test]
    fn test_typical_estimates() {
        let estimate = calculator(1_000).typical_fee_estimates();
        assert_eq!(estimate, FeeEstimate { low: 226, medium: 1_130, high: 4_520 });
        assert_eq!(estimate.to_string(), "Low: 226 sat, Medium: 1130 sat, High: 4520 sat");
    }

    #[test]
    fn test_raw_payload_must_decode() {
        let calc = calculator(1_000);
        let tx = Transaction {
            version: 2,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        let raw = encode::serialize(&tx);
        assert_eq!(calc.calculate_fee_for_raw(&raw, FeePriority::Low).unwrap(), raw.len() as u64);

        let err = calc.calculate_fee_for_raw(&[0xde, 0xad], FeePriority::Low).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::FeeCalculation);
    }

    #[test]
    fn test_custom_fee_ignores_congestion() {
        let calc = calculator(50_000);
        let tx = Transaction {
            version: 2,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        assert_eq!(calc.calculate_custom_fee(&tx, 3), serialized_size(&tx) as u64 * 3);
    }
}
