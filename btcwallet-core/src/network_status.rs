//! Bitcoin network availability and congestion signals
//!
//! The fee estimator and the transaction orchestrator only depend on the
//! [`NetworkMonitor`] trait: availability, mempool size and the derived
//! congestion/priority recommendation.
//!
//! [`SimulatedNetworkMonitor`] is a synthetic generator (random outages and a
//! time-of-day biased mempool figure). It does not reflect real chain state and is
//! meant to be replaced by a telemetry or node-backed implementation.

use chrono::{Local, Timelike};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::types::FeePriority;

/// Mempool size above which broadcasts are refused as congested
pub const CONGESTION_REJECT_THRESHOLD: u32 = 10_000;

/// Represents the current Bitcoin network congestion level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CongestionLevel {
    /// Low congestion - transactions likely to confirm quickly
    Low,
    /// Moderate congestion - transactions may take a few blocks to confirm
    Moderate,
    /// High congestion - transactions may be delayed
    High,
    /// Severe congestion - transactions likely to be significantly delayed
    Severe,
}

impl CongestionLevel {
    /// Bucket a congestion ratio (0.0..=1.0) into a level
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.3 {
            CongestionLevel::Low
        } else if ratio < 0.6 {
            CongestionLevel::Moderate
        } else if ratio < 0.8 {
            CongestionLevel::High
        } else {
            CongestionLevel::Severe
        }
    }
}

impl std::fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CongestionLevel::Low => write!(f, "Low"),
            CongestionLevel::Moderate => write!(f, "Moderate"),
            CongestionLevel::High => write!(f, "High"),
            CongestionLevel::Severe => write!(f, "Severe"),
        }
    }
}

/// Map a mempool transaction count to a congestion ratio
pub fn congestion_for_mempool(mempool_size: u32) -> f64 {
    match mempool_size {
        0..=1_999 => 0.1,
        2_000..=4_999 => 0.3,
        5_000..=7_999 => 0.6,
        8_000..=11_999 => 0.8,
        _ => 1.0,
    }
}

/// Map a congestion ratio to the priority a sender should pick
pub fn priority_for_congestion(congestion: f64) -> FeePriority {
    if congestion < 0.3 {
        FeePriority::Low
    } else if congestion < 0.7 {
        FeePriority::Medium
    } else {
        FeePriority::High
    }
}

/// Point-in-time view of the monitor, sampled once so all fields agree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub available: bool,
    pub mempool_size: u32,
    pub congestion: f64,
    pub congestion_level: CongestionLevel,
    pub recommended_priority: FeePriority,
    pub healthy: bool,
    pub hash_rate: u64,
    pub average_block_time_secs: u32,
    pub difficulty: u64,
    pub summary: String,
}

/// Source of network availability and congestion signals
pub trait NetworkMonitor: Send + Sync {
    /// Whether the network currently accepts submissions
    fn is_available(&self) -> bool;

    /// Approximate number of unconfirmed transactions
    fn mempool_size(&self) -> u32;

    /// Network hash rate
    fn hash_rate(&self) -> u64;

    /// Average seconds between recent blocks
    fn average_block_time(&self) -> u32;

    /// Current mining difficulty
    fn difficulty(&self) -> u64;

    /// Mark the network reachable
    fn connect(&self) {}

    /// Mark the network unreachable
    fn disconnect(&self) {}

    /// Congestion ratio in 0.0..=1.0
    fn congestion_level(&self) -> f64 {
        congestion_for_mempool(self.mempool_size())
    }

    fn recommended_priority(&self) -> FeePriority {
        priority_for_congestion(self.congestion_level())
    }

    fn is_healthy(&self) -> bool {
        self.is_available() && self.congestion_level() < 0.8
    }

    /// One-line human readable status
    fn status_summary(&self) -> String {
        let snapshot = self.snapshot();
        snapshot.summary
    }

    /// Sample every signal once
    fn snapshot(&self) -> NetworkSnapshot {
        let available = self.is_available();
        let mempool_size = self.mempool_size();
        let congestion = congestion_for_mempool(mempool_size);
        NetworkSnapshot {
            available,
            mempool_size,
            congestion,
            congestion_level: CongestionLevel::from_ratio(congestion),
            recommended_priority: priority_for_congestion(congestion),
            healthy: available && congestion < 0.8,
            hash_rate: self.hash_rate(),
            average_block_time_secs: self.average_block_time(),
            difficulty: self.difficulty(),
            summary: format!(
                "Network: {}, Mempool: {}, Congestion: {:.1}%",
                if available { "Available" } else { "Unavailable" },
                mempool_size,
                congestion * 100.0
            ),
        }
    }
}

/// Synthetic network monitor driven by a random generator
///
/// - 5% chance of reporting the network unavailable on each query
/// - Mempool of 3000..10000 between 08:00 and 18:00 local time, 1000..3000 otherwise
#[derive(Debug)]
pub struct SimulatedNetworkMonitor {
    connected: AtomicBool,
    outage_probability: f64,
}

impl Default for SimulatedNetworkMonitor {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(true),
            outage_probability: 0.05,
        }
    }
}

impl SimulatedNetworkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mempool figure for a given local hour
    pub fn mempool_size_at_hour(&self, hour: u32) -> u32 {
        let mut rng = rand::rng();
        if (8..18).contains(&hour) {
            rng.random_range(3_000..10_000)
        } else {
            rng.random_range(1_000..3_000)
        }
    }
}

impl NetworkMonitor for SimulatedNetworkMonitor {
    fn is_available(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !rand::rng().random_bool(self.outage_probability)
    }

    fn mempool_size(&self) -> u32 {
        self.mempool_size_at_hour(Local::now().hour())
    }

    fn hash_rate(&self) -> u64 {
        400_000_000 + rand::rng().random_range(0..50_000_000u64)
    }

    fn average_block_time(&self) -> u32 {
        rand::rng().random_range(540..660)
    }

    fn difficulty(&self) -> u64 {
        50_000_000_000_000 + rand::rng().random_range(0..5_000_000_000_000u64)
    }

    fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Deterministic monitor for tests and demos
///
/// Values can be changed after construction so a shared instance can drive a
/// scenario step by step.
#[derive(Debug)]
pub struct MockNetworkMonitor {
    available: AtomicBool,
    mempool_size: AtomicU32,
    hash_rate: u64,
    block_time: u32,
    difficulty: u64,
}

impl Default for MockNetworkMonitor {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            mempool_size: AtomicU32::new(1_000),
            hash_rate: 425_000_000,
            block_time: 600,
            difficulty: 52_000_000_000_000,
        }
    }
}

impl MockNetworkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mempool_size(self, size: u32) -> Self {
        self.set_mempool_size(size);
        self
    }

    pub fn with_availability(self, available: bool) -> Self {
        self.set_available(available);
        self
    }

    pub fn set_mempool_size(&self, size: u32) {
        self.mempool_size.store(size, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl NetworkMonitor for MockNetworkMonitor {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn mempool_size(&self) -> u32 {
        self.mempool_size.load(Ordering::SeqCst)
    }

    fn hash_rate(&self) -> u64 {
        self.hash_rate
    }

    fn average_block_time(&self) -> u32 {
        self.block_time
    }

    fn difficulty(&self) -> u64 {
        self.difficulty
    }

    fn connect(&self) {
        self.set_available(true);
    }

    fn disconnect(&self) {
        self.set_available(false);
    }
}
