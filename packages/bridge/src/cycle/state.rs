// packages/bridge/src/cycle/state.rs
//! Shared cycle counters and rates
//!
//! Every field has a single writer (scheduler, meter, RTF poller or the
//! dispatcher) and any number of readers. Readers may see a value that is one
//! measurement window old.

use crate::observability::{CYCLE_TARGET_PERIOD, REAL_TIME_FACTOR};
use metrics::gauge;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// `f64` stored as bits in an `AtomicU64`
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Point-in-time copy of [`CycleState`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleSnapshot {
    pub target_period_ms: f64,
    pub iteration_count: u64,
    pub measured_period_ms: f64,
    pub real_time_factor: f64,
}

impl CycleSnapshot {
    /// Achieved frequency from the last window, rounded to 0.1 Hz
    pub fn measured_frequency(&self) -> f64 {
        frequency_from_period(self.measured_period_ms)
    }
}

/// Convert a period in milliseconds to Hz, rounded to one decimal; 0 for 0
pub fn frequency_from_period(period_ms: f64) -> f64 {
    if period_ms > 0.0 {
        (10_000.0 / period_ms).round() / 10.0
    } else {
        0.0
    }
}

#[derive(Debug)]
pub struct CycleState {
    target_period_ms: AtomicF64,
    iteration_count: AtomicU64,
    measured_period_ms: AtomicF64,
    real_time_factor: AtomicF64,
}

impl CycleState {
    pub fn new(target_period: Duration) -> Self {
        Self {
            target_period_ms: AtomicF64::new(target_period.as_nanos() as f64 / 1e6),
            iteration_count: AtomicU64::new(0),
            measured_period_ms: AtomicF64::new(0.0),
            real_time_factor: AtomicF64::new(0.0),
        }
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        CycleSnapshot {
            target_period_ms: self.target_period_ms(),
            iteration_count: self.iteration_count.load(Ordering::Acquire),
            measured_period_ms: self.measured_period_ms.load(),
            real_time_factor: self.real_time_factor.load(),
        }
    }

    pub fn target_period_ms(&self) -> f64 {
        self.target_period_ms.load()
    }

    pub fn target_period(&self) -> Duration {
        Duration::from_nanos((self.target_period_ms().max(0.0) * 1e6).round() as u64)
    }

    pub fn set_target_period(&self, period: Duration) {
        let period_ms = period.as_nanos() as f64 / 1e6;
        self.target_period_ms.store(period_ms);
        gauge!(CYCLE_TARGET_PERIOD).set(period_ms);
    }

    /// Apply a peer-negotiated frequency. Returns false (and changes nothing)
    /// unless the frequency is finite and positive.
    pub fn set_target_frequency(&self, frequency: f64) -> bool {
        if !frequency.is_finite() || frequency <= 0.0 {
            return false;
        }
        let period_ms = 1000.0 / frequency;
        self.target_period_ms.store(period_ms);
        gauge!(CYCLE_TARGET_PERIOD).set(period_ms);
        true
    }

    pub fn record_iteration(&self) {
        self.iteration_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Read and reset the iteration counter for a new measurement window
    pub fn take_iterations(&self) -> u64 {
        self.iteration_count.swap(0, Ordering::AcqRel)
    }

    pub fn measured_period_ms(&self) -> f64 {
        self.measured_period_ms.load()
    }

    pub fn set_measured_period_ms(&self, period_ms: f64) {
        self.measured_period_ms.store(period_ms);
    }

    pub fn real_time_factor(&self) -> f64 {
        self.real_time_factor.load()
    }

    pub fn set_real_time_factor(&self, rtf: f64) {
        self.real_time_factor.store(rtf);
        gauge!(REAL_TIME_FACTOR).set(rtf);
    }
}
