//! Per-manager counters polled by the upper layer.
//!
//! Mirrors what a device keeps in its storage slots: concurrency, an
//! estimate of the bytes spent announcing processes, and delivery figures.

use aproc_metrics::{Counter, MaxGauge};
use serde::{Deserialize, Serialize};

use crate::types::Round;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessStats {
    /// Most processes run in a single round.
    pub max_proc: MaxGauge,
    /// Processes run, summed over rounds.
    pub tot_proc: Counter,
    /// Largest per-round export size estimate, in bytes.
    pub max_msg_size: MaxGauge,
    pub tot_msg_size: Counter,
    /// Sum of first-delivery latencies, in rounds.
    pub first_delivery_tot: Counter,
    pub delivery_count: Counter,
    /// Outputs for keys that had already been delivered here.
    pub repeat_count: Counter,
}

impl ProcessStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_round(&self, active: usize, msg_size: usize) {
        self.max_proc.observe(active as u64);
        self.tot_proc.inc_by(active as u64);
        self.max_msg_size.observe(msg_size as u64);
        self.tot_msg_size.inc_by(msg_size as u64);
    }

    pub fn record_first_delivery(&self, latency: Option<Round>) {
        self.delivery_count.inc();
        if let Some(latency) = latency {
            self.first_delivery_tot.inc_by(latency);
        }
    }

    pub fn record_repeat(&self) {
        self.repeat_count.inc();
    }

    /// Mean first-delivery latency, if anything was delivered.
    pub fn average_delay(&self) -> Option<f64> {
        let count = self.delivery_count.get();
        (count > 0).then(|| self.first_delivery_tot.get() as f64 / count as f64)
    }

    /// Fold another device's counters into this one (totals add, maxima max).
    pub fn absorb(&mut self, other: &ProcessStats) {
        self.max_proc.observe(other.max_proc.get());
        self.tot_proc.inc_by(other.tot_proc.get());
        self.max_msg_size.observe(other.max_msg_size.get());
        self.tot_msg_size.inc_by(other.tot_msg_size.get());
        self.first_delivery_tot.inc_by(other.first_delivery_tot.get());
        self.delivery_count.inc_by(other.delivery_count.get());
        self.repeat_count.inc_by(other.repeat_count.get());
    }
}
