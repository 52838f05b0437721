//! Synthetic session telemetry
//!
//! No provider has a telemetry channel into its tunnel yet, so sessions are
//! simulated from a per-protocol profile. Cumulative counters never decrease
//! within a session and restart from zero on the next one.

use crate::error::{Result, VpnError};
use crate::types::Metrics;
use rand::Rng;
use std::time::Instant;

/// Nominal traffic characteristics of a protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficProfile {
    /// Download rate in bytes per second
    pub rx_rate: u64,
    /// Upload rate in bytes per second
    pub tx_rate: u64,
    /// Base round-trip time in milliseconds
    pub ping_ms: u32,
    /// Maximum deviation from the base round-trip time
    pub jitter_ms: u32,
}

impl TrafficProfile {
    pub const fn new(rx_rate: u64, tx_rate: u64, ping_ms: u32, jitter_ms: u32) -> Self {
        Self {
            rx_rate,
            tx_rate,
            ping_ms,
            jitter_ms,
        }
    }
}

/// Per-session traffic generator
#[derive(Debug)]
pub struct TrafficSimulator {
    profile: TrafficProfile,
    last_sample: Option<Instant>,
    last_ping: Option<u32>,
    bytes_received: u64,
    bytes_sent: u64,
}

impl TrafficSimulator {
    pub fn new(profile: TrafficProfile) -> Self {
        Self {
            profile,
            last_sample: None,
            last_ping: None,
            bytes_received: 0,
            bytes_sent: 0,
        }
    }

    /// Begin a new session with zeroed counters
    pub fn start(&mut self) {
        self.last_sample = Some(Instant::now());
        self.last_ping = None;
        self.bytes_received = 0;
        self.bytes_sent = 0;
    }

    pub fn stop(&mut self) {
        self.last_sample = None;
    }

    pub fn is_running(&self) -> bool {
        self.last_sample.is_some()
    }

    /// Advance the session to now and report it
    pub fn sample(&mut self) -> Result<Metrics> {
        let last = self
            .last_sample
            .ok_or_else(|| VpnError::Metrics("no active session".to_string()))?;

        let now = Instant::now();
        let elapsed = now.duration_since(last).as_secs_f64();
        let mut rng = rand::thread_rng();

        // Link load wanders between 60% and 120% of the nominal rate
        let load: f64 = rng.gen_range(0.6..=1.2);
        let rx = (self.profile.rx_rate as f64 * elapsed * load) as u64;
        let tx = (self.profile.tx_rate as f64 * elapsed * load) as u64;

        self.bytes_received = self.bytes_received.saturating_add(rx);
        self.bytes_sent = self.bytes_sent.saturating_add(tx);
        self.last_sample = Some(now);

        let throughput = if elapsed > 0.0 {
            ((rx + tx) as f64 / elapsed) as u64
        } else {
            0
        };

        let spread = self.profile.jitter_ms as i64;
        let offset = if spread > 0 {
            rng.gen_range(-spread..=spread)
        } else {
            0
        };
        let ping = (self.profile.ping_ms as i64 + offset).max(1) as u32;
        let jitter = match self.last_ping {
            Some(previous) => previous.abs_diff(ping),
            None => self.profile.jitter_ms,
        };
        self.last_ping = Some(ping);

        Ok(Metrics {
            throughput,
            ping,
            jitter,
            bytes_received: self.bytes_received,
            bytes_sent: self.bytes_sent,
        })
    }
}
