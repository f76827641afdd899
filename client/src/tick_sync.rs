//! Round-trip measurement and tick offset estimation
//!
//! A ping goes out every `ping_interval`, independent of the simulation.
//! When the matching pong comes back the round trip is measured and turned
//! into the number of ticks commands should be stamped ahead by, so that
//! they arrive at the authority close to its current tick.

use log::debug;
use shared::GameConfig;
use std::time::{Duration, Instant};

/// Latest latency estimate and the tick offset derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockState {
    pub rtt_estimate_ms: f64,
    pub tick_offset: u32,
}

/// `round(rtt / (2 * interval))`: ticks elapsed during one half trip.
pub fn tick_offset_for(rtt_ms: f64, fixed_interval_ms: f64) -> u32 {
    if fixed_interval_ms <= 0.0 || !rtt_ms.is_finite() || rtt_ms <= 0.0 {
        return 0;
    }
    (rtt_ms / (2.0 * fixed_interval_ms)).round() as u32
}

#[derive(Debug, Clone)]
pub struct TickSync {
    ping_interval: Duration,
    fixed_interval_ms: f64,
    /// Send time of the ping still waiting for its pong
    outstanding: Option<Instant>,
    /// Set when `outstanding` replaced a ping that never got its pong
    superseded: bool,
    next_ping: Option<Instant>,
    clock: ClockState,
    samples: u64,
}

impl TickSync {
    pub fn new(ping_interval: Duration, fixed_interval_ms: f64) -> Self {
        Self {
            ping_interval,
            fixed_interval_ms,
            outstanding: None,
            superseded: false,
            next_ping: None,
            clock: ClockState::default(),
            samples: 0,
        }
    }

    pub fn from_config(config: &GameConfig) -> Self {
        Self::new(config.ping_interval(), config.fixed_interval_ms())
    }

    /// Returns true when a ping should be sent now and records its send time.
    ///
    /// The first call always pings. A ping whose pong never arrived is
    /// superseded and the clock keeps its last known value.
    pub fn poll(&mut self, now: Instant) -> bool {
        let due = match self.next_ping {
            Some(next) => now >= next,
            None => true,
        };
        if !due {
            return false;
        }

        self.superseded = self.outstanding.is_some();
        self.outstanding = Some(now);
        self.next_ping = Some(now + self.ping_interval);
        true
    }

    /// Completes the outstanding ping. Pongs without one are ignored.
    ///
    /// Pongs carry no sequence number. After a superseded ping, a pong that
    /// returns in under half the last round trip is taken to answer the old
    /// ping and is dropped, leaving the new one outstanding.
    pub fn on_pong(&mut self, now: Instant) -> Option<ClockState> {
        let sent = self.outstanding?;
        let rtt_ms = now.saturating_duration_since(sent).as_secs_f64() * 1000.0;

        if self.superseded && rtt_ms < self.clock.rtt_estimate_ms / 2.0 {
            debug!(
                "Dropping late pong ({:.1} ms after the current ping, last RTT {:.1} ms)",
                rtt_ms, self.clock.rtt_estimate_ms
            );
            self.superseded = false;
            return None;
        }
        self.outstanding = None;
        self.superseded = false;

        self.clock = ClockState {
            rtt_estimate_ms: rtt_ms,
            tick_offset: tick_offset_for(rtt_ms, self.fixed_interval_ms),
        };
        self.samples += 1;

        debug!(
            "RTT {:.1} ms -> tick offset {}",
            self.clock.rtt_estimate_ms, self.clock.tick_offset
        );
        Some(self.clock)
    }

    pub fn clock(&self) -> ClockState {
        self.clock
    }

    pub fn tick_offset(&self) -> u32 {
        self.clock.tick_offset
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Forgets every ping and estimate, e.g. on a new connection.
    pub fn reset(&mut self) {
        self.outstanding = None;
        self.superseded = false;
        self.next_ping = None;
        self.clock = ClockState::default();
        self.samples = 0;
    }
}
