//! Health & weight controller (component C).
//!
//! Per-identifier rolling window of call outcomes driving two independent
//! decisions: heartbeat gating (circuit breaking on error rate) and weight
//! adjustment (graceful degradation / recovery on timeout rate). Grounded
//! in the teacher's circuit-breaker state machine, generalized from a
//! binary open/closed trip into the continuous weight-recovery curve this
//! host needs.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const MIN_SAMPLES: usize = 10;
const RATE_THRESHOLD: f64 = 0.5;
const MIN_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    timeout: bool,
    error: bool,
}

/// Rolling-window health state for a single service identifier.
pub struct HealthState {
    window: VecDeque<Outcome>,
    capacity: usize,
    current_weight: f64,
    base_weight: f64,
    gate: Gate,
    last_weight_adjust_at: Option<Instant>,
    last_gate_adjust_at: Option<Instant>,
    cooldown: Duration,
}

/// The outcome of an evaluation tick, used by the heartbeat scheduler and
/// by the registry adapter's weight-update call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    None,
    WeightChanged(f64),
    GateOpened,
    GateClosed,
}

impl HealthState {
    pub fn new(window_size: usize, base_weight: f64, cooldown: Duration) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            capacity: window_size,
            current_weight: base_weight,
            base_weight,
            gate: Gate::Open,
            last_weight_adjust_at: None,
            last_gate_adjust_at: None,
            cooldown,
        }
    }

    pub fn current_weight(&self) -> f64 {
        self.current_weight
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Record one dispatch outcome. `timeout` and `error` are independent:
    /// a call can both time out and fail.
    pub fn record(&mut self, timeout: bool, error: bool) {
        self.window.push_back(Outcome { timeout, error });
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    fn cooldown_elapsed(&self, last: Option<Instant>, now: Instant) -> bool {
        match last {
            None => true,
            Some(t) => now.duration_since(t) >= self.cooldown,
        }
    }

    /// Evaluate the window and return the weight adjustment decided, if
    /// any. Errors and timeouts are evaluated independently; at most one
    /// weight change and one gate change may result from a single call.
    pub fn evaluate(&mut self, now: Instant) -> (Option<Adjustment>, Option<Adjustment>) {
        let n = self.window.len();
        if n < MIN_SAMPLES {
            return (None, None);
        }

        let timeouts = self.window.iter().filter(|o| o.timeout).count();
        let errors = self.window.iter().filter(|o| o.error).count();
        let t_rate = timeouts as f64 / n as f64;
        let e_rate = errors as f64 / n as f64;

        let gate_result = self.evaluate_gate(e_rate, now);
        let weight_result = self.evaluate_weight(t_rate, now);

        (gate_result, weight_result)
    }

    fn evaluate_gate(&mut self, e_rate: f64, now: Instant) -> Option<Adjustment> {
        if !self.cooldown_elapsed(self.last_gate_adjust_at, now) {
            return None;
        }

        if e_rate >= RATE_THRESHOLD && self.gate == Gate::Open {
            self.gate = Gate::Closed;
            self.last_gate_adjust_at = Some(now);
            Some(Adjustment::GateClosed)
        } else if e_rate < RATE_THRESHOLD && self.gate == Gate::Closed {
            self.gate = Gate::Open;
            self.last_gate_adjust_at = Some(now);
            Some(Adjustment::GateOpened)
        } else {
            None
        }
    }

    fn evaluate_weight(&mut self, t_rate: f64, now: Instant) -> Option<Adjustment> {
        if !self.cooldown_elapsed(self.last_weight_adjust_at, now) {
            return None;
        }

        let new_weight = if t_rate >= RATE_THRESHOLD {
            Some((self.current_weight * 0.5).max(MIN_WEIGHT))
        } else if self.current_weight < self.base_weight {
            let factor = 1.0 + 2.0 * (RATE_THRESHOLD - t_rate);
            Some((self.current_weight * factor).min(self.base_weight))
        } else {
            None
        };

        match new_weight {
            Some(w) if (w - self.current_weight).abs() >= 0.001 => Some(Adjustment::WeightChanged(w)),
            _ => None,
        }
    }

    /// Commit a weight change only after the adapter call that advertises
    /// it has succeeded. `lastWeightAdjustAt` is stamped here, not at
    /// decision time, so a failed advertisement leaves the cooldown
    /// untouched and the next evaluation tick can retry (§4.C, §7).
    pub fn commit_weight(&mut self, weight: f64, now: Instant) {
        self.current_weight = weight.max(MIN_WEIGHT).min(self.base_weight.max(MIN_WEIGHT));
        self.last_weight_adjust_at = Some(now);
    }

    /// Reset to a freshly-registered state: full base weight, open gate,
    /// empty window. Used by re-registration after deregistration.
    pub fn reset(&mut self) {
        self.window.clear();
        self.current_weight = self.base_weight;
        self.gate = Gate::Open;
        self.last_weight_adjust_at = None;
        self.last_gate_adjust_at = None;
    }
}

/// Disjoint per-identifier health states, keyed by service identifier.
/// `DashMap` keeps each identifier's mutation independent of every other's,
/// matching the ownership model: concurrent tasks can never interleave two
/// operations against the same identifier because each holds only its own
/// entry's lock for the duration of the call.
pub type HealthRegistry = DashMap<String, HealthState>;

pub fn new_registry() -> HealthRegistry {
    DashMap::new()
}
