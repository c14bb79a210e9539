//! Property-based invariants for the rolling-window health controller
//! (component C): weight stays bounded, the window never exceeds its
//! configured capacity, and the gate only ever takes the two declared
//! values.

use host_runtime::health::{Gate, HealthState};
use proptest::prelude::*;
use std::time::{Duration, Instant};

proptest! {
    /// Property: after any sequence of outcomes, the committed weight never
    /// exceeds the base weight and never goes to zero or negative.
    #[test]
    fn weight_stays_within_bounds(
        base_weight in 1.0f64..1000.0,
        outcomes in prop::collection::vec((any::<bool>(), any::<bool>()), 0..200),
    ) {
        let mut state = HealthState::new(10, base_weight, Duration::ZERO);
        let mut now = Instant::now();

        for (timeout, error) in outcomes {
            state.record(timeout, error);
            now += Duration::from_millis(1);
            let (_, weight_adj) = state.evaluate(now);
            if let Some(host_runtime::health::Adjustment::WeightChanged(w)) = weight_adj {
                state.commit_weight(w, now);
            }
        }

        prop_assert!(state.current_weight() > 0.0);
        prop_assert!(state.current_weight() <= base_weight + 0.001);
    }

    /// Property: the window never holds more entries than its configured
    /// capacity, regardless of how many outcomes are recorded.
    #[test]
    fn window_never_exceeds_capacity(
        capacity in 1usize..64,
        count in 0usize..500,
    ) {
        let mut state = HealthState::new(capacity, 100.0, Duration::from_secs(30));
        for _ in 0..count {
            state.record(false, false);
        }
        prop_assert!(state.window_len() <= capacity);
    }

    /// Property: a freshly constructed state always starts with an open gate
    /// and full base weight, regardless of parameters.
    #[test]
    fn fresh_state_starts_open_at_base_weight(
        capacity in 1usize..64,
        base_weight in 0.1f64..1000.0,
        cooldown_secs in 0u64..120,
    ) {
        let state = HealthState::new(capacity, base_weight, Duration::from_secs(cooldown_secs));
        prop_assert_eq!(state.gate(), Gate::Open);
        prop_assert_eq!(state.current_weight(), base_weight);
        prop_assert_eq!(state.window_len(), 0);
    }

    /// Property: reset always restores the open gate and base weight, no
    /// matter what sequence of outcomes preceded it.
    #[test]
    fn reset_always_restores_fresh_state(
        base_weight in 1.0f64..1000.0,
        outcomes in prop::collection::vec((any::<bool>(), any::<bool>()), 0..100),
    ) {
        let mut state = HealthState::new(10, base_weight, Duration::ZERO);
        let mut now = Instant::now();
        for (timeout, error) in outcomes {
            state.record(timeout, error);
            now += Duration::from_millis(1);
            state.evaluate(now);
        }

        state.reset();
        prop_assert_eq!(state.gate(), Gate::Open);
        prop_assert_eq!(state.current_weight(), base_weight);
        prop_assert_eq!(state.window_len(), 0);
    }
}
