//! The Cost Engine.
//!
//! Turns accepted RTT measurements into the single `link_cost` value the
//! host publishes on its adjacency LSA. Three steps, always in this order:
//! compute an RTT-only candidate, optionally let the registered adaptive
//! calculator rewrite it, then decide whether the change is big enough and
//! not too soon to act on.

use crate::calculator::{AdaptiveCalculator, CostSnapshot};
use crate::host::HostCallbacks;
use crate::store::LinkStateStore;
use nlsr_link_cost_common::NeighborId;
use quanta::Instant;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::warn;

/// Result of [`CostEngine::compute_rtt_based_cost`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RttBasedCost {
    /// The neighbor is absent or INACTIVE; no candidate was computed.
    NotParticipating,
    Cost(u64),
}

/// What [`CostEngine::apply_cost_update`] actually did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApplyOutcome {
    /// The change-ratio gate rejected the candidate; `current_cost` is
    /// unchanged.
    Discarded,
    /// `current_cost` moved but a rebuild was rate-limited.
    UpdatedSilently { new_cost: f64 },
    /// `current_cost` moved and the host was asked to rebuild.
    UpdatedAndRebuilt { new_cost: f64 },
}

pub struct CostEngine {
    max_cost_multiplier: f64,
    cost_change_threshold: f64,
    rebuild_rate_limit: Duration,
    calculator: Option<Box<dyn AdaptiveCalculator>>,
}

impl CostEngine {
    pub fn new(max_cost_multiplier: f64, cost_change_threshold: f64, rebuild_rate_limit: Duration) -> Self {
        CostEngine {
            max_cost_multiplier,
            cost_change_threshold,
            rebuild_rate_limit,
            calculator: None,
        }
    }

    /// Register an adaptive calculator, replacing any previous one. Called
    /// by the Calculator Selector at most once per daemon lifetime under
    /// the current selection policy.
    pub fn set_calculator(&mut self, calculator: Box<dyn AdaptiveCalculator>) {
        self.calculator = Some(calculator);
    }

    /// Deregister the active calculator, if any. The boxed object is
    /// dropped here; callers that need a final flush should do it before
    /// calling this.
    pub fn clear_calculator(&mut self) {
        self.calculator = None;
    }

    /// The change-ratio threshold used both by the engine-level gate
    /// (applied by callers before they even invoke [`CostEngine::apply_cost_update`])
    /// and by the second, inner gate `apply_cost_update` runs against the
    /// calculator's output. Exposed so callers can run the outer gate with
    /// the same number the inner one uses.
    pub fn cost_change_threshold(&self) -> f64 {
        self.cost_change_threshold
    }

    pub fn active_calculator_name(&self) -> Option<&'static str> {
        self.calculator.as_deref().map(AdaptiveCalculator::name)
    }

    /// `ln(1 + avg_ms / 100)` factor applied to `original_cost`, clamped to
    /// `[original_cost, original_cost * max_cost_multiplier]` and rounded.
    pub fn compute_rtt_based_cost(&self, store: &LinkStateStore, neighbor: &NeighborId) -> RttBasedCost {
        let Some(state) = store.get(neighbor) else {
            return RttBasedCost::NotParticipating;
        };
        if state.status != crate::store::NeighborStatus::Active {
            return RttBasedCost::NotParticipating;
        }
        if state.rtt_history().is_empty() {
            return RttBasedCost::Cost(state.original_cost());
        }
        let avg_ms = mean_rtt_ms(state.rtt_history());
        let factor = (1.0 + avg_ms / 100.0).ln();
        let candidate = state.original_cost() as f64 * (1.0 + factor);
        let clamped = candidate.clamp(
            state.original_cost() as f64,
            state.original_cost() as f64 * self.max_cost_multiplier,
        );
        RttBasedCost::Cost(clamped.round() as u64)
    }

    /// `|candidate - current_cost| / current_cost >= threshold`. `threshold`
    /// defaults to `cost_change_threshold` but callers (the pre-rebuild
    /// gate) may pass a different one.
    pub fn should_update(&self, current_cost: f64, candidate: f64, threshold: f64) -> bool {
        if current_cost == 0.0 {
            return candidate != 0.0;
        }
        ((candidate - current_cost) / current_cost).abs() >= threshold
    }

    /// Run `candidate` through the registered calculator (if any), the
    /// second change-ratio gate, and the rebuild rate limiter, mutating
    /// `store` and, when a rebuild is warranted, `host`.
    pub fn apply_cost_update(
        &mut self,
        store: &mut LinkStateStore,
        host: &mut dyn HostCallbacks,
        neighbor: &NeighborId,
        candidate: u64,
        now: Instant,
    ) -> ApplyOutcome {
        let Some(snapshot) = build_snapshot(store, neighbor, now) else {
            return ApplyOutcome::Discarded;
        };
        let current_cost = snapshot.current_cost;
        let timeout_count = snapshot.timeout_count;
        let last_rebuild_trigger = store
            .get(neighbor)
            .and_then(|s| s.last_rebuild_trigger);

        let final_cost = self.delegate_to_calculator(neighbor, candidate as f64, &snapshot);

        if !self.should_update(current_cost, final_cost, self.cost_change_threshold) {
            return ApplyOutcome::Discarded;
        }

        store.set_current_cost(neighbor, final_cost);

        let rebuild_due = last_rebuild_trigger
            .map(|t| now.saturating_duration_since(t) >= self.rebuild_rate_limit)
            .unwrap_or(true);

        if !rebuild_due {
            return ApplyOutcome::UpdatedSilently { new_cost: final_cost };
        }

        store.mark_rebuild_triggered(neighbor, now);

        if timeout_count == 0 {
            if let Some(slot) = host.link_cost_slot(neighbor) {
                *slot = final_cost.round() as u64;
            }
            host.schedule_adj_lsa_build(neighbor);
            host.schedule_routing_table_calculation();
            ApplyOutcome::UpdatedAndRebuilt { new_cost: final_cost }
        } else {
            ApplyOutcome::UpdatedSilently { new_cost: final_cost }
        }
    }

    /// Feed an accepted measurement's derived performance score to the
    /// active calculator, if any. A no-op under `Standard`.
    pub fn on_feedback(&mut self, neighbor: &NeighborId, performance: f64, snapshot: &CostSnapshot) {
        if let Some(calculator) = self.calculator.as_mut() {
            calculator.on_feedback(neighbor, performance, snapshot);
        }
    }

    /// Guards a calculator's `adjust` call so a panicking implementation
    /// degrades to the RTT-based candidate instead of taking the rest of
    /// the subsystem down with it.
    ///
    /// This only holds under `panic = "unwind"` (the default for `dev` and
    /// `test` builds, and what every test in this crate runs under). The
    /// workspace's `[profile.release] panic = "abort"` makes
    /// `catch_unwind` a no-op for a release binary: an unwind becomes a
    /// process abort before this `match` ever runs. Calculators must treat
    /// "never panic" as a hard contract in a release build, not an
    /// optional nicety this function papers over — see DESIGN.md.
    fn delegate_to_calculator(&mut self, neighbor: &NeighborId, candidate: f64, snapshot: &CostSnapshot) -> f64 {
        let Some(calculator) = self.calculator.as_mut() else {
            return candidate;
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| calculator.adjust(neighbor, candidate, snapshot)));
        match result {
            Ok(value) if value.is_finite() => value,
            Ok(_) => {
                warn!(neighbor = %neighbor, "calculator returned a non-finite cost, using rtt-based candidate");
                candidate
            }
            Err(_) => {
                warn!(neighbor = %neighbor, "calculator panicked, using rtt-based candidate");
                candidate
            }
        }
    }
}

fn mean_rtt_ms(history: &std::collections::VecDeque<crate::store::RttSample>) -> f64 {
    let total: f64 = history.iter().map(|s| s.measured.as_secs_f64() * 1000.0).sum();
    total / history.len() as f64
}

/// Build the read-only view handed to calculators and to the feedback
/// path. `None` if `neighbor` is not in the store.
pub fn build_snapshot(store: &LinkStateStore, neighbor: &NeighborId, now: Instant) -> Option<CostSnapshot> {
    let state = store.get(neighbor)?;
    Some(CostSnapshot {
        original_cost: state.original_cost(),
        current_cost: state.current_cost(),
        rtt_history_ms: state
            .rtt_history()
            .iter()
            .map(|s| s.measured.as_secs_f64() * 1000.0)
            .collect(),
        timeout_count: state.timeout_count,
        now,
        utilization: state.external_metrics.and_then(|m| m.utilization),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullHost;
    use crate::store::LinkStateStore;
    use quanta::Clock;
    use std::time::Duration;

    fn neighbor() -> NeighborId {
        NeighborId::from("/ndn/router-b")
    }

    #[test]
    fn absent_neighbor_is_not_participating() {
        let store = LinkStateStore::new(10, 5, 3);
        let engine = CostEngine::new(5.0, 0.05, Duration::from_secs(10));
        assert_eq!(
            engine.compute_rtt_based_cost(&store, &neighbor()),
            RttBasedCost::NotParticipating
        );
    }

    #[test]
    fn no_history_returns_original_cost() {
        let (clock, _mock) = Clock::mock();
        let mut store = LinkStateStore::new(10, 5, 3);
        store.initialize([(neighbor(), 10)], clock.now());
        let engine = CostEngine::new(5.0, 0.05, Duration::from_secs(10));
        assert_eq!(
            engine.compute_rtt_based_cost(&store, &neighbor()),
            RttBasedCost::Cost(10)
        );
    }

    #[test]
    fn candidate_rises_with_rtt_and_respects_cap() {
        let (clock, mock) = Clock::mock();
        let mut store = LinkStateStore::new(10, 5, 3);
        store.initialize([(neighbor(), 10)], clock.now());
        for _ in 0..3 {
            store.record_measurement(&neighbor(), Duration::from_millis(5000), clock.now());
            mock.increment(Duration::from_secs(1));
        }
        let engine = CostEngine::new(5.0, 0.05, Duration::from_secs(10));
        let cost = engine.compute_rtt_based_cost(&store, &neighbor());
        match cost {
            RttBasedCost::Cost(c) => assert!(c <= 50, "candidate {c} exceeded max multiplier cap"),
            _ => panic!("expected a cost"),
        }
    }

    #[test]
    fn small_change_is_discarded() {
        let (clock, _mock) = Clock::mock();
        let mut store = LinkStateStore::new(10, 5, 3);
        store.initialize([(neighbor(), 100)], clock.now());
        let mut host = NullHost::new().with_adjacency(neighbor(), 100);
        let mut engine = CostEngine::new(5.0, 0.05, Duration::from_secs(10));
        let outcome = engine.apply_cost_update(&mut store, &mut host, &neighbor(), 101, clock.now());
        assert_eq!(outcome, ApplyOutcome::Discarded);
    }

    #[test]
    fn large_change_triggers_rebuild_when_stable() {
        let (clock, _mock) = Clock::mock();
        let mut store = LinkStateStore::new(10, 5, 3);
        store.initialize([(neighbor(), 100)], clock.now());
        let mut host = NullHost::new().with_adjacency(neighbor(), 100);
        let mut engine = CostEngine::new(5.0, 0.05, Duration::from_secs(10));
        let outcome = engine.apply_cost_update(&mut store, &mut host, &neighbor(), 200, clock.now());
        assert_eq!(outcome, ApplyOutcome::UpdatedAndRebuilt { new_cost: 200.0 });
        assert_eq!(host.routing_table_recalculations, 1);
        assert_eq!(host.lsa_build_requests, vec![neighbor()]);
    }

    #[test]
    fn rebuild_is_rate_limited() {
        let (clock, mock) = Clock::mock();
        let mut store = LinkStateStore::new(10, 5, 3);
        store.initialize([(neighbor(), 100)], clock.now());
        let mut host = NullHost::new().with_adjacency(neighbor(), 100);
        let mut engine = CostEngine::new(5.0, 0.05, Duration::from_secs(10));

        let first = engine.apply_cost_update(&mut store, &mut host, &neighbor(), 200, clock.now());
        assert_eq!(first, ApplyOutcome::UpdatedAndRebuilt { new_cost: 200.0 });

        mock.increment(Duration::from_secs(2));
        let second = engine.apply_cost_update(&mut store, &mut host, &neighbor(), 400, clock.now());
        assert_eq!(second, ApplyOutcome::UpdatedSilently { new_cost: 400.0 });
        assert_eq!(host.routing_table_recalculations, 1);
    }

    #[test]
    fn timeout_count_nonzero_suppresses_rebuild_but_still_updates() {
        let (clock, _mock) = Clock::mock();
        let mut store = LinkStateStore::new(10, 5, 3);
        store.initialize([(neighbor(), 100)], clock.now());
        store.on_hello_timeout(&neighbor(), 2, clock.now());
        let mut host = NullHost::new().with_adjacency(neighbor(), 100);
        let mut engine = CostEngine::new(5.0, 0.05, Duration::from_secs(10));
        let outcome = engine.apply_cost_update(&mut store, &mut host, &neighbor(), 200, clock.now());
        assert_eq!(outcome, ApplyOutcome::UpdatedSilently { new_cost: 200.0 });
        assert_eq!(host.routing_table_recalculations, 0);
    }
}
