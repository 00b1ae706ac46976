//! Deterministic load-aware cost calculator.
//!
//! `final = rtt_based_cost * (1 + w_r*r + w_l*l + w_s*s)`, where `r`, `l`,
//! `s` are RTT, load, and stability components in `[0, 1]`. Stateless with
//! respect to the store — it keeps its own small bounded RTT history per
//! neighbor purely for trend awareness, the same way
//! `strata-bonding::scheduler::kalman::LinkQualityEstimator` keeps
//! per-link filters independent of the scheduler's own metrics map.

use super::{clamp_to_bounds, AdaptiveCalculator, CostSnapshot};
use nlsr_link_cost_common::config::LoadAwareWeights;
use nlsr_link_cost_common::NeighborId;
use std::collections::{HashMap, VecDeque};

const TREND_HISTORY_CAPACITY: usize = 8;

#[derive(Default)]
struct NeighborTrend {
    recent_rtt_ms: VecDeque<f64>,
}

/// A deterministic, non-learning cost rewriter that folds RTT trend,
/// reported load (utilization), and RTT stability into the candidate cost.
pub struct LoadAwareCalculator {
    weights: LoadAwareWeights,
    max_multiplier: f64,
    trends: HashMap<NeighborId, NeighborTrend>,
}

impl LoadAwareCalculator {
    pub fn new(weights: LoadAwareWeights, max_multiplier: f64) -> Self {
        LoadAwareCalculator {
            weights,
            max_multiplier,
            trends: HashMap::new(),
        }
    }

    /// RTT component: trend-normalized, in `[0, 1]`. Rising RTT relative to
    /// the neighbor's own recent history pushes this toward 1.
    fn rtt_component(&self, trend: &NeighborTrend, avg_rtt_ms: f64) -> f64 {
        if trend.recent_rtt_ms.len() < 2 {
            return (avg_rtt_ms / 200.0).clamp(0.0, 1.0);
        }
        let baseline =
            trend.recent_rtt_ms.iter().sum::<f64>() / trend.recent_rtt_ms.len() as f64;
        if baseline <= 0.0 {
            return 0.0;
        }
        ((avg_rtt_ms - baseline) / baseline).clamp(0.0, 1.0)
    }

    /// Load component: reported link utilization, defaulting to 0 when the
    /// operator has never set it via the metrics control channel.
    fn load_component(&self, snapshot: &CostSnapshot) -> f64 {
        snapshot.utilization.unwrap_or(0.0).clamp(0.0, 1.0)
    }

    /// Stability component: coefficient of variation over the last 5
    /// samples, normalized into `[0, 1]` (CV of 0.5 or more is "maximally
    /// unstable" for this purpose).
    fn stability_component(&self, snapshot: &CostSnapshot) -> f64 {
        match snapshot.coefficient_of_variation(5) {
            Some(cv) => (cv / 0.5).clamp(0.0, 1.0),
            None => 0.0,
        }
    }
}

impl AdaptiveCalculator for LoadAwareCalculator {
    fn adjust(&mut self, neighbor: &NeighborId, rtt_based_cost: f64, snapshot: &CostSnapshot) -> f64 {
        let Some(avg_rtt_ms) = snapshot.avg_rtt_ms() else {
            return rtt_based_cost;
        };

        let trend = self.trends.entry(neighbor.clone()).or_default();
        let r = self.rtt_component(trend, avg_rtt_ms);
        let l = self.load_component(snapshot);
        let s = self.stability_component(snapshot);

        if trend.recent_rtt_ms.len() == TREND_HISTORY_CAPACITY {
            trend.recent_rtt_ms.pop_front();
        }
        trend.recent_rtt_ms.push_back(avg_rtt_ms);

        let factor = 1.0
            + self.weights.rtt * r
            + self.weights.load * l
            + self.weights.stability * s;
        let candidate = rtt_based_cost * factor;
        // Never shift below the original configured value.
        clamp_to_bounds(candidate, snapshot.original_cost, self.max_multiplier)
    }

    fn name(&self) -> &'static str {
        "load_aware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta::Clock;

    fn snapshot(original_cost: u64, current_cost: f64, rtt_history_ms: Vec<f64>, clock: &Clock) -> CostSnapshot {
        CostSnapshot {
            original_cost,
            current_cost,
            rtt_history_ms,
            timeout_count: 0,
            now: clock.now(),
            utilization: None,
        }
    }

    #[test]
    fn never_drops_below_original_cost() {
        let (clock, _mock) = Clock::mock();
        let mut calc = LoadAwareCalculator::new(LoadAwareWeights::default(), 5.0);
        let n = NeighborId::from("/ndn/a");
        let snap = snapshot(10, 10.0, vec![5.0, 5.0, 5.0], &clock);
        let out = calc.adjust(&n, 10.0, &snap);
        assert!(out >= 10.0);
    }

    #[test]
    fn no_history_returns_candidate_unchanged() {
        let (clock, _mock) = Clock::mock();
        let mut calc = LoadAwareCalculator::new(LoadAwareWeights::default(), 5.0);
        let n = NeighborId::from("/ndn/a");
        let snap = snapshot(10, 10.0, vec![], &clock);
        assert_eq!(calc.adjust(&n, 10.0, &snap), 10.0);
    }

    #[test]
    fn rising_rtt_trend_increases_cost() {
        let (clock, _mock) = Clock::mock();
        let mut calc = LoadAwareCalculator::new(LoadAwareWeights::default(), 5.0);
        let n = NeighborId::from("/ndn/a");
        // Warm up the trend baseline at a low RTT.
        let warm = snapshot(10, 10.0, vec![20.0, 20.0, 20.0], &clock);
        let _ = calc.adjust(&n, 10.0, &warm);
        let _ = calc.adjust(&n, 10.0, &warm);
        // Now a spike relative to that baseline.
        let spike = snapshot(10, 10.0, vec![20.0, 20.0, 20.0, 80.0], &clock);
        let out = calc.adjust(&n, 15.0, &spike);
        assert!(out > 15.0, "expected upward adjustment, got {out}");
    }

    #[test]
    fn respects_max_multiplier_cap() {
        let (clock, _mock) = Clock::mock();
        let mut calc = LoadAwareCalculator::new(
            LoadAwareWeights {
                rtt: 10.0,
                load: 10.0,
                stability: 10.0,
            },
            5.0,
        );
        let n = NeighborId::from("/ndn/a");
        let snap = snapshot(10, 10.0, vec![1.0, 500.0], &clock);
        let out = calc.adjust(&n, 49.0, &snap);
        assert!(out <= 50.0);
    }
}
