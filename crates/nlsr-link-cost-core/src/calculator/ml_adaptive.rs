//! Online-learning adaptive cost calculator.
//!
//! A single global logistic-regression model (5 features + bias) maps a
//! neighbor's recent behavior onto a `(0, 1)` "pressure" score that scales
//! the RTT-based candidate cost. The model trains incrementally from the
//! Feedback Publisher's per-measurement performance scores via stochastic
//! gradient descent — nothing is ever persisted across daemon restarts.

use super::{clamp_to_bounds, ema, AdaptiveCalculator, CostSnapshot};
use nlsr_link_cost_common::NeighborId;
use quanta::Instant;
use std::collections::HashMap;
use std::time::Duration;

const FEATURE_LEN: usize = 5;
/// 10-minute buckets, 144 per day.
const SLOT_MINUTES: i64 = 10;
const SLOTS_PER_DAY: i64 = 144;

/// A single time-of-day bucket's running performance average.
#[derive(Debug, Clone, Copy)]
struct PatternEntry {
    mean_performance: f64,
    sample_count: u64,
}

/// Configuration knobs for the online model, broken out from
/// `LinkCostConfig` so unit tests can construct one directly.
#[derive(Debug, Clone, Copy)]
pub struct MlAdaptiveParams {
    pub adaptation_threshold: f64,
    pub max_adaptation_interval: Duration,
    pub max_multiplier: f64,
}

/// Sigmoid-linear online model plus a temporal pattern table.
pub struct MlAdaptiveCalculator {
    weights: [f64; FEATURE_LEN],
    bias: f64,
    update_count: u64,
    last_updated: Option<Instant>,
    ema_abs_error: Option<f64>,
    eta: f64,
    patterns: HashMap<(NeighborId, i64), PatternEntry>,
    params: MlAdaptiveParams,
    /// First `now` this calculator ever saw. `Instant` carries no wall-clock
    /// epoch, so the temporal slot is derived from elapsed time since this
    /// anchor rather than from a calendar time-of-day — stable within a run,
    /// which is all the in-memory (never persisted) pattern table needs.
    epoch: Option<Instant>,
}

impl MlAdaptiveCalculator {
    pub fn new(params: MlAdaptiveParams) -> Self {
        MlAdaptiveCalculator {
            // Hand-chosen prior emphasising RTT trend and stability over
            // the weaker success-rate/load/temporal signals.
            weights: [0.5, 0.3, 0.1, 0.05, 0.05],
            bias: 0.0,
            update_count: 0,
            last_updated: None,
            ema_abs_error: None,
            eta: 0.01,
            patterns: HashMap::new(),
            params,
            epoch: None,
        }
    }

    fn slot_for(&mut self, now: Instant) -> i64 {
        let epoch = *self.epoch.get_or_insert(now);
        let minutes = now.saturating_duration_since(epoch).as_secs() as i64 / 60;
        (minutes / SLOT_MINUTES).rem_euclid(SLOTS_PER_DAY)
    }

    fn temporal_feature(&mut self, neighbor: &NeighborId, now: Instant) -> f64 {
        let slot = self.slot_for(now);
        self.patterns
            .get(&(neighbor.clone(), slot))
            .map(|e| e.mean_performance)
            .unwrap_or(0.5)
    }

    fn update_pattern_table(&mut self, neighbor: &NeighborId, now: Instant, performance: f64) {
        let slot = self.slot_for(now);
        let key = (neighbor.clone(), slot);
        let entry = self.patterns.entry(key).or_insert(PatternEntry {
            mean_performance: performance,
            sample_count: 0,
        });
        entry.mean_performance = ema(Some(entry.mean_performance), performance, 0.1);
        entry.sample_count += 1;
    }

    fn features(&mut self, neighbor: &NeighborId, snapshot: &CostSnapshot) -> [f64; FEATURE_LEN] {
        let history = &snapshot.rtt_history_ms;
        let len = history.len();

        let rtt_trend = if len >= 6 {
            let recent = &history[len - 3..];
            let prior = &history[len - 6..len - 3];
            let recent_mean = recent.iter().sum::<f64>() / 3.0;
            let prior_mean = prior.iter().sum::<f64>() / 3.0;
            if prior_mean > 0.0 {
                ((recent_mean - prior_mean) / prior_mean).clamp(-1.0, 1.0)
            } else {
                0.0
            }
        } else {
            0.0
        };

        let cv = snapshot.coefficient_of_variation(5).unwrap_or(0.0);

        let window = &history[len.saturating_sub(10)..];
        let success_rate = if window.is_empty() {
            1.0
        } else {
            window.iter().filter(|&&v| v < 500.0).count() as f64 / window.len() as f64
        };

        let load_indicator = if len >= 3 {
            let s = &history[len - 3..];
            ((s[2] - 2.0 * s[1] + s[0]) / 100.0).clamp(-1.0, 1.0)
        } else {
            0.0
        };

        let temporal = self.temporal_feature(neighbor, snapshot.now);

        [rtt_trend, cv, success_rate, load_indicator, temporal]
    }

    fn predict(&self, features: &[f64; FEATURE_LEN]) -> f64 {
        if self.update_count == 0 {
            // Fixed-weight fallback over the first four features so
            // behaviour is defined before any feedback has arrived.
            let raw =
                0.4 * features[0] + 0.3 * features[1] + 0.2 * features[2] + 0.1 * features[3];
            return raw.clamp(1e-6, 1.0 - 1e-6);
        }
        let z = self.bias
            + self
                .weights
                .iter()
                .zip(features.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        sigmoid(z)
    }

    fn maybe_step(&mut self, features: &[f64; FEATURE_LEN], prediction: f64, actual: f64, now: Instant) {
        let error = actual - prediction;
        self.ema_abs_error = Some(ema(self.ema_abs_error, error.abs(), 0.2));

        let elapsed_enough = self
            .last_updated
            .map(|t| now.saturating_duration_since(t) >= self.params.max_adaptation_interval)
            .unwrap_or(true);
        let error_large_enough = error.abs() > self.params.adaptation_threshold;

        if !(elapsed_enough || error_large_enough) {
            return;
        }

        self.bias += self.eta * error;
        for (w, x) in self.weights.iter_mut().zip(features.iter()) {
            *w += self.eta * error * x;
        }
        self.update_count += 1;
        self.last_updated = Some(now);

        if let Some(ema_err) = self.ema_abs_error {
            if ema_err > 0.3 {
                self.eta = (self.eta * 1.1).min(0.05);
            } else if ema_err < 0.1 {
                self.eta = (self.eta * 0.9).max(0.001);
            }
        }
    }

    /// Current EMA of absolute prediction error, exposed for tests and for
    /// a CLI `status` query to report learning progress.
    pub fn ema_abs_error(&self) -> Option<f64> {
        self.ema_abs_error
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl AdaptiveCalculator for MlAdaptiveCalculator {
    fn adjust(&mut self, neighbor: &NeighborId, rtt_based_cost: f64, snapshot: &CostSnapshot) -> f64 {
        let features = self.features(neighbor, snapshot);
        let y = self.predict(&features);
        if !y.is_finite() {
            return rtt_based_cost;
        }
        let final_cost = snapshot.original_cost as f64 * (1.0 + y);
        if !final_cost.is_finite() || final_cost <= 0.0 {
            return rtt_based_cost;
        }
        clamp_to_bounds(final_cost, snapshot.original_cost, self.params.max_multiplier)
    }

    fn on_feedback(&mut self, neighbor: &NeighborId, actual_performance: f64, snapshot: &CostSnapshot) {
        let features = self.features(neighbor, snapshot);
        let prediction = self.predict(&features);
        self.maybe_step(&features, prediction, actual_performance, snapshot.now);
        self.update_pattern_table(neighbor, snapshot.now, actual_performance);
    }

    fn name(&self) -> &'static str {
        "ml_adaptive"
    }
}
