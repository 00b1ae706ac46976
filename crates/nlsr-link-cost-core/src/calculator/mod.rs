//! Pluggable adaptive cost calculators.
//!
//! A calculator is a callback-shaped plug-in registered with the Cost
//! Engine: at most one is active at
//! a time, it may rewrite the RTT-based candidate cost, and — if it also
//! wants the feedback loop — it can react to accepted measurements. The
//! owning cycle between the engine (which calls `adjust`) and the
//! calculator (which the Feedback Publisher drives via `on_feedback`) is
//! broken deliberately: one boxed trait object, registered
//! and deregistered explicitly, its destruction always deregistering it.

pub mod load_aware;
pub mod ml_adaptive;

use nlsr_link_cost_common::NeighborId;
use quanta::Instant;

/// A read-only view of a neighbor's cost-relevant state, handed to a
/// calculator on every `adjust`/`on_feedback` call. Calculators never get a
/// `&mut` reference to the store — only this snapshot, mirroring how
/// `strata-bonding`'s adaptive schedulers only ever see `LinkMetrics`
/// snapshots, never the store itself.
#[derive(Debug, Clone)]
pub struct CostSnapshot {
    pub original_cost: u64,
    pub current_cost: f64,
    /// RTT samples in milliseconds, oldest first, bounded by the store's
    /// history capacity.
    pub rtt_history_ms: Vec<f64>,
    pub timeout_count: u32,
    pub now: Instant,
    /// Operator-reported link utilization from the metrics control channel,
    /// `None` if never set. The only externally configured metric any
    /// calculator is allowed to see; bandwidth/loss/spectrum stay confined
    /// to the preview cost formula.
    pub utilization: Option<f64>,
}

impl CostSnapshot {
    pub fn avg_rtt_ms(&self) -> Option<f64> {
        if self.rtt_history_ms.is_empty() {
            return None;
        }
        Some(self.rtt_history_ms.iter().sum::<f64>() / self.rtt_history_ms.len() as f64)
    }

    /// Coefficient of variation over the last `n` samples (population std
    /// dev / mean). `None` if fewer than 2 samples are available.
    pub fn coefficient_of_variation(&self, n: usize) -> Option<f64> {
        let len = self.rtt_history_ms.len();
        if len < 2 {
            return None;
        }
        let window = &self.rtt_history_ms[len.saturating_sub(n)..];
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        if mean == 0.0 {
            return Some(0.0);
        }
        let variance =
            window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window.len() as f64;
        Some(variance.sqrt() / mean)
    }
}

/// A pluggable adaptive cost rewriter, at most one of which is active at a
/// time on the Cost Engine.
pub trait AdaptiveCalculator {
    /// Rewrite the RTT-based candidate cost. Must never return a cost below
    /// `snapshot.original_cost`. On any internal anomaly,
    /// implementations return `rtt_based_cost` unchanged rather than panic
    /// or propagate an error — the engine treats the calculator as
    /// best-effort and falls back to the RTT-only candidate itself if this
    /// call panics across an `UnwindSafe` boundary (it should never need
    /// to). That fallback is a `dev`/`test`-profile safety net only: the
    /// workspace release profile builds with `panic = "abort"`, so a
    /// panic here aborts the process in a release binary regardless of
    /// the engine's `catch_unwind` guard. "Never panic" is load-bearing,
    /// not advisory.
    fn adjust(&mut self, neighbor: &NeighborId, rtt_based_cost: f64, snapshot: &CostSnapshot) -> f64;

    /// React to an accepted measurement's derived performance score. Most
    /// calculators (e.g. load-aware) have no use for this and keep the
    /// default no-op. `snapshot` reflects the same neighbor state `adjust`
    /// would see, so a learning calculator can recompute the feature
    /// vector it predicted from rather than cache one.
    fn on_feedback(&mut self, _neighbor: &NeighborId, _performance: f64, _snapshot: &CostSnapshot) {}

    /// Human-readable name, used in logs and the CLI's status output.
    fn name(&self) -> &'static str;
}

/// Clamp a calculator's candidate into `[original_cost, original_cost *
/// max_multiplier]`, matching the invariant every calculator must uphold.
pub(crate) fn clamp_to_bounds(cost: f64, original_cost: u64, max_multiplier: f64) -> f64 {
    let lower = original_cost as f64;
    let upper = lower * max_multiplier;
    cost.clamp(lower, upper)
}

/// EMA smoothing helper shared by the calculators — `strata-bonding`'s
/// Kalman filters are overkill for a single scalar with no velocity term,
/// so calculators use a plain exponential moving average instead, the same
/// smoothing idiom `modem::health::LinkHealth` composes from lower-level
/// filters.
pub(crate) fn ema(prev: Option<f64>, sample: f64, alpha: f64) -> f64 {
    match prev {
        Some(p) => alpha * sample + (1.0 - alpha) * p,
        None => sample,
    }
}
