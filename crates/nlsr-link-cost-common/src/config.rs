//! Boot-time configuration.
//!
//! Every field here is read once when the host daemon starts and is
//! immutable thereafter — nothing in this subsystem reloads configuration
//! at runtime. Loaded the same way `strata-bonding`'s `BondingConfig` is:
//! `serde::Deserialize` plus `toml::from_str`, with a `Default` that matches
//! the numbers this subsystem has always shipped with, so an operator who ships no config
//! file at all still gets sane behavior.

use serde::Deserialize;
use std::time::Duration;

/// Which adaptive cost calculator (if any) the Cost Engine delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculatorSelection {
    /// No cost mutation beyond the RTT-based candidate: no calculator runs.
    #[default]
    Standard,
    /// Deterministic load-aware rewriter.
    LoadAware,
    /// Online-learning linear model.
    MlAdaptive,
    /// Reserved selection name carried over from the host daemon's existing
    /// enumeration; not implemented by this subsystem (falls back to
    /// `Standard` with a warning, same as a missing LCM dependency).
    Hyperbolic,
    /// As `Hyperbolic`, but intended to run side-by-side without ever being
    /// wired into `apply_cost_update` — a dry-run placeholder.
    HyperbolicDryRun,
}

/// Weight overrides for the load-aware calculator's three components
/// (RTT, load, stability). Must each be non-negative; the calculator does
/// not require they sum to 1; the calculator never renormalizes them.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LoadAwareWeights {
    pub rtt: f64,
    pub load: f64,
    pub stability: f64,
}

impl Default for LoadAwareWeights {
    fn default() -> Self {
        LoadAwareWeights {
            rtt: 0.3,
            load: 0.4,
            stability: 0.3,
        }
    }
}

/// Weight overrides for the feedback publisher's performance score.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FeedbackWeights {
    pub rtt: f64,
    pub stability: f64,
    pub reliability: f64,
    pub trend: f64,
}

impl Default for FeedbackWeights {
    fn default() -> Self {
        FeedbackWeights {
            rtt: 0.4,
            stability: 0.2,
            reliability: 0.3,
            trend: 0.1,
        }
    }
}

/// Weight overrides for the multi-dimensional preview cost.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PreviewWeights {
    pub rtt: f64,
    pub bandwidth: f64,
    pub loss: f64,
    pub spectrum: f64,
}

impl Default for PreviewWeights {
    fn default() -> Self {
        PreviewWeights {
            rtt: 0.4,
            bandwidth: 0.3,
            loss: 0.2,
            spectrum: 0.1,
        }
    }
}

/// Top-level, boot-time-only configuration for the link cost subsystem.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinkCostConfig {
    /// Base interval between outgoing RTT probes per neighbor.
    #[serde(with = "duration_secs_f64")]
    pub measurement_interval: Duration,
    /// Lifetime of an outbound probe before it is treated as a timeout.
    #[serde(with = "duration_secs_f64")]
    pub measurement_timeout: Duration,
    /// `current_cost <= original_cost * max_cost_multiplier`.
    pub max_cost_multiplier: f64,
    /// Change-ratio gate used both inside the engine and again before a
    /// rebuild is requested. The two checks are intentionally redundant;
    /// left alone rather than collapsed into one call site.
    pub cost_change_threshold: f64,
    /// Consecutive hello timeouts before a neighbor is declared INACTIVE.
    /// Mirrored from the host daemon's hello configuration.
    pub retry_limit: u32,
    /// Minimum number of samples in `rtt_history` before a cost
    /// recomputation is justified.
    pub min_samples_for_cost: usize,
    /// Bounded RTT history capacity (FIFO eviction), capacity >= 10.
    pub rtt_history_capacity: usize,
    /// Minimum spacing between LSDB rebuild requests, per neighbor.
    #[serde(with = "duration_secs_f64")]
    pub rebuild_rate_limit: Duration,
    /// One-shot warm-up delay after `start()` before any probing begins.
    #[serde(with = "duration_secs_f64")]
    pub warm_up: Duration,
    /// Recurring status-report tick period once running.
    #[serde(with = "duration_secs_f64")]
    pub status_report_interval: Duration,
    /// Upper bound of the uniform probe jitter window.
    #[serde(with = "duration_secs_f64")]
    pub probe_jitter_max: Duration,
    pub calculator: CalculatorSelection,
    pub load_aware_weights: LoadAwareWeights,
    pub feedback_weights: FeedbackWeights,
    pub preview_weights: PreviewWeights,
    /// ML adaptive calculator: `|error| > threshold` forces an SGD step.
    pub ml_adaptation_threshold: f64,
    /// ML adaptive calculator: forces an SGD step after this much time
    /// regardless of error magnitude.
    #[serde(with = "duration_secs_f64")]
    pub ml_adaptation_max_interval: Duration,
}

impl Default for LinkCostConfig {
    fn default() -> Self {
        LinkCostConfig {
            measurement_interval: Duration::from_secs(30),
            measurement_timeout: Duration::from_secs(2),
            max_cost_multiplier: 5.0,
            cost_change_threshold: 0.05,
            retry_limit: 5,
            min_samples_for_cost: 3,
            rtt_history_capacity: 10,
            rebuild_rate_limit: Duration::from_secs(10),
            warm_up: Duration::from_secs(30),
            status_report_interval: Duration::from_secs(600),
            probe_jitter_max: Duration::from_millis(5000),
            calculator: CalculatorSelection::default(),
            load_aware_weights: LoadAwareWeights::default(),
            feedback_weights: FeedbackWeights::default(),
            preview_weights: PreviewWeights::default(),
            ml_adaptation_threshold: 0.2,
            ml_adaptation_max_interval: Duration::from_secs(30),
        }
    }
}

impl LinkCostConfig {
    /// Parse configuration from a TOML document. Unset fields take the
    /// `Default` value (see `#[serde(default)]` above).
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// (De)serialize a `Duration` as a fractional number of seconds, the same
/// convention `strata-bonding`'s TOML configs use for timeouts/intervals.
mod duration_secs_f64 {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
