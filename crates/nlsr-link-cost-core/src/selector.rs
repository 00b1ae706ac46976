//! Calculator Selector.
//!
//! Reads the boot-time `calculator` choice and wires at most one adaptive
//! calculator into the Cost Engine. Instantiation is lazy — deferred until
//! the first routing-table build after startup — rather than eager at
//! `start()`, so a selection that turns out to be unavailable never leaves
//! probing half-armed with no calculator to show for it.

use crate::calculator::load_aware::LoadAwareCalculator;
use crate::calculator::ml_adaptive::{MlAdaptiveCalculator, MlAdaptiveParams};
use crate::engine::CostEngine;
use nlsr_link_cost_common::config::{CalculatorSelection, LinkCostConfig};
use tracing::warn;

/// Drives the one-time instantiation of the configured adaptive
/// calculator.
pub struct CalculatorSelector {
    selection: CalculatorSelection,
    load_aware_weights: nlsr_link_cost_common::config::LoadAwareWeights,
    max_cost_multiplier: f64,
    ml_adaptation_threshold: f64,
    ml_adaptation_max_interval: std::time::Duration,
    instantiated: bool,
}

impl CalculatorSelector {
    pub fn new(config: &LinkCostConfig) -> Self {
        CalculatorSelector {
            selection: config.calculator,
            load_aware_weights: config.load_aware_weights,
            max_cost_multiplier: config.max_cost_multiplier,
            ml_adaptation_threshold: config.ml_adaptation_threshold,
            ml_adaptation_max_interval: config.ml_adaptation_max_interval,
            instantiated: false,
        }
    }

    /// Call once per routing-table build; a no-op after the first call
    /// that actually wires (or falls back on) a calculator.
    pub fn ensure_instantiated(&mut self, engine: &mut CostEngine) {
        if self.instantiated {
            return;
        }
        self.instantiated = true;

        match self.selection {
            CalculatorSelection::Standard => {}
            CalculatorSelection::LoadAware => {
                engine.set_calculator(Box::new(LoadAwareCalculator::new(
                    self.load_aware_weights,
                    self.max_cost_multiplier,
                )));
            }
            CalculatorSelection::MlAdaptive => {
                engine.set_calculator(Box::new(MlAdaptiveCalculator::new(MlAdaptiveParams {
                    adaptation_threshold: self.ml_adaptation_threshold,
                    max_adaptation_interval: self.ml_adaptation_max_interval,
                    max_multiplier: self.max_cost_multiplier,
                })));
            }
            CalculatorSelection::Hyperbolic | CalculatorSelection::HyperbolicDryRun => {
                warn!(
                    selection = ?self.selection,
                    "selected calculator is not available in this build, falling back to standard"
                );
            }
        }
    }

    /// Drop the active calculator, if any, and reset so a future restart
    /// re-runs lazy instantiation.
    pub fn deregister(&mut self, engine: &mut CostEngine) {
        engine.clear_calculator();
        self.instantiated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine() -> CostEngine {
        CostEngine::new(5.0, 0.05, Duration::from_secs(10))
    }

    #[test]
    fn standard_selection_wires_no_calculator() {
        let mut config = LinkCostConfig::default();
        config.calculator = CalculatorSelection::Standard;
        let mut selector = CalculatorSelector::new(&config);
        let mut e = engine();
        selector.ensure_instantiated(&mut e);
        assert_eq!(e.active_calculator_name(), None);
    }

    #[test]
    fn load_aware_selection_wires_once() {
        let mut config = LinkCostConfig::default();
        config.calculator = CalculatorSelection::LoadAware;
        let mut selector = CalculatorSelector::new(&config);
        let mut e = engine();
        selector.ensure_instantiated(&mut e);
        assert_eq!(e.active_calculator_name(), Some("load_aware"));
        // Second call is a no-op; still load_aware, not re-instantiated.
        selector.ensure_instantiated(&mut e);
        assert_eq!(e.active_calculator_name(), Some("load_aware"));
    }

    #[test]
    fn ml_adaptive_selection_wires_ml_calculator() {
        let mut config = LinkCostConfig::default();
        config.calculator = CalculatorSelection::MlAdaptive;
        let mut selector = CalculatorSelector::new(&config);
        let mut e = engine();
        selector.ensure_instantiated(&mut e);
        assert_eq!(e.active_calculator_name(), Some("ml_adaptive"));
    }

    #[test]
    fn hyperbolic_falls_back_to_no_calculator() {
        let mut config = LinkCostConfig::default();
        config.calculator = CalculatorSelection::Hyperbolic;
        let mut selector = CalculatorSelector::new(&config);
        let mut e = engine();
        selector.ensure_instantiated(&mut e);
        assert_eq!(e.active_calculator_name(), None);
    }

    #[test]
    fn deregister_clears_and_allows_reinstantiation() {
        let mut config = LinkCostConfig::default();
        config.calculator = CalculatorSelection::LoadAware;
        let mut selector = CalculatorSelector::new(&config);
        let mut e = engine();
        selector.ensure_instantiated(&mut e);
        selector.deregister(&mut e);
        assert_eq!(e.active_calculator_name(), None);
        selector.ensure_instantiated(&mut e);
        assert_eq!(e.active_calculator_name(), Some("load_aware"));
    }
}
