//! The multi-dimensional preview cost.
//!
//! Diagnostic only: it is never applied to routing, only returned from the
//! metrics control channel's `get` endpoint so an operator can see what a
//! manually reported set of link metrics would imply about cost before any
//! RTT-driven engine touches it.

use nlsr_link_cost_common::config::PreviewWeights;

/// Every factor lies in `[1.0, 2.0]`; absent inputs fall back to a fixed
/// assumed value rather than 1.0, so an unset dimension still nudges the
/// composite away from its floor.
pub fn composite_cost(
    original_cost: u64,
    avg_rtt_ms: Option<f64>,
    utilization: Option<f64>,
    packet_loss: Option<f64>,
    spectrum_dbm: Option<f64>,
    weights: PreviewWeights,
) -> u64 {
    let f_rtt = rtt_factor(avg_rtt_ms.unwrap_or(20.0));
    let f_bw = bandwidth_factor(utilization.unwrap_or(0.30));
    let f_loss = loss_factor(packet_loss.unwrap_or(0.01));
    let f_spec = spectrum_factor(spectrum_dbm.unwrap_or(-50.0));

    let composite =
        weights.rtt * f_rtt + weights.bandwidth * f_bw + weights.loss * f_loss + weights.spectrum * f_spec;
    (original_cost as f64 * composite).round() as u64
}

fn rtt_factor(avg_rtt_ms: f64) -> f64 {
    if avg_rtt_ms <= 0.0 {
        1.0
    } else if avg_rtt_ms >= 200.0 {
        2.0
    } else {
        1.0 + avg_rtt_ms / 200.0
    }
}

fn bandwidth_factor(utilization: f64) -> f64 {
    if utilization <= 0.0 {
        1.0
    } else if utilization >= 1.0 {
        2.0
    } else {
        1.0 + utilization
    }
}

fn loss_factor(packet_loss: f64) -> f64 {
    if packet_loss <= 0.0 {
        1.0
    } else if packet_loss >= 0.5 {
        2.0
    } else {
        1.0 + 2.0 * packet_loss
    }
}

fn spectrum_factor(spectrum_dbm: f64) -> f64 {
    if spectrum_dbm >= -30.0 {
        1.0
    } else if spectrum_dbm <= -80.0 {
        2.0
    } else {
        1.0 + (-30.0 - spectrum_dbm) / 50.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_absent_uses_fixed_assumed_defaults() {
        let weights = PreviewWeights::default();
        let cost = composite_cost(12, None, None, None, None, weights);
        // composite = 0.4*1.1 + 0.3*1.3 + 0.2*1.02 + 0.1*1.4 = 1.174
        assert_eq!(cost, (12.0 * 1.174_f64).round() as u64);
    }

    #[test]
    fn spec_example_matches() {
        let weights = PreviewWeights::default();
        let cost = composite_cost(12, None, Some(0.65), Some(0.02), Some(-45.0), weights);
        assert_eq!(cost, 15);
    }

    #[test]
    fn every_factor_stays_in_bounds() {
        for rtt in [-10.0, 0.0, 50.0, 199.0, 200.0, 5000.0] {
            let f = rtt_factor(rtt);
            assert!((1.0..=2.0).contains(&f), "rtt_factor({rtt}) = {f}");
        }
        for util in [-1.0, 0.0, 0.5, 1.0, 3.0] {
            let f = bandwidth_factor(util);
            assert!((1.0..=2.0).contains(&f));
        }
        for loss in [-1.0, 0.0, 0.25, 0.5, 1.0] {
            let f = loss_factor(loss);
            assert!((1.0..=2.0).contains(&f));
        }
        for spec in [0.0, -30.0, -55.0, -80.0, -120.0] {
            let f = spectrum_factor(spec);
            assert!((1.0..=2.0).contains(&f));
        }
    }

    #[test]
    fn preview_is_a_pure_function_of_inputs() {
        let weights = PreviewWeights::default();
        let a = composite_cost(20, Some(40.0), Some(0.2), Some(0.01), Some(-60.0), weights);
        let b = composite_cost(20, Some(40.0), Some(0.2), Some(0.01), Some(-60.0), weights);
        assert_eq!(a, b);
    }
}
