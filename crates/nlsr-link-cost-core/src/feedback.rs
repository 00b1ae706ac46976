//! Feedback Publisher.
//!
//! Turns an accepted RTT measurement into a single scalar "how well is this
//! link doing" score, for any registered subscriber — today that's only the
//! ML Adaptive Calculator's online update, but the publisher itself has no
//! knowledge of who's listening.

use nlsr_link_cost_common::config::FeedbackWeights;

/// A computed performance score, lower is better, always in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Performance(pub f64);

/// Computes the weighted performance score from a neighbor's RTT history.
/// Stateless — every call is self-contained given the same history slice.
pub struct FeedbackPublisher {
    weights: FeedbackWeights,
}

impl FeedbackPublisher {
    pub fn new(weights: FeedbackWeights) -> Self {
        FeedbackPublisher { weights }
    }

    /// `history_ms` is oldest-first, bounded by the store's RTT history
    /// capacity. Returns `None` when fewer than 3 samples are present —
    /// callers should not publish in that case.
    pub fn compute(&self, history_ms: &[f64], timeout_count: u32) -> Option<Performance> {
        if history_ms.len() < 3 {
            return None;
        }
        let latest = *history_ms.last().expect("non-empty");
        let rtt = rtt_score(latest);
        let stability = stability_score(history_ms);
        let reliability = reliability_score(timeout_count);
        let trend = trend_score(history_ms);

        let score = self.weights.rtt * rtt
            + self.weights.stability * stability
            + self.weights.reliability * reliability
            + self.weights.trend * trend;
        Some(Performance(score.clamp(0.0, 1.0)))
    }
}

/// Piecewise-linear curve: 0 at <=10ms, 0.3 at 50ms, 0.6 at 100ms,
/// 0.9 at 200ms, capped at 1.0 beyond that.
fn rtt_score(rtt_ms: f64) -> f64 {
    const POINTS: [(f64, f64); 5] = [
        (10.0, 0.0),
        (50.0, 0.3),
        (100.0, 0.6),
        (200.0, 0.9),
        (f64::INFINITY, 1.0),
    ];
    if rtt_ms <= POINTS[0].0 {
        return POINTS[0].1;
    }
    for window in POINTS.windows(2) {
        let (x0, y0) = window[0];
        let (x1, y1) = window[1];
        if rtt_ms <= x1 {
            if x1.is_infinite() {
                return 1.0;
            }
            let t = (rtt_ms - x0) / (x1 - x0);
            return y0 + t * (y1 - y0);
        }
    }
    1.0
}

/// Coefficient of variation over the last <=5 samples, mapped:
/// `<=0.1 -> 0`, `<=0.3 -> linear to 0.4`, else linear toward 1.0.
fn stability_score(history_ms: &[f64]) -> f64 {
    let window = &history_ms[history_ms.len().saturating_sub(5)..];
    if window.len() < 2 {
        return 0.0;
    }
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window.len() as f64;
    let cv = variance.sqrt() / mean;

    if cv <= 0.1 {
        0.0
    } else if cv <= 0.3 {
        let t = (cv - 0.1) / (0.3 - 0.1);
        t * 0.4
    } else {
        let t = ((cv - 0.3) / 0.7).min(1.0);
        0.4 + t * 0.6
    }
}

/// Piecewise on consecutive hello timeouts.
fn reliability_score(timeout_count: u32) -> f64 {
    match timeout_count {
        0 => 0.0,
        1..=2 => 0.2,
        3..=5 => 0.5,
        _ => 0.8,
    }
}

/// Compares mean of last 3 samples vs. the prior 3; requires >=6 samples.
fn trend_score(history_ms: &[f64]) -> f64 {
    let len = history_ms.len();
    if len < 6 {
        return 0.0;
    }
    let recent = &history_ms[len - 3..];
    let prior = &history_ms[len - 6..len - 3];
    let recent_mean = recent.iter().sum::<f64>() / 3.0;
    let prior_mean = prior.iter().sum::<f64>() / 3.0;
    if prior_mean <= 0.0 {
        return 0.0;
    }
    let change = (recent_mean - prior_mean) / prior_mean;

    if change <= -0.1 {
        0.0
    } else if change <= 0.1 {
        0.2
    } else if change <= 0.3 {
        0.5
    } else {
        0.8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_three_samples_yields_none() {
        let publisher = FeedbackPublisher::new(FeedbackWeights::default());
        assert_eq!(publisher.compute(&[10.0, 20.0], 0), None);
    }

    #[test]
    fn low_rtt_stable_link_scores_near_zero() {
        let publisher = FeedbackPublisher::new(FeedbackWeights::default());
        let score = publisher.compute(&[10.0, 10.0, 10.0, 10.0], 0).unwrap();
        assert!(score.0 < 0.1, "expected near-zero score, got {}", score.0);
    }

    #[test]
    fn high_rtt_unstable_link_scores_high() {
        let publisher = FeedbackPublisher::new(FeedbackWeights::default());
        let score = publisher
            .compute(&[10.0, 300.0, 20.0, 400.0, 5.0, 500.0], 7)
            .unwrap();
        assert!(score.0 > 0.5, "expected high score, got {}", score.0);
    }

    #[test]
    fn rising_trend_raises_trend_component() {
        let rising = trend_score(&[10.0, 10.0, 10.0, 15.0, 20.0, 25.0]);
        let falling = trend_score(&[25.0, 20.0, 15.0, 10.0, 10.0, 10.0]);
        assert!(rising > falling);
    }

    #[test]
    fn score_is_always_clamped() {
        let publisher = FeedbackPublisher::new(FeedbackWeights {
            rtt: 10.0,
            stability: 10.0,
            reliability: 10.0,
            trend: 10.0,
        });
        let score = publisher
            .compute(&[10.0, 300.0, 20.0, 400.0, 5.0, 500.0], 9)
            .unwrap();
        assert!(score.0 <= 1.0);
    }
}
