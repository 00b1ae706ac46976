//! # Bonding-Specific Network Scenarios
//!
//! Pre-built scenario templates that exercise bonding edge cases:
//! - **Link failure / recovery** — sudden loss of one link
//! - **Handover simulation** — gradual SINR degradation + recovery
//! - **Correlated fading** — all links degrade simultaneously
//! - **Asymmetric capacity** — one link much faster than others
//!
//! These produce `Vec<ScenarioFrame>` compatible with the existing
//! impairment infrastructure.

use crate::impairment::ImpairmentConfig;
use crate::scenario::ScenarioFrame;
use std::time::Duration;

/// A link failure event: link drops, then recovers after a duration.
#[derive(Debug, Clone)]
pub struct LinkFailureScenario {
    /// Total scenario duration.
    pub duration: Duration,
    /// Time step between frames.
    pub step: Duration,
    /// Number of links (the last one will fail).
    pub num_links: usize,
    /// When the failure starts.
    pub failure_start: Duration,
    /// How long the failure lasts.
    pub failure_duration: Duration,
    /// Normal link capacity (kbit/s) for healthy links.
    pub normal_rate_kbit: u64,
    /// Normal delay (ms).
    pub normal_delay_ms: u32,
}

impl Default for LinkFailureScenario {
    fn default() -> Self {
        LinkFailureScenario {
            duration: Duration::from_secs(30),
            step: Duration::from_secs(1),
            num_links: 3,
            failure_start: Duration::from_secs(10),
            failure_duration: Duration::from_secs(5),
            normal_rate_kbit: 5_000,
            normal_delay_ms: 20,
        }
    }
}

impl LinkFailureScenario {
    /// Generate frames. The last link goes to 0 kbit during the failure window.
    pub fn frames(&self) -> Vec<ScenarioFrame> {
        let total_steps = (self.duration.as_secs_f64() / self.step.as_secs_f64()).ceil() as u64;
        let fail_end = self.failure_start + self.failure_duration;

        (0..=total_steps)
            .map(|i| {
                let t = self.step.mul_f64(i as f64);
                let in_failure = t >= self.failure_start && t < fail_end;

                let configs: Vec<ImpairmentConfig> = (0..self.num_links)
                    .map(|link_idx| {
                        let is_failing = link_idx == self.num_links - 1 && in_failure;
                        if is_failing {
                            ImpairmentConfig {
                                rate_kbit: Some(1),   // near-zero
                                delay_ms: Some(2000), // massive delay
                                loss_percent: Some(100.0),
                                ..Default::default()
                            }
                        } else {
                            ImpairmentConfig {
                                rate_kbit: Some(self.normal_rate_kbit),
                                delay_ms: Some(self.normal_delay_ms),
                                loss_percent: Some(0.0),
                                ..Default::default()
                            }
                        }
                    })
                    .collect();

                ScenarioFrame { t, configs }
            })
            .collect()
    }
}

/// Simulates a cellular handover: gradual SINR degradation causing
/// increased delay and loss, followed by recovery on a "new cell".
#[derive(Debug, Clone)]
pub struct HandoverScenario {
    /// Total scenario duration.
    pub duration: Duration,
    /// Time step.
    pub step: Duration,
    /// Number of links (link 0 will undergo handover).
    pub num_links: usize,
    /// When degradation begins.
    pub degradation_start: Duration,
    /// Duration of the degradation ramp.
    pub degradation_ramp: Duration,
    /// Duration of the blackout (handover gap).
    pub blackout_duration: Duration,
    /// Duration of the recovery ramp.
    pub recovery_ramp: Duration,
    /// Normal capacity.
    pub normal_rate_kbit: u64,
    /// Normal delay.
    pub normal_delay_ms: u32,
}

impl Default for HandoverScenario {
    fn default() -> Self {
        HandoverScenario {
            duration: Duration::from_secs(30),
            step: Duration::from_millis(500),
            num_links: 2,
            degradation_start: Duration::from_secs(8),
            degradation_ramp: Duration::from_secs(3),
            blackout_duration: Duration::from_millis(500),
            recovery_ramp: Duration::from_secs(2),
            normal_rate_kbit: 10_000,
            normal_delay_ms: 15,
        }
    }
}

impl HandoverScenario {
    pub fn frames(&self) -> Vec<ScenarioFrame> {
        let total_steps = (self.duration.as_secs_f64() / self.step.as_secs_f64()).ceil() as u64;
        let deg_end = self.degradation_start + self.degradation_ramp;
        let blackout_end = deg_end + self.blackout_duration;
        let recovery_end = blackout_end + self.recovery_ramp;

        (0..=total_steps)
            .map(|i| {
                let t = self.step.mul_f64(i as f64);
                let configs: Vec<ImpairmentConfig> = (0..self.num_links)
                    .map(|link_idx| {
                        if link_idx != 0 {
                            // Non-handover links are stable
                            return ImpairmentConfig {
                                rate_kbit: Some(self.normal_rate_kbit),
                                delay_ms: Some(self.normal_delay_ms),
                                loss_percent: Some(0.0),
                                ..Default::default()
                            };
                        }

                        // Link 0: handover progression
                        if t < self.degradation_start {
                            // Normal
                            ImpairmentConfig {
                                rate_kbit: Some(self.normal_rate_kbit),
                                delay_ms: Some(self.normal_delay_ms),
                                loss_percent: Some(0.0),
                                ..Default::default()
                            }
                        } else if t < deg_end {
                            // Degrading: linear ramp
                            let progress = (t - self.degradation_start).as_secs_f64()
                                / self.degradation_ramp.as_secs_f64();
                            let rate = self.normal_rate_kbit as f64 * (1.0 - progress * 0.8);
                            let delay = self.normal_delay_ms as f64 * (1.0 + progress * 5.0);
                            let loss = progress * 15.0;
                            ImpairmentConfig {
                                rate_kbit: Some(rate.max(1.0) as u64),
                                delay_ms: Some(delay as u32),
                                loss_percent: Some(loss as f32),
                                ..Default::default()
                            }
                        } else if t < blackout_end {
                            // Blackout
                            ImpairmentConfig {
                                rate_kbit: Some(1),
                                delay_ms: Some(5000),
                                loss_percent: Some(100.0),
                                ..Default::default()
                            }
                        } else if t < recovery_end {
                            // Recovery ramp
                            let progress =
                                (t - blackout_end).as_secs_f64() / self.recovery_ramp.as_secs_f64();
                            let rate = self.normal_rate_kbit as f64 * progress;
                            let delay =
                                self.normal_delay_ms as f64 * (1.0 + (1.0 - progress) * 3.0);
                            let loss = (1.0 - progress) * 5.0;
                            ImpairmentConfig {
                                rate_kbit: Some(rate.max(1.0) as u64),
                                delay_ms: Some(delay as u32),
                                loss_percent: Some(loss as f32),
                                ..Default::default()
                            }
                        } else {
                            // Recovered
                            ImpairmentConfig {
                                rate_kbit: Some(self.normal_rate_kbit),
                                delay_ms: Some(self.normal_delay_ms),
                                loss_percent: Some(0.0),
                                ..Default::default()
                            }
                        }
                    })
                    .collect();

                ScenarioFrame { t, configs }
            })
            .collect()
    }
}

/// Correlated fading: ALL links degrade simultaneously (e.g., rain fade,
/// entering a tunnel).
#[derive(Debug, Clone)]
pub struct CorrelatedFadingScenario {
    /// Total duration.
    pub duration: Duration,
    /// Time step.
    pub step: Duration,
    /// Number of links.
    pub num_links: usize,
    /// When the fade begins.
    pub fade_start: Duration,
    /// How long the fade lasts.
    pub fade_duration: Duration,
    /// Severity: fraction of capacity lost (0.0 - 1.0).
    pub severity: f64,
    /// Normal capacity.
    pub normal_rate_kbit: u64,
    /// Normal delay.
    pub normal_delay_ms: u32,
}

impl Default for CorrelatedFadingScenario {
    fn default() -> Self {
        CorrelatedFadingScenario {
            duration: Duration::from_secs(20),
            step: Duration::from_millis(500),
            num_links: 3,
            fade_start: Duration::from_secs(5),
            fade_duration: Duration::from_secs(8),
            severity: 0.7,
            normal_rate_kbit: 8_000,
            normal_delay_ms: 20,
        }
    }
}

impl CorrelatedFadingScenario {
    pub fn frames(&self) -> Vec<ScenarioFrame> {
        let total_steps = (self.duration.as_secs_f64() / self.step.as_secs_f64()).ceil() as u64;
        let fade_end = self.fade_start + self.fade_duration;

        (0..=total_steps)
            .map(|i| {
                let t = self.step.mul_f64(i as f64);

                // Compute fade factor (bell-shaped within fade window)
                let fade_factor = if t >= self.fade_start && t < fade_end {
                    let progress =
                        (t - self.fade_start).as_secs_f64() / self.fade_duration.as_secs_f64();
                    // Sine bell: peak at midpoint
                    let bell = (progress * std::f64::consts::PI).sin();
                    bell * self.severity
                } else {
                    0.0
                };

                let configs: Vec<ImpairmentConfig> = (0..self.num_links)
                    .map(|_| {
                        let rate = self.normal_rate_kbit as f64 * (1.0 - fade_factor);
                        let delay = self.normal_delay_ms as f64 * (1.0 + fade_factor * 3.0);
                        let loss = fade_factor * 10.0;
                        ImpairmentConfig {
                            rate_kbit: Some(rate.max(1.0) as u64),
                            delay_ms: Some(delay as u32),
                            loss_percent: Some(loss as f32),
                            ..Default::default()
                        }
                    })
                    .collect();

                ScenarioFrame { t, configs }
            })
            .collect()
    }
}
