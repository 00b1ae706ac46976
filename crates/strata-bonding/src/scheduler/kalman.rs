//! # Kalman Filter — Link Quality Estimation
//!
//! Two-state Kalman filter for smoothing noisy RTT and capacity
//! measurements per link.  State vector: `[value, velocity]`.
//!
//! The velocity component enables prediction during measurement gaps
//! and detects trends (e.g., degrading link before loss spikes).

/// A two-state Kalman filter: [value, velocity].
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    // ─── State ───
    /// Estimated value.
    x: f64,
    /// Estimated velocity (change per tick).
    v: f64,

    // ─── Covariance P (2×2 symmetric) ───
    p00: f64,
    p01: f64,
    p11: f64,

    // ─── Tuning ───
    /// Process noise for value.
    q_value: f64,
    /// Process noise for velocity.
    q_velocity: f64,
    /// Measurement noise variance.
    r: f64,

    /// Whether we've received at least one measurement.
    initialized: bool,
}

/// Configuration for a Kalman filter instance.
#[derive(Debug, Clone)]
pub struct KalmanConfig {
    /// Process noise for the value state. Higher = more reactive to changes.
    pub q_value: f64,
    /// Process noise for the velocity state.
    pub q_velocity: f64,
    /// Measurement noise variance. Higher = smoother output, more lag.
    pub r: f64,
}

impl KalmanConfig {
    /// Suitable for RTT smoothing (values in milliseconds).
    pub fn for_rtt() -> Self {
        KalmanConfig {
            q_value: 0.5,
            q_velocity: 0.1,
            r: 10.0,
        }
    }

    /// Suitable for capacity/throughput estimation (values in kbps).
    pub fn for_capacity() -> Self {
        KalmanConfig {
            q_value: 50.0,
            q_velocity: 5.0,
            r: 500.0,
        }
    }

    /// Suitable for RSRP/signal strength (values in dBm).
    pub fn for_signal() -> Self {
        KalmanConfig {
            q_value: 1.0,
            q_velocity: 0.2,
            r: 5.0,
        }
    }
}

impl KalmanFilter {
    pub fn new(config: &KalmanConfig) -> Self {
        KalmanFilter {
            x: 0.0,
            v: 0.0,
            p00: 1000.0, // Large initial uncertainty
            p01: 0.0,
            p11: 1000.0,
            q_value: config.q_value,
            q_velocity: config.q_velocity,
            r: config.r,
            initialized: false,
        }
    }

    /// Current estimated value.
    pub fn value(&self) -> f64 {
        self.x
    }

    /// Current estimated velocity (change per tick).
    pub fn velocity(&self) -> f64 {
        self.v
    }

    /// Whether a trend is positive (increasing).
    pub fn is_increasing(&self) -> bool {
        self.v > 0.0
    }

    /// Uncertainty in the current estimate (sqrt of variance).
    pub fn uncertainty(&self) -> f64 {
        self.p00.sqrt()
    }

    /// Has received at least one measurement.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Predict step: advance state by one time step (dt = 1).
    pub fn predict(&mut self) {
        // State prediction: x' = x + v, v' = v
        self.x += self.v;

        // Covariance prediction: P' = F*P*F' + Q
        // F = [[1, 1], [0, 1]]
        let new_p00 = self.p00 + 2.0 * self.p01 + self.p11 + self.q_value;
        let new_p01 = self.p01 + self.p11 + self.q_velocity;
        let new_p11 = self.p11 + self.q_velocity;

        self.p00 = new_p00;
        self.p01 = new_p01;
        self.p11 = new_p11;
    }

    /// Update step: incorporate a new measurement.
    pub fn update(&mut self, measurement: f64) {
        if !self.initialized {
            // First measurement: initialize directly
            self.x = measurement;
            self.v = 0.0;
            self.initialized = true;
            return;
        }

        // Predict first
        self.predict();

        // Innovation
        let y = measurement - self.x;

        // Innovation covariance: S = H*P*H' + R = P[0,0] + R
        let s = self.p00 + self.r;

        // Kalman gain: K = P*H'/S
        let k0 = self.p00 / s;
        let k1 = self.p01 / s;

        // State update
        self.x += k0 * y;
        self.v += k1 * y;

        // Covariance update: P = (I - K*H)*P
        let new_p00 = self.p00 - k0 * self.p00;
        let new_p01 = self.p01 - k0 * self.p01;
        let new_p11 = self.p11 - k1 * self.p01;

        self.p00 = new_p00;
        self.p01 = new_p01;
        self.p11 = new_p11;
    }

    /// Predict value N steps ahead without modifying state.
    pub fn predict_ahead(&self, steps: u32) -> f64 {
        self.x + self.v * steps as f64
    }

    /// Reset to uninitialized state.
    pub fn reset(&mut self) {
        self.x = 0.0;
        self.v = 0.0;
        self.p00 = 1000.0;
        self.p01 = 0.0;
        self.p11 = 1000.0;
        self.initialized = false;
    }
}

/// Per-link quality estimator using multiple Kalman filters.
pub struct LinkQualityEstimator {
    pub rtt: KalmanFilter,
    pub capacity: KalmanFilter,
    pub signal: KalmanFilter,
}

impl LinkQualityEstimator {
    pub fn new() -> Self {
        LinkQualityEstimator {
            rtt: KalmanFilter::new(&KalmanConfig::for_rtt()),
            capacity: KalmanFilter::new(&KalmanConfig::for_capacity()),
            signal: KalmanFilter::new(&KalmanConfig::for_signal()),
        }
    }

    /// Composite quality score [0, 1]. Higher = better link.
    ///
    /// Weights: RTT (40%), capacity (40%), signal trend (20%).
    pub fn quality_score(&self) -> f64 {
        if !self.rtt.is_initialized() {
            return 0.5; // No data yet
        }

        // RTT score: lower is better, normalize roughly to [0,1]
        // 10ms → 1.0, 200ms → 0.0
        let rtt_score = (1.0 - (self.rtt.value() - 10.0) / 190.0).clamp(0.0, 1.0);

        // Capacity score: normalize to [0,1] with 50 Mbps as "excellent"
        let cap_score = if self.capacity.is_initialized() {
            (self.capacity.value() / 50000.0).clamp(0.0, 1.0) // kbps
        } else {
            0.5
        };

        // Signal trend: penalize degrading signal
        let signal_penalty = if self.signal.is_initialized() && self.signal.velocity() < -1.0 {
            0.1 // 10% penalty for rapidly degrading signal
        } else {
            0.0
        };

        0.4 * rtt_score + 0.4 * cap_score + 0.2 * (1.0 - signal_penalty)
    }
}

impl Default for LinkQualityEstimator {
    fn default() -> Self {
        Self::new()
    }
}
