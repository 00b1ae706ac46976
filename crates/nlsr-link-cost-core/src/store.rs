//! Per-neighbor link state.
//!
//! The sole shared structure in the subsystem: the probe
//! scheduler, the cost engine, and the metrics control channel all read and
//! mutate it, but always from the single cooperative loop thread, so it
//! carries no internal locking — matching how `BondingScheduler` owns its
//! per-link `HashMap` outright rather than wrapping it in a `Mutex`.

use nlsr_link_cost_common::NeighborId;
use quanta::Instant;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// A two-state liveness machine. Transitions are driven only by the host's
/// hello subsystem or by this subsystem's own timeout accounting — never
/// by the cost engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborStatus {
    Active,
    Inactive,
}

/// A single round-trip measurement.
#[derive(Debug, Clone, Copy)]
pub struct RttSample {
    pub measured: Duration,
    pub received_at: Instant,
}

/// Externally configured link metrics, set via the metrics control channel.
/// Never influences routing cost directly — only the preview cost formula.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalMetrics {
    pub bandwidth_mbps: Option<f64>,
    pub utilization: Option<f64>,
    pub packet_loss: Option<f64>,
    pub spectrum_dbm: Option<f64>,
    pub updated_at: Option<Instant>,
}

/// Per-neighbor state. Created once during the initialization sweep over
/// the adjacency list and lives for the daemon's lifetime; only its fields
/// mutate.
#[derive(Debug, Clone)]
pub struct LinkState {
    pub status: NeighborStatus,
    /// The cost declared in static configuration. Never mutated after
    /// `initialize`.
    original_cost: u64,
    /// The most recently published cost.
    current_cost: f64,
    rtt_history: VecDeque<RttSample>,
    history_capacity: usize,
    pub timeout_count: u32,
    pub last_success: Option<Instant>,
    pub last_rebuild_trigger: Option<Instant>,
    pub external_metrics: Option<ExternalMetrics>,
}

impl LinkState {
    fn new(original_cost: u64, history_capacity: usize, now: Instant) -> Self {
        LinkState {
            status: NeighborStatus::Active,
            original_cost,
            current_cost: original_cost as f64,
            rtt_history: VecDeque::with_capacity(history_capacity),
            history_capacity,
            timeout_count: 0,
            last_success: Some(now),
            last_rebuild_trigger: None,
            external_metrics: None,
        }
    }

    pub fn original_cost(&self) -> u64 {
        self.original_cost
    }

    pub fn current_cost(&self) -> f64 {
        self.current_cost
    }

    pub fn rtt_history(&self) -> &VecDeque<RttSample> {
        &self.rtt_history
    }

    pub fn is_stable(&self) -> bool {
        self.status == NeighborStatus::Active && self.timeout_count == 0
    }

    fn clear_history(&mut self) {
        self.rtt_history.clear();
    }

    fn push_sample(&mut self, sample: RttSample) {
        if self.rtt_history.len() == self.history_capacity {
            self.rtt_history.pop_front();
        }
        self.rtt_history.push_back(sample);
    }
}

/// Outcome of [`LinkStateStore::record_measurement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Neighbor is unknown or INACTIVE; the sample was dropped.
    Ignored,
    /// The measured RTT exceeded 5000 ms and was discarded (Transient, per
    /// the error taxonomy — retried on the next scheduled probe).
    Rejected,
    /// The sample was appended. `ready_for_cost_update` is true once at
    /// least `min_samples` samples are present.
    Accepted { ready_for_cost_update: bool },
}

/// Outcome of a status-affecting call ([`LinkStateStore::on_hello_timeout`],
/// [`LinkStateStore::on_status_change`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    None,
    WentInactive,
    WentActive,
}

/// The per-neighbor store. Only neighbors present in the adjacency list
/// (i.e. passed to [`LinkStateStore::initialize`]) ever appear here.
pub struct LinkStateStore {
    neighbors: HashMap<NeighborId, LinkState>,
    history_capacity: usize,
    retry_limit: u32,
    min_samples_for_cost: usize,
}

impl LinkStateStore {
    pub fn new(history_capacity: usize, retry_limit: u32, min_samples_for_cost: usize) -> Self {
        assert!(history_capacity >= 10, "rtt_history capacity must be >= 10");
        LinkStateStore {
            neighbors: HashMap::new(),
            history_capacity,
            retry_limit,
            min_samples_for_cost,
        }
    }

    /// One-shot initialization sweep over the adjacency list.
    pub fn initialize<I>(&mut self, adjacency: I, now: Instant)
    where
        I: IntoIterator<Item = (NeighborId, u64)>,
    {
        for (neighbor, original_cost) in adjacency {
            self.neighbors
                .entry(neighbor)
                .or_insert_with(|| LinkState::new(original_cost, self.history_capacity, now));
        }
    }

    pub fn get(&self, neighbor: &NeighborId) -> Option<&LinkState> {
        self.neighbors.get(neighbor)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = (&NeighborId, &LinkState)> {
        self.neighbors.iter()
    }

    pub fn neighbor_ids(&self) -> impl Iterator<Item = &NeighborId> {
        self.neighbors.keys()
    }

    pub fn contains(&self, neighbor: &NeighborId) -> bool {
        self.neighbors.contains_key(neighbor)
    }

    /// Directly set `current_cost`. Clamped to
    /// `[1, original_cost * max_multiplier]` by the caller (the Cost
    /// Engine); the store itself does not know `max_multiplier`.
    pub fn set_current_cost(&mut self, neighbor: &NeighborId, cost: f64) {
        if let Some(state) = self.neighbors.get_mut(neighbor) {
            state.current_cost = cost;
        }
    }

    pub fn mark_rebuild_triggered(&mut self, neighbor: &NeighborId, now: Instant) {
        if let Some(state) = self.neighbors.get_mut(neighbor) {
            state.last_rebuild_trigger = Some(now);
        }
    }

    /// Records an accepted or rejected RTT probe result.
    pub fn record_measurement(
        &mut self,
        neighbor: &NeighborId,
        measured: Duration,
        now: Instant,
    ) -> RecordOutcome {
        let Some(state) = self.neighbors.get_mut(neighbor) else {
            return RecordOutcome::Ignored;
        };
        if state.status != NeighborStatus::Active {
            return RecordOutcome::Ignored;
        }
        // Asymmetric by design: a too-fast reading is clamped and kept,
        // a too-slow one is rejected outright rather than clamped to the
        // ceiling. Flagged in spec.md's open questions as worth
        // re-examining if measurement noise ever dominates; left as-is.
        if measured > Duration::from_millis(5000) {
            return RecordOutcome::Rejected;
        }
        let clamped = measured.max(Duration::from_millis(1));
        state.push_sample(RttSample {
            measured: clamped,
            received_at: now,
        });
        state.last_success = Some(now);
        // timeout_count tracks consecutive hello timeouts, not RTT probe
        // outcomes; only on_hello_timeout / on_status_change own it.
        RecordOutcome::Accepted {
            ready_for_cost_update: state.rtt_history.len() >= self.min_samples_for_cost,
        }
    }

    /// Advances a neighbor's consecutive-timeout count, declaring it
    /// inactive once it reaches the retry limit.
    pub fn on_hello_timeout(
        &mut self,
        neighbor: &NeighborId,
        n: u32,
        now: Instant,
    ) -> StatusTransition {
        let Some(state) = self.neighbors.get_mut(neighbor) else {
            return StatusTransition::None;
        };
        state.timeout_count = n;
        if n >= self.retry_limit && state.status == NeighborStatus::Active {
            state.status = NeighborStatus::Inactive;
            state.clear_history();
            let _ = now;
            return StatusTransition::WentInactive;
        }
        StatusTransition::None
    }

    /// Reacts to a hello-subsystem status flip for this neighbor.
    pub fn on_status_change(
        &mut self,
        neighbor: &NeighborId,
        new: NeighborStatus,
        now: Instant,
    ) -> StatusTransition {
        let Some(state) = self.neighbors.get_mut(neighbor) else {
            return StatusTransition::None;
        };
        match (state.status, new) {
            (NeighborStatus::Active, NeighborStatus::Inactive) => {
                state.status = NeighborStatus::Inactive;
                state.clear_history();
                state.timeout_count = self.retry_limit;
                StatusTransition::WentInactive
            }
            (NeighborStatus::Inactive, NeighborStatus::Active) => {
                state.status = NeighborStatus::Active;
                state.current_cost = state.original_cost as f64;
                state.timeout_count = 0;
                state.last_success = Some(now);
                StatusTransition::WentActive
            }
            _ => StatusTransition::None,
        }
    }

    /// Applies a partial update of externally configured metrics, upserting
    /// only the fields that are `Some`. Returns `false` if the neighbor is
    /// unknown (caller maps this to `LinkCostError::NotFound`).
    pub fn apply_external_metrics(
        &mut self,
        neighbor: &NeighborId,
        bandwidth_mbps: Option<f64>,
        utilization: Option<f64>,
        packet_loss: Option<f64>,
        spectrum_dbm: Option<f64>,
        now: Instant,
    ) -> bool {
        let Some(state) = self.neighbors.get_mut(neighbor) else {
            return false;
        };
        let mut metrics = state.external_metrics.unwrap_or_default();
        if bandwidth_mbps.is_some() {
            metrics.bandwidth_mbps = bandwidth_mbps;
        }
        if utilization.is_some() {
            metrics.utilization = utilization;
        }
        if packet_loss.is_some() {
            metrics.packet_loss = packet_loss;
        }
        if spectrum_dbm.is_some() {
            metrics.spectrum_dbm = spectrum_dbm;
        }
        metrics.updated_at = Some(now);
        state.external_metrics = Some(metrics);
        true
    }

    /// Rolls every neighbor's `current_cost` back to `original_cost`, for
    /// subsystem shutdown.
    pub fn rollback_all_costs(&mut self) {
        for state in self.neighbors.values_mut() {
            state.current_cost = state.original_cost as f64;
        }
    }
}
