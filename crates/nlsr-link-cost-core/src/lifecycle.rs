//! Subsystem lifecycle state machine.
//!
//! Owns every piece that isn't the host daemon itself and drives them from
//! one cooperative `poll` call: the store, the probe scheduler, the cost
//! engine, the feedback publisher, the calculator selector, and the timer
//! wheel. `Uninitialized → Initialized → Running ⇄ Stopping → Stopped`,
//! matching how `strata-bonding::runtime` threads a single tick-driven loop
//! through its own scheduler rather than spawning dedicated tasks per
//! concern.
//!
//! Liveness (`ACTIVE`/`INACTIVE`, the hello-timeout counter) is owned by
//! the host's hello subsystem, out of scope here — the host calls
//! [`LinkCostSubsystem::on_hello_timeout`] and
//! [`LinkCostSubsystem::on_status_change`] to report it. An RTT probe that
//! goes unanswered is a separate, local concern: it just means this round
//! produced no sample, and does not by itself affect liveness.

use crate::calculator::CostSnapshot;
use crate::engine::{self, ApplyOutcome, CostEngine, RttBasedCost};
use crate::feedback::FeedbackPublisher;
use crate::host::HostCallbacks;
use crate::probe::{ProbeAction, ProbeScheduler};
use crate::selector::CalculatorSelector;
use crate::store::{LinkStateStore, NeighborStatus, RecordOutcome, StatusTransition};
use crate::timer::{TimerKind, TimerWheel};
use nlsr_link_cost_common::config::LinkCostConfig;
use nlsr_link_cost_common::NeighborId;
use quanta::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Running,
    Stopping,
    Stopped,
}

/// Side effects the host must carry out after a `poll` or response/timeout
/// call — sending probes over the wire is the one thing this subsystem
/// cannot do itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send an Interest named `<neighbor>/link-cost/rtt-probe/<seq>` with
    /// the given lifetime, then report back via [`LinkCostSubsystem::handle_probe_response`]
    /// or let it lapse into [`LinkCostSubsystem::poll`]'s own timeout handling.
    SendProbe {
        neighbor: NeighborId,
        seq: u32,
        lifetime: std::time::Duration,
    },
    /// A periodic status-report tick fired; `entries` is a snapshot the
    /// host may log or expose however it likes.
    StatusReport { entries: Vec<StatusReportEntry> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReportEntry {
    pub neighbor: NeighborId,
    pub status: NeighborStatus,
    pub current_cost: f64,
    pub timeout_count: u32,
}

/// Ties the store, probe scheduler, cost engine, feedback publisher,
/// calculator selector, and timer wheel into one cooperative state machine.
pub struct LinkCostSubsystem {
    state: LifecycleState,
    store: LinkStateStore,
    probes: ProbeScheduler,
    engine: CostEngine,
    feedback: FeedbackPublisher,
    selector: CalculatorSelector,
    timers: TimerWheel,
    warm_up: std::time::Duration,
    status_report_interval: std::time::Duration,
}

impl LinkCostSubsystem {
    pub fn new(config: &LinkCostConfig) -> Self {
        LinkCostSubsystem {
            state: LifecycleState::Uninitialized,
            store: LinkStateStore::new(config.rtt_history_capacity, config.retry_limit, config.min_samples_for_cost),
            probes: ProbeScheduler::new(config.measurement_interval, config.measurement_timeout, config.probe_jitter_max),
            engine: CostEngine::new(config.max_cost_multiplier, config.cost_change_threshold, config.rebuild_rate_limit),
            feedback: FeedbackPublisher::new(config.feedback_weights),
            selector: CalculatorSelector::new(config),
            timers: TimerWheel::new(),
            warm_up: config.warm_up,
            status_report_interval: config.status_report_interval,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn store(&self) -> &LinkStateStore {
        &self.store
    }

    /// One-shot initialization sweep over the adjacency list. No probing is
    /// armed yet.
    pub fn initialize<I>(&mut self, adjacency: I, now: Instant)
    where
        I: IntoIterator<Item = (NeighborId, u64)>,
    {
        self.store.initialize(adjacency, now);
        self.state = LifecycleState::Initialized;
    }

    /// Arms the one-shot warm-up timer. Probing and the recurring
    /// status-report tick start once it fires. Idempotent when already
    /// `Running`.
    pub fn start(&mut self, now: Instant) {
        if self.state == LifecycleState::Running {
            info!("start() called while already running, ignoring");
            return;
        }
        self.timers.schedule(now + self.warm_up, TimerKind::WarmUpDone);
        self.state = LifecycleState::Running;
    }

    /// Cancels every scheduled event, drops pending measurements, rolls
    /// every neighbor's cost back to its configured original, and asks the
    /// host for one final rebuild. Safe to call more than once.
    pub fn stop(&mut self, host: &mut dyn HostCallbacks, now: Instant) {
        if self.state == LifecycleState::Stopped {
            return;
        }
        self.state = LifecycleState::Stopping;
        self.timers.clear();
        self.probes.clear();
        self.store.rollback_all_costs();
        self.selector.deregister(&mut self.engine);

        for neighbor in self.store.neighbor_ids().cloned().collect::<Vec<_>>() {
            if let Some(state) = self.store.get(&neighbor) {
                let original = state.original_cost();
                if let Some(slot) = host.link_cost_slot(&neighbor) {
                    *slot = original;
                }
            }
            host.schedule_adj_lsa_build(&neighbor);
        }
        host.schedule_routing_table_calculation();
        let _ = now;
        self.state = LifecycleState::Stopped;
    }

    /// Drain due timers and react to each, returning any effects the host
    /// must carry out (sending probes, surfacing a status report).
    pub fn poll(&mut self, now: Instant) -> Vec<Effect> {
        if self.state != LifecycleState::Running {
            return Vec::new();
        }
        let fired = self.timers.poll(now);
        let mut effects = Vec::new();
        for kind in fired {
            match kind {
                TimerKind::WarmUpDone => self.on_warm_up_done(now),
                TimerKind::ProbeFire(neighbor) => self.on_probe_fire(&neighbor, now, &mut effects),
                TimerKind::ProbeTimeout(neighbor, seq) => self.on_probe_timeout(&neighbor, seq),
                TimerKind::StatusReport => self.on_status_report(now, &mut effects),
            }
        }
        effects
    }

    fn on_warm_up_done(&mut self, now: Instant) {
        let neighbors: Vec<NeighborId> = self.store.neighbor_ids().cloned().collect();
        for neighbor in neighbors {
            self.timers.schedule(self.probes.next_fire_at(now), TimerKind::ProbeFire(neighbor));
        }
        self.timers.schedule(now + self.status_report_interval, TimerKind::StatusReport);
        debug!("warm-up complete, probing armed");
    }

    fn on_probe_fire(&mut self, neighbor: &NeighborId, now: Instant, effects: &mut Vec<Effect>) {
        let stable = self.store.get(neighbor).map(|s| s.is_stable()).unwrap_or(false);
        let running = self.state == LifecycleState::Running;
        match self.probes.on_probe_fire(neighbor, stable, running, now) {
            ProbeAction::Send { seq, lifetime } => {
                self.timers.schedule(now + lifetime, TimerKind::ProbeTimeout(neighbor.clone(), seq));
                effects.push(Effect::SendProbe {
                    neighbor: neighbor.clone(),
                    seq,
                    lifetime,
                });
            }
            ProbeAction::Skip => {}
        }
        // Reschedule unconditionally while running, regardless of whether
        // this fire resulted in an actual probe.
        if running {
            self.timers.schedule(self.probes.next_fire_at(now), TimerKind::ProbeFire(neighbor.clone()));
        }
    }

    /// An outbound probe's lifetime elapsed with no response. This has no
    /// bearing on liveness by itself — it just means this round produced
    /// no RTT sample.
    fn on_probe_timeout(&mut self, neighbor: &NeighborId, seq: u32) {
        if self.probes.on_timeout(seq).is_some() {
            debug!(neighbor = %neighbor, seq, "probe timed out without a response");
        }
    }

    fn on_status_report(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        let entries = self
            .store
            .neighbors()
            .map(|(neighbor, state)| StatusReportEntry {
                neighbor: neighbor.clone(),
                status: state.status,
                current_cost: state.current_cost(),
                timeout_count: state.timeout_count,
            })
            .collect();
        effects.push(Effect::StatusReport { entries });
        self.timers.schedule(now + self.status_report_interval, TimerKind::StatusReport);
    }

    /// A probe response for `seq` arrived. Records the measurement,
    /// recomputes and applies the cost, and publishes feedback if enough
    /// samples are present.
    pub fn handle_probe_response(&mut self, host: &mut dyn HostCallbacks, seq: u32, now: Instant) {
        let Some((neighbor, rtt)) = self.probes.on_response(seq, now) else {
            return;
        };

        let outcome = self.store.record_measurement(&neighbor, rtt, now);
        let RecordOutcome::Accepted { ready_for_cost_update } = outcome else {
            return;
        };
        if !ready_for_cost_update {
            return;
        }

        self.selector.ensure_instantiated(&mut self.engine);

        if let RttBasedCost::Cost(candidate) = self.engine.compute_rtt_based_cost(&self.store, &neighbor) {
            // Engine-level change-ratio gate (spec.md §4.3's `should_update`):
            // a candidate that doesn't clear this bar never reaches the
            // calculator or the second, inner gate inside
            // `apply_cost_update`. Deliberately redundant with that inner
            // gate rather than collapsed into one call site — see DESIGN.md.
            let current_cost = self.store.get(&neighbor).map(|s| s.current_cost());
            let clears_engine_gate = current_cost
                .map(|c| self.engine.should_update(c, candidate as f64, self.engine.cost_change_threshold()))
                .unwrap_or(false);
            if clears_engine_gate {
                let _: ApplyOutcome = self.engine.apply_cost_update(&mut self.store, host, &neighbor, candidate, now);
            }
        }

        if let Some(snapshot) = engine::build_snapshot(&self.store, &neighbor, now) {
            self.publish_feedback(&neighbor, &snapshot);
        }
    }

    /// The host's hello subsystem reports `n` consecutive timeouts for
    /// `neighbor`. Declares the neighbor inactive once `n` reaches the
    /// configured retry limit, cancelling its pending probes and timers.
    pub fn on_hello_timeout(&mut self, host: &mut dyn HostCallbacks, neighbor: &NeighborId, n: u32, now: Instant) {
        let transition = self.store.on_hello_timeout(neighbor, n, now);
        if transition == StatusTransition::WentInactive {
            self.probes.clear_neighbor(neighbor);
            self.timers.cancel_neighbor(neighbor);
            warn!(neighbor = %neighbor, "declared inactive by the hello subsystem");
            host.schedule_adj_lsa_build(neighbor);
            host.schedule_routing_table_calculation();
        }
    }

    /// The host's hello subsystem reports a direct status flip for
    /// `neighbor` (bypassing the timeout counter, e.g. an explicit
    /// down/up notification).
    pub fn on_status_change(&mut self, host: &mut dyn HostCallbacks, neighbor: &NeighborId, new: NeighborStatus, now: Instant) {
        let transition = self.store.on_status_change(neighbor, new, now);
        match transition {
            StatusTransition::WentInactive => {
                self.probes.clear_neighbor(neighbor);
                self.timers.cancel_neighbor(neighbor);
                host.schedule_adj_lsa_build(neighbor);
                host.schedule_routing_table_calculation();
            }
            StatusTransition::WentActive => {
                if self.state == LifecycleState::Running {
                    let fire_at = self.probes.next_fire_at(now);
                    self.timers.schedule(fire_at, TimerKind::ProbeFire(neighbor.clone()));
                }
            }
            StatusTransition::None => {}
        }
    }

    fn publish_feedback(&mut self, neighbor: &NeighborId, snapshot: &CostSnapshot) {
        if let Some(performance) = self.feedback.compute(&snapshot.rtt_history_ms, snapshot.timeout_count) {
            self.engine.on_feedback(neighbor, performance.0, snapshot);
        }
    }
}
