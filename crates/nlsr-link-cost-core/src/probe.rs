//! Probe Scheduler & Responder.
//!
//! Decides when to probe a neighbor and tracks outstanding probes by
//! sequence number; it never touches the network itself — the actual
//! Interest/Data exchange is the host's wire codec, out of scope here. This
//! module only ever hands the caller an intent (`ProbeAction::Send`) or
//! consumes a result the caller observed (`on_response`, `on_timeout`).
//!
//! The Responder side is the mirror image: [`handle_probe_request`] answers
//! an inbound rtt-probe Interest with a fixed, 1-second-fresh
//! [`ProbeResponse`] and keeps no state of its own across calls.

use nlsr_link_cost_common::NeighborId;
use quanta::Instant;
use rand::rngs::SmallRng;
use rand::RngExt;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;

/// What the caller should do after a `ProbeFire` timer expires.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeAction {
    /// Skipped: the subsystem is stopped or the neighbor fails the
    /// stability predicate.
    Skip,
    /// Send an Interest named `<neighbor>/link-cost/rtt-probe/<seq>` with
    /// the configured measurement timeout as its lifetime.
    Send { seq: u32, lifetime: Duration },
}

/// Fixed payload returned by [`handle_probe_request`]. The content is never
/// interpreted by the peer; only the Interest/Data round trip matters for
/// RTT measurement.
pub const PROBE_RESPONSE_PAYLOAD: &[u8] = b"nlsr-link-cost-rtt-probe-pong";

/// A reply to an inbound `<own-router>/link-cost/rtt-probe/<seq>` Interest.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    /// FreshnessPeriod to stamp on the outgoing Data.
    pub freshness: Duration,
    pub payload: &'static [u8],
}

/// The responder half of the probe exchange: answers an inbound rtt-probe
/// Interest for `seq` (already matched against `<own-router>/link-cost/
/// rtt-probe` by the caller's wire layer — naming and registration are out
/// of scope here, same as `ProbeAction::Send` never touches the network
/// itself). Stateless and neighbor-agnostic: every request gets the same
/// answer, nothing is recorded.
pub fn handle_probe_request(_seq: u32) -> ProbeResponse {
    ProbeResponse {
        freshness: Duration::from_secs(1),
        payload: PROBE_RESPONSE_PAYLOAD,
    }
}

struct Pending {
    neighbor: NeighborId,
    sent_at: Instant,
}

/// Per-neighbor probe bookkeeping plus the global pending-measurement map,
/// keyed by sequence number so out-of-order responses resolve correctly.
pub struct ProbeScheduler {
    base_interval: Duration,
    timeout: Duration,
    jitter_max: Duration,
    next_seq: u32,
    pending: HashMap<u32, Pending>,
    rng: SmallRng,
}

impl ProbeScheduler {
    pub fn new(base_interval: Duration, timeout: Duration, jitter_max: Duration) -> Self {
        ProbeScheduler {
            base_interval,
            timeout,
            jitter_max,
            next_seq: 0,
            pending: HashMap::new(),
            rng: SmallRng::seed_from_u64(0x6C73_7231),
        }
    }

    /// Uniform `[0, jitter_max)` offset added on top of `base_interval`.
    fn jitter(&mut self) -> Duration {
        if self.jitter_max.is_zero() {
            return Duration::ZERO;
        }
        let fraction: f64 = self.rng.random();
        self.jitter_max.mul_f64(fraction)
    }

    /// The deadline for the next `ProbeFire` timer, computed fresh each
    /// time this is called (the scheduler re-arms unconditionally).
    pub fn next_fire_at(&mut self, now: Instant) -> Instant {
        now + self.base_interval + self.jitter()
    }

    /// A `ProbeFire` timer expired for `neighbor`. `stable` is the result
    /// of the store's `(status == Active && timeout_count == 0)`
    /// predicate, and `running` reflects the lifecycle state.
    pub fn on_probe_fire(&mut self, neighbor: &NeighborId, stable: bool, running: bool, now: Instant) -> ProbeAction {
        if !running || !stable {
            return ProbeAction::Skip;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.pending.insert(
            seq,
            Pending {
                neighbor: neighbor.clone(),
                sent_at: now,
            },
        );
        ProbeAction::Send { seq, lifetime: self.timeout }
    }

    /// A response for `seq` arrived at `now`. Returns the neighbor and the
    /// measured round-trip time if `seq` was still outstanding (`None` if
    /// it already timed out or was never ours — e.g. a stale duplicate).
    pub fn on_response(&mut self, seq: u32, now: Instant) -> Option<(NeighborId, Duration)> {
        let pending = self.pending.remove(&seq)?;
        Some((pending.neighbor, now.saturating_duration_since(pending.sent_at)))
    }

    /// The `ProbeTimeout` timer for `(neighbor, seq)` fired. Returns the
    /// neighbor if the probe was still outstanding (a response may have
    /// raced the timeout and already removed it).
    pub fn on_timeout(&mut self, seq: u32) -> Option<NeighborId> {
        self.pending.remove(&seq).map(|p| p.neighbor)
    }

    /// Drop every outstanding probe, for `stop()` and for a neighbor going
    /// INACTIVE.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn clear_neighbor(&mut self, neighbor: &NeighborId) {
        self.pending.retain(|_, p| &p.neighbor != neighbor);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta::Clock;

    #[test]
    fn probe_request_gets_a_fixed_one_second_fresh_reply() {
        let first = handle_probe_request(0);
        let second = handle_probe_request(41);
        assert_eq!(first.freshness, Duration::from_secs(1));
        assert_eq!(first.payload, PROBE_RESPONSE_PAYLOAD);
        // Stateless: the sequence number doesn't change the answer, and
        // nothing is retained between calls.
        assert_eq!(first, second);
    }

    #[test]
    fn unstable_neighbor_is_skipped_without_consuming_a_sequence() {
        let (clock, _mock) = Clock::mock();
        let mut scheduler = ProbeScheduler::new(Duration::from_secs(30), Duration::from_secs(2), Duration::from_millis(5000));
        let n = NeighborId::from("/ndn/a");
        let action = scheduler.on_probe_fire(&n, false, true, clock.now());
        assert_eq!(action, ProbeAction::Skip);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn stable_neighbor_gets_a_fresh_sequence_number() {
        let (clock, _mock) = Clock::mock();
        let mut scheduler = ProbeScheduler::new(Duration::from_secs(30), Duration::from_secs(2), Duration::from_millis(5000));
        let n = NeighborId::from("/ndn/a");
        let action = scheduler.on_probe_fire(&n, true, true, clock.now());
        match action {
            ProbeAction::Send { seq, lifetime } => {
                assert_eq!(seq, 0);
                assert_eq!(lifetime, Duration::from_secs(2));
            }
            ProbeAction::Skip => panic!("expected Send"),
        }
        assert_eq!(scheduler.pending_count(), 1);
    }

    #[test]
    fn response_resolves_the_matching_sequence_and_computes_rtt() {
        let (clock, mock) = Clock::mock();
        let mut scheduler = ProbeScheduler::new(Duration::from_secs(30), Duration::from_secs(2), Duration::from_millis(5000));
        let n = NeighborId::from("/ndn/a");
        let ProbeAction::Send { seq, .. } = scheduler.on_probe_fire(&n, true, true, clock.now()) else {
            panic!("expected Send");
        };
        mock.increment(Duration::from_millis(42));
        let (resolved, rtt) = scheduler.on_response(seq, clock.now()).unwrap();
        assert_eq!(resolved, n);
        assert_eq!(rtt, Duration::from_millis(42));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn unknown_sequence_response_is_ignored() {
        let (clock, _mock) = Clock::mock();
        let mut scheduler = ProbeScheduler::new(Duration::from_secs(30), Duration::from_secs(2), Duration::from_millis(5000));
        assert!(scheduler.on_response(999, clock.now()).is_none());
    }

    #[test]
    fn timeout_after_response_already_arrived_is_a_noop() {
        let (clock, _mock) = Clock::mock();
        let mut scheduler = ProbeScheduler::new(Duration::from_secs(30), Duration::from_secs(2), Duration::from_millis(5000));
        let n = NeighborId::from("/ndn/a");
        let ProbeAction::Send { seq, .. } = scheduler.on_probe_fire(&n, true, true, clock.now()) else {
            panic!("expected Send");
        };
        scheduler.on_response(seq, clock.now()).unwrap();
        assert_eq!(scheduler.on_timeout(seq), None);
    }

    #[test]
    fn jitter_stays_within_configured_bound() {
        let (clock, _mock) = Clock::mock();
        let mut scheduler = ProbeScheduler::new(Duration::from_secs(30), Duration::from_secs(2), Duration::from_millis(5000));
        for _ in 0..200 {
            let fire_at = scheduler.next_fire_at(clock.now());
            let delta = fire_at.saturating_duration_since(clock.now());
            assert!(delta >= Duration::from_secs(30));
            assert!(delta < Duration::from_secs(30) + Duration::from_millis(5000));
        }
    }

    #[test]
    fn clear_neighbor_only_drops_its_own_pending_probes() {
        let (clock, _mock) = Clock::mock();
        let mut scheduler = ProbeScheduler::new(Duration::from_secs(30), Duration::from_secs(2), Duration::from_millis(5000));
        let a = NeighborId::from("/ndn/a");
        let b = NeighborId::from("/ndn/b");
        scheduler.on_probe_fire(&a, true, true, clock.now());
        scheduler.on_probe_fire(&b, true, true, clock.now());
        scheduler.clear_neighbor(&a);
        assert_eq!(scheduler.pending_count(), 1);
    }
}
