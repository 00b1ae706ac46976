//! Cooperative timer wheel.
//!
//! The host daemon owns the single event loop; this subsystem never spawns
//! a thread or blocks. Every "schedule_next → observe → reschedule" chain
//! described in the design notes is modelled as data in this wheel rather
//! than as a callback or recursive call: scheduling pushes an entry,
//! `poll(now)` drains due entries for the caller to handle, and the handler
//! decides whether to push a fresh entry (self-rearming).
//!
//! Timers carry a small [`TimerKind`] discriminant plus the neighbor they
//! belong to, rather than a boxed closure — there is exactly one thing a
//! fired timer can mean, and matching on it keeps dispatch exhaustive.

use nlsr_link_cost_common::NeighborId;
use quanta::Instant;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Opaque, monotonically increasing identifier for a scheduled timer.
///
/// Never reused; cancellation marks the id so a later `poll` skips it
/// instead of mutating the heap in place (the erase-aware idiom the design
/// notes call for when timers may be cancelled out from under an in-flight
/// scan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a fired timer means to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Fire the next probe for this neighbor.
    ProbeFire(NeighborId),
    /// An outstanding probe's lifetime has elapsed without a response.
    ProbeTimeout(NeighborId, u32),
    /// The one-shot warm-up delay after `start()` has elapsed.
    WarmUpDone,
    /// The recurring status-report tick.
    StatusReport,
}

struct Entry {
    fire_at: Instant,
    id: TimerId,
    kind: TimerKind,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.id == other.id
    }
}
impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so `BinaryHeap` (a max-heap) pops the earliest deadline first.
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A min-heap of pending timers, driven by the host's cooperative loop.
#[derive(Default)]
pub struct TimerWheel {
    next_id: u64,
    heap: BinaryHeap<Entry>,
    cancelled: HashSet<TimerId>,
}

impl TimerWheel {
    pub fn new() -> Self {
        TimerWheel::default()
    }

    /// Schedule `kind` to fire at `fire_at`. Returns a handle usable with
    /// [`TimerWheel::cancel`].
    pub fn schedule(&mut self, fire_at: Instant, kind: TimerKind) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Entry { fire_at, id, kind });
        id
    }

    /// Cancel a previously scheduled timer. Safe to call even if it has
    /// already fired or been cancelled.
    pub fn cancel(&mut self, id: TimerId) {
        self.cancelled.insert(id);
    }

    /// Cancel every timer for a given neighbor (e.g. on ACTIVE→INACTIVE).
    /// Collects ids first, then marks them — never mutates the heap while
    /// iterating it.
    pub fn cancel_neighbor(&mut self, neighbor: &NeighborId) {
        let ids: Vec<TimerId> = self
            .heap
            .iter()
            .filter(|e| matches_neighbor(&e.kind, neighbor))
            .map(|e| e.id)
            .collect();
        for id in ids {
            self.cancelled.insert(id);
        }
    }

    /// Drain and return every timer due at or before `now`, dropping
    /// cancelled entries along the way.
    pub fn poll(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut fired = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.fire_at > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked Some");
            if self.cancelled.remove(&entry.id) {
                continue;
            }
            fired.push(entry.kind);
        }
        fired
    }

    /// Cancel everything, for subsystem shutdown.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.cancelled.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.heap.len() == self.cancelled.len()
    }
}

fn matches_neighbor(kind: &TimerKind, neighbor: &NeighborId) -> bool {
    match kind {
        TimerKind::ProbeFire(n) | TimerKind::ProbeTimeout(n, _) => n == neighbor,
        TimerKind::WarmUpDone | TimerKind::StatusReport => false,
    }
}
