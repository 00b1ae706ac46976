//! The boundary with the host daemon.
//!
//! Everything this subsystem is allowed to ask of its host — rebuild the
//! adjacency LSA, recompute the routing table, or touch the one `link_cost`
//! field the host treats as advisory — goes through this trait. The LSDB,
//! the adjacency list, the Dijkstra-style calculation, the forwarding plane,
//! the wire codec, and the rest of the host daemon are out of scope and
//! only specified at this boundary.

use nlsr_link_cost_common::NeighborId;

/// Outbound calls from the subsystem into the host daemon.
pub trait HostCallbacks {
    /// Ask the host to rebuild this router's adjacency LSA. The host
    /// coalesces repeated requests; the engine only promises it will not
    /// call this more than once per `rebuild_rate_limit` per neighbor.
    fn schedule_adj_lsa_build(&mut self, neighbor: &NeighborId);

    /// Ask the host to recompute the routing table (Dijkstra et al.), out
    /// of scope here beyond this single trigger point.
    fn schedule_routing_table_calculation(&mut self);

    /// The mutable `link_cost` slot on the host's adjacency-list entry for
    /// `neighbor`, if that neighbor still exists in the adjacency list.
    /// The host re-reads this on every LSA build; this subsystem never
    /// mutates anything else on the adjacency entry.
    fn link_cost_slot(&mut self, neighbor: &NeighborId) -> Option<&mut u64>;
}

/// A test double that records every call instead of touching a real LSDB.
///
/// Grounded on the `MockLink` pattern used throughout
/// `strata-bonding`'s integration tests: cheap, in-memory, and assertable.
#[derive(Default)]
pub struct NullHost {
    pub lsa_build_requests: Vec<NeighborId>,
    pub routing_table_recalculations: u32,
    pub link_costs: std::collections::HashMap<NeighborId, u64>,
}

impl NullHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adjacency(mut self, neighbor: NeighborId, original_cost: u64) -> Self {
        self.link_costs.insert(neighbor, original_cost);
        self
    }
}

impl HostCallbacks for NullHost {
    fn schedule_adj_lsa_build(&mut self, neighbor: &NeighborId) {
        self.lsa_build_requests.push(neighbor.clone());
    }

    fn schedule_routing_table_calculation(&mut self) {
        self.routing_table_recalculations += 1;
    }

    fn link_cost_slot(&mut self, neighbor: &NeighborId) -> Option<&mut u64> {
        self.link_costs.get_mut(neighbor)
    }
}
