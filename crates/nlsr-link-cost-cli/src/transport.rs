//! The boundary between this CLI and a running router.
//!
//! A real deployment reaches `<own-router>/link-cost/metrics` over NDN,
//! which is the host daemon's wire codec and out of scope here. This trait
//! is that boundary; [`DemoTransport`] is a local stand-in useful for
//! exercising the CLI's argument handling without a live daemon.

use nlsr_link_cost_common::config::PreviewWeights;
use nlsr_link_cost_common::{LinkCostError, NeighborId};
use nlsr_link_cost_control::channel::{self, GetResponse, SetRequest, SetResponse};
use nlsr_link_cost_core::store::LinkStateStore;
use quanta::Clock;

pub trait MetricsTransport {
    fn set(&mut self, neighbor: &NeighborId, request: SetRequest) -> Result<SetResponse, LinkCostError>;
    fn get(&mut self, neighbor: &NeighborId) -> Result<GetResponse, LinkCostError>;
}

/// An in-memory store standing in for the daemon, seeded with whatever
/// adjacency the caller provides. Not wired to any real router.
pub struct DemoTransport {
    clock: Clock,
    store: LinkStateStore,
}

impl DemoTransport {
    pub fn new(adjacency: impl IntoIterator<Item = (NeighborId, u64)>) -> Self {
        let (clock, _mock) = Clock::mock();
        let mut store = LinkStateStore::new(10, 5, 3);
        store.initialize(adjacency, clock.now());
        DemoTransport { clock, store }
    }
}

impl MetricsTransport for DemoTransport {
    fn set(&mut self, neighbor: &NeighborId, request: SetRequest) -> Result<SetResponse, LinkCostError> {
        channel::set(&mut self.store, neighbor, request, self.clock.now())
    }

    fn get(&mut self, neighbor: &NeighborId) -> Result<GetResponse, LinkCostError> {
        channel::get(&self.store, neighbor, PreviewWeights::default())
    }
}
