//! Link cost computation for NDN routers running NLSR-style link-state
//! routing: RTT probing, cost derivation, pluggable adaptive calculators,
//! and the lifecycle state machine that threads them all through the host
//! daemon's single cooperative event loop.
//!
//! This crate owns none of the wire codec, the LSDB, or the Dijkstra-style
//! routing calculation — those live in the host daemon and are reached only
//! through [`host::HostCallbacks`].

pub mod calculator;
pub mod engine;
pub mod feedback;
pub mod host;
pub mod lifecycle;
pub mod probe;
pub mod selector;
pub mod store;
pub mod timer;

pub use calculator::{AdaptiveCalculator, CostSnapshot};
pub use engine::{ApplyOutcome, CostEngine, RttBasedCost};
pub use feedback::{FeedbackPublisher, Performance};
pub use host::HostCallbacks;
pub use lifecycle::{Effect, LifecycleState, LinkCostSubsystem, StatusReportEntry};
pub use probe::{handle_probe_request, ProbeAction, ProbeResponse, ProbeScheduler};
pub use selector::CalculatorSelector;
pub use store::{LinkState, LinkStateStore, NeighborStatus, RecordOutcome, StatusTransition};
pub use timer::{TimerId, TimerKind, TimerWheel};
