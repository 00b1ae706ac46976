//! TLV type codes this subsystem adds to the host's registry.
//!
//! Values are reserved by the host daemon's existing TLV allocation; this
//! crate only names them, it never encodes or decodes wire bytes itself
//! (that's the host's codec, out of scope here).

pub const LINK_METRICS_COMMAND: u64 = 210;
pub const EXTERNAL_METRICS: u64 = 211;
pub const BANDWIDTH: u64 = 212;
pub const BANDWIDTH_UTILIZATION: u64 = 213;
pub const PACKET_LOSS: u64 = 214;
pub const SPECTRUM_STRENGTH: u64 = 215;
pub const MULTI_DIMENSIONAL_COST: u64 = 216;
