//! The error taxonomy for the link cost subsystem.
//!
//! Control-channel boundaries (the CLI, the metrics channel) match on these
//! variants and map them to exit codes / response statuses. Internal,
//! never-should-happen failures inside the cost engine or calculators are
//! swallowed locally (per the propagation policy) and never reach here.

use crate::ids::NeighborId;
use thiserror::Error;

/// Structured errors crossing a control-channel or CLI boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkCostError {
    /// Unknown neighbor on snapshot/set/show.
    #[error("neighbor {0} is not a known adjacency")]
    NotFound(NeighborId),

    /// Out-of-range utilization, loss, spectrum, or weight.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An adaptive calculator was requested but its dependency (the LCM) is
    /// absent. The selector logs a warning and degrades to `Standard`; this
    /// variant exists so the degradation can also be reported to callers
    /// that care (e.g. a CLI `status` query).
    #[error("calculator unavailable: {0}")]
    Unavailable(String),
}

impl LinkCostError {
    /// Exit code for the operator CLI, per the subsystem's error design:
    /// 0 success, 1 validation error, 2 timeout/unreachable, 3 not-found.
    pub fn cli_exit_code(&self) -> i32 {
        match self {
            LinkCostError::NotFound(_) => 3,
            LinkCostError::InvalidArgument(_) => 1,
            LinkCostError::Unavailable(_) => 2,
        }
    }
}
