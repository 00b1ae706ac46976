//! Shared types for the NLSR link cost subsystem.
//!
//! This crate holds the pieces every other `nlsr-link-cost-*` crate needs:
//! - **Identifiers** — the neighbor name wrapper used as the store's key.
//! - **Errors** — the taxonomy from the subsystem's error handling design.
//! - **Configuration** — boot-time, immutable-thereafter knobs.

pub mod config;
pub mod error;
pub mod ids;

pub use config::LinkCostConfig;
pub use error::LinkCostError;
pub use ids::NeighborId;
