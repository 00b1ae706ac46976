//! The metrics control channel: `<own-router>/link-cost/metrics` set/get
//! endpoints and the diagnostic multi-dimensional preview cost formula.
//!
//! This crate never touches routing cost directly — only `external_metrics`
//! on the store, which the preview formula reads but the Cost Engine never
//! does.

pub mod channel;
pub mod codes;
pub mod preview;

pub use channel::{get, set, GetResponse, SetRequest, SetResponse};
