//! Metrics control channel.
//!
//! Exposes `set`/`get` over `<own-router>/link-cost/metrics`, the same
//! request/response shape the host's other control-channel endpoints use —
//! this module only builds and validates the structured values; the actual
//! Interest/Data framing belongs to the host's wire codec.

use crate::preview::composite_cost;
use nlsr_link_cost_common::config::PreviewWeights;
use nlsr_link_cost_common::{LinkCostError, NeighborId};
use nlsr_link_cost_core::store::LinkStateStore;
use quanta::Instant;

/// Validated, partial update to a neighbor's externally configured metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetRequest {
    pub bandwidth_mbps: Option<f64>,
    pub utilization: Option<f64>,
    pub packet_loss: Option<f64>,
    pub spectrum_dbm: Option<f64>,
}

/// Acknowledgement echoing the values now on file for the neighbor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetResponse {
    pub bandwidth_mbps: Option<f64>,
    pub utilization: Option<f64>,
    pub packet_loss: Option<f64>,
    pub spectrum_dbm: Option<f64>,
}

/// A snapshot plus the diagnostic preview cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GetResponse {
    pub original_cost: u64,
    pub current_cost: f64,
    pub bandwidth_mbps: Option<f64>,
    pub utilization: Option<f64>,
    pub packet_loss: Option<f64>,
    pub spectrum_dbm: Option<f64>,
    pub preview_cost: u64,
}

/// Validates a unit-interval quantity (utilization, packet loss).
fn validate_unit_interval(value: f64, field: &str) -> Result<(), LinkCostError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(LinkCostError::InvalidArgument(format!(
            "{field} must be in [0, 1], got {value}"
        )))
    }
}

/// Validates spectrum strength against the meaningful dBm range.
fn validate_spectrum(value: f64) -> Result<(), LinkCostError> {
    if (-100.0..=-20.0).contains(&value) {
        Ok(())
    } else {
        Err(LinkCostError::InvalidArgument(format!(
            "spectrum_dbm must be in [-100, -20], got {value}"
        )))
    }
}

/// `set <neighbor> {...}` — validates ranges, upserts `external_metrics`,
/// and returns the echoed values now on file.
pub fn set(
    store: &mut LinkStateStore,
    neighbor: &NeighborId,
    request: SetRequest,
    now: Instant,
) -> Result<SetResponse, LinkCostError> {
    if !store.contains(neighbor) {
        return Err(LinkCostError::NotFound(neighbor.clone()));
    }
    if let Some(u) = request.utilization {
        validate_unit_interval(u, "utilization")?;
    }
    if let Some(l) = request.packet_loss {
        validate_unit_interval(l, "packet_loss")?;
    }
    if let Some(s) = request.spectrum_dbm {
        validate_spectrum(s)?;
    }

    store.apply_external_metrics(
        neighbor,
        request.bandwidth_mbps,
        request.utilization,
        request.packet_loss,
        request.spectrum_dbm,
        now,
    );

    let metrics = store.get(neighbor).and_then(|s| s.external_metrics).unwrap_or_default();
    Ok(SetResponse {
        bandwidth_mbps: metrics.bandwidth_mbps,
        utilization: metrics.utilization,
        packet_loss: metrics.packet_loss,
        spectrum_dbm: metrics.spectrum_dbm,
    })
}

/// `get <neighbor>` — a snapshot plus the preview cost. Never mutates
/// routing cost.
pub fn get(store: &LinkStateStore, neighbor: &NeighborId, weights: PreviewWeights) -> Result<GetResponse, LinkCostError> {
    let state = store.get(neighbor).ok_or_else(|| LinkCostError::NotFound(neighbor.clone()))?;
    let metrics = state.external_metrics.unwrap_or_default();
    let avg_rtt_ms = if state.rtt_history().is_empty() {
        None
    } else {
        let total: f64 = state.rtt_history().iter().map(|s| s.measured.as_secs_f64() * 1000.0).sum();
        Some(total / state.rtt_history().len() as f64)
    };

    let preview_cost = composite_cost(
        state.original_cost(),
        avg_rtt_ms,
        metrics.utilization,
        metrics.packet_loss,
        metrics.spectrum_dbm,
        weights,
    );

    Ok(GetResponse {
        original_cost: state.original_cost(),
        current_cost: state.current_cost(),
        bandwidth_mbps: metrics.bandwidth_mbps,
        utilization: metrics.utilization,
        packet_loss: metrics.packet_loss,
        spectrum_dbm: metrics.spectrum_dbm,
        preview_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta::Clock;

    fn store_with_one(cost: u64, now: Instant) -> (LinkStateStore, NeighborId) {
        let mut store = LinkStateStore::new(10, 5, 3);
        let n = NeighborId::from("/ndn/b");
        store.initialize([(n.clone(), cost)], now);
        (store, n)
    }

    #[test]
    fn set_rejects_out_of_range_utilization() {
        let (clock, _mock) = Clock::mock();
        let (mut store, n) = store_with_one(10, clock.now());
        let request = SetRequest {
            utilization: Some(1.5),
            ..Default::default()
        };
        let err = set(&mut store, &n, request, clock.now()).unwrap_err();
        assert_eq!(err.cli_exit_code(), 1);
    }

    #[test]
    fn set_rejects_unknown_neighbor() {
        let (clock, _mock) = Clock::mock();
        let (mut store, _n) = store_with_one(10, clock.now());
        let missing = NeighborId::from("/ndn/ghost");
        let err = set(&mut store, &missing, SetRequest::default(), clock.now()).unwrap_err();
        assert_eq!(err, LinkCostError::NotFound(missing));
    }

    #[test]
    fn set_echoes_upserted_fields_and_get_reflects_them() {
        let (clock, _mock) = Clock::mock();
        let (mut store, n) = store_with_one(12, clock.now());
        let request = SetRequest {
            utilization: Some(0.65),
            packet_loss: Some(0.02),
            spectrum_dbm: Some(-45.0),
            ..Default::default()
        };
        let ack = set(&mut store, &n, request, clock.now()).unwrap();
        assert_eq!(ack.utilization, Some(0.65));

        let snapshot = get(&store, &n, PreviewWeights::default()).unwrap();
        assert_eq!(snapshot.preview_cost, 15);
    }

    #[test]
    fn set_is_idempotent() {
        let (clock, _mock) = Clock::mock();
        let (mut store, n) = store_with_one(12, clock.now());
        let request = SetRequest {
            utilization: Some(0.65),
            packet_loss: Some(0.02),
            spectrum_dbm: Some(-45.0),
            ..Default::default()
        };
        let first = set(&mut store, &n, request, clock.now()).unwrap();
        let second = set(&mut store, &n, request, clock.now()).unwrap();
        assert_eq!(first, second);
        let a = get(&store, &n, PreviewWeights::default()).unwrap();
        let b = get(&store, &n, PreviewWeights::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn get_unknown_neighbor_fails_not_found() {
        let (clock, _mock) = Clock::mock();
        let (store, _n) = store_with_one(10, clock.now());
        let missing = NeighborId::from("/ndn/ghost");
        let err = get(&store, &missing, PreviewWeights::default()).unwrap_err();
        assert_eq!(err.cli_exit_code(), 3);
    }
}
