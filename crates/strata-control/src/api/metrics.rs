//! Prometheus metrics endpoint for the control plane.
//!
//! `GET /metrics` — aggregates link stats from all connected sender agents
//! and renders them in Prometheus text exposition format.
//!
//! This endpoint requires no authentication (standard Prometheus practice).

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use strata_common::metrics::render_prometheus;

use crate::state::AppState;

/// Handler for `GET /metrics`.
///
/// Collects the latest link stats from every connected sender agent
/// and renders them as Prometheus text exposition format, with
/// `sender_id` labels so a single scrape covers the whole fleet.
pub async fn handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut out = String::with_capacity(4096);

    // Collect all cached stream stats from connected agents.
    let mut total_senders: usize = 0;
    let mut total_links: usize = 0;

    for entry in state.stream_stats().iter() {
        let sender_id = entry.key();
        let stats = entry.value();

        total_senders += 1;
        total_links += stats.links.len();

        // Render per-link metrics with sender_id prefix in labels.
        for link in &stats.links {
            use std::fmt::Write;
            writeln!(
                out,
                "strata_link_rtt_ms{{sender_id=\"{sender_id}\",link_id=\"{}\",interface=\"{}\"}} {:.3}",
                link.id, link.interface, link.rtt_ms
            )
            .unwrap();
            writeln!(
                out,
                "strata_link_capacity_bps{{sender_id=\"{sender_id}\",link_id=\"{}\",interface=\"{}\"}} {}",
                link.id, link.interface, link.capacity_bps
            )
            .unwrap();
            writeln!(
                out,
                "strata_link_loss_rate{{sender_id=\"{sender_id}\",link_id=\"{}\",interface=\"{}\"}} {:.6}",
                link.id, link.interface, link.loss_rate
            )
            .unwrap();
            writeln!(
                out,
                "strata_link_observed_bps{{sender_id=\"{sender_id}\",link_id=\"{}\",interface=\"{}\"}} {}",
                link.id, link.interface, link.observed_bps
            )
            .unwrap();
            writeln!(
                out,
                "strata_link_bytes_sent_total{{sender_id=\"{sender_id}\",link_id=\"{}\",interface=\"{}\"}} {}",
                link.id, link.interface, link.sent_bytes
            )
            .unwrap();
            let state_val = if link.state == "Live" || link.state == "live" {
                1
            } else {
                0
            };
            writeln!(
                out,
                "strata_link_state{{sender_id=\"{sender_id}\",link_id=\"{}\",interface=\"{}\",state=\"{}\"}} {state_val}",
                link.id, link.interface, link.state
            )
            .unwrap();
            if let Some(dbm) = link.signal_dbm {
                writeln!(
                    out,
                    "strata_link_signal_dbm{{sender_id=\"{sender_id}\",link_id=\"{}\",interface=\"{}\"}} {}",
                    link.id, link.interface, dbm
                )
                .unwrap();
            }
        }
    }

    // Fleet-wide aggregates
    {
        use std::fmt::Write;
        writeln!(
            out,
            "# HELP strata_fleet_senders_connected Number of sender agents currently connected."
        )
        .unwrap();
        writeln!(out, "# TYPE strata_fleet_senders_connected gauge").unwrap();
        writeln!(out, "strata_fleet_senders_connected {total_senders}").unwrap();

        writeln!(
            out,
            "# HELP strata_fleet_links_total Total links across all connected senders."
        )
        .unwrap();
        writeln!(out, "# TYPE strata_fleet_links_total gauge").unwrap();
        writeln!(out, "strata_fleet_links_total {total_links}").unwrap();

        writeln!(
            out,
            "# HELP strata_fleet_agents_registered Total agents registered (online + offline)."
        )
        .unwrap();
        writeln!(out, "# TYPE strata_fleet_agents_registered gauge").unwrap();
        writeln!(
            out,
            "strata_fleet_agents_registered {}",
            state.agents().len()
        )
        .unwrap();
    }

    // If no senders have stats, still output the agent-level metrics
    // as a fallback using the render_prometheus function for any
    // individual sender that happens to be the only one.
    // For a single-sender deployment, also render the standard flat format.
    if total_senders == 1 {
        if let Some(entry) = state.stream_stats().iter().next() {
            out.push_str(&render_prometheus(&entry.value().links));
        }
    }

    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        out,
    )
}
