//! Prometheus metrics rendering for link stats.
//!
//! Renders `LinkStats` in Prometheus text exposition format, suitable
//! for scraping by Prometheus or compatible collectors.

use crate::models::LinkStats;
use std::fmt::Write;

/// Render a slice of `LinkStats` as Prometheus text exposition format.
pub fn render_prometheus(links: &[LinkStats]) -> String {
    let mut out = String::with_capacity(2048);

    // ── Per-link gauges ─────────────────────────────────────────

    writeln!(
        out,
        "# HELP strata_link_rtt_ms Smoothed RTT in milliseconds."
    )
    .unwrap();
    writeln!(out, "# TYPE strata_link_rtt_ms gauge").unwrap();
    for l in links {
        writeln!(
            out,
            "strata_link_rtt_ms{{link_id=\"{}\",interface=\"{}\"}} {:.3}",
            l.id, l.interface, l.rtt_ms
        )
        .unwrap();
    }

    writeln!(
        out,
        "# HELP strata_link_capacity_bps Estimated link capacity in bits per second."
    )
    .unwrap();
    writeln!(out, "# TYPE strata_link_capacity_bps gauge").unwrap();
    for l in links {
        writeln!(
            out,
            "strata_link_capacity_bps{{link_id=\"{}\",interface=\"{}\"}} {}",
            l.id, l.interface, l.capacity_bps
        )
        .unwrap();
    }

    writeln!(
        out,
        "# HELP strata_link_loss_rate Observed packet loss rate (0.0-1.0)."
    )
    .unwrap();
    writeln!(out, "# TYPE strata_link_loss_rate gauge").unwrap();
    for l in links {
        writeln!(
            out,
            "strata_link_loss_rate{{link_id=\"{}\",interface=\"{}\"}} {:.6}",
            l.id, l.interface, l.loss_rate
        )
        .unwrap();
    }

    writeln!(
        out,
        "# HELP strata_link_observed_bps Actual throughput in bits per second."
    )
    .unwrap();
    writeln!(out, "# TYPE strata_link_observed_bps gauge").unwrap();
    for l in links {
        writeln!(
            out,
            "strata_link_observed_bps{{link_id=\"{}\",interface=\"{}\"}} {}",
            l.id, l.interface, l.observed_bps
        )
        .unwrap();
    }

    writeln!(
        out,
        "# HELP strata_link_bytes_sent_total Total bytes sent on this link."
    )
    .unwrap();
    writeln!(out, "# TYPE strata_link_bytes_sent_total counter").unwrap();
    for l in links {
        writeln!(
            out,
            "strata_link_bytes_sent_total{{link_id=\"{}\",interface=\"{}\"}} {}",
            l.id, l.interface, l.sent_bytes
        )
        .unwrap();
    }

    writeln!(out, "# HELP strata_link_state Link state (1=live, 0=down).").unwrap();
    writeln!(out, "# TYPE strata_link_state gauge").unwrap();
    for l in links {
        let v = if l.state == "Live" || l.state == "live" {
            1
        } else {
            0
        };
        writeln!(
            out,
            "strata_link_state{{link_id=\"{}\",interface=\"{}\",state=\"{}\"}} {v}",
            l.id, l.interface, l.state
        )
        .unwrap();
    }

    // ── Aggregate metrics ───────────────────────────────────────

    let alive_count = links
        .iter()
        .filter(|l| l.state == "Live" || l.state == "live")
        .count();
    let total_capacity: u64 = links
        .iter()
        .filter(|l| l.state == "Live" || l.state == "live")
        .map(|l| l.capacity_bps)
        .sum();
    let total_observed: u64 = links
        .iter()
        .filter(|l| l.state == "Live" || l.state == "live")
        .map(|l| l.observed_bps)
        .sum();

    writeln!(
        out,
        "# HELP strata_links_total Total number of configured links."
    )
    .unwrap();
    writeln!(out, "# TYPE strata_links_total gauge").unwrap();
    writeln!(out, "strata_links_total {}", links.len()).unwrap();

    writeln!(
        out,
        "# HELP strata_links_alive Number of links currently alive."
    )
    .unwrap();
    writeln!(out, "# TYPE strata_links_alive gauge").unwrap();
    writeln!(out, "strata_links_alive {alive_count}").unwrap();

    writeln!(
        out,
        "# HELP strata_total_capacity_bps Aggregate capacity of alive links."
    )
    .unwrap();
    writeln!(out, "# TYPE strata_total_capacity_bps gauge").unwrap();
    writeln!(out, "strata_total_capacity_bps {total_capacity}").unwrap();

    writeln!(
        out,
        "# HELP strata_total_observed_bps Aggregate observed throughput."
    )
    .unwrap();
    writeln!(out, "# TYPE strata_total_observed_bps gauge").unwrap();
    writeln!(out, "strata_total_observed_bps {total_observed}").unwrap();

    out
}
