use crate::config::SchedulerConfig;
use crate::net::interface::LinkSender;
use crate::scheduler::dwrr::Dwrr;
use anyhow::Result;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Top-level bonding packet scheduler.
///
/// Wraps the [`Dwrr`] scheduler with higher-level bonding logic:
/// - Critical packet broadcast (keyframes sent to all alive links)
/// - Fast-failover mode (broadcasts all traffic on link instability)
/// - Adaptive redundancy (duplicates important packets when spare capacity allows)
/// - Escalating dead-link logging
///
/// Used by [`crate::runtime::BondingRuntime`] on the worker thread.
pub struct BondingScheduler<L: LinkSender + ?Sized> {
    scheduler: Dwrr<L>,
    next_seq: u64,
    /// Monotonic start time for bonding header timestamps.
    start_time: Instant,
    // Fast-failover state
    failover_until: Option<Instant>,
    prev_phases: HashMap<usize, crate::net::interface::LinkPhase>,
    prev_rtts: HashMap<usize, f64>,
    /// Counter for consecutive all-links-dead failures (for escalation)
    consecutive_dead_count: u64,
    /// Total packets dropped due to all links being dead (used for log messages)
    total_dead_drops: u64,
}

impl<L: LinkSender + ?Sized> BondingScheduler<L> {
    /// Creates a scheduler with default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a scheduler with the given configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            scheduler: Dwrr::with_config(config),
            next_seq: 0,
            start_time: Instant::now(),
            failover_until: None,
            prev_phases: HashMap::new(),
            prev_rtts: HashMap::new(),
            consecutive_dead_count: 0,
            total_dead_drops: 0,
        }
    }

    /// Returns a reference to the current scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        self.scheduler.config()
    }

    /// Replaces the scheduler configuration at runtime.
    pub fn update_config(&mut self, config: SchedulerConfig) {
        self.scheduler.update_config(config);
    }

    /// Registers a new link with the scheduler.
    pub fn add_link(&mut self, link: Arc<L>) {
        self.scheduler.add_link(link);
    }

    /// Removes a link by ID, stopping all traffic to it.
    pub fn remove_link(&mut self, id: usize) {
        self.scheduler.remove_link(id);
    }

    /// Refreshes link metrics from all links and checks for failover conditions.
    pub fn refresh_metrics(&mut self) {
        self.scheduler.refresh_metrics();
        self.check_failover_conditions();
    }

    /// Detects link instability (phase degradation or RTT spikes) and triggers fast-failover mode.
    fn check_failover_conditions(&mut self) {
        use crate::net::interface::LinkPhase;

        if !self.scheduler.config().failover_enabled {
            return;
        }

        let metrics = self.scheduler.get_active_links();
        let mut trigger_failover = false;
        let rtt_spike_factor = self.scheduler.config().failover_rtt_spike_factor;

        for (id, m) in &metrics {
            // Check for phase degradation (Live -> Degrade or any -> Cooldown/Reset)
            if let Some(prev_phase) = self.prev_phases.get(id) {
                let degraded = matches!(
                    (prev_phase, m.phase),
                    (LinkPhase::Live, LinkPhase::Degrade)
                        | (_, LinkPhase::Cooldown)
                        | (_, LinkPhase::Reset)
                );
                if degraded {
                    trigger_failover = true;
                }
            }

            // Check for RTT spike (>Nx previous smoothed value)
            if let Some(prev_rtt) = self.prev_rtts.get(id) {
                if m.rtt_ms > prev_rtt * rtt_spike_factor && *prev_rtt > 0.0 {
                    trigger_failover = true;
                }
            }

            self.prev_phases.insert(*id, m.phase);
            self.prev_rtts.insert(*id, m.rtt_ms);
        }

        if trigger_failover {
            let failover_duration =
                Duration::from_millis(self.scheduler.config().failover_duration_ms);
            self.failover_until = Some(Instant::now() + failover_duration);
        }
    }

    /// Returns true if currently in fast-failover mode (link instability detected).
    fn in_failover_mode(&self) -> bool {
        if let Some(until) = self.failover_until {
            Instant::now() < until
        } else {
            false
        }
    }

    /// Creates a bonding header with a monotonic send timestamp for OWD measurement.
    fn make_header(&self, seq: u64) -> crate::protocol::header::BondingHeader {
        let send_time_us = self.start_time.elapsed().as_micros() as u64;
        crate::protocol::header::BondingHeader::with_timestamp(seq, send_time_us)
    }

    /// Returns a snapshot of metrics for all registered links.
    pub fn get_all_metrics(&self) -> HashMap<usize, crate::net::interface::LinkMetrics> {
        self.scheduler.get_active_links().into_iter().collect()
    }

    /// Schedules a packet for transmission across the bonded links.
    ///
    /// Routing decision depends on the packet profile and current link state:
    /// 1. **Broadcast** — critical packets or failover mode → sent to all alive links
    /// 2. **Redundancy** — spare capacity available → duplicated to N best links
    /// 3. **Standard** — DWRR selects the best single link
    pub fn send(&mut self, payload: Bytes, profile: crate::scheduler::PacketProfile) -> Result<()> {
        let packet_len = payload.len();
        let config = self.scheduler.config();

        // Fast-failover: Broadcast during link instability
        let should_broadcast = (config.critical_broadcast && profile.is_critical)
            || (config.failover_enabled && self.in_failover_mode());

        if should_broadcast {
            let links = self.scheduler.broadcast_links(packet_len);
            if links.is_empty() {
                return Err(anyhow::anyhow!("No active links for broadcast"));
            }

            let seq = self.next_seq;
            self.next_seq += 1;

            let header = self.make_header(seq);
            let wrapped = header.wrap(payload);

            for link in links {
                if link.send(&wrapped).is_ok() {
                    self.scheduler.record_send(link.id(), packet_len as u64);
                }
            }
            return Ok(());
        }

        // Adaptive Redundancy: Use spare capacity for important packets
        if config.redundancy_enabled {
            // Use cached spare ratio (updated by refresh_metrics) to avoid
            // cloning all LinkMetrics on the hot packet path.
            let spare_ratio = self.scheduler.cached_spare_ratio();

            let should_duplicate = spare_ratio > config.redundancy_spare_ratio
                && !profile.can_drop
                && profile.size_bytes < config.redundancy_max_packet_bytes;

            if should_duplicate {
                let links = self
                    .scheduler
                    .select_best_n_links(packet_len, config.redundancy_target_links);
                if !links.is_empty() {
                    let seq = self.next_seq;
                    self.next_seq += 1;

                    let header = self.make_header(seq);
                    let wrapped = header.wrap(payload);

                    for link in links {
                        if link.send(&wrapped).is_ok() {
                            self.scheduler.record_send(link.id(), packet_len as u64);
                        }
                    }
                    return Ok(());
                }
                // Fall through to standard if duplication failed
            }
        }

        // Standard Load Balancing
        if let Some(link) = self.scheduler.select_link(packet_len) {
            let seq = self.next_seq;
            self.next_seq += 1;

            let header = self.make_header(seq);
            let wrapped = header.wrap(payload);

            link.send(&wrapped)?;
            self.scheduler.record_send(link.id(), packet_len as u64);
            self.consecutive_dead_count = 0;
            return Ok(());
        }

        // All links dead — escalate logging based on consecutive failures.
        self.consecutive_dead_count += 1;
        self.total_dead_drops += 1;

        // Log at escalating severity: first occurrence is a warning,
        // sustained failures (100+ consecutive) escalate to error.
        if self.consecutive_dead_count == 1 {
            warn!("All links dead: dropped packet (seq={})", self.next_seq);
        } else if self.consecutive_dead_count == 100 {
            error!(
                "All links dead for {} consecutive packets — total drops: {}",
                self.consecutive_dead_count, self.total_dead_drops
            );
        } else if self.consecutive_dead_count.is_multiple_of(1000) {
            error!(
                "All links still dead after {} consecutive drops (total: {})",
                self.consecutive_dead_count, self.total_dead_drops
            );
        }

        Err(anyhow::anyhow!("Link selection failed (all links dead)"))
    }
}

impl<L: LinkSender + ?Sized> Default for BondingScheduler<L> {
    fn default() -> Self {
        Self::new()
    }
}
