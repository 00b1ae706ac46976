//! # Sender State Machine
//!
//! Pure logic — no I/O. Accepts application data, assigns sequence numbers,
//! serializes packets, drives FEC encoding, processes ACK/NACK feedback, and
//! produces `OutputPacket`s for the bonding scheduler to dispatch across links.
//!
//! ## Responsibilities
//!
//! 1. **Packetisation**: assign sequence numbers, timestamps, fragmentation
//! 2. **FEC Encoding**: feed payloads to `FecEncoder`, emit repair packets
//! 3. **Send Pool**: keep packets in slab pool until ACKed or expired
//! 4. **ACK Processing**: advance cumulative ACK, process SACK bitmap, purge pool
//! 5. **NACK Processing**: mark packets for retransmission via `RetransmitTracker`
//! 6. **Congestion Feedback**: expose pacing rate for scheduling decisions
//!
//! The sender does NOT manage sockets, links, or timers — the bonding layer
//! owns those.

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use quanta::Instant;

use crate::arq::RetransmitTracker;
use crate::codec::FecEncoder;
use crate::pool::{
    PacketContext, PacketHandle, PacketPool, Priority, SequenceGenerator, TimestampClock,
};
use crate::stats::SenderStats;
use crate::wire::{AckPacket, Fragment, NackPacket, Packet, PacketHeader};

// ─── Configuration ──────────────────────────────────────────────────────────

/// Sender configuration parameters.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Maximum payload per packet before fragmentation (bytes).
    pub max_payload_size: usize,
    /// Packet pool capacity (number of slots).
    pub pool_capacity: usize,
    /// FEC source symbols per generation (K).
    pub fec_k: usize,
    /// FEC repair symbols per generation (R).
    pub fec_r: usize,
    /// Maximum time to keep unacked packets before expiry.
    pub packet_ttl: Duration,
    /// Maximum retransmit attempts per packet.
    pub max_retries: u8,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            max_payload_size: 1200,
            pool_capacity: 4096,
            fec_k: 32,
            fec_r: 4,
            packet_ttl: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

// ─── Output Packet ──────────────────────────────────────────────────────────

/// A packet ready for the bonding scheduler to send.
#[derive(Debug, Clone)]
pub struct OutputPacket {
    /// Serialized wire-format bytes (header + payload).
    pub data: Bytes,
    /// Priority classification for scheduling.
    pub priority: Priority,
    /// Sequence number (for correlation with ACKs).
    pub sequence: u64,
    /// Whether this is a retransmission.
    pub is_retransmit: bool,
    /// Whether this is an FEC repair packet.
    pub is_fec_repair: bool,
}

// ─── Sender ─────────────────────────────────────────────────────────────────

/// Sender state machine.
pub struct Sender {
    config: SenderConfig,
    seq_gen: SequenceGenerator,
    clock: TimestampClock,
    pool: PacketPool,
    fec_encoder: FecEncoder,
    retransmit: RetransmitTracker,
    output_queue: VecDeque<OutputPacket>,
    stats: SenderStats,
    /// Maps sequence number → pool handle for ACK/retransmit lookups.
    seq_to_handle: std::collections::HashMap<u64, PacketHandle>,
}

impl Sender {
    /// Create a new sender with the given configuration.
    pub fn new(config: SenderConfig) -> Self {
        let fec_encoder = FecEncoder::new(config.fec_k, config.fec_r);
        let retransmit = RetransmitTracker::new(config.max_retries);
        let pool = PacketPool::new(config.pool_capacity);

        Sender {
            config,
            seq_gen: SequenceGenerator::new(),
            clock: TimestampClock::new(),
            pool,
            fec_encoder,
            retransmit,
            output_queue: VecDeque::new(),
            stats: SenderStats::default(),
            seq_to_handle: std::collections::HashMap::new(),
        }
    }

    /// Submit application data for transmission.
    ///
    /// The data will be packetised (fragmented if necessary), FEC-encoded,
    /// stored in the send pool, and queued as `OutputPacket`s.
    ///
    /// Returns the number of output packets queued (including FEC repairs).
    pub fn send(&mut self, data: Bytes, priority: Priority) -> usize {
        let is_keyframe = priority >= Priority::Reference;
        let is_config = priority >= Priority::Critical;

        let fragments = self.fragment(data, is_keyframe, is_config);
        let mut count = 0;

        for (payload, fragment, kf, cfg) in fragments {
            let seq = self.seq_gen.next();
            let ts = self.clock.now_us();

            // Build wire packet
            let mut header =
                PacketHeader::data(seq, ts, payload.len() as u16).with_fragment(fragment);
            if kf {
                header = header.with_keyframe();
            }
            if cfg {
                header = header.with_config();
            }

            let pkt = Packet {
                header,
                payload: payload.clone(),
            };
            let wire_bytes = pkt.encode().freeze();

            // Store in send pool
            let mut ctx = PacketContext::new(seq, ts).with_priority(priority);
            ctx.fragment = fragment;
            ctx.is_keyframe = kf;
            ctx.is_config = cfg;

            if let Some(handle) = self.pool.insert(ctx, payload.clone()) {
                self.seq_to_handle.insert(seq, handle);
            }

            // Track stats before moving payload into FEC
            self.stats.packets_sent += 1;
            self.stats.bytes_sent += payload.len() as u64;

            // Feed FEC encoder (Bytes::clone is cheap — ref-counted)
            let fec_repairs = self.fec_encoder.add_source_symbol(seq, payload.clone());
            for repair_data in fec_repairs {
                self.output_queue.push_back(OutputPacket {
                    data: repair_data,
                    priority: Priority::Standard,
                    sequence: seq,
                    is_retransmit: false,
                    is_fec_repair: true,
                });
                self.stats.fec_repairs_sent += 1;
                count += 1;
            }

            // Queue the data packet
            self.output_queue.push_back(OutputPacket {
                data: wire_bytes,
                priority,
                sequence: seq,
                is_retransmit: false,
                is_fec_repair: false,
            });
            count += 1;
        }

        count
    }

    /// Process an ACK from the receiver.
    ///
    /// Advances cumulative acknowledgment and processes SACK bitmap.
    /// Returns the number of packets newly acknowledged.
    pub fn process_ack(&mut self, ack: &AckPacket) -> usize {
        let mut newly_acked = 0;

        // Cumulative ACK — all seqs <= cumulative_seq are acknowledged
        let cum_seq = ack.cumulative_seq.value();
        let to_remove: Vec<u64> = self
            .seq_to_handle
            .keys()
            .filter(|&&s| s <= cum_seq)
            .copied()
            .collect();

        for seq in to_remove {
            if let Some(handle) = self.seq_to_handle.remove(&seq) {
                self.pool.mark_acked(handle);
                newly_acked += 1;
            }
            self.retransmit.mark_acked(seq);
        }

        // SACK bitmap — individual acks beyond cumulative
        for sack_seq in ack.sacked_sequences() {
            if let Some(handle) = self.seq_to_handle.remove(&sack_seq) {
                self.pool.mark_acked(handle);
                newly_acked += 1;
            }
            self.retransmit.mark_acked(sack_seq);
        }

        self.stats.packets_acked += newly_acked as u64;

        // Cleanup retransmit tracker below cumulative
        self.retransmit.cleanup_below(cum_seq);

        // Purge acknowledged packets from pool
        self.pool.purge_acked();

        newly_acked
    }

    /// Process a NACK from the receiver.
    ///
    /// Enqueues retransmissions for requested sequence ranges.
    /// Returns the number of retransmissions queued.
    pub fn process_nack(&mut self, nack: &NackPacket) -> usize {
        let mut retransmitted = 0;

        for range in &nack.ranges {
            let start = range.start.value();
            let count = range.count.value();

            for seq in start..(start + count) {
                if !self.retransmit.request_retransmit(seq) {
                    continue; // retry budget exhausted
                }

                // Look up the packet in the pool
                if let Some(&handle) = self.seq_to_handle.get(&seq) {
                    if let Some(entry) = self.pool.get_mut(handle) {
                        entry.context.retry_count += 1;

                        // Re-serialize the packet
                        let header = PacketHeader::data(
                            entry.context.sequence,
                            entry.context.timestamp_us,
                            entry.payload.len() as u16,
                        )
                        .with_fragment(entry.context.fragment);

                        let pkt = Packet {
                            header,
                            payload: entry.payload.clone(),
                        };

                        self.output_queue.push_back(OutputPacket {
                            data: pkt.encode().freeze(),
                            priority: entry.context.priority,
                            sequence: seq,
                            is_retransmit: true,
                            is_fec_repair: false,
                        });

                        self.stats.retransmissions += 1;
                        retransmitted += 1;
                    }
                }
            }
        }

        retransmitted
    }

    /// Drain output packets ready for the bonding scheduler.
    pub fn drain_output(&mut self) -> impl Iterator<Item = OutputPacket> + '_ {
        self.output_queue.drain(..)
    }

    /// Peek at the number of queued output packets.
    pub fn output_queue_len(&self) -> usize {
        self.output_queue.len()
    }

    /// Expire old unacked packets from the pool.
    /// Returns the number of expired packets.
    pub fn expire_old_packets(&mut self) -> usize {
        let cutoff = Instant::now() - self.config.packet_ttl;
        let expired = self.pool.drain_expired(cutoff);
        let count = expired.len();

        // Remove expired seqs from the handle map
        for entry in &expired {
            self.seq_to_handle.remove(&entry.context.sequence);
            self.retransmit.mark_acked(entry.context.sequence); // stop retransmitting
        }
        self.stats.packets_expired += count as u64;
        count
    }

    /// Flush partial FEC generation (e.g., at end of GOP or latency deadline).
    /// Returns the number of repair packets queued.
    pub fn flush_fec(&mut self) -> usize {
        let repairs = self.fec_encoder.flush();
        let count = repairs.len();
        for repair in repairs {
            self.output_queue.push_back(OutputPacket {
                data: repair,
                priority: Priority::Standard,
                sequence: 0,
                is_retransmit: false,
                is_fec_repair: true,
            });
            self.stats.fec_repairs_sent += 1;
        }
        count
    }

    /// Update FEC encoding rate (called by TAROT optimizer).
    pub fn set_fec_rate(&mut self, k: usize, r: usize) {
        self.fec_encoder.set_rate(k, r);
    }

    /// Get send pool utilization (0.0 - 1.0).
    pub fn pool_utilization(&self) -> f64 {
        self.pool.len() as f64 / self.pool.capacity() as f64
    }

    /// Get current sender statistics.
    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// Get mutable access to stats (for linking with congestion metrics).
    pub fn stats_mut(&mut self) -> &mut SenderStats {
        &mut self.stats
    }

    /// Number of packets currently in the send pool (unacked).
    pub fn in_flight(&self) -> usize {
        self.pool.len()
    }

    /// Next sequence number that will be assigned.
    pub fn next_sequence(&self) -> u64 {
        self.seq_gen.current()
    }

    // ─── Internal Helpers ────────────────────────────────────────────────

    /// Fragment data into MTU-sized chunks with appropriate fragment flags.
    fn fragment(
        &self,
        data: Bytes,
        is_keyframe: bool,
        is_config: bool,
    ) -> Vec<(Bytes, Fragment, bool, bool)> {
        let max = self.config.max_payload_size;
        if data.len() <= max {
            return vec![(data, Fragment::Complete, is_keyframe, is_config)];
        }

        let mut fragments = Vec::new();
        let mut offset = 0;
        let total = data.len();

        while offset < total {
            let end = (offset + max).min(total);
            let chunk = data.slice(offset..end);
            let frag = if offset == 0 {
                Fragment::Start
            } else if end == total {
                Fragment::End
            } else {
                Fragment::Middle
            };

            // Keyframe/config flags only on first fragment
            let kf = is_keyframe && offset == 0;
            let cfg = is_config && offset == 0;
            fragments.push((chunk, frag, kf, cfg));
            offset = end;
        }

        fragments
    }
}
