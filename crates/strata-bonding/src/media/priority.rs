//! # Priority Classification
//!
//! Maps NAL classification to scheduling priorities and treatment policies.
//! This bridges the media layer with the bonding scheduler.

use super::nal::{Codec, NalClass, NalInfo};
use crate::scheduler::PacketProfile;

/// Treatment policy for a given priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    /// Send on ALL links with maximum FEC. (SPS, PPS, VPS)
    Broadcast,
    /// Send on best 2 links with high FEC. (IDR, CRA, BLA)
    Redundant,
    /// Normal single-link scheduling. (P-slices, reference frames)
    Normal,
    /// Lowest priority, can be dropped under pressure. (B non-ref)
    Droppable,
}

/// FEC protection level recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecLevel {
    /// Maximum FEC overhead (e.g., 50%).
    Max,
    /// High FEC overhead (e.g., 25%).
    High,
    /// Standard FEC overhead (e.g., 10%).
    Standard,
    /// No FEC needed (droppable frames).
    None,
}

/// Priority classification result.
#[derive(Debug, Clone)]
pub struct PacketPriority {
    /// How the scheduler should treat this packet.
    pub treatment: Treatment,
    /// Recommended FEC protection level.
    pub fec_level: FecLevel,
    /// NAL classification that produced this priority.
    pub nal_class: NalClass,
}

/// Classify a NAL unit into scheduling priority.
pub fn classify(info: &NalInfo) -> PacketPriority {
    match info.class {
        NalClass::ParameterSet => PacketPriority {
            treatment: Treatment::Broadcast,
            fec_level: FecLevel::Max,
            nal_class: NalClass::ParameterSet,
        },
        NalClass::Keyframe => PacketPriority {
            treatment: Treatment::Redundant,
            fec_level: FecLevel::High,
            nal_class: NalClass::Keyframe,
        },
        NalClass::Reference => PacketPriority {
            treatment: Treatment::Normal,
            fec_level: FecLevel::Standard,
            nal_class: NalClass::Reference,
        },
        NalClass::NonReference => PacketPriority {
            treatment: Treatment::Droppable,
            fec_level: FecLevel::None,
            nal_class: NalClass::NonReference,
        },
        NalClass::Unknown => PacketPriority {
            treatment: Treatment::Normal,
            fec_level: FecLevel::Standard,
            nal_class: NalClass::Unknown,
        },
    }
}

/// Convert a NAL-based priority into the scheduler's PacketProfile.
pub fn to_packet_profile(priority: &PacketPriority, size_bytes: usize) -> PacketProfile {
    PacketProfile {
        is_critical: matches!(
            priority.treatment,
            Treatment::Broadcast | Treatment::Redundant
        ),
        can_drop: matches!(priority.treatment, Treatment::Droppable),
        size_bytes,
    }
}

/// Classify raw payload bytes directly.
///
/// Parses the NAL header and returns both the NAL info and the scheduling priority.
pub fn classify_payload(payload: &[u8], codec: Codec) -> Option<(NalInfo, PacketPriority)> {
    let info = super::nal::parse_nal(payload, codec)?;
    let priority = classify(&info);
    Some((info, priority))
}

/// Graceful degradation stage based on capacity pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DegradationStage {
    /// No degradation.
    Normal = 0,
    /// Drop non-reference B-frames.
    DropDisposable = 1,
    /// Reduce encoder bitrate.
    ReduceBitrate = 2,
    /// Drop standard frames, protect only Critical + Reference.
    ProtectKeyframes = 3,
    /// Emergency: keyframe-only mode.
    KeyframeOnly = 4,
}

impl DegradationStage {
    /// Whether a given treatment should be allowed through at this stage.
    pub fn allows(&self, treatment: Treatment) -> bool {
        match self {
            DegradationStage::Normal => true,
            DegradationStage::DropDisposable => treatment != Treatment::Droppable,
            DegradationStage::ReduceBitrate => treatment != Treatment::Droppable,
            DegradationStage::ProtectKeyframes => {
                matches!(treatment, Treatment::Broadcast | Treatment::Redundant)
            }
            DegradationStage::KeyframeOnly => treatment == Treatment::Broadcast,
        }
    }

    /// Determine degradation stage from ratio of available_capacity / required_bitrate.
    pub fn from_pressure(ratio: f64) -> Self {
        if ratio >= 1.0 {
            DegradationStage::Normal
        } else if ratio >= 0.8 {
            DegradationStage::DropDisposable
        } else if ratio >= 0.5 {
            DegradationStage::ReduceBitrate
        } else if ratio >= 0.25 {
            DegradationStage::ProtectKeyframes
        } else {
            DegradationStage::KeyframeOnly
        }
    }
}
