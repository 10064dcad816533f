//! Static channel access schedule math.
//!
//! Pure functions over a [FixedScheduleConfig]; callable from any context.
//! All arithmetic stays in the baseband tick domain so repeated calls for
//! the same configuration can never accumulate rounding drift.

use crate::{
    config::{FixedScheduleConfig, MacRole, ScheduleMode, SlotRange},
    consts::{MAX_PEERS, SLOT_DURATION},
    time::Instant,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ScheduleError {
    /// The operation is only defined in fixed mode.
    RandomMode,
    /// The coordinator never transmits in a peer slot.
    CoordinatorRole,
    InvalidPeerId,
    ZeroFrameLength,
    InvalidPeerCount,
    SlotRangeOutOfFrame { peer_id: u8 },
    OverlappingRanges { first: u8, second: u8 },
}

fn range_in_frame(cfg: &FixedScheduleConfig, peer_id: u8) -> Result<SlotRange, ScheduleError> {
    let range = cfg.peer_slots[peer_id as usize - 1];
    if range.start_slot > range.end_slot || range.end_slot >= cfg.frame_length_in_slots {
        return Err(ScheduleError::SlotRangeOutOfFrame { peer_id });
    }
    Ok(range)
}

/// Check the configuration invariants.
///
/// Random mode needs no schedule and always validates. A peer only needs its
/// own valid assignment; the coordinator owns the whole frame layout and
/// additionally requires all configured ranges to be pairwise disjoint.
pub fn validate(cfg: &FixedScheduleConfig) -> Result<(), ScheduleError> {
    if cfg.mode != ScheduleMode::Fixed {
        return Ok(());
    }
    if cfg.frame_length_in_slots == 0 {
        return Err(ScheduleError::ZeroFrameLength);
    }
    if cfg.max_peers == 0 || cfg.max_peers as usize > MAX_PEERS {
        return Err(ScheduleError::InvalidPeerCount);
    }

    match cfg.role {
        MacRole::Peer => {
            if cfg.own_peer_id == 0 || cfg.own_peer_id > cfg.max_peers {
                return Err(ScheduleError::InvalidPeerId);
            }
            range_in_frame(cfg, cfg.own_peer_id)?;
        }
        MacRole::Coordinator => {
            if cfg.own_peer_id != 0 {
                return Err(ScheduleError::InvalidPeerId);
            }
            for peer_id in 1..=cfg.max_peers {
                range_in_frame(cfg, peer_id)?;
            }
            for first in 1..=cfg.max_peers {
                for second in first + 1..=cfg.max_peers {
                    let a = cfg.peer_slots[first as usize - 1];
                    let b = cfg.peer_slots[second as usize - 1];
                    if a.start_slot <= b.end_slot && b.start_slot <= a.end_slot {
                        return Err(ScheduleError::OverlappingRanges { first, second });
                    }
                }
            }
        }
    }

    Ok(())
}

/// The slot range assigned to `peer_id` (1-based).
pub fn slot_range_for(
    cfg: &FixedScheduleConfig,
    peer_id: u8,
) -> Result<SlotRange, ScheduleError> {
    if peer_id == 0 || peer_id > cfg.max_peers || peer_id as usize > MAX_PEERS {
        return Err(ScheduleError::InvalidPeerId);
    }
    Ok(cfg.peer_slots[peer_id as usize - 1])
}

/// The next instant at which this peer may start transmitting.
///
/// The frame boundary at or before `now`, plus the assigned start slot;
/// advanced by exactly one frame when that is not strictly after `now`.
pub fn next_transmit_time(
    cfg: &FixedScheduleConfig,
    now: Instant,
) -> Result<Instant, ScheduleError> {
    if cfg.mode != ScheduleMode::Fixed {
        return Err(ScheduleError::RandomMode);
    }
    if cfg.role != MacRole::Peer {
        return Err(ScheduleError::CoordinatorRole);
    }
    validate(cfg)?;

    let range = slot_range_for(cfg, cfg.own_peer_id)?;
    let frame = SLOT_DURATION * cfg.frame_length_in_slots as i64;
    let frame_start = now.align_down(frame);

    let mut slot_start = frame_start + SLOT_DURATION * range.start_slot as i64;
    if slot_start <= now {
        slot_start += frame;
    }

    Ok(slot_start)
}
