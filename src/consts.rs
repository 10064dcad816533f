//! Radio frame structure constants and fixed scheduler handle assignments.

use crate::time::Duration;

/// Duration of one radio frame: 10 ms of baseband ticks.
pub const FRAME_DURATION: Duration = Duration::from_millis(10);

/// The number of slots in every radio frame.
pub const SLOTS_PER_FRAME: u32 = 24;

/// The number of subslots in every slot.
pub const SUBSLOTS_PER_SLOT: u32 = 2;

/// The number of subslots in every radio frame.
pub const SUBSLOTS_PER_FRAME: u32 = SLOTS_PER_FRAME * SUBSLOTS_PER_SLOT;

/// Duration of one slot (10 ms / 24 = 28800 ticks).
pub const SLOT_DURATION: Duration = Duration::from_ticks(FRAME_DURATION.ticks() / 24);

/// Duration of one subslot.
pub const SUBSLOT_DURATION: Duration = Duration::from_ticks(SLOT_DURATION.ticks() / 2);

/// The number of OFDM symbols in every slot.
pub const SYMBOLS_PER_SLOT: u32 = 10;

/// The number of OFDM symbols in every subslot.
pub const SYMBOLS_PER_SUBSLOT: u32 = SYMBOLS_PER_SLOT / SUBSLOTS_PER_SLOT;

/// The number of OFDM symbols in every radio frame. RSSI measurements used
/// for the Last-Minute-Scan are reported in this resolution.
pub const FRAME_SYMBOL_COUNT: usize = (SLOTS_PER_FRAME * SYMBOLS_PER_SLOT) as usize;

/// The largest MAC PDU, in octets, that any slot/MCS combination this crate
/// supports can carry.
pub const MAX_PDU_SIZE: usize = 701;

/// Upper bound on the number of sub-PDUs multiplexed into one MAC PDU.
pub const MAX_SUB_PDUS: usize = 16;

/// Hard compile-time bound on the associated-peer table. The configured
/// `max_peers` may be lower, never higher.
pub const MAX_PEERS: usize = 6;

/// The packet length field of the physical layer control field is 4 bits
/// wide, so a single transmission spans at most 16 slots.
pub const MAX_TX_SLOTS: u8 = 16;

/// Interval between cluster beacon transmissions.
pub const BEACON_INTERVAL: Duration = Duration::from_millis(2000);

/// First subslot of the advertised random access window.
pub const RA_START_SUBSLOT: u8 = 18;

/// Length of the advertised random access window, in slots.
pub const RA_LENGTH_SLOTS: u8 = 2;

/// How many frames the advertised random access allocation stays valid.
pub const RA_VALIDITY_FRAMES: u8 = 16;

/// Repetition interval of the random access window, in frames.
pub const RA_REPETITION_FRAMES: u8 = 2;

/// Response window advertised in the random access resource, in subslots
/// (coded as value + 1 on the wire).
pub const RA_RESPONSE_WINDOW: u8 = 10;
