//! Interface to the radio scheduler collaborator.
//!
//! The PHY offers only raw slot-timed operations. The MAC submits jobs that
//! carry an absolute frame time and an optional repeat interval; the
//! scheduler owns all waiting and firing. Job identity is the caller-chosen
//! [JobHandle]; retracting a handle that is not present is a no-op.

use heapless::Vec;

use crate::{
    consts::{MAX_PDU_SIZE, SLOT_DURATION, SUBSLOT_DURATION},
    time::{Duration, Instant},
};

/// Identity of a scheduled radio operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct JobHandle(pub u32);

/// Periodic cluster beacon transmission.
pub const BEACON_TX_HANDLE: JobHandle = JobHandle(50);
/// Periodic Last-Minute-Scan RSSI measurement ahead of each beacon.
pub const BEACON_LMS_RSSI_SCAN_HANDLE: JobHandle = JobHandle(51);
/// One-shot association response transmission.
pub const ASSOC_RESP_TX_HANDLE: JobHandle = JobHandle(52);
/// Receive windows covering the advertised random access resource. Handles
/// wrap inside this inclusive range.
pub const RACH_RX_HANDLE_FIRST: JobHandle = JobHandle(60);
pub const RACH_RX_HANDLE_LAST: JobHandle = JobHandle(69);

/// Relative priority between jobs competing for the same air time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum JobPriority {
    High,
    Normal,
}

/// Whether a physical-layer length field counts slots or subslots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum PacketLengthType {
    #[default]
    Slots,
    Subslots,
}

impl PacketLengthType {
    /// Air time of a transmission of `count` units of this length type.
    pub fn duration(&self, count: u8) -> Duration {
        match self {
            PacketLengthType::Slots => SLOT_DURATION * count as i64,
            PacketLengthType::Subslots => SUBSLOT_DURATION * count as i64,
        }
    }
}

/// A scheduled transmission.
#[derive(Debug, Clone)]
pub struct TxJob {
    pub handle: JobHandle,
    pub channel: u16,
    /// Absolute start of the frame this job transmits in.
    pub frame_time: Instant,
    /// Re-fire interval; `None` for a one-shot job.
    pub interval: Option<Duration>,
    pub start_slot: u16,
    pub length_slots: u8,
    pub priority: JobPriority,
    pub payload: Vec<u8, MAX_PDU_SIZE>,
}

/// Receive filtering applied by the PHY before the MAC sees a frame.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RxFilter {
    pub short_network_id: Option<u8>,
    pub receiver_short_id: Option<u16>,
}

/// A scheduled receive window.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RxJob {
    pub handle: JobHandle,
    pub channel: u16,
    pub frame_time: Instant,
    pub interval: Option<Duration>,
    pub start_slot: u16,
    pub length_slots: u8,
    pub priority: JobPriority,
    pub filter: RxFilter,
}

/// A scheduled RSSI measurement, reported in symbol resolution.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RssiJob {
    pub handle: JobHandle,
    pub channel: u16,
    pub frame_time: Instant,
    pub interval: Option<Duration>,
    /// Measurement length in subslots.
    pub duration_subslots: u8,
}

/// The radio scheduler this MAC submits its work to.
///
/// `submit_*` returns `false` when the job cannot be accepted; the caller is
/// responsible for rolling back sibling jobs of the same logical operation.
/// Retraction must be idempotent: retracting an absent handle is a no-op.
pub trait RadioScheduler {
    fn submit_tx(&mut self, job: TxJob) -> bool;
    fn submit_rx(&mut self, job: RxJob) -> bool;
    fn submit_rssi(&mut self, job: RssiJob) -> bool;
    fn retract(&mut self, handle: JobHandle);
    fn retract_range(&mut self, first: JobHandle, last: JobHandle);
    /// Replace the payload of a scheduled transmission without touching its
    /// timing. Returns `false` if the handle is not scheduled.
    fn update_tx_payload(&mut self, handle: JobHandle, payload: &[u8]) -> bool;
}

/// Physical-layer context of one received frame.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ReceptionMetadata {
    /// Receive timestamp of the start of the transmission.
    pub time: Instant,
    pub channel: u16,
    pub rssi_dbm: i8,
    /// MCS of the received transmission, reused for the response.
    pub mcs: u8,
    /// Short RD id of the transmitter from the physical layer control field.
    pub transmitter_short_id: u16,
    pub short_network_id: u8,
    /// Length of the received transmission as declared in the physical
    /// layer control field.
    pub length_type: PacketLengthType,
    pub length: u8,
}

impl ReceptionMetadata {
    /// Air time of the received transmission.
    pub fn rx_duration(&self) -> Duration {
        self.length_type.duration(self.length)
    }
}
