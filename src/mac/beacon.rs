//! Coordinator-side cluster beacon lifecycle.
//!
//! The controller encodes the periodic cluster beacon, keeps it scheduled,
//! performs the Last-Minute-Scan (LMS) busy detection ahead of every
//! transmission and answers association requests received in the advertised
//! random access window.
//!
//! State is shared between the radio receive callback (LMS results,
//! association requests) and administrative context (start/stop/update), so
//! it lives behind a non-blocking critical section. Scheduler calls and
//! logging happen outside the section.

use core::cell::RefCell;

use byte::BytesExt;
use critical_section::Mutex;
use heapless::Vec;

use crate::{
    config::{AssocFullPolicy, RadioConfig, ScheduleMode},
    consts::{
        BEACON_INTERVAL, FRAME_DURATION, FRAME_SYMBOL_COUNT, MAX_PDU_SIZE, RA_LENGTH_SLOTS,
        RA_REPETITION_FRAMES, RA_RESPONSE_WINDOW, RA_START_SUBSLOT, RA_VALIDITY_FRAMES,
        SUBSLOTS_PER_FRAME, SUBSLOTS_PER_SLOT, SYMBOLS_PER_SLOT, SYMBOLS_PER_SUBSLOT,
    },
    mac::{
        assoc_table::{AssocError, AssociationTable},
        sched_fixed,
        sched_fixed::ScheduleError,
    },
    phy::{
        JobPriority, PacketLengthType, RadioScheduler, ReceptionMetadata, RssiJob, RxFilter,
        RxJob, TxJob, ASSOC_RESP_TX_HANDLE, BEACON_LMS_RSSI_SCAN_HANDLE, BEACON_TX_HANDLE,
        RACH_RX_HANDLE_FIRST, RACH_RX_HANDLE_LAST,
    },
    time::{Duration, Instant},
    wire::{
        assoc::{
            AssociationRequest, AssociationResponse, RejectCause, ScheduleAssignmentExt,
            ScheduleModeExt, EXT_TYPE_SCHEDULE_ASSIGNMENT, EXT_TYPE_SCHEDULE_MODE,
        },
        beacon::{
            ClusterBeacon, ClusterBeaconPeriod, NetworkBeaconPeriod, RaRepeat,
            RandomAccessResourceIe,
        },
        encode_sub_pdus, header_length, mux::add_padding, pdc_bytes, slots_needed, CommonHeader,
        FrameType, SubPdu, TypeHeader, WireError,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum BeaconError {
    AlreadyRunning,
    /// The configured schedule does not hold its invariants; nothing was
    /// scheduled.
    InvalidConfig(ScheduleError),
    Encode(WireError),
    /// The scheduler refused a job submission. Sibling jobs of the same
    /// start call have been retracted.
    SchedulerRejected,
}

impl From<WireError> for BeaconError {
    fn from(value: WireError) -> Self {
        BeaconError::Encode(value)
    }
}

/// Why the beacon left the running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum BeaconStopCause {
    UserRequest,
    /// LMS: channel busy inside our own beacon transmit reservation.
    LmsBeaconCollision,
    /// LMS: channel busy inside the advertised random access window.
    LmsRachCollision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct BeaconStartParams {
    pub channel: u16,
    pub tx_power_dbm: i8,
}

/// Operator-facing snapshot of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct BeaconStatus {
    pub running: bool,
    pub channel: u16,
    pub tx_power_dbm: i8,
    pub system_frame_number: u8,
    pub encoded_pdu_len: usize,
    pub slot_count: u8,
    pub last_beacon: Option<ClusterBeacon>,
    pub last_rach_ie: Option<RandomAccessResourceIe>,
    pub last_stop_cause: Option<BeaconStopCause>,
    pub last_tx_frame_time: Option<Instant>,
}

/// Verdict over one symbol-resolution RSSI measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
enum Verdict {
    Busy,
    Possible,
    Free,
}

fn classify(sample: i8, busy_limit: i8, free_limit: i8) -> Verdict {
    if sample > busy_limit {
        Verdict::Busy
    } else if sample <= free_limit {
        Verdict::Free
    } else {
        Verdict::Possible
    }
}

// 4-bit coded TX power field, index = code.
const TX_POWER_DBM: [i8; 16] = [
    -40, -30, -20, -16, -12, -8, -4, 0, 4, 7, 10, 13, 16, 19, 21, 23,
];

fn coded_tx_power(dbm: i8) -> u8 {
    TX_POWER_DBM
        .iter()
        .rposition(|&step| step <= dbm)
        .unwrap_or(0) as u8
}

struct BeaconState {
    running: bool,
    next_sfn: u8,
    encoded_pdu: Vec<u8, MAX_PDU_SIZE>,
    slot_count: u8,
    last_beacon: Option<ClusterBeacon>,
    last_rach_ie: Option<RandomAccessResourceIe>,
    last_tx_frame_time: Option<Instant>,
    last_stop_cause: Option<BeaconStopCause>,
    start_params: BeaconStartParams,
    beacon_reserved_symbols: [bool; FRAME_SYMBOL_COUNT],
    rach_reserved_symbols: [bool; FRAME_SYMBOL_COUNT],
}

impl BeaconState {
    fn new() -> Self {
        Self {
            running: false,
            next_sfn: 0,
            encoded_pdu: Vec::new(),
            slot_count: 0,
            last_beacon: None,
            last_rach_ie: None,
            last_tx_frame_time: None,
            last_stop_cause: None,
            start_params: BeaconStartParams {
                channel: 0,
                tx_power_dbm: 0,
            },
            beacon_reserved_symbols: [false; FRAME_SYMBOL_COUNT],
            rach_reserved_symbols: [false; FRAME_SYMBOL_COUNT],
        }
    }
}

/// FT-side beacon controller. One instance per MAC instance, with the
/// lifetime of the application.
pub struct BeaconController<'a> {
    config: &'a RadioConfig,
    state: Mutex<RefCell<BeaconState>>,
}

impl<'a> BeaconController<'a> {
    pub fn new(config: &'a RadioConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RefCell::new(BeaconState::new())),
        }
    }

    pub fn is_running(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).running)
    }

    pub fn status(&self) -> BeaconStatus {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            BeaconStatus {
                running: state.running,
                channel: state.start_params.channel,
                tx_power_dbm: state.start_params.tx_power_dbm,
                system_frame_number: state.next_sfn,
                encoded_pdu_len: state.encoded_pdu.len(),
                slot_count: state.slot_count,
                last_beacon: state.last_beacon,
                last_rach_ie: state.last_rach_ie,
                last_stop_cause: state.last_stop_cause,
                last_tx_frame_time: state.last_tx_frame_time,
            }
        })
    }

    /// Record a completed beacon transmission. Wired to the scheduler's
    /// completion callback by the embedding application.
    pub fn on_tx_complete(&self, frame_time: Instant) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).last_tx_frame_time = Some(frame_time);
        });
    }

    /// Encode the initial beacon and schedule the periodic beacon TX, the
    /// LMS RSSI scan two frames ahead of each TX, and the receive windows
    /// covering the advertised random access allocation.
    ///
    /// Any scheduler rejection retracts every sibling job already submitted
    /// by this call and leaves the controller stopped.
    pub fn start(
        &self,
        sched: &mut impl RadioScheduler,
        now: Instant,
        params: BeaconStartParams,
    ) -> Result<(), BeaconError> {
        if self.is_running() {
            return Err(BeaconError::AlreadyRunning);
        }
        if let Err(e) = sched_fixed::validate(&self.config.schedule) {
            return Err(BeaconError::InvalidConfig(e));
        }

        let (payload, slot_count, beacon_msg, rach_ie) =
            encode_beacon_pdu(self.config, &params, 0)?;

        // Symbol reservations inside one frame, used by the LMS verdicts.
        let mut beacon_reserved = [false; FRAME_SYMBOL_COUNT];
        let beacon_symbols = (slot_count as u32 * SYMBOLS_PER_SLOT) as usize;
        for reserved in beacon_reserved.iter_mut().take(beacon_symbols) {
            *reserved = true;
        }

        let mut rach_reserved = [false; FRAME_SYMBOL_COUNT];
        let rach_first = (RA_START_SUBSLOT as u32 * SYMBOLS_PER_SUBSLOT) as usize;
        let rach_symbols = (RA_LENGTH_SLOTS as u32 * SYMBOLS_PER_SLOT) as usize;
        for reserved in rach_reserved
            .iter_mut()
            .skip(rach_first)
            .take(rach_symbols)
        {
            *reserved = true;
        }

        let start_time = now + Duration::from_seconds(1);
        let encoded_pdu_len = payload.len();

        // LMS runs two frames ahead of each beacon so the verdict can still
        // retract the transmission.
        let submitted = sched.submit_rssi(RssiJob {
            handle: BEACON_LMS_RSSI_SCAN_HANDLE,
            channel: params.channel,
            frame_time: start_time - 2 * FRAME_DURATION,
            interval: Some(BEACON_INTERVAL),
            duration_subslots: SUBSLOTS_PER_FRAME as u8,
        });
        if !submitted {
            return Err(BeaconError::SchedulerRejected);
        }

        let submitted = sched.submit_tx(TxJob {
            handle: BEACON_TX_HANDLE,
            channel: params.channel,
            frame_time: start_time,
            interval: Some(BEACON_INTERVAL),
            start_slot: 0,
            length_slots: slot_count,
            priority: JobPriority::High,
            payload: payload.clone(),
        });
        if !submitted {
            sched.retract(BEACON_LMS_RSSI_SCAN_HANDLE);
            return Err(BeaconError::SchedulerRejected);
        }

        // One receive window per advertised repetition until the allocation
        // expires; handles wrap inside the fixed range.
        let mut rach_handle = RACH_RX_HANDLE_FIRST;
        let mut rach_frame_time = start_time;
        let last_valid = start_time + FRAME_DURATION * RA_VALIDITY_FRAMES as i64;

        while rach_frame_time <= last_valid {
            let submitted = sched.submit_rx(RxJob {
                handle: rach_handle,
                channel: params.channel,
                frame_time: rach_frame_time,
                interval: Some(BEACON_INTERVAL),
                start_slot: (RA_START_SUBSLOT as u32 / SUBSLOTS_PER_SLOT) as u16,
                length_slots: RA_LENGTH_SLOTS,
                priority: JobPriority::Normal,
                filter: RxFilter {
                    short_network_id: Some(self.config.short_network_id()),
                    receiver_short_id: Some(self.config.short_rd_id),
                },
            });
            if !submitted {
                sched.retract(BEACON_LMS_RSSI_SCAN_HANDLE);
                sched.retract(BEACON_TX_HANDLE);
                sched.retract_range(RACH_RX_HANDLE_FIRST, RACH_RX_HANDLE_LAST);
                return Err(BeaconError::SchedulerRejected);
            }

            rach_frame_time += FRAME_DURATION * RA_REPETITION_FRAMES as i64;
            rach_handle.0 += 1;
            if rach_handle > RACH_RX_HANDLE_LAST {
                rach_handle = RACH_RX_HANDLE_FIRST;
            }
        }

        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            *state = BeaconState {
                running: true,
                next_sfn: 0,
                encoded_pdu: payload,
                slot_count,
                last_beacon: Some(beacon_msg),
                last_rach_ie: Some(rach_ie),
                last_tx_frame_time: None,
                last_stop_cause: None,
                start_params: params,
                beacon_reserved_symbols: beacon_reserved,
                rach_reserved_symbols: rach_reserved,
            };
        });

        info!(
            "Scheduled beacon TX: interval {} ms, tx pwr {} dBm, channel {}, payload PDU byte count {}",
            BEACON_INTERVAL.millis(),
            params.tx_power_dbm,
            params.channel,
            encoded_pdu_len,
        );

        Ok(())
    }

    /// Periodic tick: step the system frame number, re-encode the beacon
    /// and republish the payload of the scheduled transmission in place.
    pub fn update(&self, sched: &mut impl RadioScheduler) {
        let Some((params, sfn)) = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if !state.running {
                return None;
            }
            state.next_sfn = state.next_sfn.wrapping_add(1);
            Some((state.start_params, state.next_sfn))
        }) else {
            return;
        };

        let (payload, slot_count, beacon_msg, rach_ie) =
            match encode_beacon_pdu(self.config, &params, sfn) {
                Ok(encoded) => encoded,
                Err(e) => {
                    error!("Failed to re-encode beacon: {:?}", e);
                    return;
                }
            };

        let still_running = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if !state.running {
                return false;
            }
            state.encoded_pdu = payload.clone();
            state.slot_count = slot_count;
            state.last_beacon = Some(beacon_msg);
            state.last_rach_ie = Some(rach_ie);
            true
        });

        if still_running && !sched.update_tx_payload(BEACON_TX_HANDLE, &payload) {
            warn!("Beacon payload update had no scheduled TX to apply to");
        }
    }

    /// Retract every beacon-related job and leave the running state.
    pub fn stop(&self, sched: &mut impl RadioScheduler, cause: BeaconStopCause) {
        sched.retract(BEACON_LMS_RSSI_SCAN_HANDLE);
        sched.retract(BEACON_TX_HANDLE);
        sched.retract_range(RACH_RX_HANDLE_FIRST, RACH_RX_HANDLE_LAST);

        let was_running = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let was_running = state.running;
            state.running = false;
            if was_running {
                state.last_stop_cause = Some(cause);
            }
            was_running
        });

        if was_running {
            info!("Beacon stopped: {:?}", cause);
        }
    }

    /// Last-Minute-Scan evaluation of one symbol-resolution RSSI report.
    ///
    /// A Busy verdict inside our own beacon transmit reservation retracts
    /// the pending transmission immediately and stops the beacon; a Busy
    /// verdict only inside the random access window stops the beacon with a
    /// distinct cause. Nothing else stops the beacon.
    pub fn on_rssi_measurement(&self, sched: &mut impl RadioScheduler, samples: &[i8]) {
        let busy_limit = self.config.rssi_busy_threshold_dbm;
        let free_limit = self.config.rssi_free_threshold_dbm;

        let verdicts = critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            if !state.running {
                return None;
            }

            let mut busy_in_beacon_tx = false;
            let mut busy_in_rach = false;

            for (i, &sample) in samples.iter().take(FRAME_SYMBOL_COUNT).enumerate() {
                // Only valid (negative dBm) measurements are classified.
                if sample >= 0 {
                    continue;
                }
                if classify(sample, busy_limit, free_limit) == Verdict::Busy {
                    if state.beacon_reserved_symbols[i] {
                        busy_in_beacon_tx = true;
                    } else if state.rach_reserved_symbols[i] {
                        busy_in_rach = true;
                    }
                }
            }

            Some((busy_in_beacon_tx, busy_in_rach))
        });

        match verdicts {
            Some((true, _)) => {
                // Remove the pending beacon TX as soon as possible.
                sched.retract(BEACON_TX_HANDLE);
                warn!("LMS: busy inside beacon TX reservation, stopping beacon");
                self.stop(sched, BeaconStopCause::LmsBeaconCollision);
            }
            Some((false, true)) => {
                warn!("LMS: busy inside random access window, stopping beacon");
                self.stop(sched, BeaconStopCause::LmsRachCollision);
            }
            _ => {}
        }
    }

    /// Answer a decoded association request.
    ///
    /// In fixed mode the peer is installed into the association table and
    /// the acknowledged response carries its assigned slot index plus the
    /// full per-peer slot map. A full table follows the configured
    /// [AssocFullPolicy].
    pub fn handle_association_request(
        &self,
        sched: &mut impl RadioScheduler,
        table: &AssociationTable,
        meta: &ReceptionMetadata,
        common_header: &CommonHeader,
        _request: &AssociationRequest,
    ) {
        if !self.is_running() {
            debug!(
                "Association request from {} while beacon not running",
                common_header.transmitter_id()
            );
            return;
        }

        let schedule = &self.config.schedule;
        let mut assignment = None;

        let response = if schedule.mode == ScheduleMode::Fixed {
            let upserted = table.upsert(
                common_header.transmitter_id(),
                meta.transmitter_short_id,
                meta.rssi_dbm,
                meta.time,
            );

            match upserted {
                Ok(index) => {
                    let mut peer_slots = Vec::new();
                    for peer_id in 1..=schedule.max_peers {
                        if let Ok(range) = sched_fixed::slot_range_for(schedule, peer_id) {
                            unwrap!(peer_slots.push(range));
                        }
                    }
                    assignment = Some(ScheduleAssignmentExt {
                        mode: schedule.mode,
                        assigned_index: index,
                        frame_length_in_slots: schedule.frame_length_in_slots as u8,
                        peer_slots,
                    });
                    debug!(
                        "Peer {} assigned index {}",
                        common_header.transmitter_id(),
                        index
                    );
                    AssociationResponse::accept_all()
                }
                Err(AssocError::CapacityExceeded) => match self.config.assoc_full_policy {
                    AssocFullPolicy::AckWithoutAssignment => {
                        warn!("Peer table full, acknowledging without assignment");
                        AssociationResponse::accept_all()
                    }
                    AssocFullPolicy::Reject => {
                        warn!("Peer table full, rejecting association");
                        AssociationResponse::reject(RejectCause::NoRadioCapacity)
                    }
                },
                Err(_) => AssociationResponse::reject(RejectCause::ConflictShortId),
            }
        } else {
            AssociationResponse::accept_all()
        };

        if let Err(e) = self.send_association_response(sched, meta, common_header, response, assignment)
        {
            error!("Could not schedule association response: {:?}", e);
        }
    }

    /// Send a bare NACK for a request that is not taken any further.
    pub fn reject(
        &self,
        sched: &mut impl RadioScheduler,
        meta: &ReceptionMetadata,
        common_header: &CommonHeader,
        cause: RejectCause,
    ) {
        if !self.is_running() {
            return;
        }

        let response = AssociationResponse::reject(cause);
        if let Err(e) = self.send_association_response(sched, meta, common_header, response, None) {
            error!("Could not schedule association reject: {:?}", e);
        }
    }

    fn send_association_response(
        &self,
        sched: &mut impl RadioScheduler,
        meta: &ReceptionMetadata,
        common_header: &CommonHeader,
        response: AssociationResponse,
        assignment: Option<ScheduleAssignmentExt>,
    ) -> Result<(), WireError> {
        let channel = critical_section::with(|cs| self.state.borrow_ref(cs).start_params.channel);

        let mut buffer: Vec<u8, MAX_PDU_SIZE> = Vec::new();
        unwrap!(buffer.resize_default(MAX_PDU_SIZE));
        let mut offset = 0;

        {
            let pdu = &mut buffer[..];
            pdu.write(&mut offset, TypeHeader::new(FrameType::Unicast))?;
            pdu.write(
                &mut offset,
                CommonHeader::Unicast {
                    reset: true,
                    sequence_number: common_header.sequence_number().unwrap_or(0),
                    receiver_id: common_header.transmitter_id(),
                    transmitter_id: self.config.long_rd_id,
                },
            )?;

            encode_sub_pdus(pdu, &mut offset, &[SubPdu::AssociationResponse(response)])?;

            if let Some(assignment) = assignment {
                let mut ext_payload = [0u8; 24];
                let mut ext_len = 0;
                ext_payload.write(&mut ext_len, assignment)?;
                encode_sub_pdus(
                    pdu,
                    &mut offset,
                    &[SubPdu::VendorExtension {
                        sub_type: EXT_TYPE_SCHEDULE_ASSIGNMENT,
                        data: &ext_payload[..ext_len],
                    }],
                )?;
            }

            // Reuse the MCS the request came in with and pad out the slots.
            let slot_count = slots_needed(meta.mcs, offset)?;
            let capacity = pdc_bytes(meta.mcs, slot_count).ok_or(WireError::UnsupportedMcs)?;
            if capacity > MAX_PDU_SIZE {
                return Err(WireError::TooLarge);
            }
            let pad_len = capacity - offset;
            add_padding(pdu, &mut offset, pad_len)?;

            let response_time = meta.time + meta.rx_duration() + FRAME_DURATION / 2;
            let submitted = sched.submit_tx(TxJob {
                handle: ASSOC_RESP_TX_HANDLE,
                channel,
                frame_time: response_time,
                interval: None,
                start_slot: 0,
                length_slots: slot_count,
                priority: JobPriority::High,
                payload: {
                    let mut payload: Vec<u8, MAX_PDU_SIZE> = Vec::new();
                    unwrap!(payload.extend_from_slice(&pdu[..offset]));
                    payload
                },
            });
            if !submitted {
                error!("Scheduler rejected the association response TX");
            }
        }

        Ok(())
    }
}

/// Encode one complete cluster beacon PDU: beacon message, random access
/// resource and the vendor extension advertising the scheduling mode,
/// padded to exactly fill the slot capacity.
fn encode_beacon_pdu(
    config: &RadioConfig,
    params: &BeaconStartParams,
    sfn: u8,
) -> Result<(Vec<u8, MAX_PDU_SIZE>, u8, ClusterBeacon, RandomAccessResourceIe), WireError> {
    let beacon = ClusterBeacon {
        system_frame_number: sfn,
        power_constraints: false,
        max_tx_power: Some(coded_tx_power(params.tx_power_dbm)),
        frame_offset: None,
        next_cluster_channel: None,
        time_to_next_us: None,
        network_beacon_period: NetworkBeaconPeriod::Ms50,
        cluster_beacon_period: ClusterBeaconPeriod::Ms2000,
        count_to_trigger: 0,
        relative_quality: 0,
        min_quality: 0,
    };

    let rach_ie = RandomAccessResourceIe {
        repeat: RaRepeat::Frames,
        repetition: RA_REPETITION_FRAMES,
        validity: RA_VALIDITY_FRAMES,
        system_frame_number: None,
        channel: None,
        response_channel: None,
        start_subslot: RA_START_SUBSLOT,
        length_type: PacketLengthType::Slots,
        length: RA_LENGTH_SLOTS,
        max_rach_length_type: PacketLengthType::Slots,
        max_rach_length: 4,
        cw_min_sig: 0,
        dect_delay: true,
        response_window: RA_RESPONSE_WINDOW,
        cw_max_sig: 7,
    };

    let mut mode_payload = [0u8; ScheduleModeExt::ENCODED_LEN];
    let mut mode_len = 0;
    mode_payload.write(
        &mut mode_len,
        ScheduleModeExt {
            mode: config.schedule.mode,
        },
    )?;

    let mut buffer: Vec<u8, MAX_PDU_SIZE> = Vec::new();
    unwrap!(buffer.resize_default(MAX_PDU_SIZE));
    let mut offset = 0;

    {
        let pdu = &mut buffer[..];
        pdu.write(&mut offset, TypeHeader::new(FrameType::Beacon))?;
        pdu.write(
            &mut offset,
            CommonHeader::Beacon {
                network_id_ms24: config.network_id_ms24(),
                transmitter_id: config.long_rd_id,
            },
        )?;
        debug_assert!(offset == header_length(FrameType::Beacon));

        encode_sub_pdus(
            pdu,
            &mut offset,
            &[
                SubPdu::ClusterBeacon(beacon),
                SubPdu::RandomAccessResource(rach_ie),
                SubPdu::VendorExtension {
                    sub_type: EXT_TYPE_SCHEDULE_MODE,
                    data: &mode_payload[..mode_len],
                },
            ],
        )?;

        let slot_count = slots_needed(config.mcs, offset)?;
        let capacity = pdc_bytes(config.mcs, slot_count).ok_or(WireError::UnsupportedMcs)?;
        if capacity > MAX_PDU_SIZE {
            return Err(WireError::TooLarge);
        }
        let pad_len = capacity - offset;
        add_padding(pdu, &mut offset, pad_len)?;
        debug_assert!(offset == capacity);

        buffer.truncate(capacity);
        Ok((buffer, slot_count, beacon, rach_ie))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::decode_sub_pdus;

    #[test]
    fn beacon_pdu_round_trip() {
        let config = RadioConfig::default();
        let params = BeaconStartParams {
            channel: 1665,
            tx_power_dbm: -12,
        };

        let (pdu, slot_count, beacon, rach_ie) = encode_beacon_pdu(&config, &params, 7).unwrap();

        // 30 octets of content need two MCS0 slots, padded to full capacity
        assert_eq!(slot_count, 2);
        assert_eq!(pdu.len(), pdc_bytes(config.mcs, slot_count).unwrap());
        assert_eq!(pdu.len(), 37);

        let type_header: TypeHeader = pdu.as_slice().read(&mut 0).unwrap();
        assert_eq!(type_header.frame_type, FrameType::Beacon);

        let mut offset = 1;
        let common: CommonHeader = pdu
            .as_slice()
            .read_with(&mut offset, FrameType::Beacon)
            .unwrap();
        assert_eq!(common.transmitter_id(), config.long_rd_id);
        assert_eq!(
            common,
            CommonHeader::Beacon {
                network_id_ms24: config.network_id_ms24(),
                transmitter_id: config.long_rd_id,
            }
        );

        let sub_pdus = decode_sub_pdus(&pdu[header_length(FrameType::Beacon)..]).unwrap();
        let mut decoded_beacon = None;
        let mut decoded_rach = None;
        let mut decoded_mode = None;
        for sub_pdu in &sub_pdus {
            match sub_pdu {
                SubPdu::ClusterBeacon(b) => decoded_beacon = Some(*b),
                SubPdu::RandomAccessResource(ie) => decoded_rach = Some(*ie),
                SubPdu::VendorExtension { sub_type, data } if *sub_type == EXT_TYPE_SCHEDULE_MODE => {
                    let ext: ScheduleModeExt = data.read(&mut 0).unwrap();
                    decoded_mode = Some(ext.mode);
                }
                SubPdu::Padding(_) => {}
                other => panic!("unexpected sub-PDU: {other:?}"),
            }
        }

        assert_eq!(decoded_beacon, Some(beacon));
        assert_eq!(decoded_beacon.unwrap().system_frame_number, 7);
        assert_eq!(decoded_rach, Some(rach_ie));
        assert_eq!(decoded_mode, Some(config.schedule.mode));
    }

    #[test]
    fn coded_tx_power_is_monotonic() {
        assert_eq!(coded_tx_power(-50), 0);
        assert_eq!(coded_tx_power(-12), 4);
        assert_eq!(coded_tx_power(19), 13);
        assert_eq!(coded_tx_power(42), 15);
    }

    #[test]
    fn start_rejects_an_invalid_schedule() {
        use crate::{
            config::{MacRole, SlotRange},
            test_helpers::FakeScheduler,
        };

        let mut config = RadioConfig::default();
        config.schedule.mode = ScheduleMode::Fixed;
        config.schedule.role = MacRole::Coordinator;
        config.schedule.max_peers = 2;
        config.schedule.peer_slots[0] = SlotRange {
            start_slot: 5,
            end_slot: 10,
        };
        config.schedule.peer_slots[1] = SlotRange {
            start_slot: 10,
            end_slot: 12,
        };

        let beacon = BeaconController::new(&config);
        let mut sched = FakeScheduler::default();
        assert_eq!(
            beacon.start(
                &mut sched,
                Instant::from_ticks(0),
                BeaconStartParams {
                    channel: 1665,
                    tx_power_dbm: -12,
                },
            ),
            Err(BeaconError::InvalidConfig(
                ScheduleError::OverlappingRanges {
                    first: 1,
                    second: 2
                }
            ))
        );
        assert!(sched.tx_jobs.is_empty());
        assert!(sched.rssi_jobs.is_empty());
    }

    #[test]
    fn rssi_classification_thresholds() {
        // defaults: busy above -71, free at or below -85
        assert_eq!(classify(-60, -71, -85), Verdict::Busy);
        assert_eq!(classify(-71, -71, -85), Verdict::Possible);
        assert_eq!(classify(-80, -71, -85), Verdict::Possible);
        assert_eq!(classify(-85, -71, -85), Verdict::Free);
        assert_eq!(classify(-100, -71, -85), Verdict::Free);
    }
}
