//! Association signalling messages and the vendor extension payloads used
//! for static schedule assignment.

use byte::{check_len, BytesExt, TryRead, TryWrite, BE};

use crate::{
    config::{ScheduleMode, SlotRange},
    consts::MAX_PEERS,
    wire::beacon::{ClusterBeaconPeriod, NetworkBeaconPeriod},
};

/// Why a peer wants to associate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SetupCause {
    #[default]
    InitialAssociation,
    NewFlows,
    MobilityHandover,
    ReassociationAfterError,
    OperatingModeChange,
    PagingResponse,
    Other(u8),
}

impl From<u8> for SetupCause {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::InitialAssociation,
            1 => Self::NewFlows,
            2 => Self::MobilityHandover,
            3 => Self::ReassociationAfterError,
            4 => Self::OperatingModeChange,
            5 => Self::PagingResponse,
            other => Self::Other(other),
        }
    }
}

impl From<SetupCause> for u8 {
    fn from(value: SetupCause) -> Self {
        match value {
            SetupCause::InitialAssociation => 0,
            SetupCause::NewFlows => 1,
            SetupCause::MobilityHandover => 2,
            SetupCause::ReassociationAfterError => 3,
            SetupCause::OperatingModeChange => 4,
            SetupCause::PagingResponse => 5,
            SetupCause::Other(other) => other,
        }
    }
}

/// Why an association request was not acknowledged.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RejectCause {
    #[default]
    NoRadioCapacity,
    NoHwCapacity,
    ConflictShortId,
    NonSecured,
    IncompatibleOperatingMode,
    Other(u8),
}

impl From<u8> for RejectCause {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NoRadioCapacity,
            1 => Self::NoHwCapacity,
            2 => Self::ConflictShortId,
            3 => Self::NonSecured,
            4 => Self::IncompatibleOperatingMode,
            other => Self::Other(other),
        }
    }
}

impl From<RejectCause> for u8 {
    fn from(value: RejectCause) -> Self {
        match value {
            RejectCause::NoRadioCapacity => 0,
            RejectCause::NoHwCapacity => 1,
            RejectCause::ConflictShortId => 2,
            RejectCause::NonSecured => 3,
            RejectCause::IncompatibleOperatingMode => 4,
            RejectCause::Other(other) => other,
        }
    }
}

/// Why an association was released.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ReleaseCause {
    #[default]
    ConnectionTermination,
    MobilityHandover,
    LongInactivity,
    IncompatibleConfiguration,
    NoSufficientResources,
    Other(u8),
}

impl From<u8> for ReleaseCause {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::ConnectionTermination,
            1 => Self::MobilityHandover,
            2 => Self::LongInactivity,
            3 => Self::IncompatibleConfiguration,
            4 => Self::NoSufficientResources,
            other => Self::Other(other),
        }
    }
}

impl From<ReleaseCause> for u8 {
    fn from(value: ReleaseCause) -> Self {
        match value {
            ReleaseCause::ConnectionTermination => 0,
            ReleaseCause::MobilityHandover => 1,
            ReleaseCause::LongInactivity => 2,
            ReleaseCause::IncompatibleConfiguration => 3,
            ReleaseCause::NoSufficientResources => 4,
            ReleaseCause::Other(other) => other,
        }
    }
}

/// HARQ configuration octet pair shared by request and response.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct HarqConfig {
    /// 3 bits.
    pub tx_process_count: u8,
    /// 5 bits.
    pub max_tx_retransmission_delay: u8,
    /// 3 bits.
    pub rx_process_count: u8,
    /// 5 bits.
    pub max_rx_retransmission_delay: u8,
}

impl TryRead<'_> for HarqConfig {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, 2)?;
        let tx: u8 = bytes.read(offset)?;
        let rx: u8 = bytes.read(offset)?;
        Ok((
            Self {
                tx_process_count: tx >> 5,
                max_tx_retransmission_delay: tx & 0x1f,
                rx_process_count: rx >> 5,
                max_rx_retransmission_delay: rx & 0x1f,
            },
            *offset,
        ))
    }
}

impl TryWrite for HarqConfig {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write(
            offset,
            (self.tx_process_count << 5) | (self.max_tx_retransmission_delay & 0x1f),
        )?;
        bytes.write(
            offset,
            (self.rx_process_count << 5) | (self.max_rx_retransmission_delay & 0x1f),
        )?;
        Ok(*offset)
    }
}

/// Beacon information a requesting peer advertises when it also operates as
/// a coordinator.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct FtModeInfo {
    pub network_beacon_period: NetworkBeaconPeriod,
    pub cluster_beacon_period: ClusterBeaconPeriod,
    pub next_cluster_channel: u16,
    pub time_to_next_us: u32,
}

const PWR_CONST: u8 = 0b0000_0010;
const FT_MODE: u8 = 0b0000_0001;

/// Association request sent by a peer inside the random access window.
///
/// ```txt
/// +------------------------------------+---------+---------+---------+-----+
/// | Cause | Flows | PwrConst | FT mode | HARQ TX | HARQ RX | Flow id | FT..|
/// +------------------------------------+---------+---------+---------+-----+
///   3 bits  3 bits    1 bit     1 bit      1          1         1
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct AssociationRequest {
    pub setup_cause: SetupCause,
    /// 3 bits. This implementation encodes a single flow; decoding skips
    /// the flow ids beyond the first.
    pub flow_count: u8,
    pub power_constraints: bool,
    pub harq: HarqConfig,
    /// 6 bits.
    pub flow_id: u8,
    pub ft_mode: Option<FtModeInfo>,
}

impl AssociationRequest {
    pub fn encoded_len(&self) -> usize {
        4 + self.ft_mode.map_or(0, |_| 7)
    }
}

impl TryRead<'_> for AssociationRequest {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, 4)?;

        let b0: u8 = bytes.read(offset)?;
        let harq = bytes.read(offset)?;
        let flow_count = (b0 >> 2) & 0x07;
        let flow_octet: u8 = bytes.read(offset)?;

        // Only the first flow id is kept; further flow octets are skipped to
        // stay aligned with the remaining fields.
        for _ in 1..flow_count {
            let _: u8 = bytes.read(offset)?;
        }

        let ft_mode = if b0 & FT_MODE != 0 {
            let periods: u8 = bytes.read(offset)?;
            let network_beacon_period =
                NetworkBeaconPeriod::try_from(periods >> 4).map_err(|_| byte::Error::BadInput {
                    err: "bad network beacon period",
                })?;
            let cluster_beacon_period = ClusterBeaconPeriod::try_from(periods & 0x0f)
                .map_err(|_| byte::Error::BadInput {
                    err: "bad cluster beacon period",
                })?;
            let raw_channel: u16 = bytes.read_with(offset, BE)?;
            Some(FtModeInfo {
                network_beacon_period,
                cluster_beacon_period,
                next_cluster_channel: raw_channel & 0x1fff,
                time_to_next_us: bytes.read_with(offset, BE)?,
            })
        } else {
            None
        };

        Ok((
            Self {
                setup_cause: SetupCause::from(b0 >> 5),
                flow_count,
                power_constraints: b0 & PWR_CONST != 0,
                harq,
                flow_id: flow_octet & 0x3f,
                ft_mode,
            },
            *offset,
        ))
    }
}

impl TryWrite for AssociationRequest {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;

        let mut b0 = (u8::from(self.setup_cause) << 5) | ((self.flow_count & 0x07) << 2);
        if self.power_constraints {
            b0 |= PWR_CONST;
        }
        if self.ft_mode.is_some() {
            b0 |= FT_MODE;
        }

        bytes.write(offset, b0)?;
        bytes.write(offset, self.harq)?;
        bytes.write(offset, self.flow_id & 0x3f)?;

        if let Some(ft) = self.ft_mode {
            bytes.write(
                offset,
                (u8::from(ft.network_beacon_period) << 4) | u8::from(ft.cluster_beacon_period),
            )?;
            bytes.write_with(offset, ft.next_cluster_channel & 0x1fff, BE)?;
            bytes.write_with(offset, ft.time_to_next_us, BE)?;
        }

        Ok(*offset)
    }
}

const ACK: u8 = 0b1000_0000;
const GROUP: u8 = 0b0100_0000;
const HARQ_PRESENT: u8 = 0b0010_0000;

/// All flows accepted as configured in the request.
pub const FLOW_COUNT_ALL: u8 = 0b111;

/// Association response sent by the coordinator.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct AssociationResponse {
    pub ack: bool,
    pub group: bool,
    /// 3 bits; [FLOW_COUNT_ALL] accepts every requested flow.
    pub flow_count: u8,
    /// Carried only in a NACK. 4-bit cause plus a coded 4-bit backoff the
    /// peer must wait before trying again.
    pub reject: Option<(RejectCause, u8)>,
    pub harq: Option<HarqConfig>,
}

impl AssociationResponse {
    pub fn accept_all() -> Self {
        Self {
            ack: true,
            group: false,
            flow_count: FLOW_COUNT_ALL,
            reject: None,
            harq: None,
        }
    }

    pub fn reject(cause: RejectCause) -> Self {
        Self {
            ack: false,
            group: false,
            flow_count: 0,
            reject: Some((cause, 0)),
            harq: None,
        }
    }

    pub fn encoded_len(&self) -> usize {
        2 + self.harq.map_or(0, |_| 2)
    }
}

impl TryRead<'_> for AssociationResponse {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, 2)?;

        let b0: u8 = bytes.read(offset)?;
        let b1: u8 = bytes.read(offset)?;
        let ack = b0 & ACK != 0;

        let harq = if b0 & HARQ_PRESENT != 0 {
            Some(bytes.read(offset)?)
        } else {
            None
        };

        Ok((
            Self {
                ack,
                group: b0 & GROUP != 0,
                flow_count: (b0 >> 2) & 0x07,
                reject: (!ack).then(|| (RejectCause::from(b1 >> 4), b1 & 0x0f)),
                harq,
            },
            *offset,
        ))
    }
}

impl TryWrite for AssociationResponse {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;

        let mut b0 = (self.flow_count & 0x07) << 2;
        if self.ack {
            b0 |= ACK;
        }
        if self.group {
            b0 |= GROUP;
        }
        if self.harq.is_some() {
            b0 |= HARQ_PRESENT;
        }

        bytes.write(offset, b0)?;
        match self.reject {
            Some((cause, time)) if !self.ack => {
                bytes.write(offset, (u8::from(cause) << 4) | (time & 0x0f))?;
            }
            _ => bytes.write(offset, 0u8)?,
        }
        if let Some(harq) = self.harq {
            bytes.write(offset, harq)?;
        }

        Ok(*offset)
    }
}

/// Association release notification.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct AssociationRelease {
    pub cause: ReleaseCause,
}

impl AssociationRelease {
    pub fn encoded_len(&self) -> usize {
        1
    }
}

impl TryRead<'_> for AssociationRelease {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        let b0: u8 = bytes.read(offset)?;
        Ok((
            Self {
                cause: ReleaseCause::from(b0 >> 4),
            },
            *offset,
        ))
    }
}

impl TryWrite for AssociationRelease {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write(offset, u8::from(self.cause) << 4)?;
        Ok(*offset)
    }
}

/// Vendor extension sub-type: full schedule assignment, attached to an
/// accepted association response in fixed mode.
pub const EXT_TYPE_SCHEDULE_ASSIGNMENT: u8 = 0xa1;
/// Vendor extension sub-type: advertised scheduling mode, attached to every
/// cluster beacon and to peer association requests.
pub const EXT_TYPE_SCHEDULE_MODE: u8 = 0xa2;
/// Version octet leading every vendor extension payload.
pub const EXT_VERSION: u8 = 1;

fn mode_octet(mode: ScheduleMode) -> u8 {
    match mode {
        ScheduleMode::Random => 0,
        ScheduleMode::Fixed => 1,
    }
}

fn mode_from_octet(raw: u8) -> ScheduleMode {
    if raw == 1 {
        ScheduleMode::Fixed
    } else {
        ScheduleMode::Random
    }
}

/// `[version, mode]` payload of [EXT_TYPE_SCHEDULE_MODE].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ScheduleModeExt {
    pub mode: ScheduleMode,
}

impl ScheduleModeExt {
    pub const ENCODED_LEN: usize = 2;
}

impl TryRead<'_> for ScheduleModeExt {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, 2)?;
        let version: u8 = bytes.read(offset)?;
        if version != EXT_VERSION {
            return Err(byte::Error::BadInput {
                err: "unknown extension version",
            });
        }
        let mode: u8 = bytes.read(offset)?;
        Ok((
            Self {
                mode: mode_from_octet(mode),
            },
            *offset,
        ))
    }
}

impl TryWrite for ScheduleModeExt {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write(offset, EXT_VERSION)?;
        bytes.write(offset, mode_octet(self.mode))?;
        Ok(*offset)
    }
}

/// `[version, mode, assigned_index, max_peers, frame_length_in_slots,
/// (start, end) × max_peers]` payload of [EXT_TYPE_SCHEDULE_ASSIGNMENT].
///
/// `max_peers` on the wire is the length of `peer_slots`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ScheduleAssignmentExt {
    pub mode: ScheduleMode,
    /// Slot index assigned to the requesting peer, 1-based.
    pub assigned_index: u8,
    pub frame_length_in_slots: u8,
    pub peer_slots: heapless::Vec<SlotRange, MAX_PEERS>,
}

impl ScheduleAssignmentExt {
    pub fn encoded_len(&self) -> usize {
        5 + 2 * self.peer_slots.len()
    }
}

impl TryRead<'_> for ScheduleAssignmentExt {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, 5)?;
        let version: u8 = bytes.read(offset)?;
        if version != EXT_VERSION {
            return Err(byte::Error::BadInput {
                err: "unknown extension version",
            });
        }
        let mode: u8 = bytes.read(offset)?;
        let assigned_index = bytes.read(offset)?;
        let max_peers: u8 = bytes.read(offset)?;
        let frame_length_in_slots = bytes.read(offset)?;

        if max_peers as usize > MAX_PEERS {
            return Err(byte::Error::BadInput {
                err: "peer count out of bounds",
            });
        }

        let mut peer_slots = heapless::Vec::new();
        for _ in 0..max_peers {
            let start: u8 = bytes.read(offset)?;
            let end: u8 = bytes.read(offset)?;
            unwrap!(peer_slots.push(SlotRange {
                start_slot: start as u16,
                end_slot: end as u16,
            }));
        }

        Ok((
            Self {
                mode: mode_from_octet(mode),
                assigned_index,
                frame_length_in_slots,
                peer_slots,
            },
            *offset,
        ))
    }
}

impl TryWrite for ScheduleAssignmentExt {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write(offset, EXT_VERSION)?;
        bytes.write(offset, mode_octet(self.mode))?;
        bytes.write(offset, self.assigned_index)?;
        bytes.write(offset, self.peer_slots.len() as u8)?;
        bytes.write(offset, self.frame_length_in_slots)?;
        for range in self.peer_slots {
            bytes.write(offset, range.start_slot as u8)?;
            bytes.write(offset, range.end_slot as u8)?;
        }
        Ok(*offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let request = AssociationRequest {
            setup_cause: SetupCause::InitialAssociation,
            flow_count: 1,
            power_constraints: false,
            harq: HarqConfig {
                tx_process_count: 2,
                max_tx_retransmission_delay: 4,
                rx_process_count: 2,
                max_rx_retransmission_delay: 4,
            },
            flow_id: 1,
            ft_mode: None,
        };

        assert_eq!(request.encoded_len(), 4);

        let mut buffer = [0u8; 16];
        let mut len = 0;
        buffer.write(&mut len, request).unwrap();
        assert_eq!(len, 4);
        assert_eq!(buffer[..len], [0b000_001_00, 0x44, 0x44, 0x01]);

        let decoded: AssociationRequest = buffer[..len].read(&mut 0).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn request_with_ft_mode_round_trip() {
        let request = AssociationRequest {
            setup_cause: SetupCause::MobilityHandover,
            flow_count: 1,
            power_constraints: true,
            harq: HarqConfig::default(),
            flow_id: 5,
            ft_mode: Some(FtModeInfo {
                network_beacon_period: NetworkBeaconPeriod::Ms100,
                cluster_beacon_period: ClusterBeaconPeriod::Ms1000,
                next_cluster_channel: 1667,
                time_to_next_us: 250_000,
            }),
        };

        assert_eq!(request.encoded_len(), 11);

        let mut buffer = [0u8; 16];
        let mut len = 0;
        buffer.write(&mut len, request).unwrap();
        assert_eq!(len, 11);

        let decoded: AssociationRequest = buffer[..len].read(&mut 0).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn response_ack_round_trip() {
        let response = AssociationResponse::accept_all();
        assert_eq!(response.encoded_len(), 2);

        let mut buffer = [0u8; 8];
        let mut len = 0;
        buffer.write(&mut len, response).unwrap();
        assert_eq!(len, 2);
        assert_eq!(buffer[..len], [0b1_0_0_111_00, 0x00]);

        let decoded: AssociationResponse = buffer[..len].read(&mut 0).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn response_nack_round_trip() {
        let response = AssociationResponse::reject(RejectCause::NoRadioCapacity);

        let mut buffer = [0u8; 8];
        let mut len = 0;
        buffer.write(&mut len, response).unwrap();
        assert_eq!(len, 2);

        let decoded: AssociationResponse = buffer[..len].read(&mut 0).unwrap();
        assert!(!decoded.ack);
        assert_eq!(decoded.reject, Some((RejectCause::NoRadioCapacity, 0)));
    }

    #[test]
    fn release_round_trip() {
        let release = AssociationRelease {
            cause: ReleaseCause::LongInactivity,
        };

        let mut buffer = [0u8; 4];
        let mut len = 0;
        buffer.write(&mut len, release).unwrap();
        assert_eq!(len, 1);
        assert_eq!(buffer[0], 0x20);

        let decoded: AssociationRelease = buffer[..len].read(&mut 0).unwrap();
        assert_eq!(decoded, release);
    }

    #[test]
    fn schedule_assignment_round_trip() {
        let mut peer_slots = heapless::Vec::new();
        peer_slots
            .push(SlotRange {
                start_slot: 5,
                end_slot: 8,
            })
            .unwrap();
        peer_slots
            .push(SlotRange {
                start_slot: 9,
                end_slot: 12,
            })
            .unwrap();

        let ext = ScheduleAssignmentExt {
            mode: ScheduleMode::Fixed,
            assigned_index: 1,
            frame_length_in_slots: 24,
            peer_slots,
        };

        assert_eq!(ext.encoded_len(), 9);

        let mut buffer = [0u8; 32];
        let mut len = 0;
        buffer.write(&mut len, ext.clone()).unwrap();
        assert_eq!(len, 9);
        assert_eq!(buffer[..len], [1, 1, 1, 2, 24, 5, 8, 9, 12]);

        let decoded: ScheduleAssignmentExt = buffer[..len].read(&mut 0).unwrap();
        assert_eq!(decoded, ext);
    }

    #[test]
    fn schedule_mode_rejects_unknown_version() {
        let data = [2u8, 1];
        assert!(data.read::<ScheduleModeExt>(&mut 0).is_err());

        let data = [EXT_VERSION, 1];
        let decoded: ScheduleModeExt = data.read(&mut 0).unwrap();
        assert_eq!(decoded.mode, ScheduleMode::Fixed);
    }
}
