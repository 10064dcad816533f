//! Cluster beacon and random access resource messages.

use byte::{check_len, BytesExt, TryRead, TryWrite, BE};

use crate::phy::PacketLengthType;

/// How often network beacons are transmitted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum NetworkBeaconPeriod {
    #[default]
    Ms50,
    Ms100,
    Ms500,
    Ms1000,
    Ms1500,
    Ms2000,
    Ms4000,
}

impl NetworkBeaconPeriod {
    pub fn in_ms(&self) -> u32 {
        match self {
            NetworkBeaconPeriod::Ms50 => 50,
            NetworkBeaconPeriod::Ms100 => 100,
            NetworkBeaconPeriod::Ms500 => 500,
            NetworkBeaconPeriod::Ms1000 => 1000,
            NetworkBeaconPeriod::Ms1500 => 1500,
            NetworkBeaconPeriod::Ms2000 => 2000,
            NetworkBeaconPeriod::Ms4000 => 4000,
        }
    }
}

impl TryFrom<u8> for NetworkBeaconPeriod {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ms50),
            1 => Ok(Self::Ms100),
            2 => Ok(Self::Ms500),
            3 => Ok(Self::Ms1000),
            4 => Ok(Self::Ms1500),
            5 => Ok(Self::Ms2000),
            6 => Ok(Self::Ms4000),
            _ => Err(value),
        }
    }
}

impl From<NetworkBeaconPeriod> for u8 {
    fn from(value: NetworkBeaconPeriod) -> Self {
        value as u8
    }
}

/// How often cluster beacons are transmitted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ClusterBeaconPeriod {
    Ms10,
    Ms50,
    Ms100,
    Ms500,
    Ms1000,
    Ms1500,
    #[default]
    Ms2000,
    Ms4000,
    Ms8000,
    Ms16000,
    Ms32000,
}

impl ClusterBeaconPeriod {
    pub fn in_ms(&self) -> u32 {
        match self {
            ClusterBeaconPeriod::Ms10 => 10,
            ClusterBeaconPeriod::Ms50 => 50,
            ClusterBeaconPeriod::Ms100 => 100,
            ClusterBeaconPeriod::Ms500 => 500,
            ClusterBeaconPeriod::Ms1000 => 1000,
            ClusterBeaconPeriod::Ms1500 => 1500,
            ClusterBeaconPeriod::Ms2000 => 2000,
            ClusterBeaconPeriod::Ms4000 => 4000,
            ClusterBeaconPeriod::Ms8000 => 8000,
            ClusterBeaconPeriod::Ms16000 => 16000,
            ClusterBeaconPeriod::Ms32000 => 32000,
        }
    }
}

impl TryFrom<u8> for ClusterBeaconPeriod {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ms10),
            1 => Ok(Self::Ms50),
            2 => Ok(Self::Ms100),
            3 => Ok(Self::Ms500),
            4 => Ok(Self::Ms1000),
            5 => Ok(Self::Ms1500),
            6 => Ok(Self::Ms2000),
            7 => Ok(Self::Ms4000),
            8 => Ok(Self::Ms8000),
            9 => Ok(Self::Ms16000),
            10 => Ok(Self::Ms32000),
            _ => Err(value),
        }
    }
}

impl From<ClusterBeaconPeriod> for u8 {
    fn from(value: ClusterBeaconPeriod) -> Self {
        value as u8
    }
}

const TX_POWER_PRESENT: u8 = 0b0001_0000;
const POWER_CONSTRAINTS: u8 = 0b0000_1000;
const FRAME_OFFSET_PRESENT: u8 = 0b0000_0100;
const NEXT_CHANNEL_PRESENT: u8 = 0b0000_0010;
const TIME_TO_NEXT_PRESENT: u8 = 0b0000_0001;

/// Cluster beacon message.
///
/// ```txt
/// +-----+-------+----------------+----------------+-----------------------+
/// | SFN | Flags | NB/CB periods  | Trigger/qual.  | Optional fields ...   |
/// +-----+-------+----------------+----------------+-----------------------+
///    1      1          1                 1          gated by flag bits
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct ClusterBeacon {
    /// Increments once per transmitted beacon, mod 256.
    pub system_frame_number: u8,
    pub power_constraints: bool,
    /// Coded max TX power of this cluster, 4 bits.
    pub max_tx_power: Option<u8>,
    /// Offset of the beacon inside the frame, in subslots.
    pub frame_offset: Option<u8>,
    /// 13-bit channel the cluster moves to next.
    pub next_cluster_channel: Option<u16>,
    /// Microseconds until the next beacon when it deviates from the period.
    pub time_to_next_us: Option<u32>,
    pub network_beacon_period: NetworkBeaconPeriod,
    pub cluster_beacon_period: ClusterBeaconPeriod,
    pub count_to_trigger: u8,
    pub relative_quality: u8,
    pub min_quality: u8,
}

impl ClusterBeacon {
    pub fn encoded_len(&self) -> usize {
        4 + self.max_tx_power.map_or(0, |_| 1)
            + self.frame_offset.map_or(0, |_| 1)
            + self.next_cluster_channel.map_or(0, |_| 2)
            + self.time_to_next_us.map_or(0, |_| 4)
    }
}

impl TryRead<'_> for ClusterBeacon {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, 4)?;

        let system_frame_number = bytes.read(offset)?;
        let flags: u8 = bytes.read(offset)?;
        let periods: u8 = bytes.read(offset)?;
        let quality: u8 = bytes.read(offset)?;

        let network_beacon_period =
            NetworkBeaconPeriod::try_from(periods >> 4).map_err(|_| byte::Error::BadInput {
                err: "bad network beacon period",
            })?;
        let cluster_beacon_period =
            ClusterBeaconPeriod::try_from(periods & 0x0f).map_err(|_| byte::Error::BadInput {
                err: "bad cluster beacon period",
            })?;

        let max_tx_power = if flags & TX_POWER_PRESENT != 0 {
            let raw: u8 = bytes.read(offset)?;
            Some(raw & 0x0f)
        } else {
            None
        };
        let frame_offset = if flags & FRAME_OFFSET_PRESENT != 0 {
            Some(bytes.read(offset)?)
        } else {
            None
        };
        let next_cluster_channel = if flags & NEXT_CHANNEL_PRESENT != 0 {
            let raw: u16 = bytes.read_with(offset, BE)?;
            Some(raw & 0x1fff)
        } else {
            None
        };
        let time_to_next_us = if flags & TIME_TO_NEXT_PRESENT != 0 {
            Some(bytes.read_with(offset, BE)?)
        } else {
            None
        };

        Ok((
            Self {
                system_frame_number,
                power_constraints: flags & POWER_CONSTRAINTS != 0,
                max_tx_power,
                frame_offset,
                next_cluster_channel,
                time_to_next_us,
                network_beacon_period,
                cluster_beacon_period,
                count_to_trigger: quality >> 4,
                relative_quality: (quality >> 2) & 0x03,
                min_quality: quality & 0x03,
            },
            *offset,
        ))
    }
}

impl TryWrite for ClusterBeacon {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;

        let mut flags = 0u8;
        if self.max_tx_power.is_some() {
            flags |= TX_POWER_PRESENT;
        }
        if self.power_constraints {
            flags |= POWER_CONSTRAINTS;
        }
        if self.frame_offset.is_some() {
            flags |= FRAME_OFFSET_PRESENT;
        }
        if self.next_cluster_channel.is_some() {
            flags |= NEXT_CHANNEL_PRESENT;
        }
        if self.time_to_next_us.is_some() {
            flags |= TIME_TO_NEXT_PRESENT;
        }

        bytes.write(offset, self.system_frame_number)?;
        bytes.write(offset, flags)?;
        bytes.write(
            offset,
            (u8::from(self.network_beacon_period) << 4) | u8::from(self.cluster_beacon_period),
        )?;
        bytes.write(
            offset,
            (self.count_to_trigger << 4)
                | ((self.relative_quality & 0x03) << 2)
                | (self.min_quality & 0x03),
        )?;

        if let Some(power) = self.max_tx_power {
            bytes.write(offset, power & 0x0f)?;
        }
        if let Some(frame_offset) = self.frame_offset {
            bytes.write(offset, frame_offset)?;
        }
        if let Some(channel) = self.next_cluster_channel {
            bytes.write_with(offset, channel & 0x1fff, BE)?;
        }
        if let Some(time_to_next) = self.time_to_next_us {
            bytes.write_with(offset, time_to_next, BE)?;
        }

        Ok(*offset)
    }
}

/// Repetition policy of a random access allocation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RaRepeat {
    #[default]
    Single,
    Frames,
    Subslots,
}

impl TryFrom<u8> for RaRepeat {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Single),
            1 => Ok(Self::Frames),
            2 => Ok(Self::Subslots),
            _ => Err(value),
        }
    }
}

const SFN_PRESENT: u8 = 0b0000_0100;
const CHANNEL_PRESENT: u8 = 0b0000_0010;
const RESPONSE_CHANNEL_PRESENT: u8 = 0b0000_0001;
const LENGTH_TYPE_SLOTS: u8 = 0b1000_0000;
const DECT_DELAY: u8 = 0b1000_0000;

/// Random access resource: the contention window peers may use to send
/// association requests.
///
/// ```txt
/// +-------+---------------+--------+-------------+-----+----------+------+
/// | Flags | Start subslot | Length | Max len/CW  | Win | Rep/Val  | Opt. |
/// +-------+---------------+--------+-------------+-----+----------+------+
///     1          1            1          1          1       2
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RandomAccessResourceIe {
    pub repeat: RaRepeat,
    /// Interval between windows in units given by `repeat`.
    pub repetition: u8,
    /// How long the allocation stays valid, in frames.
    pub validity: u8,
    /// Allocation valid from this SFN onwards; immediately valid if absent.
    pub system_frame_number: Option<u8>,
    /// Allocation valid in this channel; current channel if absent.
    pub channel: Option<u16>,
    /// Responses are sent in this channel; same channel if absent.
    pub response_channel: Option<u16>,
    pub start_subslot: u8,
    pub length_type: PacketLengthType,
    /// Window length, 7 bits, in units of `length_type`.
    pub length: u8,
    pub max_rach_length_type: PacketLengthType,
    /// Longest allowed random access transmission, 4 bits.
    pub max_rach_length: u8,
    /// Contention window minimum, power-of-two exponent, 3 bits.
    pub cw_min_sig: u8,
    /// Set: the response window starts half a frame after the start of the
    /// random access transmission. Clear: 3 subslots after its last subslot.
    pub dect_delay: bool,
    /// Response window length in subslots, coded as value - 1, 4 bits.
    pub response_window: u8,
    /// Contention window maximum, power-of-two exponent, 3 bits.
    pub cw_max_sig: u8,
}

impl RandomAccessResourceIe {
    pub fn encoded_len(&self) -> usize {
        7 + self.system_frame_number.map_or(0, |_| 1)
            + self.channel.map_or(0, |_| 2)
            + self.response_channel.map_or(0, |_| 2)
    }
}

fn length_type_bit(length_type: PacketLengthType, mask: u8) -> u8 {
    match length_type {
        PacketLengthType::Slots => mask,
        PacketLengthType::Subslots => 0,
    }
}

fn length_type_from_bit(raw: u8, mask: u8) -> PacketLengthType {
    if raw & mask != 0 {
        PacketLengthType::Slots
    } else {
        PacketLengthType::Subslots
    }
}

impl TryRead<'_> for RandomAccessResourceIe {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, 7)?;

        let flags: u8 = bytes.read(offset)?;
        let repeat = RaRepeat::try_from((flags >> 3) & 0x03).map_err(|_| byte::Error::BadInput {
            err: "bad repeat type",
        })?;
        let start_subslot = bytes.read(offset)?;
        let length_raw: u8 = bytes.read(offset)?;
        let max_raw: u8 = bytes.read(offset)?;
        let window_raw: u8 = bytes.read(offset)?;
        let repetition = bytes.read(offset)?;
        let validity = bytes.read(offset)?;

        let system_frame_number = if flags & SFN_PRESENT != 0 {
            Some(bytes.read(offset)?)
        } else {
            None
        };
        let channel = if flags & CHANNEL_PRESENT != 0 {
            let raw: u16 = bytes.read_with(offset, BE)?;
            Some(raw & 0x1fff)
        } else {
            None
        };
        let response_channel = if flags & RESPONSE_CHANNEL_PRESENT != 0 {
            let raw: u16 = bytes.read_with(offset, BE)?;
            Some(raw & 0x1fff)
        } else {
            None
        };

        Ok((
            Self {
                repeat,
                repetition,
                validity,
                system_frame_number,
                channel,
                response_channel,
                start_subslot,
                length_type: length_type_from_bit(length_raw, LENGTH_TYPE_SLOTS),
                length: length_raw & 0x7f,
                max_rach_length_type: length_type_from_bit(max_raw, LENGTH_TYPE_SLOTS),
                max_rach_length: (max_raw >> 3) & 0x0f,
                cw_min_sig: max_raw & 0x07,
                dect_delay: window_raw & DECT_DELAY != 0,
                response_window: (window_raw >> 3) & 0x0f,
                cw_max_sig: window_raw & 0x07,
            },
            *offset,
        ))
    }
}

impl TryWrite for RandomAccessResourceIe {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;

        let mut flags = (self.repeat as u8) << 3;
        if self.system_frame_number.is_some() {
            flags |= SFN_PRESENT;
        }
        if self.channel.is_some() {
            flags |= CHANNEL_PRESENT;
        }
        if self.response_channel.is_some() {
            flags |= RESPONSE_CHANNEL_PRESENT;
        }

        bytes.write(offset, flags)?;
        bytes.write(offset, self.start_subslot)?;
        bytes.write(
            offset,
            length_type_bit(self.length_type, LENGTH_TYPE_SLOTS) | (self.length & 0x7f),
        )?;
        bytes.write(
            offset,
            length_type_bit(self.max_rach_length_type, LENGTH_TYPE_SLOTS)
                | ((self.max_rach_length & 0x0f) << 3)
                | (self.cw_min_sig & 0x07),
        )?;
        bytes.write(
            offset,
            if self.dect_delay { DECT_DELAY } else { 0 }
                | ((self.response_window & 0x0f) << 3)
                | (self.cw_max_sig & 0x07),
        )?;
        bytes.write(offset, self.repetition)?;
        bytes.write(offset, self.validity)?;

        if let Some(sfn) = self.system_frame_number {
            bytes.write(offset, sfn)?;
        }
        if let Some(channel) = self.channel {
            bytes.write_with(offset, channel & 0x1fff, BE)?;
        }
        if let Some(channel) = self.response_channel {
            bytes.write_with(offset, channel & 0x1fff, BE)?;
        }

        Ok(*offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_beacon_round_trip() {
        let beacon = ClusterBeacon {
            system_frame_number: 42,
            power_constraints: false,
            max_tx_power: Some(0x0b),
            frame_offset: None,
            next_cluster_channel: None,
            time_to_next_us: None,
            network_beacon_period: NetworkBeaconPeriod::Ms50,
            cluster_beacon_period: ClusterBeaconPeriod::Ms2000,
            count_to_trigger: 0,
            relative_quality: 0,
            min_quality: 0,
        };

        assert_eq!(beacon.encoded_len(), 5);

        let mut buffer = [0u8; 16];
        let mut len = 0;
        buffer.write(&mut len, beacon).unwrap();
        assert_eq!(len, 5);
        assert_eq!(buffer[..len], [42, 0x10, 0x06, 0x00, 0x0b]);

        let mut read_len = 0;
        let decoded: ClusterBeacon = buffer[..len].read(&mut read_len).unwrap();
        assert_eq!(read_len, len);
        assert_eq!(decoded, beacon);
    }

    #[test]
    fn cluster_beacon_all_optionals() {
        let beacon = ClusterBeacon {
            system_frame_number: 255,
            power_constraints: true,
            max_tx_power: Some(3),
            frame_offset: Some(17),
            next_cluster_channel: Some(1667),
            time_to_next_us: Some(1_500_000),
            network_beacon_period: NetworkBeaconPeriod::Ms100,
            cluster_beacon_period: ClusterBeaconPeriod::Ms4000,
            count_to_trigger: 5,
            relative_quality: 2,
            min_quality: 1,
        };

        assert_eq!(beacon.encoded_len(), 12);

        let mut buffer = [0u8; 16];
        let mut len = 0;
        buffer.write(&mut len, beacon).unwrap();
        assert_eq!(len, 12);

        let decoded: ClusterBeacon = buffer[..len].read(&mut 0).unwrap();
        assert_eq!(decoded, beacon);
    }

    #[test]
    fn cluster_beacon_rejects_truncated() {
        let data = [42u8, 0x10, 0x06];
        assert!(data.read::<ClusterBeacon>(&mut 0).is_err());

        // flags announce a tx power octet that is not there
        let data = [42u8, 0x10, 0x06, 0x00];
        assert!(data.read::<ClusterBeacon>(&mut 0).is_err());
    }

    #[test]
    fn rach_ie_round_trip() {
        let ie = RandomAccessResourceIe {
            repeat: RaRepeat::Frames,
            repetition: 2,
            validity: 16,
            system_frame_number: None,
            channel: None,
            response_channel: None,
            start_subslot: 18,
            length_type: PacketLengthType::Slots,
            length: 2,
            max_rach_length_type: PacketLengthType::Slots,
            max_rach_length: 4,
            cw_min_sig: 0,
            dect_delay: true,
            response_window: 10,
            cw_max_sig: 7,
        };

        assert_eq!(ie.encoded_len(), 7);

        let mut buffer = [0u8; 16];
        let mut len = 0;
        buffer.write(&mut len, ie).unwrap();
        assert_eq!(len, 7);
        assert_eq!(buffer[..len], [0x08, 18, 0x82, 0xa0, 0xd7, 2, 16]);

        let decoded: RandomAccessResourceIe = buffer[..len].read(&mut 0).unwrap();
        assert_eq!(decoded, ie);
    }

    #[test]
    fn rach_ie_optionals_round_trip() {
        let ie = RandomAccessResourceIe {
            repeat: RaRepeat::Subslots,
            repetition: 48,
            validity: 8,
            system_frame_number: Some(100),
            channel: Some(1665),
            response_channel: Some(1667),
            start_subslot: 0,
            length_type: PacketLengthType::Subslots,
            length: 4,
            max_rach_length_type: PacketLengthType::Subslots,
            max_rach_length: 8,
            cw_min_sig: 1,
            dect_delay: false,
            response_window: 5,
            cw_max_sig: 3,
        };

        assert_eq!(ie.encoded_len(), 12);

        let mut buffer = [0u8; 16];
        let mut len = 0;
        buffer.write(&mut len, ie).unwrap();
        assert_eq!(len, 12);

        let decoded: RandomAccessResourceIe = buffer[..len].read(&mut 0).unwrap();
        assert_eq!(decoded, ie);
    }
}
