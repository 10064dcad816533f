//! The binary MAC PDU format.
//!
//! A MAC PDU is a one-octet type header, a type-dependent common header and
//! a sequence of length-prefixed sub-PDUs, padded out to exactly fill the
//! physical-layer packet for the chosen slot count and MCS.
//!
//! ```txt
//! +-------------+---------------+-----------+-----------+-----+---------+
//! | Type header | Common header | Sub-PDU 0 | Sub-PDU 1 | ... | Padding |
//! +-------------+---------------+-----------+-----------+-----+---------+
//!       1          6/7/10 octets
//! ```

use byte::{check_len, BytesExt, TryRead, TryWrite, BE};

pub mod assoc;
pub mod beacon;
pub mod mux;

pub use mux::{decode_sub_pdus, encode_sub_pdus, SubPdu};

use crate::consts::MAX_TX_SLOTS;

/// Errors of the PDU codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum WireError {
    /// Undersized buffer or a declared length exceeding the remaining
    /// bytes. Always a local reject, never a partial decode.
    Malformed,
    /// The content does not fit the largest representable packet.
    TooLarge,
    /// No capacity table for the configured MCS.
    UnsupportedMcs,
}

impl From<byte::Error> for WireError {
    fn from(_: byte::Error) -> Self {
        WireError::Malformed
    }
}

/// MAC PDU type carried in the type header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum FrameType {
    Beacon,
    Unicast,
    Broadcast,
    /// Not rejected structurally; header length lookup yields 0 so callers
    /// reject it before touching the payload.
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            1 => FrameType::Beacon,
            2 => FrameType::Unicast,
            3 => FrameType::Broadcast,
            other => FrameType::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(value: FrameType) -> Self {
        match value {
            FrameType::Beacon => 1,
            FrameType::Unicast => 2,
            FrameType::Broadcast => 3,
            FrameType::Unknown(other) => other,
        }
    }
}

/// First octet of every MAC PDU.
///
/// ```txt
/// +---------+----------+------------+
/// | Version | Security | Frame type |
/// +---------+----------+------------+
///    2 bits    2 bits      4 bits
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TypeHeader {
    pub version: u8,
    pub security: u8,
    pub frame_type: FrameType,
}

impl TypeHeader {
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            version: 0,
            security: 0,
            frame_type,
        }
    }
}

impl TryRead<'_> for TypeHeader {
    fn try_read(bytes: &[u8], _ctx: ()) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        let byte: u8 = bytes.read(offset)?;
        Ok((
            Self {
                version: byte >> 6,
                security: (byte >> 4) & 0x03,
                frame_type: FrameType::from(byte & 0x0f),
            },
            *offset,
        ))
    }
}

impl TryWrite for TypeHeader {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write(
            offset,
            (self.version << 6) | ((self.security & 0x03) << 4) | (u8::from(self.frame_type) & 0x0f),
        )?;
        Ok(*offset)
    }
}

const RESET: u8 = 0b0001_0000;

/// Common header following the type header; layout depends on frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum CommonHeader {
    /// ```txt
    /// +---------------------+-----------------+
    /// | Network ID (24 MSB) |  Transmitter ID |
    /// +---------------------+-----------------+
    ///        3 octets             4 octets
    /// ```
    Beacon {
        network_id_ms24: u32,
        transmitter_id: u32,
    },
    /// ```txt
    /// +----------+-------+-----------------+-------------+----------------+
    /// | Reserved | Reset | Sequence number | Receiver ID | Transmitter ID |
    /// +----------+-------+-----------------+-------------+----------------+
    ///    3 bits    1 bit      12 bits          4 octets        4 octets
    /// ```
    Unicast {
        reset: bool,
        sequence_number: u16,
        receiver_id: u32,
        transmitter_id: u32,
    },
    /// As unicast, without the receiver id.
    Broadcast {
        reset: bool,
        sequence_number: u16,
        transmitter_id: u32,
    },
}

impl CommonHeader {
    pub fn transmitter_id(&self) -> u32 {
        match *self {
            CommonHeader::Beacon { transmitter_id, .. }
            | CommonHeader::Unicast { transmitter_id, .. }
            | CommonHeader::Broadcast { transmitter_id, .. } => transmitter_id,
        }
    }

    pub fn sequence_number(&self) -> Option<u16> {
        match *self {
            CommonHeader::Beacon { .. } => None,
            CommonHeader::Unicast {
                sequence_number, ..
            }
            | CommonHeader::Broadcast {
                sequence_number, ..
            } => Some(sequence_number),
        }
    }
}

impl TryRead<'_, FrameType> for CommonHeader {
    fn try_read(bytes: &[u8], frame_type: FrameType) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        check_len(bytes, 1)?;

        match frame_type {
            FrameType::Beacon => {
                check_len(bytes, 7)?;
                let hi: u8 = bytes.read(offset)?;
                let mid: u16 = bytes.read_with(offset, BE)?;
                let network_id_ms24 = ((hi as u32) << 16) | mid as u32;
                let transmitter_id = bytes.read_with(offset, BE)?;
                Ok((
                    Self::Beacon {
                        network_id_ms24,
                        transmitter_id,
                    },
                    *offset,
                ))
            }
            FrameType::Unicast => {
                check_len(bytes, 10)?;
                let b0: u8 = bytes.read(offset)?;
                let b1: u8 = bytes.read(offset)?;
                let receiver_id = bytes.read_with(offset, BE)?;
                let transmitter_id = bytes.read_with(offset, BE)?;
                Ok((
                    Self::Unicast {
                        reset: b0 & RESET != 0,
                        sequence_number: (((b0 & 0x0f) as u16) << 8) | b1 as u16,
                        receiver_id,
                        transmitter_id,
                    },
                    *offset,
                ))
            }
            FrameType::Broadcast => {
                check_len(bytes, 6)?;
                let b0: u8 = bytes.read(offset)?;
                let b1: u8 = bytes.read(offset)?;
                let transmitter_id = bytes.read_with(offset, BE)?;
                Ok((
                    Self::Broadcast {
                        reset: b0 & RESET != 0,
                        sequence_number: (((b0 & 0x0f) as u16) << 8) | b1 as u16,
                        transmitter_id,
                    },
                    *offset,
                ))
            }
            FrameType::Unknown(_) => Err(byte::Error::BadInput {
                err: "unsupported frame type",
            }),
        }
    }
}

impl TryWrite for CommonHeader {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;
        match self {
            CommonHeader::Beacon {
                network_id_ms24,
                transmitter_id,
            } => {
                bytes.write(offset, (network_id_ms24 >> 16) as u8)?;
                bytes.write_with(offset, (network_id_ms24 & 0xffff) as u16, BE)?;
                bytes.write_with(offset, transmitter_id, BE)?;
            }
            CommonHeader::Unicast {
                reset,
                sequence_number,
                receiver_id,
                transmitter_id,
            } => {
                let reset = if reset { RESET } else { 0 };
                bytes.write(offset, reset | ((sequence_number >> 8) as u8 & 0x0f))?;
                bytes.write(offset, (sequence_number & 0xff) as u8)?;
                bytes.write_with(offset, receiver_id, BE)?;
                bytes.write_with(offset, transmitter_id, BE)?;
            }
            CommonHeader::Broadcast {
                reset,
                sequence_number,
                transmitter_id,
            } => {
                let reset = if reset { RESET } else { 0 };
                bytes.write(offset, reset | ((sequence_number >> 8) as u8 & 0x0f))?;
                bytes.write(offset, (sequence_number & 0xff) as u8)?;
                bytes.write_with(offset, transmitter_id, BE)?;
            }
        }
        Ok(*offset)
    }
}

/// Combined type + common header length for a frame type.
///
/// Returns 0 for unsupported types; callers must treat that as a hard
/// reject.
pub fn header_length(frame_type: FrameType) -> usize {
    match frame_type {
        FrameType::Beacon => 1 + 7,
        FrameType::Unicast => 1 + 10,
        FrameType::Broadcast => 1 + 6,
        FrameType::Unknown(_) => 0,
    }
}

// Physical data channel capacity in octets: first slot, then a constant gain
// per additional slot (the first slot also carries the synchronization and
// control fields).
const PDC_CAPACITY: [(usize, usize); 5] = [(17, 20), (37, 40), (57, 60), (77, 80), (117, 120)];

/// Octets the physical data channel carries for `slots` slots at `mcs`.
pub fn pdc_bytes(mcs: u8, slots: u8) -> Option<usize> {
    if slots == 0 || slots > MAX_TX_SLOTS {
        return None;
    }
    let (first, step) = *PDC_CAPACITY.get(mcs as usize)?;
    Some(first + (slots as usize - 1) * step)
}

/// Smallest slot count whose capacity fits `len` octets at `mcs`.
///
/// Errors with [WireError::TooLarge] instead of ever truncating.
pub fn slots_needed(mcs: u8, len: usize) -> Result<u8, WireError> {
    let (first, step) = *PDC_CAPACITY
        .get(mcs as usize)
        .ok_or(WireError::UnsupportedMcs)?;

    if len <= first {
        return Ok(1);
    }
    let slots = 1 + len.saturating_sub(first).div_ceil(step);
    if slots > MAX_TX_SLOTS as usize {
        return Err(WireError::TooLarge);
    }
    Ok(slots as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_type_header() {
        let data = [0b01_01_0001u8];
        let mut len = 0;
        let th: TypeHeader = data.read(&mut len).unwrap();
        assert_eq!(len, 1);
        assert_eq!(th.version, 1);
        assert_eq!(th.security, 1);
        assert_eq!(th.frame_type, FrameType::Beacon);

        // an unknown frame type is passed through, not rejected
        let data = [0x0fu8];
        let th: TypeHeader = data.read(&mut 0).unwrap();
        assert_eq!(th.frame_type, FrameType::Unknown(15));
        assert_eq!(header_length(th.frame_type), 0);
    }

    #[test]
    fn type_header_needs_one_byte() {
        let data: [u8; 0] = [];
        assert!(data.read::<TypeHeader>(&mut 0).is_err());
    }

    #[test]
    fn common_header_round_trip() {
        let headers = [
            (
                FrameType::Beacon,
                CommonHeader::Beacon {
                    network_id_ms24: 0x123456,
                    transmitter_id: 0xdeadbeef,
                },
                7,
            ),
            (
                FrameType::Unicast,
                CommonHeader::Unicast {
                    reset: true,
                    sequence_number: 0x0abc,
                    receiver_id: 42,
                    transmitter_id: 38,
                },
                10,
            ),
            (
                FrameType::Broadcast,
                CommonHeader::Broadcast {
                    reset: false,
                    sequence_number: 7,
                    transmitter_id: 38,
                },
                6,
            ),
        ];

        for (frame_type, header, expected_len) in headers {
            let mut buffer = [0u8; 16];
            let mut len = 0;
            buffer.write(&mut len, header).unwrap();
            assert_eq!(len, expected_len);

            let mut read_len = 0;
            let decoded: CommonHeader = buffer[..len].read_with(&mut read_len, frame_type).unwrap();
            assert_eq!(read_len, expected_len);
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn common_header_rejects_short_buffer() {
        let data = [0u8; 3];
        assert!(data
            .read_with::<CommonHeader>(&mut 0, FrameType::Unicast)
            .is_err());
        assert!(data
            .read_with::<CommonHeader>(&mut 0, FrameType::Beacon)
            .is_err());
    }

    #[test]
    fn beacon_header_wire_layout() {
        let header = CommonHeader::Beacon {
            network_id_ms24: 0x123456,
            transmitter_id: 0x00000026,
        };
        let mut buffer = [0u8; 7];
        let mut len = 0;
        buffer.write(&mut len, header).unwrap();
        assert_eq!(buffer, [0x12, 0x34, 0x56, 0x00, 0x00, 0x00, 0x26]);
    }

    #[test]
    fn capacity_table() {
        assert_eq!(pdc_bytes(0, 1), Some(17));
        assert_eq!(pdc_bytes(0, 2), Some(37));
        assert_eq!(pdc_bytes(4, 16), Some(117 + 15 * 120));
        assert_eq!(pdc_bytes(5, 1), None);
        assert_eq!(pdc_bytes(0, 0), None);
        assert_eq!(pdc_bytes(0, 17), None);
    }

    #[test]
    fn slots_needed_bounds() {
        assert_eq!(slots_needed(0, 0), Ok(1));
        assert_eq!(slots_needed(0, 17), Ok(1));
        assert_eq!(slots_needed(0, 18), Ok(2));
        assert_eq!(slots_needed(0, 37), Ok(2));
        // 16 slots of MCS0 carry 317 octets
        assert_eq!(slots_needed(0, 317), Ok(16));
        assert_eq!(slots_needed(0, 318), Err(WireError::TooLarge));
        assert_eq!(slots_needed(9, 1), Err(WireError::UnsupportedMcs));
    }
}
