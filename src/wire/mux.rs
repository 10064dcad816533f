//! Sub-PDU multiplexing.
//!
//! Every sub-PDU is a mux header followed by its payload:
//!
//! ```txt
//! +-----------+---------+------------------+-----------------+---------+
//! | Extension | IE type | Length (0/1/2 B) | Ext. sub-type   | Payload |
//! +-----------+---------+------------------+-----------------+---------+
//!    2 bits     6 bits    per extension      1 B, EXTENSION only
//! ```
//!
//! The extension field selects the length encoding: no length field (fixed
//! size implied by the IE type), an 8-bit length, a 16-bit length, or a
//! short IE with a single payload octet.

use byte::{check_len, BytesExt, BE};
use heapless::Vec;

use crate::{
    consts::MAX_SUB_PDUS,
    wire::{
        assoc::{AssociationRelease, AssociationRequest, AssociationResponse},
        beacon::{ClusterBeacon, RandomAccessResourceIe},
        WireError,
    },
};

/// Information element type codes.
pub mod ie_type {
    pub const PADDING: u8 = 0;
    pub const SIGNALLING_FLOW1: u8 = 1;
    pub const SIGNALLING_FLOW2: u8 = 2;
    pub const USER_DATA_FLOW1: u8 = 3;
    pub const USER_DATA_FLOW2: u8 = 4;
    pub const USER_DATA_FLOW3: u8 = 5;
    pub const USER_DATA_FLOW4: u8 = 6;
    pub const NETWORK_BEACON: u8 = 8;
    pub const CLUSTER_BEACON: u8 = 9;
    pub const ASSOCIATION_REQ: u8 = 10;
    pub const ASSOCIATION_RESP: u8 = 11;
    pub const ASSOCIATION_REL: u8 = 12;
    pub const RANDOM_ACCESS_RESOURCE: u8 = 19;
    pub const EXTENSION: u8 = 62;
}

const EXT_NO_LENGTH: u8 = 0;
const EXT_LEN8: u8 = 1;
const EXT_LEN16: u8 = 2;
const EXT_SHORT: u8 = 3;

/// One decoded sub-PDU. Variable payloads borrow from the receive buffer;
/// the list they live in is scoped to a single decode or dispatch call.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SubPdu<'a> {
    DataSdu { flow: u8, data: &'a [u8] },
    AssociationRequest(AssociationRequest),
    AssociationResponse(AssociationResponse),
    AssociationRelease(AssociationRelease),
    ClusterBeacon(ClusterBeacon),
    RandomAccessResource(RandomAccessResourceIe),
    VendorExtension { sub_type: u8, data: &'a [u8] },
    /// Payload byte count of a padding sub-PDU.
    Padding(u16),
    /// Forward compatibility: unknown IE types carry their raw bytes.
    Unknown { ie_type: u8, data: &'a [u8] },
}

fn is_data_flow(ie: u8) -> bool {
    (ie_type::SIGNALLING_FLOW1..=ie_type::USER_DATA_FLOW4).contains(&ie)
}

/// Decode a full sub-PDU list from the payload of a MAC PDU.
///
/// Any declared length that exceeds the remaining buffer fails the whole
/// call; a partially decoded list is never returned.
pub fn decode_sub_pdus(bytes: &[u8]) -> Result<Vec<SubPdu<'_>, MAX_SUB_PDUS>, WireError> {
    let mut out = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        let b0 = bytes[offset];
        offset += 1;

        let ext = b0 >> 6;
        let ie = b0 & 0x3f;

        let payload_len = match ext {
            EXT_LEN8 => {
                let len: u8 = bytes.read(&mut offset)?;
                len as usize
            }
            EXT_LEN16 => {
                let len: u16 = bytes.read_with(&mut offset, BE)?;
                len as usize
            }
            EXT_SHORT => 1,
            _ => match ie {
                // The only fixed-size IE this crate emits with no length
                // field is a single-octet padding header.
                ie_type::PADDING => 0,
                // Everything else with no length field extends to the end
                // of the PDU payload.
                _ => bytes.len() - offset,
            },
        };

        let sub_type = if ie == ie_type::EXTENSION {
            Some(bytes.read::<u8>(&mut offset)?)
        } else {
            None
        };

        if payload_len > bytes.len() - offset {
            return Err(WireError::Malformed);
        }
        let payload = &bytes[offset..offset + payload_len];
        offset += payload_len;

        let sub_pdu = match ie {
            ie_type::PADDING => SubPdu::Padding(payload_len as u16),
            ie_type::CLUSTER_BEACON => SubPdu::ClusterBeacon(payload.read(&mut 0)?),
            ie_type::RANDOM_ACCESS_RESOURCE => {
                SubPdu::RandomAccessResource(payload.read(&mut 0)?)
            }
            ie_type::ASSOCIATION_REQ => SubPdu::AssociationRequest(payload.read(&mut 0)?),
            ie_type::ASSOCIATION_RESP => SubPdu::AssociationResponse(payload.read(&mut 0)?),
            ie_type::ASSOCIATION_REL => SubPdu::AssociationRelease(payload.read(&mut 0)?),
            ie_type::EXTENSION => SubPdu::VendorExtension {
                sub_type: unwrap!(sub_type),
                data: payload,
            },
            flow if is_data_flow(flow) => SubPdu::DataSdu {
                flow,
                data: payload,
            },
            other => SubPdu::Unknown {
                ie_type: other,
                data: payload,
            },
        };

        out.push(sub_pdu).map_err(|_| WireError::Malformed)?;
    }

    Ok(out)
}

fn write_slice(bytes: &mut [u8], offset: &mut usize, data: &[u8]) -> byte::Result<()> {
    check_len(bytes, *offset + data.len())?;
    bytes[*offset..*offset + data.len()].copy_from_slice(data);
    *offset += data.len();
    Ok(())
}

fn write_mux_header(
    bytes: &mut [u8],
    offset: &mut usize,
    ext: u8,
    ie: u8,
    payload_len: usize,
) -> byte::Result<()> {
    bytes.write(offset, (ext << 6) | (ie & 0x3f))?;
    match ext {
        EXT_LEN8 => bytes.write(offset, payload_len as u8)?,
        EXT_LEN16 => bytes.write_with(offset, payload_len as u16, BE)?,
        _ => {}
    }
    Ok(())
}

fn length_ext(payload_len: usize) -> u8 {
    if payload_len <= u8::MAX as usize {
        EXT_LEN8
    } else {
        EXT_LEN16
    }
}

/// Append one sub-PDU to the output cursor.
pub fn encode_sub_pdu(
    bytes: &mut [u8],
    offset: &mut usize,
    sub_pdu: &SubPdu<'_>,
) -> Result<(), WireError> {
    match sub_pdu {
        SubPdu::DataSdu { flow, data } => {
            write_mux_header(bytes, offset, length_ext(data.len()), *flow, data.len())?;
            write_slice(bytes, offset, data)?;
        }
        SubPdu::AssociationRequest(request) => {
            let len = request.encoded_len();
            write_mux_header(bytes, offset, EXT_LEN8, ie_type::ASSOCIATION_REQ, len)?;
            bytes.write(offset, *request)?;
        }
        SubPdu::AssociationResponse(response) => {
            let len = response.encoded_len();
            write_mux_header(bytes, offset, EXT_LEN8, ie_type::ASSOCIATION_RESP, len)?;
            bytes.write(offset, *response)?;
        }
        SubPdu::AssociationRelease(release) => {
            let len = release.encoded_len();
            write_mux_header(bytes, offset, EXT_LEN8, ie_type::ASSOCIATION_REL, len)?;
            bytes.write(offset, *release)?;
        }
        SubPdu::ClusterBeacon(beacon) => {
            let len = beacon.encoded_len();
            write_mux_header(bytes, offset, EXT_LEN8, ie_type::CLUSTER_BEACON, len)?;
            bytes.write(offset, *beacon)?;
        }
        SubPdu::RandomAccessResource(ie) => {
            let len = ie.encoded_len();
            write_mux_header(bytes, offset, EXT_LEN8, ie_type::RANDOM_ACCESS_RESOURCE, len)?;
            bytes.write(offset, *ie)?;
        }
        SubPdu::VendorExtension { sub_type, data } => {
            // Vendor extensions always use the 16-bit length form.
            write_mux_header(bytes, offset, EXT_LEN16, ie_type::EXTENSION, data.len())?;
            bytes.write(offset, *sub_type)?;
            write_slice(bytes, offset, data)?;
        }
        SubPdu::Padding(len) => {
            add_padding(bytes, offset, mux_overhead(*len as usize) + *len as usize)?;
        }
        SubPdu::Unknown { ie_type, data } => {
            write_mux_header(bytes, offset, length_ext(data.len()), *ie_type, data.len())?;
            write_slice(bytes, offset, data)?;
        }
    }
    Ok(())
}

fn mux_overhead(payload_len: usize) -> usize {
    if payload_len == 0 {
        1
    } else if payload_len <= u8::MAX as usize {
        2
    } else {
        3
    }
}

/// Append sub-PDUs to the output cursor, in order.
pub fn encode_sub_pdus(
    bytes: &mut [u8],
    offset: &mut usize,
    sub_pdus: &[SubPdu<'_>],
) -> Result<(), WireError> {
    for sub_pdu in sub_pdus {
        encode_sub_pdu(bytes, offset, sub_pdu)?;
    }
    Ok(())
}

/// Append deterministic padding sub-PDUs occupying exactly `need` bytes.
///
/// A single byte of padding is a bare mux header; anything larger is an
/// 8-bit-length padding sub-PDU with a zeroed payload, chunked when `need`
/// exceeds what one length octet can declare.
pub fn add_padding(bytes: &mut [u8], offset: &mut usize, need: usize) -> Result<(), WireError> {
    let mut need = need;

    while need > 0 {
        if need == 1 {
            write_mux_header(bytes, offset, EXT_NO_LENGTH, ie_type::PADDING, 0)?;
            need = 0;
        } else {
            let chunk = need.min(2 + u8::MAX as usize);
            let payload_len = chunk - 2;
            write_mux_header(bytes, offset, EXT_LEN8, ie_type::PADDING, payload_len)?;
            for _ in 0..payload_len {
                bytes.write(offset, 0u8)?;
            }
            need -= chunk;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::assoc::RejectCause;

    #[test]
    fn decode_beacon_sub_pdus() {
        // cluster beacon (5 bytes) + RACH IE (7 bytes), both 8-bit length
        let data = [
            0x49, 5, 42, 0x10, 0x06, 0x00, 0x0b, // cluster beacon
            0x53, 7, 0x08, 18, 0x82, 0xa0, 0xd7, 2, 16, // rach ie
        ];

        let sub_pdus = decode_sub_pdus(&data).unwrap();
        assert_eq!(sub_pdus.len(), 2);
        assert!(matches!(sub_pdus[0], SubPdu::ClusterBeacon(b) if b.system_frame_number == 42));
        assert!(matches!(
            sub_pdus[1],
            SubPdu::RandomAccessResource(ie) if ie.start_subslot == 18
        ));
    }

    #[test]
    fn declared_length_must_fit() {
        // 8-bit length form declaring 10 bytes with only 2 present
        let data = [0x49, 10, 0x00, 0x00];
        assert_eq!(decode_sub_pdus(&data), Err(WireError::Malformed));

        // 16-bit length form running past the end
        let data = [0x80 | 9, 0x01, 0x00];
        assert_eq!(decode_sub_pdus(&data), Err(WireError::Malformed));
    }

    #[test]
    fn unknown_ie_is_passed_through() {
        let data = [0x40 | 33, 3, 0xaa, 0xbb, 0xcc];
        let sub_pdus = decode_sub_pdus(&data).unwrap();
        assert_eq!(
            sub_pdus[0],
            SubPdu::Unknown {
                ie_type: 33,
                data: &[0xaa, 0xbb, 0xcc],
            }
        );
    }

    #[test]
    fn vendor_extension_round_trip() {
        let mut buffer = [0u8; 16];
        let mut offset = 0;
        encode_sub_pdu(
            &mut buffer,
            &mut offset,
            &SubPdu::VendorExtension {
                sub_type: 0xa2,
                data: &[1, 1],
            },
        )
        .unwrap();
        // 1 header + 2 length + 1 sub-type + 2 payload
        assert_eq!(offset, 6);
        assert_eq!(buffer[..offset], [0x80 | 62, 0x00, 0x02, 0xa2, 0x01, 0x01]);

        let sub_pdus = decode_sub_pdus(&buffer[..offset]).unwrap();
        assert_eq!(
            sub_pdus[0],
            SubPdu::VendorExtension {
                sub_type: 0xa2,
                data: &[1, 1],
            }
        );
    }

    #[test]
    fn association_response_round_trip() {
        let response = AssociationResponse::reject(RejectCause::NoRadioCapacity);

        let mut buffer = [0u8; 16];
        let mut offset = 0;
        encode_sub_pdu(&mut buffer, &mut offset, &SubPdu::AssociationResponse(response)).unwrap();

        let sub_pdus = decode_sub_pdus(&buffer[..offset]).unwrap();
        assert_eq!(sub_pdus[0], SubPdu::AssociationResponse(response));
    }

    #[test]
    fn padding_fills_exactly() {
        for need in [1usize, 2, 3, 17, 255, 258, 300] {
            let mut buffer = [0u8; 512];
            let mut offset = 0;
            add_padding(&mut buffer, &mut offset, need).unwrap();
            assert_eq!(offset, need, "padding for need = {need}");

            let sub_pdus = decode_sub_pdus(&buffer[..offset]).unwrap();
            for sub_pdu in &sub_pdus {
                assert!(matches!(sub_pdu, SubPdu::Padding(_)));
            }
        }
    }

    #[test]
    fn short_form_carries_one_octet() {
        let data = [0xc0 | 33, 0x5a];
        let sub_pdus = decode_sub_pdus(&data).unwrap();
        assert_eq!(
            sub_pdus[0],
            SubPdu::Unknown {
                ie_type: 33,
                data: &[0x5a],
            }
        );
    }

    #[test]
    fn truncated_mux_header_is_rejected() {
        // 8-bit length form with no length octet
        let data = [0x40 | 9];
        assert!(decode_sub_pdus(&data).is_err());
    }
}
