//! Demultiplexing of received MAC PDUs.
//!
//! [ReceiveDispatcher::handle] is invoked once per received radio frame
//! from the receive-completion context: it must not block, allocate or
//! log anything heavier than the compiled-in level filters allow.

use crate::{
    config::{MacRole, RadioConfig, ScheduleMode},
    mac::{
        assoc_table::AssociationTable, beacon::BeaconController, AssociationClient, NeighborSink,
    },
    phy::{RadioScheduler, ReceptionMetadata},
    wire::{
        assoc::{RejectCause, ScheduleModeExt, EXT_TYPE_SCHEDULE_MODE},
        decode_sub_pdus, header_length, CommonHeader, SubPdu, TypeHeader,
    },
};

use byte::BytesExt;

/// Routes decoded sub-PDUs to the association table, the beacon controller
/// and the external sinks.
pub struct ReceiveDispatcher<'a> {
    config: &'a RadioConfig,
    table: &'a AssociationTable,
    beacon: &'a BeaconController<'a>,
}

impl<'a> ReceiveDispatcher<'a> {
    pub fn new(
        config: &'a RadioConfig,
        table: &'a AssociationTable,
        beacon: &'a BeaconController<'a>,
    ) -> Self {
        Self {
            config,
            table,
            beacon,
        }
    }

    fn decode_headers(bytes: &[u8]) -> Option<(TypeHeader, CommonHeader, usize)> {
        // Need the type header octet plus at least one common header octet.
        if bytes.len() < 2 {
            return None;
        }

        let type_header: TypeHeader = bytes.read(&mut 0).ok()?;
        let common_header: CommonHeader = bytes[1..]
            .read_with(&mut 0, type_header.frame_type)
            .ok()?;

        let header_len = header_length(type_header.frame_type);
        if header_len == 0 || header_len > bytes.len() {
            return None;
        }

        Some((type_header, common_header, header_len))
    }

    /// Handle one received frame. Returns whether the frame was handled;
    /// `false` means no side effect took place.
    pub fn handle(
        &self,
        bytes: &[u8],
        meta: &ReceptionMetadata,
        neighbors: &mut impl NeighborSink,
        client: &mut impl AssociationClient,
    ) -> bool {
        let Some((_, common_header, header_len)) = Self::decode_headers(bytes) else {
            return false;
        };

        let payload = &bytes[header_len..];
        if payload.is_empty() {
            // Handled, nothing to decode.
            return true;
        }

        let Ok(sub_pdus) = decode_sub_pdus(payload) else {
            trace!("Dropping frame with undecodable sub-PDU list");
            return false;
        };

        let mut beacon_msg = None;
        let mut rach_ie = None;
        let mut association_resp = None;

        for sub_pdu in &sub_pdus {
            match sub_pdu {
                SubPdu::ClusterBeacon(beacon) => beacon_msg = Some(*beacon),
                // There can be several of these; keep the last.
                SubPdu::RandomAccessResource(ie) => rach_ie = Some(*ie),
                SubPdu::AssociationResponse(response) => association_resp = Some(*response),
                SubPdu::AssociationRelease(release) => {
                    trace!(
                        "Peer {} released association: {:?}",
                        common_header.transmitter_id(),
                        release.cause
                    );
                    let _ = self.table.remove(common_header.transmitter_id());
                }
                _ => {}
            }
        }

        if let (Some(beacon), Some(rach)) = (beacon_msg, rach_ie) {
            let network_id_ms24 = match common_header {
                CommonHeader::Beacon {
                    network_id_ms24, ..
                } => network_id_ms24,
                _ => 0,
            };
            neighbors.store_and_update(
                meta.time,
                meta.channel,
                network_id_ms24,
                meta.short_network_id,
                common_header.transmitter_id(),
                meta.transmitter_short_id,
                &beacon,
                &rach,
                self.beacon.is_running(),
            );
        }

        if let Some(response) = association_resp {
            client.handle_association_response(&common_header, &response);
        }

        true
    }

    /// Coordinator-side direct dispatch for frames received in the random
    /// access windows.
    ///
    /// Every successfully decoded common header refreshes the association
    /// table best-effort, regardless of the sub-PDU content; some peer
    /// traffic does not decode into an enumerated message type and the
    /// table must stay warm anyway.
    pub fn handle_direct(
        &self,
        sched: &mut impl RadioScheduler,
        bytes: &[u8],
        meta: &ReceptionMetadata,
    ) -> bool {
        let Some((_, common_header, header_len)) = Self::decode_headers(bytes) else {
            return false;
        };

        if self.config.schedule.role == MacRole::Coordinator {
            let _ = self.table.upsert(
                common_header.transmitter_id(),
                meta.transmitter_short_id,
                meta.rssi_dbm,
                meta.time,
            );
        }

        let payload = &bytes[header_len..];
        if payload.is_empty() {
            return true;
        }

        let Ok(sub_pdus) = decode_sub_pdus(payload) else {
            return false;
        };

        // A peer advertises its scheduling mode in a vendor extension; a
        // fixed-mode coordinator only accepts fixed-mode peers.
        let mut peer_advertises_fixed = false;
        for sub_pdu in &sub_pdus {
            if let SubPdu::VendorExtension { sub_type, data } = sub_pdu {
                if *sub_type == EXT_TYPE_SCHEDULE_MODE {
                    if let Ok(ext) = data.read::<ScheduleModeExt>(&mut 0) {
                        peer_advertises_fixed = ext.mode == ScheduleMode::Fixed;
                    }
                }
            }
        }

        for sub_pdu in &sub_pdus {
            if let SubPdu::AssociationRequest(request) = sub_pdu {
                if self.config.schedule.mode == ScheduleMode::Fixed && !peer_advertises_fixed {
                    debug!(
                        "Rejecting association from {}: peer does not advertise fixed mode",
                        common_header.transmitter_id()
                    );
                    self.beacon.reject(
                        sched,
                        meta,
                        &common_header,
                        RejectCause::IncompatibleOperatingMode,
                    );
                    continue;
                }

                self.beacon
                    .handle_association_request(sched, self.table, meta, &common_header, request);
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mac::beacon::{BeaconStartParams, BeaconStopCause},
        phy::PacketLengthType,
        time::Instant,
        wire::{
            assoc::{AssociationRelease, AssociationResponse, ReleaseCause},
            beacon::{ClusterBeacon, RandomAccessResourceIe},
            encode_sub_pdus, FrameType,
        },
    };

    #[derive(Default)]
    struct RecordingSink {
        beacons: std::vec::Vec<(u32, u32, u8)>,
    }

    impl NeighborSink for RecordingSink {
        #[allow(clippy::too_many_arguments)]
        fn store_and_update(
            &mut self,
            _time: Instant,
            _channel: u16,
            network_id_ms24: u32,
            _short_network_id: u8,
            transmitter_id: u32,
            _transmitter_short_id: u16,
            beacon: &ClusterBeacon,
            _rach_ie: &RandomAccessResourceIe,
            _verbose: bool,
        ) {
            self.beacons
                .push((network_id_ms24, transmitter_id, beacon.system_frame_number));
        }
    }

    #[derive(Default)]
    struct RecordingClient {
        responses: std::vec::Vec<(u32, bool)>,
    }

    impl AssociationClient for RecordingClient {
        fn handle_association_response(
            &mut self,
            common_header: &CommonHeader,
            response: &AssociationResponse,
        ) {
            self.responses
                .push((common_header.transmitter_id(), response.ack));
        }
    }

    fn meta() -> ReceptionMetadata {
        ReceptionMetadata {
            time: Instant::from_ticks(1_000_000),
            channel: 1665,
            rssi_dbm: -55,
            mcs: 0,
            transmitter_short_id: 0x1234,
            short_network_id: 0x78,
            length_type: PacketLengthType::Slots,
            length: 2,
        }
    }

    fn encode_frame(common_header: CommonHeader, sub_pdus: &[SubPdu<'_>]) -> std::vec::Vec<u8> {
        let frame_type = match common_header {
            CommonHeader::Beacon { .. } => FrameType::Beacon,
            CommonHeader::Unicast { .. } => FrameType::Unicast,
            CommonHeader::Broadcast { .. } => FrameType::Broadcast,
        };

        let mut buffer = [0u8; 256];
        let mut offset = 0;
        buffer.write(&mut offset, TypeHeader::new(frame_type)).unwrap();
        buffer.write(&mut offset, common_header).unwrap();
        encode_sub_pdus(&mut buffer, &mut offset, sub_pdus).unwrap();
        buffer[..offset].to_vec()
    }

    #[test]
    fn short_buffer_is_not_handled() {
        let config = RadioConfig::default();
        let table = AssociationTable::new(4);
        let beacon = BeaconController::new(&config);
        let dispatcher = ReceiveDispatcher::new(&config, &table, &beacon);

        let mut sink = RecordingSink::default();
        let mut client = RecordingClient::default();

        assert!(!dispatcher.handle(&[], &meta(), &mut sink, &mut client));
        assert!(!dispatcher.handle(&[0x02], &meta(), &mut sink, &mut client));
        // unicast frame type with a buffer shorter than its header
        assert!(!dispatcher.handle(&[0x02, 0x00, 0x01], &meta(), &mut sink, &mut client));
        assert!(sink.beacons.is_empty());
    }

    #[test]
    fn empty_payload_is_handled_without_side_effects() {
        let config = RadioConfig::default();
        let table = AssociationTable::new(4);
        let beacon = BeaconController::new(&config);
        let dispatcher = ReceiveDispatcher::new(&config, &table, &beacon);

        let frame = encode_frame(
            CommonHeader::Beacon {
                network_id_ms24: 0x123456,
                transmitter_id: 99,
            },
            &[],
        );

        let mut sink = RecordingSink::default();
        let mut client = RecordingClient::default();
        assert!(dispatcher.handle(&frame, &meta(), &mut sink, &mut client));
        assert!(sink.beacons.is_empty());
        assert!(client.responses.is_empty());
    }

    #[test]
    fn beacon_and_rach_pair_reaches_the_neighbor_sink() {
        let config = RadioConfig::default();
        let table = AssociationTable::new(4);
        let beacon = BeaconController::new(&config);
        let dispatcher = ReceiveDispatcher::new(&config, &table, &beacon);

        let beacon_msg = ClusterBeacon {
            system_frame_number: 12,
            max_tx_power: Some(4),
            ..Default::default()
        };
        let frame = encode_frame(
            CommonHeader::Beacon {
                network_id_ms24: 0x123456,
                transmitter_id: 99,
            },
            &[
                SubPdu::ClusterBeacon(beacon_msg),
                SubPdu::RandomAccessResource(RandomAccessResourceIe::default()),
            ],
        );

        let mut sink = RecordingSink::default();
        let mut client = RecordingClient::default();
        assert!(dispatcher.handle(&frame, &meta(), &mut sink, &mut client));
        assert_eq!(sink.beacons, vec![(0x123456, 99, 12)]);
    }

    #[test]
    fn beacon_without_rach_is_not_forwarded() {
        let config = RadioConfig::default();
        let table = AssociationTable::new(4);
        let beacon = BeaconController::new(&config);
        let dispatcher = ReceiveDispatcher::new(&config, &table, &beacon);

        let frame = encode_frame(
            CommonHeader::Beacon {
                network_id_ms24: 0x123456,
                transmitter_id: 99,
            },
            &[SubPdu::ClusterBeacon(ClusterBeacon::default())],
        );

        let mut sink = RecordingSink::default();
        let mut client = RecordingClient::default();
        assert!(dispatcher.handle(&frame, &meta(), &mut sink, &mut client));
        assert!(sink.beacons.is_empty());
    }

    #[test]
    fn release_removes_the_table_entry() {
        let config = RadioConfig::default();
        let table = AssociationTable::new(4);
        let beacon = BeaconController::new(&config);
        let dispatcher = ReceiveDispatcher::new(&config, &table, &beacon);

        table.upsert(99, 0x1234, -60, Instant::from_ticks(0)).unwrap();
        assert_eq!(table.count(), 1);

        let frame = encode_frame(
            CommonHeader::Broadcast {
                reset: false,
                sequence_number: 1,
                transmitter_id: 99,
            },
            &[SubPdu::AssociationRelease(AssociationRelease {
                cause: ReleaseCause::ConnectionTermination,
            })],
        );

        let mut sink = RecordingSink::default();
        let mut client = RecordingClient::default();
        assert!(dispatcher.handle(&frame, &meta(), &mut sink, &mut client));
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn association_response_reaches_the_client() {
        let config = RadioConfig::default();
        let table = AssociationTable::new(4);
        let beacon = BeaconController::new(&config);
        let dispatcher = ReceiveDispatcher::new(&config, &table, &beacon);

        let frame = encode_frame(
            CommonHeader::Unicast {
                reset: true,
                sequence_number: 5,
                receiver_id: config.long_rd_id,
                transmitter_id: 77,
            },
            &[SubPdu::AssociationResponse(
                AssociationResponse::accept_all(),
            )],
        );

        let mut sink = RecordingSink::default();
        let mut client = RecordingClient::default();
        assert!(dispatcher.handle(&frame, &meta(), &mut sink, &mut client));
        assert_eq!(client.responses, vec![(77, true)]);
    }

    #[test]
    fn truncated_sub_pdu_fails_the_whole_frame() {
        let config = RadioConfig::default();
        let table = AssociationTable::new(4);
        let beacon = BeaconController::new(&config);
        let dispatcher = ReceiveDispatcher::new(&config, &table, &beacon);

        table.upsert(99, 0x1234, -60, Instant::from_ticks(0)).unwrap();

        let mut frame = encode_frame(
            CommonHeader::Broadcast {
                reset: false,
                sequence_number: 1,
                transmitter_id: 99,
            },
            &[SubPdu::AssociationRelease(AssociationRelease {
                cause: ReleaseCause::ConnectionTermination,
            })],
        );
        // corrupt the declared sub-PDU length so it overruns the buffer
        let header_len = header_length(FrameType::Broadcast);
        frame[header_len + 1] = 200;

        let mut sink = RecordingSink::default();
        let mut client = RecordingClient::default();
        assert!(!dispatcher.handle(&frame, &meta(), &mut sink, &mut client));
        // no partial effect: the release was never applied
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn direct_dispatch_warms_the_table() {
        let config = RadioConfig::default();
        let table = AssociationTable::new(4);
        let beacon = BeaconController::new(&config);
        let dispatcher = ReceiveDispatcher::new(&config, &table, &beacon);
        let mut sched = crate::test_helpers::FakeScheduler::default();

        // a frame with no enumerated sub-PDU at all
        let frame = encode_frame(
            CommonHeader::Broadcast {
                reset: false,
                sequence_number: 1,
                transmitter_id: 1234,
            },
            &[SubPdu::Unknown {
                ie_type: 33,
                data: &[0xaa],
            }],
        );

        assert!(dispatcher.handle_direct(&mut sched, &frame, &meta()));
        assert_eq!(table.lookup_index(1234), Some(1));
    }

    #[test]
    fn lms_beacon_collision_stops_and_retracts() {
        let config = RadioConfig::default();
        let table = AssociationTable::new(4);
        let beacon = BeaconController::new(&config);
        let mut sched = crate::test_helpers::FakeScheduler::default();

        beacon
            .start(
                &mut sched,
                Instant::from_ticks(0),
                BeaconStartParams {
                    channel: 1665,
                    tx_power_dbm: -12,
                },
            )
            .unwrap();
        assert!(beacon.is_running());

        // busy sample (above -71 dBm) inside the first beacon symbol
        let mut samples = [-90i8; 240];
        samples[0] = -60;
        beacon.on_rssi_measurement(&mut sched, &samples);

        assert!(!beacon.is_running());
        assert_eq!(
            beacon.status().last_stop_cause,
            Some(BeaconStopCause::LmsBeaconCollision)
        );
        assert!(sched.tx_jobs.is_empty());
        assert!(sched.rx_jobs.is_empty());
        assert!(sched.rssi_jobs.is_empty());
    }
}
