//! The MAC layer proper: association table, static schedule math, the
//! coordinator beacon lifecycle and the receive dispatcher.

use crate::{
    time::Instant,
    wire::{
        assoc::AssociationResponse,
        beacon::{ClusterBeacon, RandomAccessResourceIe},
        CommonHeader,
    },
};

pub mod assoc_table;
pub mod beacon;
pub mod dispatch;
pub mod sched_fixed;

pub use assoc_table::{AssocError, AssociationTable, PeerEntry};
pub use beacon::{
    BeaconController, BeaconError, BeaconStartParams, BeaconStatus, BeaconStopCause,
};
pub use dispatch::ReceiveDispatcher;

/// Collects beacons heard from other coordinators. External collaborator;
/// must be callable from the receive-completion context.
pub trait NeighborSink {
    #[allow(clippy::too_many_arguments)]
    fn store_and_update(
        &mut self,
        time: Instant,
        channel: u16,
        network_id_ms24: u32,
        short_network_id: u8,
        transmitter_id: u32,
        transmitter_short_id: u16,
        beacon: &ClusterBeacon,
        rach_ie: &RandomAccessResourceIe,
        verbose: bool,
    );
}

/// Peer-side handling of association responses. External collaborator.
pub trait AssociationClient {
    fn handle_association_response(
        &mut self,
        common_header: &CommonHeader,
        response: &AssociationResponse,
    );
}
