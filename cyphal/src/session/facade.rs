//! The transport façade: the single entry point an application talks to.
//!
//! [`CanTransport`] owns a [`Node`], the inbound [`InputDispatchTable`] and
//! (on `std`) the outbound [`OutputRegistry`], and drives a caller-supplied
//! [`Media`] implementation. Everything below this layer is transport- and
//! dispatch-agnostic; this is where a subject ID turns into bytes on a wire.

use alloc::rc::Rc;

use crate::node::{Node, TransmitFrameError};
use crate::serialization::descriptor::Descriptor;
use crate::serialization::value::Value;
use crate::serialization::{max_byte_length, pack, pack_service_side, unpack, unpack_service_side};
use crate::session::dispatch::{InputDispatchTable, InputSession};
use crate::time::Timestamp;
use crate::transfer::manager::{CreateTransferError, InternalOrUserError, TokenAccessError};
use crate::transfer::{TransferKind, TransferManager, TransferMetadata};
use crate::transport::Transport;
use crate::types::{DataSpecifier, NodeId, PortId, ServiceRole, TRANSFER_ID_MODULO};
use crate::{InvalidTransportConfiguration, MediaError, Priority, RxError, SerializationError};

#[cfg(feature = "std")]
use crate::session::registry::{OutputRegistry, OutputSession};

/// A filter a [`Media`] implementation can use to narrow down which CAN IDs
/// it bothers delivering to `on_frame_received`. Exact enforcement is up to
/// the media implementation (a hardware acceptance filter, a software mask,
/// or nothing at all); this crate does its own validation regardless.
#[derive(Copy, Clone, Debug)]
pub struct AcceptanceFilter {
    pub data_specifier: DataSpecifier,
    pub source: Option<NodeId>,
}

/// The link-layer driver this façade talks to. Implemented by whatever owns
/// the actual CAN controller; this crate never talks to hardware directly.
pub trait Media<C: embedded_time::Clock> {
    type Frame;

    /// Maximum number of payload bytes a single frame of this medium can
    /// carry, tail byte included (8 for classic CAN, up to 64 for CAN FD).
    const MAX_DATA_FIELD_LENGTH: usize;

    /// Transmits one frame. `deadline` is advisory: implementations that
    /// can't meet it should still attempt the send rather than silently
    /// drop it, but may report [`MediaError`] if the medium is clearly
    /// unable to keep up.
    fn send(&mut self, frame: &Self::Frame, deadline: Timestamp<C>) -> Result<(), MediaError>;

    /// Installs (or loosens) a hardware/software acceptance filter. A no-op
    /// is always a legal implementation; filtering is an optimization, not
    /// a correctness requirement, since [`CanTransport`] re-validates every
    /// frame it's handed regardless.
    fn configure_acceptance_filters(&mut self, filters: &[AcceptanceFilter]);

    /// Enables automatic hardware retransmission of frames that lost
    /// arbitration or weren't acknowledged. Called once, right after a local
    /// node ID is assigned: before that point frames go out anonymously and
    /// aren't expected to be retried.
    fn enable_automatic_retransmission(&mut self);

    /// Releases any resources tied to this medium (closing a socket, idling
    /// a peripheral). Called once from [`CanTransport::close`].
    fn close(&mut self);
}

/// Errors from [`CanTransport::send`].
#[derive(Copy, Clone, Debug)]
pub enum SendError {
    /// The output session was already closed.
    SessionClosed,
    /// The caller's deadline had already passed before the first frame was
    /// ever handed to the medium; nothing was transmitted.
    DeadlineExpired,
    Serialization(SerializationError),
    Transfer(CreateTransferError),
    Token(TokenAccessError),
    Frame(TransmitFrameError),
    Media(MediaError),
}

/// Ties a [`Node`] (frame/transfer layer), an [`InputDispatchTable`]
/// (inbound routing) and, on `std`, an [`OutputRegistry`] (outbound
/// sessions) to a [`Media`] implementation.
pub struct CanTransport<M, C, T, Med>
where
    M: TransferManager<C, T>,
    C: embedded_time::Clock,
    T: Transport<C>,
    Med: Media<C, Frame = T::Frame>,
{
    node: Node<M, C, T>,
    inputs: InputDispatchTable<C>,
    #[cfg(feature = "std")]
    outputs: OutputRegistry,
    _media: core::marker::PhantomData<Med>,
}

/// Static facts about the bus this façade is running on, as handed to the
/// application layer by `protocol_parameters`.
#[derive(Copy, Clone, Debug)]
pub struct ProtocolParameters {
    pub transfer_id_modulo: u8,
    pub node_id_cardinality: usize,
    /// The largest payload that fits in a single frame without triggering
    /// multi-frame fragmentation (medium capacity minus the tail byte).
    pub single_frame_capacity: usize,
}

impl<M, C, T, Med> CanTransport<M, C, T, Med>
where
    M: TransferManager<C, T>,
    C: embedded_time::Clock,
    T: Transport<C>,
    Med: Media<C, Frame = T::Frame>,
{
    pub fn new(transfer_manager: M) -> Self {
        Self {
            node: Node::new(None, transfer_manager),
            inputs: InputDispatchTable::new(),
            #[cfg(feature = "std")]
            outputs: OutputRegistry::new(),
            _media: core::marker::PhantomData,
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.node.node_id()
    }

    /// Assigns this node's identifier. Can only be called once: UAVCAN
    /// nodes don't change identity mid-session, and every output session's
    /// source address is derived from it at creation time. Once the ID is
    /// set, the medium is told to start retransmitting automatically and to
    /// reconfigure its acceptance filters, since frames addressed to this
    /// node can now actually be named.
    pub fn set_local_node_id(&mut self, id: NodeId, media: &mut Med) -> Result<(), InvalidTransportConfiguration> {
        if self.node.node_id().is_some() {
            return Err(InvalidTransportConfiguration::AlreadyAssigned);
        }
        if id as usize >= crate::types::NUM_NODE_IDS {
            return Err(InvalidTransportConfiguration::NodeIdOutOfRange);
        }
        self.node.set_node_id(id);
        media.enable_automatic_retransmission();
        media.configure_acceptance_filters(&[]);
        Ok(())
    }

    pub fn protocol_parameters(&self) -> ProtocolParameters {
        ProtocolParameters {
            transfer_id_modulo: TRANSFER_ID_MODULO,
            node_id_cardinality: crate::types::NUM_NODE_IDS,
            single_frame_capacity: Med::MAX_DATA_FIELD_LENGTH - 1,
        }
    }

    /// Gets (or lazily creates) the promiscuous input for `data_specifier`
    /// — delivers every transfer on that subject/service regardless of
    /// sender.
    pub fn get_promiscuous_input(
        &mut self,
        data_specifier: DataSpecifier,
        descriptor: Rc<Descriptor>,
        backlog_capacity: usize,
    ) -> Rc<InputSession<C>> {
        self.inputs.get_or_create(data_specifier, None, backlog_capacity, || descriptor)
    }

    /// Gets (or lazily creates) the selective input for `data_specifier`
    /// from exactly `source` — used for service responses, which must be
    /// matched to the node a request was sent to.
    pub fn get_selective_input(
        &mut self,
        data_specifier: DataSpecifier,
        source: NodeId,
        descriptor: Rc<Descriptor>,
        backlog_capacity: usize,
    ) -> Rc<InputSession<C>> {
        self.inputs
            .get_or_create(data_specifier, Some(source), backlog_capacity, || descriptor)
    }

    pub fn close_input(&mut self, data_specifier: DataSpecifier, source: Option<NodeId>) {
        self.inputs.close(data_specifier, source);
    }

    #[cfg(feature = "std")]
    pub fn get_broadcast_output(
        &mut self,
        data_specifier: DataSpecifier,
        descriptor: Rc<Descriptor>,
    ) -> Rc<OutputSession> {
        self.outputs.get_or_create(data_specifier, None, || descriptor)
    }

    #[cfg(feature = "std")]
    pub fn get_unicast_output(
        &mut self,
        data_specifier: DataSpecifier,
        destination: NodeId,
        descriptor: Rc<Descriptor>,
    ) -> Rc<OutputSession> {
        self.outputs.get_or_create(data_specifier, Some(destination), || descriptor)
    }

    #[cfg(feature = "std")]
    pub fn close_output(&mut self, data_specifier: DataSpecifier, destination: Option<NodeId>) {
        self.outputs.close(data_specifier, destination);
    }

    /// Tears down every session and releases the medium. Sessions already
    /// holding an `Rc` observe `is_closed()`/an empty dispatch slot rather
    /// than a dangling reference.
    pub fn close(&mut self, media: &mut Med) {
        #[cfg(feature = "std")]
        self.outputs.clear();
        media.close();
    }

    /// Packs `value` and hands it to `media` one frame at a time, fragmenting
    /// as needed. Returns `Ok(false)` if `timestamp` was already past
    /// `deadline` when called (nothing sent); `Ok(true)` once every frame
    /// has been handed to the medium. Frames already sent before a mid-flight
    /// [`MediaError`] are not, and cannot be, rolled back.
    #[cfg(feature = "std")]
    pub fn send(
        &mut self,
        output: &OutputSession,
        value: &Value,
        priority: Priority,
        timestamp: Timestamp<C>,
        deadline: Timestamp<C>,
        media: &mut Med,
    ) -> Result<bool, SendError> {
        if output.is_closed() {
            return Err(SendError::SessionClosed);
        }
        if timestamp > deadline {
            return Ok(false);
        }

        let (transfer_kind, port_id) = data_specifier_to_outbound(output.data_specifier);
        let base_crc = match output.descriptor.as_ref() {
            Descriptor::Compound(compound) => compound.base_crc,
            _ => 0,
        };
        let metadata = TransferMetadata {
            timestamp,
            priority,
            transfer_kind,
            port_id,
            remote_node_id: output.destination,
            transfer_id: output.next_transfer_id(),
            data_type_crc: base_crc,
        };

        let requested_buffer_size = max_byte_length(&output.descriptor);
        let descriptor = output.descriptor.clone();
        let is_response = matches!(transfer_kind, TransferKind::Response);

        let create_result = self.node.transfer_manager.create_transmission(
            requested_buffer_size,
            &metadata,
            move |buf| -> Result<usize, SerializationError> {
                let mut writer = crate::serialization::bits::BitWriter::new(buf);
                match descriptor.as_ref() {
                    Descriptor::Compound(compound) if compound.response.is_some() => {
                        pack_service_side(value, compound, is_response, &mut writer)?;
                    }
                    other => pack(value, other, &mut writer)?,
                }
                Ok(writer.bit_position().div_ceil(8))
            },
        );

        let mut token = match create_result {
            Ok(token) => token,
            Err(InternalOrUserError::InternalError(e)) => return Err(SendError::Transfer(e)),
            Err(InternalOrUserError::UserError(e)) => return Err(SendError::Serialization(e)),
        };

        loop {
            let (frame, next_token) = self
                .node
                .transmit_frame(token, timestamp)
                .map_err(SendError::Frame)?;
            media.send(&frame, deadline).map_err(SendError::Media)?;
            match next_token {
                Some(next) => token = next,
                None => break,
            }
        }

        Ok(true)
    }

    /// Ingests one received frame: advances the underlying transfer
    /// reassembly, and on completion unpacks and delivers to whichever
    /// selective/promiscuous input sessions match.
    pub fn on_frame_received(&mut self, frame: &T::Frame) -> Result<(), RxError> {
        let completed = self.node.try_receive_frame(frame)?;
        let Some(token) = completed else {
            return Ok(());
        };

        let inputs = &self.inputs;
        if let Err(e) = self.node.transfer_manager.with_rx_transfer(token, |metadata, payload| {
            let data_specifier = match metadata.transfer_kind {
                TransferKind::Message => DataSpecifier::Message(metadata.port_id),
                TransferKind::Request => DataSpecifier::Service {
                    service_id: metadata.port_id as crate::types::ServiceId,
                    role: ServiceRole::Server,
                },
                TransferKind::Response => DataSpecifier::Service {
                    service_id: metadata.port_id as crate::types::ServiceId,
                    role: ServiceRole::Client,
                },
            };

            inputs.route(data_specifier, metadata.remote_node_id, metadata, |descriptor| {
                unpack_inbound(descriptor, metadata.transfer_kind, payload)
            });
        }) {
            log::warn!("rx token rejected by transfer manager after completion: {e:?}");
        }

        Ok(())
    }

    /// Routes a loopback frame (one the medium echoes back after a local
    /// `send`) back to the originating output session. Per the dispatch
    /// layer's design, a missing entry is logged, never treated as an
    /// error — loopback is a best-effort diagnostic aid, not a delivery
    /// guarantee.
    #[cfg(feature = "std")]
    pub fn handle_loopback(&self, parsed: crate::transport::can::ParsedCanId) {
        let data_specifier = parsed.to_output_data_specifier();
        let destination = match parsed {
            crate::transport::can::ParsedCanId::Service { source_node_id, .. } => Some(source_node_id),
            _ => None,
        };
        match self.outputs.find(data_specifier, destination) {
            Some(session) => session.handle_loopback_frame(),
            None => log::debug!("loopback frame for {data_specifier:?} matched no known output session"),
        }
    }
}

fn data_specifier_to_outbound(data_specifier: DataSpecifier) -> (TransferKind, PortId) {
    match data_specifier {
        DataSpecifier::Message(subject_id) => (TransferKind::Message, subject_id),
        DataSpecifier::Service { service_id, role } => {
            let kind = match role {
                ServiceRole::Client => TransferKind::Request,
                ServiceRole::Server => TransferKind::Response,
            };
            (kind, service_id as PortId)
        }
    }
}

fn unpack_inbound(descriptor: &Descriptor, transfer_kind: TransferKind, payload: &[u8]) -> Option<Value> {
    match descriptor {
        Descriptor::Compound(compound) if compound.response.is_some() => {
            let response = matches!(transfer_kind, TransferKind::Response);
            let mut reader = crate::serialization::bits::BitReader::new(payload);
            unpack_service_side(compound, response, &mut reader).ok()
        }
        other => {
            let mut reader = crate::serialization::bits::BitReader::new(payload);
            unpack(other, &mut reader).ok()
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::serialization::descriptor::{CompoundDescriptor, CompoundKind};
    use crate::transfer::map_manager::MapTransferManager;
    use crate::transport::can::Can;

    fn dummy_descriptor() -> Rc<Descriptor> {
        Rc::new(Descriptor::Compound(CompoundDescriptor {
            kind: CompoundKind::Message,
            data_type_id: 341,
            base_crc: 0,
            signature: 0,
            fields: alloc::vec::Vec::new(),
            constants: alloc::vec::Vec::new(),
            is_union: false,
            response: None,
        }))
    }

    #[test]
    fn protocol_parameters_reflect_medium_capacity() {
        struct FakeMedia;
        impl Media<crate::testing::TestClock> for FakeMedia {
            type Frame = <Can as Transport<crate::testing::TestClock>>::Frame;
            const MAX_DATA_FIELD_LENGTH: usize = 8;
            fn send(&mut self, _frame: &Self::Frame, _deadline: Timestamp<crate::testing::TestClock>) -> Result<(), MediaError> {
                Ok(())
            }
            fn configure_acceptance_filters(&mut self, _filters: &[AcceptanceFilter]) {}
            fn enable_automatic_retransmission(&mut self) {}
            fn close(&mut self) {}
        }

        let transport: CanTransport<MapTransferManager<crate::testing::TestClock, Can>, crate::testing::TestClock, Can, FakeMedia> =
            CanTransport::new(MapTransferManager::new());
        let params = transport.protocol_parameters();
        assert_eq!(params.single_frame_capacity, 7);
        assert_eq!(params.transfer_id_modulo, 32);
    }

    #[test]
    fn set_local_node_id_rejects_out_of_range_and_double_assignment() {
        struct FakeMedia;
        impl Media<crate::testing::TestClock> for FakeMedia {
            type Frame = <Can as Transport<crate::testing::TestClock>>::Frame;
            const MAX_DATA_FIELD_LENGTH: usize = 8;
            fn send(&mut self, _frame: &Self::Frame, _deadline: Timestamp<crate::testing::TestClock>) -> Result<(), MediaError> {
                Ok(())
            }
            fn configure_acceptance_filters(&mut self, _filters: &[AcceptanceFilter]) {}
            fn enable_automatic_retransmission(&mut self) {}
            fn close(&mut self) {}
        }

        let mut transport: CanTransport<MapTransferManager<crate::testing::TestClock, Can>, crate::testing::TestClock, Can, FakeMedia> =
            CanTransport::new(MapTransferManager::new());
        let mut media = FakeMedia;
        assert!(matches!(
            transport.set_local_node_id(200, &mut media),
            Err(InvalidTransportConfiguration::NodeIdOutOfRange)
        ));
        assert!(transport.set_local_node_id(42, &mut media).is_ok());
        assert!(matches!(
            transport.set_local_node_id(1, &mut media),
            Err(InvalidTransportConfiguration::AlreadyAssigned)
        ));
    }

    #[test]
    fn promiscuous_input_get_or_create_is_idempotent() {
        struct FakeMedia;
        impl Media<crate::testing::TestClock> for FakeMedia {
            type Frame = <Can as Transport<crate::testing::TestClock>>::Frame;
            const MAX_DATA_FIELD_LENGTH: usize = 8;
            fn send(&mut self, _frame: &Self::Frame, _deadline: Timestamp<crate::testing::TestClock>) -> Result<(), MediaError> {
                Ok(())
            }
            fn configure_acceptance_filters(&mut self, _filters: &[AcceptanceFilter]) {}
            fn enable_automatic_retransmission(&mut self) {}
            fn close(&mut self) {}
        }

        let mut transport: CanTransport<MapTransferManager<crate::testing::TestClock, Can>, crate::testing::TestClock, Can, FakeMedia> =
            CanTransport::new(MapTransferManager::new());
        let spec = DataSpecifier::Message(341);
        let a = transport.get_promiscuous_input(spec, dummy_descriptor(), 4);
        let b = transport.get_promiscuous_input(spec, dummy_descriptor(), 4);
        assert!(Rc::ptr_eq(&a, &b));
    }
}
