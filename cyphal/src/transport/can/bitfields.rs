//! 29-bit CAN identifier encoding, and the tail byte that terminates every
//! UAVCAN/CAN frame payload.
//!
//! Bit layout of the 29-bit identifier (bit 0 is the LSB):
//!
//! ```text
//! message:    28..24 priority | 23..8 data_type_id (16) | 7 =0 | 6..0 source_node_id
//! anonymous:  28..24 priority | 23..10 discriminator (14) | 9..8 data_type_id (2) | 7 =0 | 6..0 =0
//! service:    28..24 priority | 23..16 data_type_id (8) | 15 request/response | 14..8 dest_node_id | 7 =1 | 6..0 source_node_id
//! ```
//!
//! This is the legacy (29-bit, v0) UAVCAN/CAN layout: every one of the 29
//! bits is assigned in every frame kind, so there are no reserved padding
//! bits to check for — the only structural invalid case is a service frame
//! whose source and destination node IDs coincide.

use num_traits::FromPrimitive;

use crate::types::{DataSpecifier, DataTypeId, NodeId, ServiceId, ServiceRole, SubjectId};
use crate::{Priority, TransferId};

const SOURCE_NODE_ID_SHIFT: u32 = 0;
const SERVICE_NOT_MESSAGE_SHIFT: u32 = 7;
const PRIORITY_SHIFT: u32 = 24;
const PRIORITY_MASK: u32 = 0x1F;

const MESSAGE_DATA_TYPE_SHIFT: u32 = 8;
const MESSAGE_DATA_TYPE_MASK: u32 = 0xFFFF;

const ANON_DISCRIMINATOR_SHIFT: u32 = 10;
const ANON_DISCRIMINATOR_MASK: u32 = 0x3FFF;
const ANON_DATA_TYPE_MASK: u32 = 0x3;

const SERVICE_DEST_SHIFT: u32 = 8;
const SERVICE_REQUEST_SHIFT: u32 = 15;
const SERVICE_DATA_TYPE_SHIFT: u32 = 16;
const SERVICE_DATA_TYPE_MASK: u32 = 0xFF;

/// The last byte of every non-empty UAVCAN/CAN frame payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TailByte(pub u8);

impl TailByte {
    const START_OF_TRANSFER: u8 = 0x80;
    const END_OF_TRANSFER: u8 = 0x40;
    const TOGGLE: u8 = 0x20;
    const TRANSFER_ID_MASK: u8 = 0x1F;

    pub fn new(start: bool, end: bool, toggle: bool, transfer_id: TransferId) -> Self {
        let mut byte = transfer_id & Self::TRANSFER_ID_MASK;
        if start {
            byte |= Self::START_OF_TRANSFER;
        }
        if end {
            byte |= Self::END_OF_TRANSFER;
        }
        if toggle {
            byte |= Self::TOGGLE;
        }
        Self(byte)
    }

    pub fn start_of_transfer(&self) -> bool {
        self.0 & Self::START_OF_TRANSFER != 0
    }

    pub fn end_of_transfer(&self) -> bool {
        self.0 & Self::END_OF_TRANSFER != 0
    }

    pub fn toggle(&self) -> bool {
        self.0 & Self::TOGGLE != 0
    }

    pub fn transfer_id(&self) -> TransferId {
        self.0 & Self::TRANSFER_ID_MASK
    }
}

/// A CAN-ID known to carry a message transfer (anonymous or addressed).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CanMessageId(pub u32);

impl CanMessageId {
    pub fn new(priority: Priority, subject_id: SubjectId, source_node_id: Option<NodeId>) -> Self {
        let mut id = (priority as u32 & PRIORITY_MASK) << PRIORITY_SHIFT;
        match source_node_id {
            Some(source) => {
                id |= (source as u32) << SOURCE_NODE_ID_SHIFT;
                id |= (subject_id as u32 & MESSAGE_DATA_TYPE_MASK) << MESSAGE_DATA_TYPE_SHIFT;
            }
            None => {
                // Anonymous: the discriminator takes the place of a real subject ID.
                // Callers that need a full 14-bit discriminator should use
                // `new_anonymous` instead; this constructs the common case where
                // `subject_id` narrowly fits as a discriminator seed.
                id |= (subject_id as u32 & ANON_DISCRIMINATOR_MASK) << ANON_DISCRIMINATOR_SHIFT;
            }
        }
        Self(id)
    }

    pub fn new_anonymous(priority: Priority, discriminator: u16, data_type_id: DataTypeId) -> Self {
        let id = ((priority as u32 & PRIORITY_MASK) << PRIORITY_SHIFT)
            | ((discriminator as u32 & ANON_DISCRIMINATOR_MASK) << ANON_DISCRIMINATOR_SHIFT)
            | ((data_type_id as u32 & ANON_DATA_TYPE_MASK) << MESSAGE_DATA_TYPE_SHIFT);
        Self(id)
    }

    pub fn is_svc(&self) -> bool {
        self.0 & (1 << SERVICE_NOT_MESSAGE_SHIFT) != 0
    }

    pub fn is_anon(&self) -> bool {
        self.source_id() == 0
    }

    pub fn priority(&self) -> u8 {
        ((self.0 >> PRIORITY_SHIFT) & PRIORITY_MASK) as u8
    }

    pub fn source_id(&self) -> NodeId {
        (self.0 & crate::types::NODE_ID_MASK as u32) as NodeId
    }

    pub fn subject_id(&self) -> SubjectId {
        ((self.0 >> MESSAGE_DATA_TYPE_SHIFT) & MESSAGE_DATA_TYPE_MASK) as SubjectId
    }

    pub fn discriminator(&self) -> u16 {
        ((self.0 >> ANON_DISCRIMINATOR_SHIFT) & ANON_DISCRIMINATOR_MASK) as u16
    }

    /// Structural validity: this identifier must not claim to be a service
    /// frame.
    pub fn valid(&self) -> bool {
        !self.is_svc()
    }
}

/// A CAN-ID known to carry a service request or response transfer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CanServiceId(pub u32);

impl CanServiceId {
    pub fn new(
        priority: Priority,
        request: bool,
        service_id: ServiceId,
        destination_node_id: NodeId,
        source_node_id: NodeId,
    ) -> Self {
        let mut id = (priority as u32 & PRIORITY_MASK) << PRIORITY_SHIFT;
        id |= 1 << SERVICE_NOT_MESSAGE_SHIFT;
        id |= (source_node_id as u32) << SOURCE_NODE_ID_SHIFT;
        id |= (destination_node_id as u32) << SERVICE_DEST_SHIFT;
        if request {
            id |= 1 << SERVICE_REQUEST_SHIFT;
        }
        id |= (service_id as u32 & SERVICE_DATA_TYPE_MASK) << SERVICE_DATA_TYPE_SHIFT;
        Self(id)
    }

    pub fn is_svc(&self) -> bool {
        self.0 & (1 << SERVICE_NOT_MESSAGE_SHIFT) != 0
    }

    pub fn is_req(&self) -> bool {
        self.0 & (1 << SERVICE_REQUEST_SHIFT) != 0
    }

    pub fn priority(&self) -> u8 {
        ((self.0 >> PRIORITY_SHIFT) & PRIORITY_MASK) as u8
    }

    pub fn service_id(&self) -> ServiceId {
        ((self.0 >> SERVICE_DATA_TYPE_SHIFT) & SERVICE_DATA_TYPE_MASK) as ServiceId
    }

    pub fn source_id(&self) -> NodeId {
        (self.0 & crate::types::NODE_ID_MASK as u32) as NodeId
    }

    pub fn destination_id(&self) -> NodeId {
        ((self.0 >> SERVICE_DEST_SHIFT) & crate::types::NODE_ID_MASK as u32) as NodeId
    }

    /// Structural validity: a service frame's source and destination must
    /// differ (a node cannot call itself over the bus).
    pub fn valid(&self) -> bool {
        self.is_svc() && self.source_id() != self.destination_id()
    }
}

/// The classified form of a 29-bit identifier, as produced by [`try_parse`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParsedCanId {
    Message {
        priority: Priority,
        subject_id: SubjectId,
        source_node_id: NodeId,
    },
    AnonymousMessage {
        priority: Priority,
        discriminator: u16,
        data_type_id: u8,
    },
    Service {
        priority: Priority,
        service_id: ServiceId,
        request_or_response: bool,
        destination_node_id: NodeId,
        source_node_id: NodeId,
    },
}

/// Parses a raw 29-bit identifier, returning `None` for anything that
/// violates the UAVCAN/CAN layout. Frames that fail to parse must be
/// silently dropped by callers, never treated as an error.
pub fn try_parse(raw: u32) -> Option<ParsedCanId> {
    if CanServiceId(raw).is_svc() {
        let id = CanServiceId(raw);
        if !id.valid() {
            return None;
        }
        let priority = Priority::from_u8(id.priority())?;
        Some(ParsedCanId::Service {
            priority,
            service_id: id.service_id(),
            request_or_response: id.is_req(),
            destination_node_id: id.destination_id(),
            source_node_id: id.source_id(),
        })
    } else {
        let id = CanMessageId(raw);
        let priority = Priority::from_u8(id.priority())?;
        if id.is_anon() {
            Some(ParsedCanId::AnonymousMessage {
                priority,
                discriminator: id.discriminator(),
                data_type_id: (id.subject_id() & 0x3) as u8,
            })
        } else {
            Some(ParsedCanId::Message {
                priority,
                subject_id: id.subject_id(),
                source_node_id: id.source_id(),
            })
        }
    }
}

impl ParsedCanId {
    /// The data specifier this identifier addresses, from the perspective of
    /// an *input* session (a subscriber receiving this frame).
    pub fn to_input_data_specifier(&self) -> DataSpecifier {
        match *self {
            ParsedCanId::Message { subject_id, .. } => DataSpecifier::Message(subject_id),
            ParsedCanId::AnonymousMessage { .. } => {
                // Anonymous transfers don't carry a subject ID in this legacy
                // layout; callers match them by data_type_id out of band.
                DataSpecifier::Message(0)
            }
            ParsedCanId::Service {
                service_id,
                request_or_response,
                ..
            } => DataSpecifier::Service {
                service_id,
                role: if request_or_response {
                    ServiceRole::Server
                } else {
                    ServiceRole::Client
                },
            },
        }
    }

    /// The data specifier this identifier addresses, from the perspective of
    /// an *output* session (used to route loopback frames back to their
    /// sender).
    pub fn to_output_data_specifier(&self) -> DataSpecifier {
        match *self {
            ParsedCanId::Service {
                service_id,
                request_or_response,
                ..
            } => DataSpecifier::Service {
                service_id,
                role: if request_or_response {
                    ServiceRole::Client
                } else {
                    ServiceRole::Server
                },
            },
            _ => self.to_input_data_specifier(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_node_status_message_id() {
        let id = CanMessageId::new(Priority::High, 341, Some(42));
        assert_eq!(id.0, (16u32 << 24) | (341 << 8) | 42);
    }

    #[test]
    fn message_round_trips_through_try_parse() {
        let id = CanMessageId::new(Priority::Nominal, 100, Some(7));
        match try_parse(id.0).unwrap() {
            ParsedCanId::Message {
                subject_id,
                source_node_id,
                priority,
            } => {
                assert_eq!(subject_id, 100);
                assert_eq!(source_node_id, 7);
                assert_eq!(priority, Priority::Nominal);
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn service_frame_with_equal_source_and_dest_is_invalid() {
        let id = CanServiceId::new(Priority::Nominal, true, 10, 5, 5);
        assert!(try_parse(id.0).is_none());
    }

    #[test]
    fn service_round_trips_through_try_parse() {
        let id = CanServiceId::new(Priority::Low, true, 10, 42, 7);
        match try_parse(id.0).unwrap() {
            ParsedCanId::Service {
                service_id,
                request_or_response,
                destination_node_id,
                source_node_id,
                ..
            } => {
                assert_eq!(service_id, 10);
                assert!(request_or_response);
                assert_eq!(destination_node_id, 42);
                assert_eq!(source_node_id, 7);
            }
            other => panic!("expected Service, got {other:?}"),
        }
    }
}
