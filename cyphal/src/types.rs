//! Protocol-level identifier types shared across the transport, transfer and
//! session layers.

/// A node identifier, 0..=127. `0` is only valid as a *source* in an
/// anonymous message transfer; it is never a valid destination.
pub type NodeId = u8;

/// Mask for a node ID field: node IDs occupy the low 7 bits of whatever
/// field they appear in.
pub const NODE_ID_MASK: u8 = 0x7F;

/// Number of distinct node IDs, including the anonymous pseudo-ID.
pub const NUM_NODE_IDS: usize = NODE_ID_MASK as usize + 1;

/// A 5-bit transfer-id, incremented modulo 32 per session.
pub type TransferId = u8;

/// Mask for the transfer-id field of the tail byte.
pub const TRANSFER_ID_MASK: u8 = 0x1F;

/// Modulo of the transfer-id counter.
pub const TRANSFER_ID_MODULO: u8 = TRANSFER_ID_MASK + 1;

/// A message subject ID, 0..=8191 (13 bits).
pub type SubjectId = u16;

/// Mask for a 13-bit subject ID field.
pub const SUBJECT_ID_MASK: u16 = 0x1FFF;

/// Number of distinct subjects.
pub const NUM_SUBJECTS: usize = SUBJECT_ID_MASK as usize + 1;

/// A service ID, 0..=255 (8 bits in the legacy UAVCAN/CAN identifier layout
/// this crate implements).
pub type ServiceId = u8;

/// Mask for an 8-bit service ID field.
pub const SERVICE_ID_MASK: u8 = 0xFF;

/// Number of distinct services.
pub const NUM_SERVICES: usize = SERVICE_ID_MASK as usize + 1;

/// A DSDL data-type ID, as carried by a type descriptor. Width depends on
/// transfer kind (16 bits for messages, 8 bits for services, 2 bits for
/// anonymous messages); stored widened to `u16` everywhere off the wire.
pub type DataTypeId = u16;

/// A generic "port" ID: a subject ID for messages, a service ID for
/// services. Used by code that doesn't care which.
pub type PortId = u16;

/// Which side of a service exchange a data specifier or session refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ServiceRole {
    /// The requesting side: sends requests, receives responses.
    Client,
    /// The serving side: receives requests, sends responses.
    Server,
}

/// Abstract address of a communication channel, independent of node IDs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DataSpecifier {
    /// A publish/subscribe subject.
    Message(SubjectId),
    /// A request/response service, qualified by which side of the exchange
    /// this specifier names.
    Service {
        service_id: ServiceId,
        role: ServiceRole,
    },
}
