//! # Cyphal/UAVCAN transport core
//!
//! This crate reconstructs UAVCAN transfers out of a stream of raw CAN
//! frames, and fragments outgoing transfers back down into frames. It does
//! not know how to talk to a CAN bus (see the `Media` trait in
//! [`session::facade`]) and it does not parse DSDL text — it consumes a type
//! descriptor ([`serialization::descriptor`]) produced elsewhere and moves
//! bytes according to it.
//!
//! The pieces compose bottom-up:
//! - [`serialization`] packs and unpacks typed values to/from a bit stream.
//! - [`transfer`] reassembles/fragments multi-frame transfers and tracks
//!   per-session state via a pluggable [`transfer::TransferManager`].
//! - [`transport`] maps transfers onto a specific link layer (CAN today).
//! - [`session`] ties everything to a [`session::facade::Media`]
//!   implementation and routes inbound frames to subscribers in O(1).
#![no_std]
//#![deny(warnings)]

#[allow(unused_imports)]
#[cfg(feature = "std")]
#[macro_use]
extern crate std;

#[macro_use]
extern crate num_derive;

extern crate alloc;

pub mod serialization;
pub mod session;

#[cfg(test)]
mod testing;

pub mod time;

pub mod transfer;
pub mod transport;
pub mod types;

pub use node::{Node, TransmitFrameError};
use time::Duration;
pub use transfer::TransferKind;

pub use streaming_iterator::StreamingIterator;

mod node;

pub use types::*;

/// Protocol errors possible from receiving incoming frames.
#[derive(Copy, Clone, Debug)]
pub enum RxError {
    TransferStartMissingToggle,
    /// Anonymous transfers must only use a single frame
    AnonNotSingleFrame,
    /// Frames that are not last cannot have less than the maximum MTU
    NonLastUnderUtilization,
    /// No type of frame can contain empty data, must always have at least a tail byte
    FrameEmpty,
    /// Id field is formatted incorrectly
    InvalidCanId,
    /// Non-start frame received without session
    NewSessionNoStart,
    /// Session has expired
    Timeout,

    InvalidFrameOrdering,

    CrcError,

    InvalidPayload,

    /// Transport implementation has incorrectly assigned a remote node id to a message
    MessageWithRemoteId,
}

/// Errors that can be caused by incorrect parameters for transmission
///
/// TODO I should be able to capture these errors in the type system, making it impossible to do,
/// but this is still a first pass, so I'll leave them as runtime for now.
#[derive(Copy, Clone, Debug)]
pub enum TxError {
    AnonNotSingleFrame,
    ServiceNoSourceID,
    ServiceNoDestinationID,
}

/// Errors from misusing the transport-level configuration surface, e.g.
/// `set_local_node_id`.
#[derive(Copy, Clone, Debug)]
pub enum InvalidTransportConfiguration {
    /// The local node ID has already been assigned; it can only be set once.
    AlreadyAssigned,
    /// The requested node ID is outside 0..=127.
    NodeIdOutOfRange,
}

/// Raised by a value-tree accessor when the requested field is not the
/// active arm of a union, or does not exist.
#[derive(Copy, Clone, Debug)]
pub enum InvalidFieldAccess {
    /// The field exists, but is not the active union arm.
    NotActiveUnionField,
    /// No field with that name exists on the composite.
    UnknownField,
}

/// Errors raised by the pack/unpack engine.
#[derive(Copy, Clone, Debug)]
pub enum SerializationError {
    /// A saturated-cast value fell outside the type's range while strict
    /// mode was requested.
    ValueOutOfRange,
    /// A required field was never assigned a value before packing.
    FieldNotSet,
}

/// Pass-through error from the media driver.
#[derive(Copy, Clone, Debug)]
pub struct MediaError;

/// An outbound `send` missed its caller-supplied deadline. Frames already
/// emitted before the deadline are not rolled back.
#[derive(Copy, Clone, Debug)]
pub struct Timeout;

// TODO could replace with custom impl's to reduce dependencies
// TODO how could I represent more priorities for different transports?
/// Protocol-level priorities.
///
/// Transports are supposed to be able to support more than these base 8
/// priorities, but there is currently no API for that.
#[derive(FromPrimitive, ToPrimitive, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Hash)]
pub enum Priority {
    Exceptional,
    Immediate,
    Fast,
    High,
    Nominal,
    Low,
    Slow,
    Optional,
}

/// Simple subscription type to
// TODO remove this allow
#[allow(dead_code)]
pub struct Subscription {
    transfer_kind: TransferKind,
    port_id: PortId,
    extent: usize,
    timeout: Duration,
}

impl Subscription {
    pub fn new(
        transfer_kind: TransferKind,
        port_id: PortId,
        extent: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            transfer_kind,
            port_id,
            extent,
            timeout,
        }
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.transfer_kind == other.transfer_kind && self.port_id == other.port_id
    }
}
