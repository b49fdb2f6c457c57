//! Session routing: ties the frame/transfer layer to user-facing publish/
//! subscribe and request/response endpoints.
//!
//! [`dispatch`] holds the O(1) inbound table, [`registry`] the hashed
//! outbound map, and [`facade`] wires both of them plus a [`transfer::TransferManager`](crate::transfer::TransferManager)
//! to a [`facade::Media`] implementation.

pub mod dispatch;
pub mod facade;

#[cfg(feature = "std")]
pub mod registry;

pub use dispatch::{InputDispatchTable, InputSession, dispatch_index};
pub use facade::{CanTransport, Media, SendError};

#[cfg(feature = "std")]
pub use registry::{OutputRegistry, OutputSession};
