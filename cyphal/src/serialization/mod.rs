//! Typed value serialization: bit-stream primitives, type descriptors, the
//! value tree they describe, and the pack/unpack engine that moves between
//! the two.

pub mod bits;
pub mod codec;
pub mod descriptor;
pub mod value;

pub use codec::{max_bit_length, max_byte_length, pack, pack_into, pack_service_side, unpack, unpack_from, unpack_service_side};
pub use descriptor::Descriptor;
pub use value::Value;
