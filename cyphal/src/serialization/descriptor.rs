//! Type descriptors: the read-only shape of a DSDL type.
//!
//! Descriptors are produced elsewhere (by a code generator reading DSDL
//! text, out of scope here) and shared immutably for the life of the
//! process. [`Rc`] is used rather than `Arc` since the whole crate assumes a
//! single-threaded cooperative executor (see the crate's concurrency
//! story); cross-thread sharing needs external synchronization regardless.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::types::DataTypeId;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PrimitiveKind {
    Bool,
    UnsignedInt,
    SignedInt,
    Float,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CastMode {
    Saturated,
    Truncated,
}

/// Inclusive numeric bounds used by saturated/truncated casts. Floats are
/// stored bit-for-bit as `f64` for range comparison; integers as `i64`,
/// which comfortably holds every legal `bitlen <= 64` unsigned or signed
/// range this engine supports except the full unsigned 64-bit span, which
/// is handled specially in the codec.
#[derive(Copy, Clone, Debug)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArrayMode {
    Static,
    Dynamic,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompoundKind {
    Message,
    Service,
}

#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub descriptor: Rc<Descriptor>,
}

/// A named constant. Constants aren't packed; they exist for the benefit of
/// callers that want named values (e.g. enumerations encoded as uint8).
#[derive(Clone, Debug)]
pub struct Constant {
    pub name: String,
    pub value: f64,
}

#[derive(Clone, Debug)]
pub struct CompoundDescriptor {
    pub kind: CompoundKind,
    pub data_type_id: DataTypeId,
    /// CRC-16 seed for the transfer payload; `None` for single-frame-only
    /// types that never need one (still fine to carry zero in practice).
    pub base_crc: u16,
    pub signature: u64,
    pub fields: Vec<Field>,
    pub constants: Vec<Constant>,
    pub is_union: bool,
    /// Populated only when `kind == Service`: the response side's own field
    /// list, constants and union flag.
    pub response: Option<(Vec<Field>, Vec<Constant>, bool)>,
}

#[derive(Clone, Debug)]
pub enum Descriptor {
    Void {
        bitlen: u8,
    },
    Primitive {
        kind: PrimitiveKind,
        bitlen: u8,
        cast_mode: CastMode,
        range: ValueRange,
        /// True for `uint8`/`uint7` arrays the generator marked string-like,
        /// enabling UTF-8 string assignment through `set`.
        string_like: bool,
    },
    Array {
        mode: ArrayMode,
        value_type: Rc<Descriptor>,
        max_size: usize,
        /// Tail-array optimization: the length prefix is omitted when this
        /// array is the last field of its enclosing composite and the
        /// element width is >= 8 bits. Computed once at descriptor build
        /// time rather than re-derived on every pack/unpack call.
        tao: bool,
    },
    Compound(CompoundDescriptor),
}

impl Descriptor {
    /// Bit width of the union tag needed to select among `n_fields` arms:
    /// `max(1, ceil(log2(n)))`.
    pub fn union_tag_width(n_fields: usize) -> u8 {
        if n_fields <= 1 {
            return 1;
        }
        let mut width = 0u8;
        while (1usize << width) < n_fields {
            width += 1;
        }
        width.max(1)
    }

    /// Whether an array of `max_size` elements of `element_bitlen` width,
    /// placed as the last field of its enclosing composite, qualifies for
    /// tail-array optimization. Only dynamic arrays benefit; static arrays
    /// have no length prefix to omit in the first place.
    pub fn array_qualifies_for_tao(mode: ArrayMode, element_bitlen: u32, is_last_field: bool) -> bool {
        mode == ArrayMode::Dynamic && is_last_field && element_bitlen >= 8
    }
}
