//! Value trees: a mutable, one-for-one mirror of a [`Descriptor`].

use alloc::vec::Vec;

use crate::InvalidFieldAccess;
use crate::serialization::descriptor::{ArrayMode, CompoundDescriptor, Descriptor};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PrimitiveValue {
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
}

impl Default for PrimitiveValue {
    fn default() -> Self {
        PrimitiveValue::UInt(0)
    }
}

/// An ordered field-name -> value mapping, plus (for unions) the selector of
/// the currently active arm.
#[derive(Clone, Debug)]
pub struct CompositeValue {
    pub fields: Vec<Value>,
    /// Index into `fields`. Always `Some` for unions (defaults to the first
    /// field per the "resolves to first field on read" rule) and unused for
    /// plain structs.
    pub active_field: Option<usize>,
}

#[derive(Clone, Debug)]
pub enum Value {
    Void,
    Primitive(PrimitiveValue),
    Array(Vec<Value>),
    Composite(CompositeValue),
}

/// A single step of a field/index path into a value tree.
pub enum PathSegment<'a> {
    Field(&'a str),
    Index(usize),
}

impl Value {
    /// Builds a default-initialized tree: static arrays pre-populate
    /// `max_size` default children, primitives default to numeric zero, and
    /// unions default to their first field active.
    pub fn new(descriptor: &Descriptor) -> Value {
        match descriptor {
            Descriptor::Void { .. } => Value::Void,
            Descriptor::Primitive { .. } => Value::Primitive(PrimitiveValue::default()),
            Descriptor::Array {
                mode,
                value_type,
                max_size,
                ..
            } => {
                let count = if *mode == ArrayMode::Static { *max_size } else { 0 };
                Value::Array((0..count).map(|_| Value::new(value_type)).collect())
            }
            Descriptor::Compound(compound) => Value::Composite(Self::new_composite(&compound.fields, compound.is_union)),
        }
    }

    fn new_composite(fields: &[super::descriptor::Field], is_union: bool) -> CompositeValue {
        CompositeValue {
            fields: fields.iter().map(|f| Value::new(&f.descriptor)).collect(),
            active_field: if is_union { Some(0) } else { None },
        }
    }

    /// Builds the request or response side of a service compound.
    pub fn new_service_side(compound: &CompoundDescriptor, response: bool) -> Value {
        if response {
            let (fields, _, is_union) = compound
                .response
                .as_ref()
                .expect("service descriptor missing response side");
            Value::Composite(Self::new_composite(fields, *is_union))
        } else {
            Value::Composite(Self::new_composite(&compound.fields, compound.is_union))
        }
    }

    pub fn as_primitive(&self) -> Option<PrimitiveValue> {
        match self {
            Value::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeValue> {
        match self {
            Value::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Field access by name against a known descriptor. Returns
    /// `InvalidFieldAccess::UnknownField` for a name the descriptor doesn't
    /// have, and `NotActiveUnionField` if the field exists but is not the
    /// active arm of a union.
    pub fn get_field<'a>(
        &'a self,
        name: &str,
        fields: &[super::descriptor::Field],
    ) -> Result<&'a Value, InvalidFieldAccess> {
        let index = fields
            .iter()
            .position(|f| f.name == name)
            .ok_or(InvalidFieldAccess::UnknownField)?;

        let composite = match self {
            Value::Composite(c) => c,
            _ => return Err(InvalidFieldAccess::UnknownField),
        };

        if let Some(active) = composite.active_field {
            if active != index {
                return Err(InvalidFieldAccess::NotActiveUnionField);
            }
        }

        Ok(&composite.fields[index])
    }

    /// Mutable field access. Setting a union field implicitly activates it,
    /// matching the "assignment implies selection" union semantics.
    pub fn set_field(
        &mut self,
        name: &str,
        fields: &[super::descriptor::Field],
        new_value: Value,
    ) -> Result<(), InvalidFieldAccess> {
        let index = fields
            .iter()
            .position(|f| f.name == name)
            .ok_or(InvalidFieldAccess::UnknownField)?;

        let composite = match self {
            Value::Composite(c) => c,
            _ => return Err(InvalidFieldAccess::UnknownField),
        };

        if composite.active_field.is_some() {
            composite.active_field = Some(index);
        }
        composite.fields[index] = new_value;
        Ok(())
    }

    /// Assigns a UTF-8 string into a string-like `uint8`/`uint7` array
    /// field, one byte-valued element per codepoint byte.
    pub fn set_string(&mut self, s: &str) {
        let items: Vec<Value> = s.bytes().map(|b| Value::Primitive(PrimitiveValue::UInt(b as u64))).collect();
        *self = Value::Array(items);
    }

    pub fn get_path<'a>(&'a self, path: &[PathSegment], fields: &[super::descriptor::Field]) -> Option<&'a Value> {
        let mut current = self;
        let mut current_fields = fields;
        for segment in path {
            match segment {
                PathSegment::Field(name) => {
                    current = current.get_field(name, current_fields).ok()?;
                    // Without per-node descriptor tracking we can't recurse
                    // into a nested compound's own field list here; callers
                    // wanting multi-level paths through compounds should
                    // walk level by level with the matching descriptor at
                    // each step instead.
                    current_fields = &[];
                }
                PathSegment::Index(i) => {
                    current = current.as_array()?.get(*i)?;
                }
            }
        }
        Some(current)
    }
}
