//! The recursive pack/unpack engine: moves values between a [`Value`] tree
//! and a bit stream according to a [`Descriptor`], honoring cast modes,
//! tail-array optimization and union tag widths.

use alloc::vec::Vec;

use crate::SerializationError;
use crate::serialization::bits::{BitReader, BitWriter};
use crate::serialization::descriptor::{ArrayMode, CastMode, CompoundDescriptor, Descriptor, PrimitiveKind, ValueRange};
use crate::serialization::value::{CompositeValue, PrimitiveValue, Value};

/// Packs `value` according to `descriptor` into `buf`, returning the number
/// of bytes written (rounded up to the next byte boundary).
pub fn pack_into(value: &Value, descriptor: &Descriptor, buf: &mut [u8]) -> Result<usize, SerializationError> {
    let mut writer = BitWriter::new(buf);
    pack(value, descriptor, &mut writer)?;
    Ok(writer.bit_position().div_ceil(8))
}

/// Unpacks a value of the shape `descriptor` out of `buf`.
pub fn unpack_from(descriptor: &Descriptor, buf: &[u8]) -> Result<Value, SerializationError> {
    let mut reader = BitReader::new(buf);
    unpack(descriptor, &mut reader)
}

pub fn pack(value: &Value, descriptor: &Descriptor, writer: &mut BitWriter) -> Result<(), SerializationError> {
    match descriptor {
        Descriptor::Void { bitlen } => {
            writer.write_bits(0, *bitlen);
            Ok(())
        }
        Descriptor::Primitive {
            kind,
            bitlen,
            cast_mode,
            range,
            ..
        } => {
            let prim = value.as_primitive().ok_or(SerializationError::FieldNotSet)?;
            writer.write_bits(cast_to_bits(prim, *kind, *bitlen, *cast_mode, *range), *bitlen);
            Ok(())
        }
        Descriptor::Array {
            mode,
            value_type,
            max_size,
            tao,
        } => {
            let items = value.as_array().ok_or(SerializationError::FieldNotSet)?;
            match mode {
                ArrayMode::Static => {
                    for i in 0..*max_size {
                        match items.get(i) {
                            Some(item) => pack(item, value_type, writer)?,
                            None => pack(&Value::new(value_type), value_type, writer)?,
                        }
                    }
                }
                ArrayMode::Dynamic => {
                    if !*tao {
                        writer.write_bits(items.len() as u64, length_field_width(*max_size));
                    }
                    for item in items {
                        pack(item, value_type, writer)?;
                    }
                }
            }
            Ok(())
        }
        Descriptor::Compound(compound) => {
            let composite = value.as_composite().ok_or(SerializationError::FieldNotSet)?;
            if compound.is_union {
                let active = composite.active_field.ok_or(SerializationError::FieldNotSet)?;
                writer.write_bits(active as u64, Descriptor::union_tag_width(compound.fields.len()));
                pack(&composite.fields[active], &compound.fields[active].descriptor, writer)
            } else {
                for (field, value) in compound.fields.iter().zip(composite.fields.iter()) {
                    pack(value, &field.descriptor, writer)?;
                }
                Ok(())
            }
        }
    }
}

pub fn unpack(descriptor: &Descriptor, reader: &mut BitReader) -> Result<Value, SerializationError> {
    match descriptor {
        Descriptor::Void { bitlen } => {
            reader.read_bits(*bitlen);
            Ok(Value::Void)
        }
        Descriptor::Primitive { kind, bitlen, .. } => {
            let bits = reader.read_bits(*bitlen);
            Ok(Value::Primitive(bits_to_primitive(bits, *kind, *bitlen)))
        }
        Descriptor::Array {
            mode,
            value_type,
            max_size,
            tao,
        } => match mode {
            ArrayMode::Static => {
                let mut items = Vec::with_capacity(*max_size);
                for _ in 0..*max_size {
                    items.push(unpack(value_type, reader)?);
                }
                Ok(Value::Array(items))
            }
            ArrayMode::Dynamic => {
                if *tao {
                    let mut items = Vec::new();
                    while reader.remaining_bits() >= 8 && items.len() < *max_size {
                        items.push(unpack(value_type, reader)?);
                    }
                    Ok(Value::Array(items))
                } else {
                    let len = (reader.read_bits(length_field_width(*max_size)) as usize).min(*max_size);
                    let mut items = Vec::with_capacity(len);
                    for _ in 0..len {
                        items.push(unpack(value_type, reader)?);
                    }
                    Ok(Value::Array(items))
                }
            }
        },
        Descriptor::Compound(compound) => {
            if compound.is_union {
                let tag = reader.read_bits(Descriptor::union_tag_width(compound.fields.len())) as usize;
                if tag >= compound.fields.len() {
                    return Err(SerializationError::ValueOutOfRange);
                }
                let mut fields: Vec<Value> = compound.fields.iter().map(|f| Value::new(&f.descriptor)).collect();
                fields[tag] = unpack(&compound.fields[tag].descriptor, reader)?;
                Ok(Value::Composite(CompositeValue {
                    fields,
                    active_field: Some(tag),
                }))
            } else {
                let mut fields = Vec::with_capacity(compound.fields.len());
                for field in &compound.fields {
                    fields.push(unpack(&field.descriptor, reader)?);
                }
                Ok(Value::Composite(CompositeValue {
                    fields,
                    active_field: None,
                }))
            }
        }
    }
}

/// Width of a dynamic array's length prefix: `max(1, ceil(log2(max_size)))`,
/// the same formula as a union tag's width over the array's size space.
fn length_field_width(max_size: usize) -> u8 {
    Descriptor::union_tag_width(max_size)
}

/// Selects a service compound's request or response field list, cloning it
/// into a standalone `CompoundDescriptor` so the ordinary compound pack/
/// unpack path can be reused unchanged for either side.
fn service_side(compound: &CompoundDescriptor, response: bool) -> CompoundDescriptor {
    if response {
        let (fields, constants, is_union) = compound
            .response
            .as_ref()
            .expect("service descriptor missing response side");
        CompoundDescriptor {
            fields: fields.clone(),
            constants: constants.clone(),
            is_union: *is_union,
            response: None,
            ..compound.clone()
        }
    } else {
        CompoundDescriptor {
            response: None,
            ..compound.clone()
        }
    }
}

/// Packs the request (or, with `response: true`, the response) side of a
/// service compound.
pub fn pack_service_side(
    value: &Value,
    compound: &CompoundDescriptor,
    response: bool,
    writer: &mut BitWriter,
) -> Result<(), SerializationError> {
    pack(value, &Descriptor::Compound(service_side(compound, response)), writer)
}

/// Unpacks the request (or response) side of a service compound.
pub fn unpack_service_side(
    compound: &CompoundDescriptor,
    response: bool,
    reader: &mut BitReader,
) -> Result<Value, SerializationError> {
    unpack(&Descriptor::Compound(service_side(compound, response)), reader)
}

/// Worst-case packed size of `descriptor`, in bits. Used to size a transmit
/// buffer up front since the pack engine itself writes into a fixed slice.
pub fn max_bit_length(descriptor: &Descriptor) -> usize {
    match descriptor {
        Descriptor::Void { bitlen } => *bitlen as usize,
        Descriptor::Primitive { bitlen, .. } => *bitlen as usize,
        Descriptor::Array {
            mode,
            value_type,
            max_size,
            tao,
        } => {
            let element = max_bit_length(value_type);
            let prefix = if *mode == ArrayMode::Dynamic && !*tao {
                length_field_width(*max_size) as usize
            } else {
                0
            };
            prefix + element * max_size
        }
        Descriptor::Compound(compound) => max_compound_bit_length(compound),
    }
}

fn max_compound_bit_length(compound: &CompoundDescriptor) -> usize {
    let request_side = if compound.is_union {
        Descriptor::union_tag_width(compound.fields.len()) as usize
            + compound
                .fields
                .iter()
                .map(|f| max_bit_length(&f.descriptor))
                .max()
                .unwrap_or(0)
    } else {
        compound.fields.iter().map(|f| max_bit_length(&f.descriptor)).sum()
    };

    match &compound.response {
        None => request_side,
        Some((fields, _, is_union)) => {
            let response_side = if *is_union {
                Descriptor::union_tag_width(fields.len()) as usize
                    + fields.iter().map(|f| max_bit_length(&f.descriptor)).max().unwrap_or(0)
            } else {
                fields.iter().map(|f| max_bit_length(&f.descriptor)).sum()
            };
            request_side.max(response_side)
        }
    }
}

/// [`max_bit_length`] rounded up to whole bytes.
pub fn max_byte_length(descriptor: &Descriptor) -> usize {
    max_bit_length(descriptor).div_ceil(8)
}

fn cast_to_bits(value: PrimitiveValue, kind: PrimitiveKind, bitlen: u8, cast_mode: CastMode, range: ValueRange) -> u64 {
    match kind {
        PrimitiveKind::Bool => match value {
            PrimitiveValue::Bool(b) => b as u64,
            PrimitiveValue::UInt(u) => (u != 0) as u64,
            PrimitiveValue::Int(i) => (i != 0) as u64,
            PrimitiveValue::Float(f) => (f != 0.0) as u64,
        },
        PrimitiveKind::UnsignedInt => {
            let raw: i128 = match value {
                PrimitiveValue::UInt(u) => u as i128,
                PrimitiveValue::Int(i) => i as i128,
                PrimitiveValue::Bool(b) => b as i128,
                PrimitiveValue::Float(f) => f as i128,
            };
            let max: i128 = if bitlen >= 64 { u64::MAX as i128 } else { (1i128 << bitlen) - 1 };
            let result = match cast_mode {
                CastMode::Saturated => raw.clamp(0, max),
                CastMode::Truncated => raw & max,
            };
            result as u64
        }
        PrimitiveKind::SignedInt => {
            let raw: i128 = match value {
                PrimitiveValue::Int(i) => i as i128,
                PrimitiveValue::UInt(u) => u as i128,
                PrimitiveValue::Bool(b) => b as i128,
                PrimitiveValue::Float(f) => f as i128,
            };
            let mask: u64 = if bitlen >= 64 { u64::MAX } else { (1u64 << bitlen) - 1 };
            let half: i128 = 1i128 << (bitlen - 1);
            let result = match cast_mode {
                CastMode::Saturated => raw.clamp(-half, half - 1),
                CastMode::Truncated => raw,
            };
            (result as u64) & mask
        }
        PrimitiveKind::Float => {
            let mut f: f64 = match value {
                PrimitiveValue::Float(f) => f,
                PrimitiveValue::Int(i) => i as f64,
                PrimitiveValue::UInt(u) => u as f64,
                PrimitiveValue::Bool(b) => b as u8 as f64,
            };
            f = match cast_mode {
                CastMode::Saturated => f.clamp(range.min, range.max),
                CastMode::Truncated => {
                    if f.is_nan() {
                        f
                    } else if f > range.max {
                        f64::INFINITY
                    } else if f < range.min {
                        f64::NEG_INFINITY
                    } else {
                        f
                    }
                }
            };
            match bitlen {
                16 => f32_to_f16_bits(f as f32) as u64,
                32 => (f as f32).to_bits() as u64,
                _ => f.to_bits(),
            }
        }
    }
}

fn bits_to_primitive(bits: u64, kind: PrimitiveKind, bitlen: u8) -> PrimitiveValue {
    match kind {
        PrimitiveKind::Bool => PrimitiveValue::Bool(bits & 1 != 0),
        PrimitiveKind::UnsignedInt => PrimitiveValue::UInt(bits),
        PrimitiveKind::SignedInt => {
            if bitlen < 64 && (bits >> (bitlen - 1)) & 1 != 0 {
                PrimitiveValue::Int(bits as i64 - (1i64 << bitlen))
            } else {
                PrimitiveValue::Int(bits as i64)
            }
        }
        PrimitiveKind::Float => match bitlen {
            16 => PrimitiveValue::Float(f16_bits_to_f32(bits as u16) as f64),
            32 => PrimitiveValue::Float(f32::from_bits(bits as u32) as f64),
            _ => PrimitiveValue::Float(f64::from_bits(bits)),
        },
    }
}

/// float32 -> IEEE 754 half bits, rebiasing the exponent from 127 to 15 and
/// shifting the mantissa right by 13. Overflow saturates to infinity;
/// underflow flushes to signed zero rather than producing a subnormal half.
fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = (bits >> 16) & 0x8000;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x007F_FFFF;

    if exponent == 0xFF {
        let nan_flag = if mantissa != 0 { 0x0200 } else { 0 };
        return (sign | 0x7C00 | nan_flag) as u16;
    }

    let rebiased = exponent - 127 + 15;
    if rebiased >= 0x1F {
        return (sign | 0x7C00) as u16;
    }
    if rebiased <= 0 {
        return sign as u16;
    }

    (sign | ((rebiased as u32) << 10) | (mantissa >> 13)) as u16
}

/// float16 bits -> f32, the inverse bit trick documented above.
fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = (bits & 0x8000) as u32;
    let exponent = (bits & 0x7C00) as u32;
    let mantissa = (bits & 0x03FF) as u32;

    if exponent == 0 && mantissa == 0 {
        return f32::from_bits(sign << 16);
    }

    f32::from_bits((sign << 16) + (exponent << 13) + (mantissa << 13) + 0x3800_0000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::descriptor::{CompoundDescriptor, CompoundKind, Field};
    use alloc::rc::Rc;
    use alloc::string::ToString;
    use alloc::vec;

    fn uint_descriptor(bitlen: u8) -> Descriptor {
        Descriptor::Primitive {
            kind: PrimitiveKind::UnsignedInt,
            bitlen,
            cast_mode: CastMode::Saturated,
            range: ValueRange {
                min: 0.0,
                max: ((1u64 << bitlen) - 1) as f64,
            },
            string_like: false,
        }
    }

    #[test]
    fn primitive_round_trips() {
        let descriptor = uint_descriptor(12);
        let value = Value::Primitive(PrimitiveValue::UInt(0xABC));
        let mut buf = [0u8; 2];
        let len = pack_into(&value, &descriptor, &mut buf).unwrap();
        assert_eq!(len, 2);
        let unpacked = unpack_from(&descriptor, &buf).unwrap();
        assert_eq!(unpacked.as_primitive().unwrap(), PrimitiveValue::UInt(0xABC));
    }

    #[test]
    fn saturated_cast_clamps_to_range() {
        let descriptor = uint_descriptor(4); // max 15
        let value = Value::Primitive(PrimitiveValue::UInt(200));
        let mut buf = [0u8; 1];
        pack_into(&value, &descriptor, &mut buf).unwrap();
        let unpacked = unpack_from(&descriptor, &buf).unwrap();
        assert_eq!(unpacked.as_primitive().unwrap(), PrimitiveValue::UInt(15));
    }

    #[test]
    fn signed_high_bit_round_trips_negative() {
        let descriptor = Descriptor::Primitive {
            kind: PrimitiveKind::SignedInt,
            bitlen: 8,
            cast_mode: CastMode::Saturated,
            range: ValueRange { min: -128.0, max: 127.0 },
            string_like: false,
        };
        let value = Value::Primitive(PrimitiveValue::Int(-5));
        let mut buf = [0u8; 1];
        pack_into(&value, &descriptor, &mut buf).unwrap();
        let unpacked = unpack_from(&descriptor, &buf).unwrap();
        assert_eq!(unpacked.as_primitive().unwrap(), PrimitiveValue::Int(-5));
    }

    #[test]
    fn float16_round_trips_common_value() {
        assert_eq!(f16_bits_to_f32(f32_to_f16_bits(1.5)), 1.5);
        assert_eq!(f16_bits_to_f32(f32_to_f16_bits(-2.0)), -2.0);
    }

    #[test]
    fn union_with_single_field_uses_one_bit_tag() {
        assert_eq!(Descriptor::union_tag_width(1), 1);
    }

    #[test]
    fn s6_union_encodes_selected_field_and_tag() {
        let a = Field {
            name: "a".to_string(),
            descriptor: Rc::new(uint_descriptor(8)),
        };
        let b = Field {
            name: "b".to_string(),
            descriptor: Rc::new(uint_descriptor(16)),
        };
        let c = Field {
            name: "c".to_string(),
            descriptor: Rc::new(uint_descriptor(32)),
        };
        let descriptor = Descriptor::Compound(CompoundDescriptor {
            kind: CompoundKind::Message,
            data_type_id: 0,
            base_crc: 0,
            signature: 0,
            fields: vec![a, b, c],
            constants: vec![],
            is_union: true,
            response: None,
        });

        let mut value = Value::new(&descriptor);
        if let Descriptor::Compound(ref compound) = descriptor {
            value
                .set_field("b", &compound.fields, Value::Primitive(PrimitiveValue::UInt(0x1234)))
                .unwrap();
        }

        let mut buf = [0u8; 3];
        pack_into(&value, &descriptor, &mut buf).unwrap();
        // tag = 1 (2 bits) followed by 16 bits of 0x1234: 01 0001001000110100 -> 0x44 0x8D 0x00
        assert_eq!(buf, [0b0100_0100, 0b1000_1101, 0b0000_0000]);

        let unpacked = unpack_from(&descriptor, &buf).unwrap();
        let composite = unpacked.as_composite().unwrap();
        assert_eq!(composite.active_field, Some(1));
        assert_eq!(composite.fields[1].as_primitive().unwrap(), PrimitiveValue::UInt(0x1234));
    }

    #[test]
    fn tao_array_of_sub_byte_element_keeps_length_prefix() {
        let bool_descriptor = Rc::new(Descriptor::Primitive {
            kind: PrimitiveKind::Bool,
            bitlen: 1,
            cast_mode: CastMode::Saturated,
            range: ValueRange { min: 0.0, max: 1.0 },
            string_like: false,
        });
        assert!(!Descriptor::array_qualifies_for_tao(ArrayMode::Dynamic, 1, true));
        let descriptor = Descriptor::Array {
            mode: ArrayMode::Dynamic,
            value_type: bool_descriptor,
            max_size: 4,
            tao: false,
        };
        let value = Value::Array(vec![Value::Primitive(PrimitiveValue::Bool(true))]);
        let mut buf = [0u8; 1];
        let len = pack_into(&value, &descriptor, &mut buf).unwrap();
        assert_eq!(len, 1);
        // length field (3 bits, max_size=4 -> width 2) + 1 bit of payload
        let unpacked = unpack_from(&descriptor, &buf).unwrap();
        assert_eq!(unpacked.as_array().unwrap().len(), 1);
    }

    #[test]
    fn service_request_and_response_sides_pack_independently() {
        let request_fields = vec![Field {
            name: "value".to_string(),
            descriptor: Rc::new(uint_descriptor(8)),
        }];
        let response_fields = vec![Field {
            name: "echo".to_string(),
            descriptor: Rc::new(uint_descriptor(16)),
        }];
        let compound = CompoundDescriptor {
            kind: CompoundKind::Service,
            data_type_id: 1,
            base_crc: 0,
            signature: 0,
            fields: request_fields,
            constants: vec![],
            is_union: false,
            response: Some((response_fields, vec![], false)),
        };

        let request = Value::Composite(CompositeValue {
            fields: vec![Value::Primitive(PrimitiveValue::UInt(9))],
            active_field: None,
        });
        let mut buf = [0u8; 1];
        pack_service_side(&request, &compound, false, &mut BitWriter::new(&mut buf)).unwrap();
        assert_eq!(buf, [9]);
        let unpacked = unpack_service_side(&compound, false, &mut BitReader::new(&buf)).unwrap();
        assert_eq!(
            unpacked.as_composite().unwrap().fields[0].as_primitive().unwrap(),
            PrimitiveValue::UInt(9)
        );

        let response = Value::Composite(CompositeValue {
            fields: vec![Value::Primitive(PrimitiveValue::UInt(0x1234))],
            active_field: None,
        });
        let mut buf = [0u8; 2];
        pack_service_side(&response, &compound, true, &mut BitWriter::new(&mut buf)).unwrap();
        let unpacked = unpack_service_side(&compound, true, &mut BitReader::new(&buf)).unwrap();
        assert_eq!(
            unpacked.as_composite().unwrap().fields[0].as_primitive().unwrap(),
            PrimitiveValue::UInt(0x1234)
        );
    }

    #[test]
    fn max_byte_length_accounts_for_union_tag_and_widest_arm() {
        let a = Field {
            name: "a".to_string(),
            descriptor: Rc::new(uint_descriptor(8)),
        };
        let b = Field {
            name: "b".to_string(),
            descriptor: Rc::new(uint_descriptor(32)),
        };
        let descriptor = Descriptor::Compound(CompoundDescriptor {
            kind: CompoundKind::Message,
            data_type_id: 0,
            base_crc: 0,
            signature: 0,
            fields: vec![a, b],
            constants: vec![],
            is_union: true,
            response: None,
        });
        // 1-bit tag + widest arm (32 bits) = 33 bits -> 5 bytes.
        assert_eq!(max_byte_length(&descriptor), 5);
    }
}
