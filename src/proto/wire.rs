//! # Protobuf Wire Format
//!
//! Minimal encoder and decoder for the wire format used by `.caffemodel`
//! files. Only the wire types proto2 actually emits are supported.

use super::{Message, ProtoError, Value};

pub const WIRE_VARINT: u32 = 0;
pub const WIRE_FIXED64: u32 = 1;
pub const WIRE_LEN: u32 = 2;
pub const WIRE_FIXED32: u32 = 5;

// --- Encoding ---

/// Appends wire-format fields to a byte buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder { buf: Vec::new() }
    }

    pub fn write_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    pub fn write_tag(&mut self, field: u32, wire_type: u32) {
        self.write_varint(((field as u64) << 3) | wire_type as u64);
    }

    pub fn varint_field(&mut self, field: u32, value: u64) {
        self.write_tag(field, WIRE_VARINT);
        self.write_varint(value);
    }

    /// `int32`/`int64` fields: negative values are sign-extended to ten bytes.
    pub fn int_field(&mut self, field: u32, value: i64) {
        self.varint_field(field, value as u64);
    }

    pub fn float_field(&mut self, field: u32, value: f32) {
        self.write_tag(field, WIRE_FIXED32);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn bytes_field(&mut self, field: u32, bytes: &[u8]) {
        self.write_tag(field, WIRE_LEN);
        self.write_varint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    pub fn packed_floats(&mut self, field: u32, values: &[f32]) {
        self.write_tag(field, WIRE_LEN);
        self.write_varint((values.len() * 4) as u64);
        self.buf.reserve(values.len() * 4);
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    pub fn packed_int64(&mut self, field: u32, values: &[i64]) {
        let mut body = Encoder::new();
        for &v in values {
            body.write_varint(v as u64);
        }
        self.bytes_field(field, &body.buf);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Encodes a message tree.
pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut enc = Encoder::new();
    for field in message.fields() {
        match &field.value {
            Value::Int(v) => enc.int_field(field.number, *v),
            Value::UInt(v) => enc.varint_field(field.number, *v),
            Value::Bool(v) => enc.varint_field(field.number, *v as u64),
            Value::Float(v) => enc.float_field(field.number, *v),
            Value::Str(s) => enc.bytes_field(field.number, s.as_bytes()),
            Value::Enum(_, n) => enc.int_field(field.number, *n as i64),
            Value::Message(m) => enc.bytes_field(field.number, &encode_message(m)),
            Value::PackedFloat(v) => enc.packed_floats(field.number, v),
            Value::PackedInt64(v) => enc.packed_int64(field.number, v),
        }
    }
    enc.into_bytes()
}

// --- Decoding ---

/// One decoded field payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

impl<'a> FieldValue<'a> {
    pub fn wire_type(&self) -> u32 {
        match self {
            FieldValue::Varint(_) => WIRE_VARINT,
            FieldValue::Fixed64(_) => WIRE_FIXED64,
            FieldValue::Bytes(_) => WIRE_LEN,
            FieldValue::Fixed32(_) => WIRE_FIXED32,
        }
    }
}

/// Sequential reader over a wire-format buffer.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Decoder { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_varint(&mut self) -> Result<u64, ProtoError> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or(ProtoError::Truncated("varint"))?;
            self.pos += 1;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift >= 64 {
                return Err(ProtoError::VarintOverflow);
            }
        }
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], ProtoError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(ProtoError::Truncated(what))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_fixed32(&mut self) -> Result<u32, ProtoError> {
        let b = self.take(4, "fixed32")?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, ProtoError> {
        let b = self.take(8, "fixed64")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], ProtoError> {
        let len = self.read_varint()? as usize;
        self.take(len, "length-delimited field")
    }

    /// Reads the next `(field number, payload)` pair, or `None` at the end.
    pub fn next_field(&mut self) -> Result<Option<(u32, FieldValue<'a>)>, ProtoError> {
        if self.is_empty() {
            return Ok(None);
        }
        let tag = self.read_varint()?;
        let (field, wire_type) = ((tag >> 3) as u32, (tag & 7) as u32);
        let value = match wire_type {
            WIRE_VARINT => FieldValue::Varint(self.read_varint()?),
            WIRE_FIXED64 => FieldValue::Fixed64(self.read_fixed64()?),
            WIRE_LEN => FieldValue::Bytes(self.read_bytes()?),
            WIRE_FIXED32 => FieldValue::Fixed32(self.read_fixed32()?),
            other => return Err(ProtoError::UnknownWireType(other)),
        };
        Ok(Some((field, value)))
    }
}

/// Decodes a packed or single `float` field into `out`.
pub fn read_floats(field: u32, value: FieldValue<'_>, out: &mut Vec<f32>) -> Result<(), ProtoError> {
    match value {
        FieldValue::Fixed32(bits) => out.push(f32::from_bits(bits)),
        FieldValue::Bytes(bytes) => {
            if bytes.len() % 4 != 0 {
                return Err(ProtoError::Truncated("packed float"));
            }
            out.extend(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }
        other => {
            return Err(ProtoError::WireTypeMismatch {
                field,
                expected: WIRE_FIXED32,
                got: other.wire_type(),
            })
        }
    }
    Ok(())
}

/// Decodes a packed or single varint field into `out`.
pub fn read_varints(field: u32, value: FieldValue<'_>, out: &mut Vec<i64>) -> Result<(), ProtoError> {
    match value {
        FieldValue::Varint(v) => out.push(v as i64),
        FieldValue::Bytes(bytes) => {
            let mut dec = Decoder::new(bytes);
            while !dec.is_empty() {
                out.push(dec.read_varint()? as i64);
            }
        }
        other => {
            return Err(ProtoError::WireTypeMismatch {
                field,
                expected: WIRE_VARINT,
                got: other.wire_type(),
            })
        }
    }
    Ok(())
}

/// Decodes a string field.
pub fn read_string(field: u32, value: FieldValue<'_>) -> Result<String, ProtoError> {
    match value {
        FieldValue::Bytes(bytes) => std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| ProtoError::InvalidUtf8),
        other => Err(ProtoError::WireTypeMismatch {
            field,
            expected: WIRE_LEN,
            got: other.wire_type(),
        }),
    }
}
