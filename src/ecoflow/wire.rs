use crate::prelude::*;

use nom::bytes::complete::take;
use nom::number::complete::{le_f32, le_i64};
use std::collections::BTreeMap;

type NomError<'a> = nom::error::Error<&'a [u8]>;

pub const WIRE_TYPE_VARINT: u8 = 0;
pub const WIRE_TYPE_64BIT: u8 = 1;
pub const WIRE_TYPE_LENGTH_DELIMITED: u8 = 2;
pub const WIRE_TYPE_32BIT: u8 = 5;

/// Reads one base-128 varint starting at `pos`.
///
/// Returns the value and the offset just past it. A buffer that ends before
/// a terminating byte yields whatever was accumulated, with the offset at the
/// end of the buffer. Bits beyond the 64th are discarded.
pub fn read_varint(data: &[u8], mut pos: usize) -> (u64, usize) {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    while let Some(&byte) = data.get(pos) {
        pos += 1;
        if shift < 64 {
            value |= u64::from(byte & 0x7F) << shift;
        }
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    (value, pos)
}

// FieldValue {{{
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(i64),
    Bytes(&'a [u8]),
    Fixed32(f32),
}

impl<'a> FieldValue<'a> {
    // varints are taken as two's complement, so protobuf int32/int64
    // negatives come out negative
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            FieldValue::Varint(v) => Some(v as i64),
            FieldValue::Fixed64(v) => Some(v),
            FieldValue::Fixed32(v) if v.is_finite() => Some(v.trunc() as i64),
            FieldValue::Fixed32(_) | FieldValue::Bytes(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FieldValue::Varint(v) => Some(v as i64 as f64),
            FieldValue::Fixed64(v) => Some(v as f64),
            FieldValue::Fixed32(v) => Some(f64::from(v)),
            FieldValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn wire_type(&self) -> u8 {
        match self {
            FieldValue::Varint(_) => WIRE_TYPE_VARINT,
            FieldValue::Fixed64(_) => WIRE_TYPE_64BIT,
            FieldValue::Bytes(_) => WIRE_TYPE_LENGTH_DELIMITED,
            FieldValue::Fixed32(_) => WIRE_TYPE_32BIT,
        }
    }
} // }}}

// Fields {{{
/// Decoded TLV buffer: field number to every value seen for it, in wire order.
///
/// Scalar accessors always read the *first* occurrence of a field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fields<'a> {
    fields: BTreeMap<u64, Vec<FieldValue<'a>>>,
}

impl<'a> Fields<'a> {
    /// Decodes as much of `data` as is well formed. An unknown wire type or a
    /// length/width running past the end stops decoding; everything before it
    /// is kept.
    pub fn decode(data: &'a [u8]) -> Self {
        let mut fields: BTreeMap<u64, Vec<FieldValue<'a>>> = BTreeMap::new();
        let mut pos = 0;

        while pos < data.len() {
            let (tag, next) = read_varint(data, pos);
            pos = next;

            let field_num = tag >> 3;
            let wire_type = (tag & 0x07) as u8;
            let rest = &data[pos..];

            let value = match wire_type {
                WIRE_TYPE_VARINT => {
                    let (value, next) = read_varint(data, pos);
                    pos = next;
                    FieldValue::Varint(value)
                }
                WIRE_TYPE_64BIT => match le_i64::<_, NomError>(rest) {
                    Ok((_, value)) => {
                        pos += 8;
                        FieldValue::Fixed64(value)
                    }
                    Err(_) => {
                        debug!("field {} truncated: 64-bit value with {} bytes left", field_num, rest.len());
                        break;
                    }
                },
                WIRE_TYPE_LENGTH_DELIMITED => {
                    let (length, next) = read_varint(data, pos);
                    pos = next;
                    let rest = &data[pos..];
                    let taken = usize::try_from(length)
                        .ok()
                        .and_then(|length| take::<_, _, NomError>(length)(rest).ok());
                    match taken {
                        Some((_, value)) => {
                            pos += value.len();
                            FieldValue::Bytes(value)
                        }
                        None => {
                            debug!("field {} truncated: declared length {} with {} bytes left", field_num, length, rest.len());
                            break;
                        }
                    }
                }
                WIRE_TYPE_32BIT => match le_f32::<_, NomError>(rest) {
                    Ok((_, value)) => {
                        pos += 4;
                        FieldValue::Fixed32(value)
                    }
                    Err(_) => {
                        debug!("field {} truncated: 32-bit value with {} bytes left", field_num, rest.len());
                        break;
                    }
                },
                _ => {
                    debug!("unknown wire type {} at field {}", wire_type, field_num);
                    break;
                }
            };

            fields.entry(field_num).or_default().push(value);
        }

        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn contains(&self, field: u64) -> bool {
        self.fields.contains_key(&field)
    }

    /// All values of `field`, empty if it never appeared.
    pub fn get(&self, field: u64) -> &[FieldValue<'a>] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, field: u64) -> Option<FieldValue<'a>> {
        self.get(field).first().copied()
    }

    pub fn f64_or(&self, field: u64, default: f64) -> f64 {
        self.first(field).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    pub fn i64_or(&self, field: u64, default: i64) -> i64 {
        self.first(field).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    /// First value of `field` as raw bytes; empty when absent or not length-delimited.
    pub fn bytes(&self, field: u64) -> &'a [u8] {
        self.first(field).and_then(|v| v.as_bytes()).unwrap_or(&[])
    }

    pub fn string_or(&self, field: u64, default: &str) -> String {
        self.first(field)
            .and_then(|v| v.as_bytes())
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or(default)
            .to_string()
    }

    // strict variants: absent is fine, present-but-uncoercible is an error

    pub fn try_f64(&self, field: u64) -> Result<Option<f64>> {
        match self.first(field) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| anyhow!("field {} is not numeric (wire type {})", field, v.wire_type())),
        }
    }

    pub fn try_i64(&self, field: u64) -> Result<Option<i64>> {
        match self.first(field) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| anyhow!("field {} is not an integer (wire type {})", field, v.wire_type())),
        }
    }

    pub fn try_bytes(&self, field: u64) -> Result<Option<&'a [u8]>> {
        match self.first(field) {
            None => Ok(None),
            Some(v) => v
                .as_bytes()
                .map(Some)
                .ok_or_else(|| anyhow!("field {} is not length-delimited (wire type {})", field, v.wire_type())),
        }
    }

    /// First occurrence of `field` decoded as an embedded message.
    pub fn message(&self, field: u64) -> Result<Option<Fields<'a>>> {
        Ok(self.try_bytes(field)?.map(Fields::decode))
    }

    /// Every occurrence of a repeated embedded-message field, in wire order.
    pub fn messages(&self, field: u64) -> Result<Vec<Fields<'a>>> {
        self.get(field)
            .iter()
            .map(|v| {
                v.as_bytes()
                    .map(Fields::decode)
                    .ok_or_else(|| anyhow!("repeated field {} holds a non-message value", field))
            })
            .collect()
    }
} // }}}
