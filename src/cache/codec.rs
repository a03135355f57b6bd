//! Value Codec Module
//!
//! Turns application values into tagged blobs for the `value` column.
//!
//! Layout: one tag byte followed by the payload.
//! - `i`: an integer as ASCII decimal digits. Kept readable so SQL arithmetic
//!   (`incr`/`decr`) can update it in place.
//! - `p`: any other value, serialized with `serde_json`. NaN and infinities
//!   are rejected since JSON would store them as `null`.

use serde::de::DeserializeOwned;
use serde::ser::{self, Error as _};
use serde::Serialize;
use serde_json::Value;

use crate::cache::MAX_VALUE_SIZE;
use crate::error::{CacheError, Result};

/// Tag byte for raw integers.
pub const TAG_INTEGER: u8 = b'i';
/// Tag byte for values run through the general serializer.
pub const TAG_SERIALIZED: u8 = b'p';

// == Encode ==
/// Encodes `value`, taking the integer fast path when possible.
///
/// Serializer failures are returned unchanged inside [`CacheError::Serialization`].
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    value.serialize(FiniteFloats)?;
    let tree = serde_json::to_value(value)?;
    let encoded = match tree.as_i64() {
        Some(n) => encode_integer(n),
        None => {
            let body = serde_json::to_vec(&tree)?;
            let mut out = Vec::with_capacity(body.len() + 1);
            out.push(TAG_SERIALIZED);
            out.extend_from_slice(&body);
            out
        }
    };

    if encoded.len() > MAX_VALUE_SIZE {
        return Err(CacheError::ValueTooLarge {
            size: encoded.len(),
        });
    }
    Ok(encoded)
}

/// Encodes an integer in the tagged decimal form.
pub fn encode_integer(n: i64) -> Vec<u8> {
    let digits = n.to_string();
    let mut out = Vec::with_capacity(digits.len() + 1);
    out.push(TAG_INTEGER);
    out.extend_from_slice(digits.as_bytes());
    out
}

// == Float Check ==
/// Serializer that only visits `value` and fails on a non-finite float.
#[derive(Clone, Copy)]
struct FiniteFloats;

type Checked = std::result::Result<(), serde_json::Error>;

fn check_float(f: f64) -> Checked {
    if f.is_finite() {
        Ok(())
    } else {
        Err(serde_json::Error::custom(format!(
            "cannot cache non-finite float {}",
            f
        )))
    }
}

impl ser::Serializer for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Checked {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Checked {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Checked {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Checked {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Checked {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> Checked {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Checked {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Checked {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Checked {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Checked {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> Checked {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Checked {
        check_float(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Checked {
        check_float(v)
    }
    fn serialize_char(self, _: char) -> Checked {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Checked {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Checked {
        Ok(())
    }
    fn serialize_none(self) -> Checked {
        Ok(())
    }
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Checked {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Checked {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Checked {
        Ok(())
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Checked {
        Ok(())
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(self, _: &'static str, value: &T) -> Checked {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }
    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Checked {
        key.serialize(*self)
    }
    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, _: &'static str, value: &T) -> Checked {
        value.serialize(*self)
    }
    fn end(self) -> Checked {
        Ok(())
    }
}

// == Decode ==
/// Decodes a blob produced by [`encode`] into `T`.
pub fn decode<T: DeserializeOwned>(blob: &[u8]) -> Result<T> {
    let (tag, payload) = blob
        .split_first()
        .ok_or_else(|| CacheError::InvalidPayload("empty value".to_string()))?;

    match *tag {
        TAG_INTEGER => {
            let n = decode_integer(payload)?;
            Ok(serde_json::from_value(Value::from(n))?)
        }
        TAG_SERIALIZED => Ok(serde_json::from_slice(payload)?),
        other => Err(CacheError::InvalidPayload(format!(
            "unknown value tag 0x{:02x}",
            other
        ))),
    }
}

fn decode_integer(payload: &[u8]) -> Result<i64> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| CacheError::InvalidPayload("malformed integer value".to_string()))
}
