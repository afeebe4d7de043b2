//! LCM binary encoding.
//!
//! Every encoded message is laid out as:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────┐
//! │ Fingerprint (8 bytes)│ Fields in declaration order          │
//! │ Big-endian u64       │ Big-endian, no padding               │
//! └──────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! | LCM type | Encoding |
//! |---|---|
//! | `int32_t` / `int64_t` | Two's complement, big-endian |
//! | `boolean` | One byte, `0` or `1` (any non-zero byte decodes as `true`) |
//! | `string` | `int32` length including the NUL terminator, the bytes, then `0x00` |
//!
//! The fingerprint is derived from the member names and types only (not from
//! the struct name), so renaming a type keeps it wire-compatible while adding,
//! removing or reordering a field does not. [`fingerprint`] is a `const fn`:
//! each [`LcmMessage`] computes its fingerprint at compile time from its
//! [`Field`] table.

use crate::{ConvoyError, Result};

/// Seed of the LCM struct hash.
const HASH_SEED: i64 = 0x1234_5678;

/// Primitive member types used by the `convoy` schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    Boolean,
    String,
}

impl FieldType {
    /// The type name as written in an `.lcm` schema.
    pub const fn lcm_name(self) -> &'static str {
        match self {
            FieldType::Int8 => "int8_t",
            FieldType::Int16 => "int16_t",
            FieldType::Int32 => "int32_t",
            FieldType::Int64 => "int64_t",
            FieldType::Boolean => "boolean",
            FieldType::String => "string",
        }
    }
}

/// One scalar member of a message schema.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
}

impl Field {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

const fn hash_update(v: i64, c: i8) -> i64 {
    ((v << 8) ^ (v >> 55)).wrapping_add(c as i64)
}

const fn hash_string(mut v: i64, s: &str) -> i64 {
    let bytes = s.as_bytes();
    v = hash_update(v, bytes.len() as i8);
    let mut i = 0;
    while i < bytes.len() {
        v = hash_update(v, bytes[i] as i8);
        i += 1;
    }
    v
}

/// Compute the LCM fingerprint of a schema made of scalar primitive members.
pub const fn fingerprint(fields: &[Field]) -> u64 {
    let mut v = HASH_SEED;
    let mut i = 0;
    while i < fields.len() {
        v = hash_string(v, fields[i].name);
        v = hash_string(v, fields[i].ty.lcm_name());
        // Scalars have no array dimensions.
        v = hash_update(v, 0);
        i += 1;
    }
    (v as u64).rotate_left(1)
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoder
// ─────────────────────────────────────────────────────────────────────────────

/// Append-only big-endian writer.
#[derive(Debug)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Start a message with its 8-byte fingerprint.
    pub fn new(fingerprint: u64) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&fingerprint.to_be_bytes());
        Self { buf }
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Write a string. Anything after an interior NUL cannot be represented
    /// and is dropped.
    pub fn put_str(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let bytes = match bytes.iter().position(|&b| b == 0) {
            Some(nul) => &bytes[..nul],
            None => bytes,
        };
        self.put_i32((bytes.len() + 1) as i32);
        self.buf.extend_from_slice(bytes);
        self.buf.push(0);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoder
// ─────────────────────────────────────────────────────────────────────────────

/// Cursor over an encoded message.
#[derive(Debug)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Consume the leading fingerprint and check it against `expected`.
    pub fn expect_fingerprint(&mut self, expected: u64) -> Result<()> {
        let found = u64::from_be_bytes(self.array::<8>("fingerprint")?);
        if found != expected {
            return Err(ConvoyError::FingerprintMismatch { expected, found });
        }
        Ok(())
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                ConvoyError::Decode(format!(
                    "buffer truncated reading {what}: need {n} bytes at offset {}, have {}",
                    self.pos,
                    self.buf.len().saturating_sub(self.pos)
                ))
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array::<4>("int32_t")?))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.array::<8>("int64_t")?))
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.array::<1>("boolean")?[0] != 0)
    }

    /// Read a string; invalid UTF-8 is replaced rather than rejected.
    pub fn get_string(&mut self) -> Result<String> {
        let len = self.get_i32()?;
        if len < 1 {
            return Err(ConvoyError::Decode(format!("invalid string length {len}")));
        }
        let raw = self.take(len as usize, "string")?;
        let (body, nul) = raw.split_at(raw.len() - 1);
        if nul[0] != 0 {
            return Err(ConvoyError::Decode("string is not NUL-terminated".into()));
        }
        Ok(String::from_utf8_lossy(body).into_owned())
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LcmMessage
// ─────────────────────────────────────────────────────────────────────────────

/// A message type that can travel over an LCM channel.
pub trait LcmMessage: Sized {
    /// Fully qualified type name, e.g. `"convoy.heartbeat_t"`.
    const TYPE_NAME: &'static str;

    /// Member schema in wire order.
    const FIELDS: &'static [Field];

    /// Type fingerprint written in front of every encoded message.
    const FINGERPRINT: u64 = fingerprint(Self::FIELDS);

    fn encode_fields(&self, enc: &mut Encoder);

    fn decode_fields(dec: &mut Decoder<'_>) -> Result<Self>;

    fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new(Self::FINGERPRINT);
        self.encode_fields(&mut enc);
        enc.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        dec.expect_fingerprint(Self::FINGERPRINT)?;
        Self::decode_fields(&mut dec)
    }
}
