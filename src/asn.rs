//! ASN.1 encode/decode boundary (§6): a pure function pair standing in
//! for the real UPER codec against 3GPP TS 25.331, which is out of scope
//! (§1(b)). What lives here is a small, internally-consistent tag/length
//! wire format sufficient to round-trip the RRC message set this core
//! actually emits and consumes (§6) — not a standards-compliant encoder,
//! since no external UE or test equipment needs to decode these bytes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsnError {
    #[error("encode constraint violated: {0}")]
    ConstraintViolation(&'static str),

    #[error("truncated or malformed encoding")]
    Truncated,
}

pub trait AsnEncode {
    fn asn_encode(&self) -> Result<Vec<u8>, AsnError>;
}

pub trait AsnDecode: Sized {
    fn asn_decode(bytes: &[u8]) -> Result<Self, AsnError>;
}

/// A tiny length-prefixed cursor-based writer/reader pair used by every
/// message's hand-rolled (de)serialization in `rrc::messages`.
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Length-prefixed (1-byte length, so ≤255 bytes — a real UPER
    /// encoder would use the IE's declared size constraint instead).
    pub fn bytes(&mut self, b: &[u8]) -> Result<&mut Self, AsnError> {
        if b.len() > u8::MAX as usize {
            return Err(AsnError::ConstraintViolation("byte string exceeds 255 bytes"));
        }
        self.buf.push(b.len() as u8);
        self.buf.extend_from_slice(b);
        Ok(self)
    }

    pub fn string(&mut self, s: &str) -> Result<&mut Self, AsnError> {
        self.bytes(s.as_bytes())
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn u8(&mut self) -> Result<u8, AsnError> {
        let v = *self.bytes.get(self.offset).ok_or(AsnError::Truncated)?;
        self.offset += 1;
        Ok(v)
    }

    pub fn u16(&mut self) -> Result<u16, AsnError> {
        let b = self
            .bytes
            .get(self.offset..self.offset + 2)
            .ok_or(AsnError::Truncated)?;
        self.offset += 2;
        Ok(u16::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn u32(&mut self) -> Result<u32, AsnError> {
        let b = self
            .bytes
            .get(self.offset..self.offset + 4)
            .ok_or(AsnError::Truncated)?;
        self.offset += 4;
        Ok(u32::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, AsnError> {
        let len = self.u8()? as usize;
        let b = self
            .bytes
            .get(self.offset..self.offset + len)
            .ok_or(AsnError::Truncated)?;
        self.offset += len;
        Ok(b.to_vec())
    }

    pub fn string(&mut self) -> Result<String, AsnError> {
        let b = self.bytes()?;
        String::from_utf8(b).map_err(|_| AsnError::Truncated)
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_round_trip() {
        let mut w = Writer::new();
        w.u8(7).u16(1000).u32(99999);
        w.string("hello").unwrap();
        let bytes = w.into_vec();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.u16().unwrap(), 1000);
        assert_eq!(r.u32().unwrap(), 99999);
        assert_eq!(r.string().unwrap(), "hello");
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut r = Reader::new(&[1, 2]);
        assert!(r.u32().is_err());
    }
}
