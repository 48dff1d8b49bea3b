//! Primitive byte layer for value streams.
//!
//! A value stream is a flat concatenation of CBOR data items (RFC 8742
//! sequence framing). [`ByteSink`] appends items to a growable buffer,
//! [`ByteSource`] consumes them front to back while enforcing [`Limits`].
//! Definite-length encoding only; indefinite-length items are rejected.

use std::convert::Infallible;

use bytes::Bytes;
use minicbor::data::Type;
use minicbor::{Decoder, Encoder};

use crate::limits::Limits;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("cbor encode: {0}")]
    Cbor(#[from] minicbor::encode::Error<Infallible>),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// A decode limit was exceeded; the payload names the limit.
    #[error("decode limit exceeded: {0}")]
    Limit(&'static str),
    #[error("indefinite-length items are not allowed in value streams")]
    IndefiniteLength,
    #[error("trailing bytes after end of value stream")]
    TrailingBytes,
    #[error("cbor decode: {0}")]
    Cbor(#[from] minicbor::decode::Error),
}

/// Write half of the wire layer. Owns the output buffer.
#[derive(Debug, Default)]
pub struct ByteSink {
    buf: Vec<u8>,
}

impl ByteSink {
    pub fn new() -> Self {
        ByteSink::default()
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), EncodeError> {
        Encoder::new(&mut self.buf).bool(value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), EncodeError> {
        Encoder::new(&mut self.buf).u64(value)?;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), EncodeError> {
        Encoder::new(&mut self.buf).i64(value)?;
        Ok(())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), EncodeError> {
        Encoder::new(&mut self.buf).f64(value)?;
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> Result<(), EncodeError> {
        Encoder::new(&mut self.buf).str(value)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), EncodeError> {
        Encoder::new(&mut self.buf).bytes(value)?;
        Ok(())
    }

    /// Writes a codec dispatch tag.
    pub fn write_tag(&mut self, tag: u8) -> Result<(), EncodeError> {
        Encoder::new(&mut self.buf).u8(tag)?;
        Ok(())
    }

    /// Writes a small identity id.
    pub fn write_small_id(&mut self, id: u32) -> Result<(), EncodeError> {
        Encoder::new(&mut self.buf).u32(id)?;
        Ok(())
    }

    /// Writes a record type token. Tokens are plain text items; the reader
    /// resolves them against its registry.
    pub fn write_type_token(&mut self, token: &str) -> Result<(), EncodeError> {
        self.write_str(token)
    }

    /// Writes the entry count that precedes an encoded sequence.
    pub fn write_sequence_len(&mut self, len: usize) -> Result<(), EncodeError> {
        Encoder::new(&mut self.buf).u64(len as u64)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

/// Read half of the wire layer. Owns the input buffer and a cursor; every
/// read advances the cursor past exactly one data item.
#[derive(Debug)]
pub struct ByteSource {
    buf: Bytes,
    pos: usize,
    limits: Limits,
}

impl ByteSource {
    pub fn new(buf: Bytes, limits: &Limits) -> Self {
        ByteSource {
            buf,
            pos: 0,
            limits: limits.clone(),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fails with [`DecodeError::TrailingBytes`] unless the stream was fully
    /// consumed.
    pub fn expect_end(&self) -> Result<(), DecodeError> {
        if self.remaining() > 0 {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        self.read_item(|dec| Ok(dec.bool()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.read_item(|dec| Ok(dec.u64()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        self.read_item(|dec| Ok(dec.i64()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        self.read_item(|dec| Ok(dec.f64()?))
    }

    pub fn read_str(&mut self) -> Result<String, DecodeError> {
        let max_text_len = self.limits.max_text_len;
        self.read_item(|dec| {
            if dec.datatype()? == Type::StringIndef {
                return Err(DecodeError::IndefiniteLength);
            }
            let s = dec.str()?;
            if s.len() > max_text_len {
                return Err(DecodeError::Limit("max_text_len"));
            }
            Ok(s.to_owned())
        })
    }

    pub fn read_bytes(&mut self) -> Result<Bytes, DecodeError> {
        let max_bytes_len = self.limits.max_bytes_len;
        self.read_item(|dec| {
            if dec.datatype()? == Type::BytesIndef {
                return Err(DecodeError::IndefiniteLength);
            }
            let b = dec.bytes()?;
            if b.len() > max_bytes_len {
                return Err(DecodeError::Limit("max_bytes_len"));
            }
            Ok(Bytes::copy_from_slice(b))
        })
    }

    pub fn read_tag(&mut self) -> Result<u8, DecodeError> {
        self.read_item(|dec| Ok(dec.u8()?))
    }

    pub fn read_small_id(&mut self) -> Result<u32, DecodeError> {
        self.read_item(|dec| Ok(dec.u32()?))
    }

    pub fn read_type_token(&mut self) -> Result<String, DecodeError> {
        self.read_str()
    }

    pub fn read_sequence_len(&mut self) -> Result<usize, DecodeError> {
        let max_sequence_entries = self.limits.max_sequence_entries;
        self.read_item(|dec| {
            let len = dec.u64()?;
            if len > max_sequence_entries as u64 {
                return Err(DecodeError::Limit("max_sequence_entries"));
            }
            Ok(len as usize)
        })
    }

    /// Runs `f` over a transient decoder at the cursor and advances the
    /// cursor past what it consumed. On failure the cursor is left unchanged,
    /// but a partially read stream is not generally resumable.
    fn read_item<T>(
        &mut self,
        f: impl FnOnce(&mut Decoder<'_>) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        let mut dec = Decoder::new(&self.buf[self.pos..]);
        let value = f(&mut dec)?;
        self.pos += dec.position();
        Ok(value)
    }
}
