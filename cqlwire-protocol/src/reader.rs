//! Decoding of primitive wire types from a frame body.

use crate::consistency::ConsistencyLevel;
use crate::error::DecodeError;
use bytes::{Buf, Bytes};
use std::collections::HashMap;

/// Bounded cursor over a frame body.
///
/// Every read checks the remaining length first, since lengths inside a
/// body come straight from the client.
#[derive(Debug, Clone)]
pub struct BodyReader {
    buf: Bytes,
}

impl BodyReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(DecodeError::Truncated { needed, remaining });
        }
        Ok(())
    }

    pub fn byte(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads an unsigned 16-bit `[short]`.
    pub fn short(&mut self) -> Result<u16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    fn take(&mut self, len: usize) -> Result<Bytes, DecodeError> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    fn utf8(raw: Bytes) -> Result<String, DecodeError> {
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Reads a `[string]`: u16 length followed by UTF-8 bytes.
    pub fn short_string(&mut self) -> Result<String, DecodeError> {
        let len = self.short()? as usize;
        let raw = self.take(len)?;
        Self::utf8(raw)
    }

    /// Reads a `[long string]`: u32 length followed by UTF-8 bytes.
    pub fn long_string(&mut self) -> Result<String, DecodeError> {
        self.ensure(4)?;
        let len = self.buf.get_u32() as usize;
        let raw = self.take(len)?;
        Self::utf8(raw)
    }

    /// Reads a `[string list]`.
    pub fn string_list(&mut self) -> Result<Vec<String>, DecodeError> {
        let count = self.short()? as usize;
        let mut list = Vec::with_capacity(count.min(self.remaining() / 2));
        for _ in 0..count {
            list.push(self.short_string()?);
        }
        Ok(list)
    }

    /// Reads a `[string map]`. A repeated key keeps its last value.
    pub fn string_map(&mut self) -> Result<HashMap<String, String>, DecodeError> {
        let count = self.short()? as usize;
        let mut map = HashMap::with_capacity(count.min(self.remaining() / 4));
        for _ in 0..count {
            let key = self.short_string()?;
            let value = self.short_string()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Reads a `[string multimap]`, preserving key order as sent.
    pub fn string_multimap(&mut self) -> Result<Vec<(String, Vec<String>)>, DecodeError> {
        let count = self.short()? as usize;
        let mut entries = Vec::with_capacity(count.min(self.remaining() / 4));
        for _ in 0..count {
            let key = self.short_string()?;
            let values = self.string_list()?;
            entries.push((key, values));
        }
        Ok(entries)
    }

    /// Reads `[bytes]`: i32 length, negative meaning null.
    pub fn bytes(&mut self) -> Result<Option<Bytes>, DecodeError> {
        let len = self.i32()?;
        if len < 0 {
            return Ok(None);
        }
        self.take(len as usize).map(Some)
    }

    /// Reads `[short bytes]`: u16 length followed by raw bytes.
    pub fn short_bytes(&mut self) -> Result<Bytes, DecodeError> {
        let len = self.short()? as usize;
        self.take(len)
    }

    /// Reads a `[consistency]`. Unknown codes are an error.
    pub fn consistency_level(&mut self) -> Result<ConsistencyLevel, DecodeError> {
        ConsistencyLevel::from_wire(self.short()?)
    }
}

impl From<Bytes> for BodyReader {
    fn from(buf: Bytes) -> Self {
        Self::new(buf)
    }
}
