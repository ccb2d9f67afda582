//! Response construction.
//!
//! A [`Response`] is built by appending encoded values to its body. The
//! header depends on the final body length, so it is only produced by
//! [`Response::finalize`] when the response is sent.

use crate::consistency::ConsistencyLevel;
use crate::error::{EncodeError, ErrorCode};
use crate::frame::{FrameHeader, ProtocolVersion};
use crate::opcode::Opcode;
use bytes::{BufMut, Bytes, BytesMut};

/// Maximum length of a `[string]` or `[short bytes]` value.
pub const MAX_SHORT_LEN: usize = u16::MAX as usize;

/// Maximum length of a `[long string]` value.
pub const MAX_LONG_STRING_LEN: usize = u32::MAX as usize;

/// Maximum length of a `[bytes]` value.
pub const MAX_BYTES_LEN: usize = i32::MAX as usize;

/// Response kind code for a RESULT carrying no rows.
pub const RESULT_KIND_VOID: i32 = 0x0001;

/// An outgoing frame under construction.
#[derive(Debug, Clone)]
pub struct Response {
    stream_id: i16,
    opcode: Opcode,
    body: BytesMut,
}

impl Response {
    /// Creates an empty response addressed to `stream_id`.
    pub fn new(stream_id: i16, opcode: Opcode) -> Self {
        Self {
            stream_id,
            opcode,
            body: BytesMut::new(),
        }
    }

    /// READY with an empty body.
    pub fn ready(stream_id: i16) -> Self {
        Self::new(stream_id, Opcode::Ready)
    }

    /// ERROR carrying `code` and a human-readable message.
    ///
    /// Messages longer than a `[string]` allows are cut at a character
    /// boundary so that an error can always be reported; callers that want
    /// to know check [`Response::clips_error_message`] first.
    pub fn error(stream_id: i16, code: ErrorCode, message: &str) -> Self {
        let mut end = message.len().min(MAX_SHORT_LEN);
        while !message.is_char_boundary(end) {
            end -= 1;
        }

        let mut response = Self::new(stream_id, Opcode::Error);
        response.write_int(i32::from(code.code()));
        response.put_short_prefixed(&message.as_bytes()[..end]);
        response
    }

    /// Returns whether [`Response::error`] would cut `message` short.
    pub fn clips_error_message(message: &str) -> bool {
        message.len() > MAX_SHORT_LEN
    }

    /// SUPPORTED listing `options` as a string multimap.
    pub fn supported<'a, I>(stream_id: i16, options: I) -> Result<Self, EncodeError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut response = Self::new(stream_id, Opcode::Supported);
        response.write_string_multimap(options)?;
        Ok(response)
    }

    /// RESULT whose body is an already-encoded payload.
    pub fn result(stream_id: i16, payload: &[u8]) -> Self {
        let mut response = Self::new(stream_id, Opcode::Result);
        response.write_raw(payload);
        response
    }

    pub fn stream_id(&self) -> i16 {
        self.stream_id
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn write_byte(&mut self, n: u8) {
        self.body.put_u8(n);
    }

    pub fn write_short(&mut self, n: u16) {
        self.body.put_u16(n);
    }

    pub fn write_int(&mut self, n: i32) {
        self.body.put_i32(n);
    }

    pub fn write_long(&mut self, n: i64) {
        self.body.put_i64(n);
    }

    fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), EncodeError> {
        if len > max {
            return Err(EncodeError::ValueTooLong { field, len, max });
        }
        Ok(())
    }

    /// Runs `write`, restoring the body to its prior length if it fails.
    fn all_or_nothing<F>(&mut self, write: F) -> Result<(), EncodeError>
    where
        F: FnOnce(&mut Self) -> Result<(), EncodeError>,
    {
        let start = self.body.len();
        let result = write(self);
        if result.is_err() {
            self.body.truncate(start);
        }
        result
    }

    fn put_short_prefixed(&mut self, raw: &[u8]) {
        self.body.put_u16(raw.len() as u16);
        self.body.put_slice(raw);
    }

    /// Writes a `[string]`.
    pub fn write_string(&mut self, s: &str) -> Result<(), EncodeError> {
        Self::check_len("string", s.len(), MAX_SHORT_LEN)?;
        self.put_short_prefixed(s.as_bytes());
        Ok(())
    }

    /// Writes a `[long string]`.
    pub fn write_long_string(&mut self, s: &str) -> Result<(), EncodeError> {
        Self::check_len("long string", s.len(), MAX_LONG_STRING_LEN)?;
        self.body.put_u32(s.len() as u32);
        self.body.put_slice(s.as_bytes());
        Ok(())
    }

    /// Writes a `[string list]`.
    pub fn write_string_list<S: AsRef<str>>(&mut self, list: &[S]) -> Result<(), EncodeError> {
        Self::check_len("string list", list.len(), MAX_SHORT_LEN)?;
        self.all_or_nothing(|r| {
            r.write_short(list.len() as u16);
            for s in list {
                r.write_string(s.as_ref())?;
            }
            Ok(())
        })
    }

    /// Writes `[bytes]`; `None` is encoded as a null value.
    pub fn write_bytes(&mut self, value: Option<&[u8]>) -> Result<(), EncodeError> {
        match value {
            Some(b) => {
                Self::check_len("bytes", b.len(), MAX_BYTES_LEN)?;
                self.write_int(b.len() as i32);
                self.body.put_slice(b);
            }
            None => self.write_int(-1),
        }
        Ok(())
    }

    /// Writes `[short bytes]`.
    pub fn write_short_bytes(&mut self, b: &[u8]) -> Result<(), EncodeError> {
        Self::check_len("short bytes", b.len(), MAX_SHORT_LEN)?;
        self.put_short_prefixed(b);
        Ok(())
    }

    pub fn write_consistency(&mut self, level: ConsistencyLevel) {
        self.write_short(level.to_wire());
    }

    /// Writes a `[string map]` in iteration order.
    pub fn write_string_map<I, K, V>(&mut self, map: I) -> Result<(), EncodeError>
    where
        I: IntoIterator<Item = (K, V)>,
        I::IntoIter: ExactSizeIterator,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let iter = map.into_iter();
        Self::check_len("string map", iter.len(), MAX_SHORT_LEN)?;
        self.all_or_nothing(|r| {
            r.write_short(iter.len() as u16);
            for (key, value) in iter {
                r.write_string(key.as_ref())?;
                r.write_string(value.as_ref())?;
            }
            Ok(())
        })
    }

    /// Writes a `[string multimap]`.
    ///
    /// Values are grouped under their key; keys appear once each, in the
    /// order they were first seen.
    pub fn write_string_multimap<I, K, V>(&mut self, entries: I) -> Result<(), EncodeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut grouped: Vec<(K, Vec<V>)> = Vec::new();
        for (key, value) in entries {
            let position = grouped
                .iter()
                .position(|(k, _)| AsRef::<str>::as_ref(k) == key.as_ref());
            match position {
                Some(i) => grouped[i].1.push(value),
                None => grouped.push((key, vec![value])),
            }
        }

        Self::check_len("string multimap", grouped.len(), MAX_SHORT_LEN)?;
        self.all_or_nothing(|r| {
            r.write_short(grouped.len() as u16);
            for (key, values) in &grouped {
                r.write_string(key.as_ref())?;
                r.write_string_list(values)?;
            }
            Ok(())
        })
    }

    /// Appends pre-encoded bytes to the body.
    pub fn write_raw(&mut self, raw: &[u8]) {
        self.body.put_slice(raw);
    }

    /// Produces header followed by body, ready to be written to a socket.
    pub fn finalize(self, version: ProtocolVersion) -> Result<Bytes, EncodeError> {
        let body_length = u32::try_from(self.body.len()).map_err(|_| EncodeError::ValueTooLong {
            field: "frame body",
            len: self.body.len(),
            max: u32::MAX as usize,
        })?;

        let header = FrameHeader::response(version, self.stream_id, self.opcode, body_length);
        let mut msg = BytesMut::with_capacity(header.size() + self.body.len());
        header.encode_into(&mut msg)?;
        msg.extend_from_slice(&self.body);
        Ok(msg.freeze())
    }
}
