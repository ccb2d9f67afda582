//! Whole frames and an incremental frame decoder.

use crate::error::{EncodeError, FrameError};
use crate::frame::{decode_header, first_byte_version, FrameHeader, ProtocolVersion};
use crate::opcode::Opcode;
use crate::MAX_FRAME_SIZE;
use bytes::{Buf, Bytes, BytesMut};

/// A complete frame: header plus exactly `header.body_length` body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: Bytes,
}

impl Frame {
    /// Creates a client-to-server frame.
    pub fn request(
        version: ProtocolVersion,
        stream_id: i16,
        opcode: Opcode,
        body: impl Into<Bytes>,
    ) -> Result<Self, EncodeError> {
        let body = body.into();
        let body_length = u32::try_from(body.len()).map_err(|_| EncodeError::ValueTooLong {
            field: "frame body",
            len: body.len(),
            max: u32::MAX as usize,
        })?;
        Ok(Self {
            header: FrameHeader::request(version, stream_id, opcode, body_length),
            body,
        })
    }

    /// Encodes header and body into one buffer.
    pub fn encode(&self) -> Result<BytesMut, FrameError> {
        let mut buf = BytesMut::with_capacity(self.header.size() + self.body.len());
        self.header.encode_into(&mut buf)?;
        buf.extend_from_slice(&self.body);
        Ok(buf)
    }
}

/// Splits a byte stream into frames.
///
/// Like a connection, the decoder locks onto the version of the first frame
/// it sees and rejects any later frame carrying another version.
pub struct FrameDecoder {
    buffer: BytesMut,
    version: Option<ProtocolVersion>,
    max_frame_size: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            version: None,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(mut self, max: u32) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the version locked by the first decoded frame, if any.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    /// Attempts to decode the next frame from the buffer.
    ///
    /// Returns `Ok(None)` if more data is needed.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let Some(&first) = self.buffer.first() else {
            return Ok(None);
        };

        let header_len = match self.version {
            Some(v) => v.header_size(),
            None => first_byte_version(first)?.header_size(),
        };
        if self.buffer.len() < header_len {
            return Ok(None);
        }

        let (header, version) = decode_header(self.version, &self.buffer[..header_len])?;
        if header.body_length > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: header.body_length,
                max: self.max_frame_size,
            });
        }
        self.version = Some(version);

        let total = header_len + header.body_length as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        self.buffer.advance(header_len);
        let body = self.buffer.split_to(header.body_length as usize).freeze();
        Ok(Some(Frame { header, body }))
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
