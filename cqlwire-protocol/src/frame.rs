//! Frame header codec for the native protocol.
//!
//! Two header layouts exist, selected by the protocol version:
//!
//! ```text
//! v1, v2 (8 bytes):
//! +---------+-------+--------+--------+-------------+
//! | version | flags | stream | opcode | body_length |
//! | 1 byte  | 1 byte| 1 byte | 1 byte |   4 bytes   |
//! +---------+-------+--------+--------+-------------+
//!
//! v3, v4 (9 bytes):
//! +---------+-------+---------+--------+-------------+
//! | version | flags | stream  | opcode | body_length |
//! | 1 byte  | 1 byte| 2 bytes | 1 byte |   4 bytes   |
//! +---------+-------+---------+--------+-------------+
//! ```
//!
//! Multi-byte fields are big-endian and the stream id is signed. The high
//! bit of the version byte marks a response.

use crate::error::FrameError;
use crate::opcode::Opcode;
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

/// Largest header size across all supported versions.
pub const MAX_HEADER_SIZE: usize = 9;

/// Version byte bit marking a server-to-client frame.
pub const RESPONSE_BIT: u8 = 0x80;

const VERSION_MASK: u8 = 0x7F;

/// Supported protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ProtocolVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
    V4 = 4,
}

impl ProtocolVersion {
    pub const ALL: [ProtocolVersion; 4] = [
        ProtocolVersion::V1,
        ProtocolVersion::V2,
        ProtocolVersion::V3,
        ProtocolVersion::V4,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the header size in bytes for this version.
    pub fn header_size(self) -> usize {
        if self.has_narrow_stream() {
            8
        } else {
            9
        }
    }

    /// v1 and v2 carry the stream id in a single byte.
    fn has_narrow_stream(self) -> bool {
        matches!(self, ProtocolVersion::V1 | ProtocolVersion::V2)
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ProtocolVersion::V1),
            2 => Ok(ProtocolVersion::V2),
            3 => Ok(ProtocolVersion::V3),
            4 => Ok(ProtocolVersion::V4),
            other => Err(FrameError::UnsupportedVersion(other)),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_u8())
    }
}

/// Returns the header size in bytes for `version`.
pub fn header_size(version: ProtocolVersion) -> usize {
    version.header_size()
}

/// Reads the protocol version out of the first byte of a header.
///
/// This is all that can be learned before the header size is known, so a
/// connection calls it on the very first byte it receives.
pub fn first_byte_version(byte: u8) -> Result<ProtocolVersion, FrameError> {
    ProtocolVersion::try_from(byte & VERSION_MASK)
}

/// Which side of the conversation produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// Frame flags bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Body is compressed with the codec chosen at STARTUP.
    pub const COMPRESSION: u8 = 0x01;
    /// Request tracing.
    pub const TRACING: u8 = 0x02;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn with_compression(mut self) -> Self {
        self.0 |= Self::COMPRESSION;
        self
    }

    pub fn with_tracing(mut self) -> Self {
        self.0 |= Self::TRACING;
        self
    }

    pub fn is_compressed(&self) -> bool {
        self.0 & Self::COMPRESSION != 0
    }

    pub fn is_tracing(&self) -> bool {
        self.0 & Self::TRACING != 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// A frame header normalized across protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: ProtocolVersion,
    pub direction: Direction,
    pub flags: FrameFlags,
    pub stream_id: i16,
    pub opcode: Opcode,
    pub body_length: u32,
}

impl FrameHeader {
    /// Creates a client-to-server header with no flags set.
    pub fn request(
        version: ProtocolVersion,
        stream_id: i16,
        opcode: Opcode,
        body_length: u32,
    ) -> Self {
        Self {
            version,
            direction: Direction::Request,
            flags: FrameFlags::new(),
            stream_id,
            opcode,
            body_length,
        }
    }

    /// Creates a server-to-client header with no flags set.
    pub fn response(
        version: ProtocolVersion,
        stream_id: i16,
        opcode: Opcode,
        body_length: u32,
    ) -> Self {
        Self {
            direction: Direction::Response,
            ..Self::request(version, stream_id, opcode, body_length)
        }
    }

    pub fn with_flags(mut self, flags: FrameFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Size of this header on the wire.
    pub fn size(&self) -> usize {
        self.version.header_size()
    }

    /// Appends the wire form of this header to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), FrameError> {
        let mut version_byte = self.version.as_u8();
        if self.direction == Direction::Response {
            version_byte |= RESPONSE_BIT;
        }

        buf.reserve(self.size());
        buf.put_u8(version_byte);
        buf.put_u8(self.flags.bits());

        if self.version.has_narrow_stream() {
            let stream = i8::try_from(self.stream_id).map_err(|_| {
                FrameError::StreamIdOutOfRange {
                    version: self.version,
                    stream_id: self.stream_id,
                }
            })?;
            buf.put_i8(stream);
        } else {
            buf.put_i16(self.stream_id);
        }

        buf.put_u8(self.opcode.as_u8());
        buf.put_u32(self.body_length);
        Ok(())
    }

    /// Encodes this header into a fresh buffer.
    pub fn encode(&self) -> Result<BytesMut, FrameError> {
        let mut buf = BytesMut::with_capacity(self.size());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }
}

/// Encodes a response header for `version`.
///
/// The version byte carries the response bit and flags are always zero.
pub fn encode_header(
    version: ProtocolVersion,
    stream_id: i16,
    opcode: Opcode,
    body_length: u32,
) -> Result<BytesMut, FrameError> {
    FrameHeader::response(version, stream_id, opcode, body_length).encode()
}

/// Decodes a complete frame header.
///
/// With no `locked_version` the version is taken from the header itself;
/// otherwise the header must carry exactly the locked version. `bytes` must
/// hold exactly one header of the effective version. Returns the header and
/// the version the connection is now locked to.
pub fn decode_header(
    locked_version: Option<ProtocolVersion>,
    bytes: &[u8],
) -> Result<(FrameHeader, ProtocolVersion), FrameError> {
    let Some(&first) = bytes.first() else {
        return Err(FrameError::TruncatedHeader {
            expected: locked_version.map_or(1, header_size),
            actual: 0,
        });
    };

    let version = match locked_version {
        Some(locked) => {
            let actual = first & VERSION_MASK;
            if actual != locked.as_u8() {
                return Err(FrameError::VersionMismatch {
                    expected: locked.as_u8(),
                    actual,
                });
            }
            locked
        }
        None => first_byte_version(first)?,
    };

    let expected = version.header_size();
    if bytes.len() != expected {
        return Err(FrameError::InvalidHeaderLength {
            version: version.as_u8(),
            expected,
            actual: bytes.len(),
        });
    }

    let mut buf = bytes;
    let version_byte = buf.get_u8();
    let direction = if version_byte & RESPONSE_BIT != 0 {
        Direction::Response
    } else {
        Direction::Request
    };
    let flags = FrameFlags::from_bits(buf.get_u8());
    let stream_id = if version.has_narrow_stream() {
        i16::from(buf.get_i8())
    } else {
        buf.get_i16()
    };
    let opcode_byte = buf.get_u8();
    let body_length = buf.get_u32();

    let opcode = Opcode::from_u8(opcode_byte).ok_or(FrameError::UnknownOpcode {
        stream_id,
        opcode: opcode_byte,
    })?;

    let header = FrameHeader {
        version,
        direction,
        flags,
        stream_id,
        opcode,
        body_length,
    };
    Ok((header, version))
}
