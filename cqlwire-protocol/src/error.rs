//! Protocol error types and error codes.

use crate::frame::ProtocolVersion;
use std::fmt;
use thiserror::Error;

/// Errors in a frame header or in the framing of a body.
///
/// Every variant is fatal to the connection that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("unsupported protocol version: {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("protocol version changed mid-connection: negotiated v{expected}, got v{actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    #[error("invalid header length for v{version}: expected {expected} bytes, got {actual}")]
    InvalidHeaderLength {
        version: u8,
        expected: usize,
        actual: usize,
    },

    #[error("unknown opcode {opcode:#04x} on stream {stream_id}")]
    UnknownOpcode { stream_id: i16, opcode: u8 },

    #[error("frame on stream {stream_id} requests compression, which is not supported")]
    CompressionUnsupported { stream_id: i16 },

    #[error("received a response frame where a request was expected")]
    UnexpectedDirection,

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("truncated frame header: got {actual} of {expected} bytes")]
    TruncatedHeader { expected: usize, actual: usize },

    #[error("truncated frame body: got {actual} of {expected} bytes")]
    TruncatedBody { expected: usize, actual: usize },

    #[error("stream id {stream_id} does not fit a {version} header")]
    StreamIdOutOfRange {
        version: ProtocolVersion,
        stream_id: i16,
    },
}

/// Errors while decoding primitive values from a frame body.
///
/// These are recoverable: the frame itself was well formed, so the
/// connection answers with a protocol error and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated body: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("invalid consistency level: {0:#06x}")]
    InvalidConsistency(u16),
}

/// Errors while building a response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{field} of {len} bytes exceeds the maximum of {max}")]
    ValueTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("cannot encode frame header: {0}")]
    Header(#[from] FrameError),
}

/// Error codes carried in ERROR frames.
///
/// The numeric values are fixed by the native protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    ServerError = 0x0000,
    ProtocolError = 0x000A,
    BadCredentials = 0x0100,
    Unavailable = 0x1000,
    Overloaded = 0x1001,
    IsBootstrapping = 0x1002,
    TruncateError = 0x1003,
    WriteTimeout = 0x1100,
    ReadTimeout = 0x1200,
    SyntaxError = 0x2000,
    Unauthorized = 0x2100,
    Invalid = 0x2200,
    ConfigError = 0x2300,
    AlreadyExists = 0x2400,
    Unprepared = 0x2500,
}

impl ErrorCode {
    /// Returns the wire code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Looks up an error code by its wire value.
    pub fn from_code(code: u16) -> Option<Self> {
        let ec = match code {
            0x0000 => ErrorCode::ServerError,
            0x000A => ErrorCode::ProtocolError,
            0x0100 => ErrorCode::BadCredentials,
            0x1000 => ErrorCode::Unavailable,
            0x1001 => ErrorCode::Overloaded,
            0x1002 => ErrorCode::IsBootstrapping,
            0x1003 => ErrorCode::TruncateError,
            0x1100 => ErrorCode::WriteTimeout,
            0x1200 => ErrorCode::ReadTimeout,
            0x2000 => ErrorCode::SyntaxError,
            0x2100 => ErrorCode::Unauthorized,
            0x2200 => ErrorCode::Invalid,
            0x2300 => ErrorCode::ConfigError,
            0x2400 => ErrorCode::AlreadyExists,
            0x2500 => ErrorCode::Unprepared,
            _ => return None,
        };
        Some(ec)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::BadCredentials => "BAD_CREDENTIALS",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Overloaded => "OVERLOADED",
            ErrorCode::IsBootstrapping => "IS_BOOTSTRAPPING",
            ErrorCode::TruncateError => "TRUNCATE_ERROR",
            ErrorCode::WriteTimeout => "WRITE_TIMEOUT",
            ErrorCode::ReadTimeout => "READ_TIMEOUT",
            ErrorCode::SyntaxError => "SYNTAX_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Invalid => "INVALID",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::Unprepared => "UNPREPARED",
        };
        f.write_str(name)
    }
}
