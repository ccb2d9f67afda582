//! # cqlwire-protocol
//!
//! CQL native protocol codec, versions 1 through 4.
//!
//! This crate provides:
//! - Frame header parsing and encoding for both header layouts
//! - Bounded decoding of primitive wire types from a frame body
//! - Response construction with a header computed at send time
//! - Opcodes, error codes and consistency levels

pub mod codec;
pub mod consistency;
pub mod error;
pub mod frame;
pub mod opcode;
pub mod reader;
pub mod writer;

pub use codec::{Frame, FrameDecoder};
pub use consistency::ConsistencyLevel;
pub use error::{DecodeError, EncodeError, ErrorCode, FrameError};
pub use frame::{
    decode_header, encode_header, first_byte_version, header_size, Direction, FrameFlags,
    FrameHeader, ProtocolVersion, MAX_HEADER_SIZE, RESPONSE_BIT,
};
pub use opcode::Opcode;
pub use reader::BodyReader;
pub use writer::Response;

/// Default port for the native protocol.
pub const DEFAULT_PORT: u16 = 9042;

/// Default maximum frame body size (256 MiB).
pub const MAX_FRAME_SIZE: u32 = 256 * 1024 * 1024;
