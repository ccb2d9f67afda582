//! Server error types.

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::query::QueryError;
use cqlwire_protocol::{DecodeError, EncodeError, ErrorCode, FrameError, Opcode};
use thiserror::Error;

/// Errors that end a connection or stop the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("cannot encode response: {0}")]
    Encode(#[from] EncodeError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("client sent {opcode} on stream {stream_id}, which is not a request")]
    UnexpectedOpcode { stream_id: i16, opcode: Opcode },
}

impl ServerError {
    /// Returns whether the peer broke the protocol, as opposed to the
    /// transport failing underneath it.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ServerError::Frame(_) | ServerError::UnexpectedOpcode { .. }
        )
    }
}

/// Failures while handling a well-formed frame.
///
/// These never close the connection; they are answered with an ERROR frame
/// on the request's stream.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("not implemented")]
    NotImplemented(Opcode),

    #[error("{0}")]
    Encode(#[from] EncodeError),
}

impl HandlerError {
    /// Converts to the error code sent to the client.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            HandlerError::Decode(_) => ErrorCode::ProtocolError,
            HandlerError::Query(e) => e.code,
            HandlerError::Auth(_) => ErrorCode::BadCredentials,
            HandlerError::NotImplemented(_) => ErrorCode::ServerError,
            HandlerError::Encode(_) => ErrorCode::ServerError,
        }
    }
}
