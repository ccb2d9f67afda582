//! Opcode dispatch.

use crate::auth::{AllowAllAuthenticator, Authenticator, Credentials};
use crate::error::HandlerError;
use crate::query::{QueryEngine, QueryRequest, UnconfiguredQueryEngine};
use bytes::Bytes;
use cqlwire_protocol::writer::MAX_SHORT_LEN;
use cqlwire_protocol::{BodyReader, ErrorCode, Opcode, Response};
use std::sync::Arc;

/// Options advertised in SUPPORTED, as (key, value) pairs.
///
/// Compression is advertised for driver compatibility; compressed frames
/// are still rejected.
pub const SUPPORTED_OPTIONS: [(&str, &str); 3] = [
    ("CQL_VERSION", "3.0.0"),
    ("CQL_VERSION", "3.2.0"),
    ("COMPRESSION", "snappy"),
];

/// What the connection should do with a dispatched frame.
#[derive(Debug)]
pub enum Dispatch {
    /// Send the response and keep reading.
    Reply(Response),
    /// Send the response, then close the connection.
    ReplyAndClose(Response),
}

impl Dispatch {
    pub fn response(&self) -> &Response {
        match self {
            Dispatch::Reply(r) | Dispatch::ReplyAndClose(r) => r,
        }
    }
}

/// Maps request opcodes to handlers.
pub struct RequestDispatcher {
    engine: Arc<dyn QueryEngine>,
    authenticator: Arc<dyn Authenticator>,
}

impl RequestDispatcher {
    /// Creates a dispatcher backed by `engine`.
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            engine,
            authenticator: Arc::new(AllowAllAuthenticator),
        }
    }

    /// Sets the authenticator used for CREDENTIALS.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Handles one request frame.
    pub fn dispatch(&self, stream_id: i16, opcode: Opcode, body: Bytes) -> Dispatch {
        let result = match opcode {
            Opcode::Startup => self.handle_startup(stream_id, body),
            Opcode::Options => self.handle_options(stream_id),
            Opcode::Query => self.handle_query(stream_id, body),
            Opcode::Register => self.handle_register(stream_id, body),
            Opcode::Credentials => self.handle_credentials(stream_id, body),
            Opcode::AuthResponse | Opcode::Prepare | Opcode::Execute | Opcode::Batch => {
                Err(HandlerError::NotImplemented(opcode))
            }
            Opcode::Error
            | Opcode::Ready
            | Opcode::Authenticate
            | Opcode::Supported
            | Opcode::Result
            | Opcode::Event
            | Opcode::AuthChallenge
            | Opcode::AuthSuccess => {
                tracing::warn!("Client sent server-only opcode {} on stream {}", opcode, stream_id);
                return Dispatch::ReplyAndClose(Response::error(
                    stream_id,
                    ErrorCode::ProtocolError,
                    &format!("unexpected {} message from client", opcode),
                ));
            }
        };

        match result {
            Ok(response) => Dispatch::Reply(response),
            Err(e) => {
                let message = e.to_string();
                if Response::clips_error_message(&message) {
                    tracing::warn!(
                        "Error message on stream {} is {} bytes, clipping to {}",
                        stream_id,
                        message.len(),
                        MAX_SHORT_LEN
                    );
                } else {
                    tracing::debug!("{} on stream {} failed: {}", opcode, stream_id, message);
                }
                Dispatch::Reply(Response::error(stream_id, e.error_code(), &message))
            }
        }
    }

    /// Response for an opcode byte outside the protocol.
    pub fn unknown_opcode(stream_id: i16, opcode: u8) -> Response {
        Response::error(
            stream_id,
            ErrorCode::ProtocolError,
            &format!("unknown opcode {:#04x}", opcode),
        )
    }

    fn handle_startup(&self, stream_id: i16, body: Bytes) -> Result<Response, HandlerError> {
        let options = BodyReader::new(body).string_map()?;
        for (key, value) in &options {
            tracing::debug!("STARTUP option {} => {}", key, value);
        }
        Ok(Response::ready(stream_id))
    }

    fn handle_options(&self, stream_id: i16) -> Result<Response, HandlerError> {
        Ok(Response::supported(stream_id, SUPPORTED_OPTIONS)?)
    }

    fn handle_query(&self, stream_id: i16, body: Bytes) -> Result<Response, HandlerError> {
        let mut reader = BodyReader::new(body);
        let mut request = QueryRequest::new(reader.long_string()?);
        if !reader.is_empty() {
            request.consistency = Some(reader.consistency_level()?);
        }
        if !reader.is_empty() {
            request.flags = Some(reader.byte()?);
        }

        tracing::debug!("Processing query: '{}'", request.query);
        let payload = self.engine.compile_and_execute(&request)?;
        Ok(Response::result(stream_id, payload.as_bytes()))
    }

    fn handle_register(&self, stream_id: i16, body: Bytes) -> Result<Response, HandlerError> {
        let events = BodyReader::new(body).string_list()?;
        tracing::warn!("Ignoring event registration for {:?}", events);
        Ok(Response::ready(stream_id))
    }

    fn handle_credentials(&self, stream_id: i16, body: Bytes) -> Result<Response, HandlerError> {
        let credentials = Credentials::new(BodyReader::new(body).string_map()?);
        self.authenticator.authenticate(&credentials)?;
        Ok(Response::ready(stream_id))
    }
}

impl Default for RequestDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(UnconfiguredQueryEngine))
    }
}
