//! Query engine boundary.
//!
//! Parsing and executing CQL lives outside this crate. The dispatcher hands
//! each QUERY to a [`QueryEngine`] and sends back whatever RESULT body it
//! produces.

use bytes::{BufMut, Bytes, BytesMut};
use cqlwire_protocol::writer::RESULT_KIND_VOID;
use cqlwire_protocol::{ConsistencyLevel, ErrorCode};
use thiserror::Error;

/// A decoded QUERY request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub query: String,
    /// Absent when the client sent only the query text.
    pub consistency: Option<ConsistencyLevel>,
    pub flags: Option<u8>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            consistency: None,
            flags: None,
        }
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = Some(consistency);
        self
    }
}

/// An encoded RESULT body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPayload(Bytes);

impl ResultPayload {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self(body.into())
    }

    /// The `Void` result, for statements that return nothing.
    pub fn void() -> Self {
        let mut body = BytesMut::with_capacity(4);
        body.put_i32(RESULT_KIND_VOID);
        Self(body.freeze())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A query failure reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryError {
    pub code: ErrorCode,
    pub message: String,
}

impl QueryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SyntaxError, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Invalid, message)
    }
}

/// Compiles and executes query text.
pub trait QueryEngine: Send + Sync {
    fn compile_and_execute(&self, request: &QueryRequest) -> Result<ResultPayload, QueryError>;
}

/// Engine used when nothing else is wired in: every query fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredQueryEngine;

impl QueryEngine for UnconfiguredQueryEngine {
    fn compile_and_execute(&self, _request: &QueryRequest) -> Result<ResultPayload, QueryError> {
        Err(QueryError::new(
            ErrorCode::ServerError,
            "no query engine configured",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_payload() {
        assert_eq!(ResultPayload::void().as_bytes(), &[0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_unconfigured_engine_rejects() {
        let err = UnconfiguredQueryEngine
            .compile_and_execute(&QueryRequest::new("SELECT * FROM t"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerError);
        assert_eq!(err.to_string(), "no query engine configured");
    }

    #[test]
    fn test_query_error_constructors() {
        assert_eq!(QueryError::syntax("x").code, ErrorCode::SyntaxError);
        assert_eq!(QueryError::invalid("x").code, ErrorCode::Invalid);
    }
}
