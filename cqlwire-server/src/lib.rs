//! # cqlwire-server
//!
//! TCP server for the CQL native protocol.
//!
//! This crate provides:
//! - A per-connection state machine that negotiates the protocol version
//! - Opcode dispatch to the query engine and authenticator
//! - The accept loop with connection limits and shutdown
//! - YAML and environment configuration

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod query;
pub mod server;

pub use auth::{AllowAllAuthenticator, AuthError, Authenticator, Credentials};
pub use config::{Config, ConfigError, NetworkConfig, ProtocolConfig};
pub use connection::{Connection, ConnectionState};
pub use error::{HandlerError, ServerError};
pub use handler::{Dispatch, RequestDispatcher, SUPPORTED_OPTIONS};
pub use query::{QueryEngine, QueryError, QueryRequest, ResultPayload, UnconfiguredQueryEngine};
pub use server::{Server, ServerConfig, ServerStats};
