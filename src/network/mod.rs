//! Network protocol handling
//!
//! Client side of the RethinkDB wire protocol over TCP or any async stream.
//!
//! ## Protocol Flow
//!
//! 1. **Handshake**: client sends version magic, auth key and protocol type,
//!    server answers with a NUL-terminated status
//! 2. **Query/Response Loop**: framed JSON queries and responses, many in
//!    flight at once, matched by token
//!
//! ## Modules
//!
//! - [`protocol`]: handshake, frame codec and response parsing
//! - [`config`]: connection and close options
//! - [`connection`]: the multiplexer that owns the transport

pub mod config;
pub mod connection;
pub mod protocol;

pub use config::{CloseOptions, ConnectOptions};
pub use connection::{connect, Connection, ConnectionState};
pub use protocol::{
    Handshake, ProtocolVersion, QueryMessage, Response, ResponseMessage, PROTOCOL_JSON,
    VERSION_V0_4, VERSION_V1_0,
};
