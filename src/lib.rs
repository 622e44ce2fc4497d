// ReQL client - Rust Implementation
// Query builder, wire compiler and connection multiplexer for ReQL servers

#![warn(rust_2018_idioms)]

pub mod network;
pub mod query;
pub mod reql;

// Re-exports for convenience
pub use network::{connect, CloseOptions, ConnectOptions, Connection, ConnectionState};
pub use query::{Cursor, RunOptions, RunResult, ServerInfo};
pub use reql::{r, Datum, Term, TermType};

/// Client error types
pub mod error {
    use crate::reql::ast::Backtrace as Trace;
    use crate::reql::types::ErrorType;
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum Error {
        /// Malformed term or options. Raised locally, never sent.
        #[error("Compile error: {0}")]
        Compile(String),

        /// API misuse, or a CLIENT_ERROR reported by the server.
        #[error("Client error: {0}")]
        Client(String),

        /// The server failed to execute a well-formed query.
        #[error("Runtime error ({kind}): {message}{}", render_term(.term))]
        Runtime {
            kind: ErrorType,
            message: String,
            /// Path from the root term to the failing sub-term
            frames: Trace,
            term: Option<String>,
        },

        /// Transport failure, handshake failure or forced close.
        #[error("Connection error: {0}")]
        Connection(String),

        #[error("Change feed queue overflow: more than {limit} unread items")]
        QueueOverflow { limit: usize },

        #[error("Cursor is closed")]
        CursorClosed,
    }

    impl Error {
        pub fn is_connection(&self) -> bool {
            matches!(self, Error::Connection(_))
        }

        pub(crate) fn closed() -> Self {
            Error::Connection("connection closed".to_string())
        }
    }

    impl From<std::io::Error> for Error {
        fn from(e: std::io::Error) -> Self {
            Error::Connection(e.to_string())
        }
    }

    fn render_term(term: &Option<String>) -> String {
        match term {
            Some(t) => format!(" in:\n{}", t),
            None => String::new(),
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

pub use error::{Error, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
