//! ReQL (RethinkDB Query Language) term construction.
//!
//! This module covers everything needed to describe a query on the client:
//!
//! - **Term Types**: the opcode table with per-opcode arity and option keys
//! - **AST**: immutable, structurally shared `Term` trees
//! - **Datum**: JSON-like values plus the TIME, BINARY and GEOMETRY pseudo-types
//! - **Closures**: Rust closures compiled into FUNC terms at build time
//! - **Builder**: `r::*` entry points and chained methods on `Term`
//!
//! Nothing in here talks to the network. Terms are lowered to wire JSON by
//! `query::compiler` when they are run.
//!
//! # Example
//!
//! ```rust
//! use reql_client::reql::{r, TermType};
//!
//! // r.db("test").table("users").get("alice")
//! let query = r::db("test").table("users").get("alice");
//! assert_eq!(query.term_type(), TermType::Get);
//! ```

pub mod ast;
pub mod datum;
pub mod func;
pub mod ops;
pub mod r;
pub mod terms;
pub mod types;

pub use ast::{Arg, Args, Backtrace, Frame, OptArgs, Term};
pub use datum::{Datum, DecodeOptions, Format};
pub use func::{func, func2, func3, Fallback, Func};
pub use ops::sequence::Squash;
pub use ops::ChangesOptions;
pub use terms::TermType;
pub use types::{ErrorType, QueryType, ResponseNote, ResponseType};
