//! Query compilation and result handling
//!
//! - [`compiler`]: validates terms and lowers them to wire JSON
//! - [`options`]: run options and their split into global optargs
//! - [`cursor`]: batched, possibly infinite result streams
//! - [`result`]: what running a query resolves to

pub mod compiler;
pub mod cursor;
pub mod options;
pub mod result;

pub use compiler::{Query, QueryCompiler};
pub use cursor::Cursor;
pub use options::{Durability, ReadMode, RunOptions};
pub use result::{RunResult, ServerInfo};
