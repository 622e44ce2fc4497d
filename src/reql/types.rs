//! ReQL type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Query type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    Start,
    Continue,
    Stop,
    NoreplyWait,
    ServerInfo,
}

impl QueryType {
    pub fn to_u64(self) -> u64 {
        match self {
            QueryType::Start => 1,
            QueryType::Continue => 2,
            QueryType::Stop => 3,
            QueryType::NoreplyWait => 4,
            QueryType::ServerInfo => 5,
        }
    }

    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(QueryType::Start),
            2 => Some(QueryType::Continue),
            3 => Some(QueryType::Stop),
            4 => Some(QueryType::NoreplyWait),
            5 => Some(QueryType::ServerInfo),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryType::Start => "START",
            QueryType::Continue => "CONTINUE",
            QueryType::Stop => "STOP",
            QueryType::NoreplyWait => "NOREPLY_WAIT",
            QueryType::ServerInfo => "SERVER_INFO",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Response type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseType {
    SuccessAtom,
    SuccessSequence,
    SuccessPartial,
    WaitComplete,
    ServerInfo,
    ClientError,
    CompileError,
    RuntimeError,
}

impl ResponseType {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(ResponseType::SuccessAtom),
            2 => Some(ResponseType::SuccessSequence),
            3 => Some(ResponseType::SuccessPartial),
            4 => Some(ResponseType::WaitComplete),
            5 => Some(ResponseType::ServerInfo),
            16 => Some(ResponseType::ClientError),
            17 => Some(ResponseType::CompileError),
            18 => Some(ResponseType::RuntimeError),
            _ => None,
        }
    }

    pub fn to_u64(self) -> u64 {
        match self {
            ResponseType::SuccessAtom => 1,
            ResponseType::SuccessSequence => 2,
            ResponseType::SuccessPartial => 3,
            ResponseType::WaitComplete => 4,
            ResponseType::ServerInfo => 5,
            ResponseType::ClientError => 16,
            ResponseType::CompileError => 17,
            ResponseType::RuntimeError => 18,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            ResponseType::ClientError | ResponseType::CompileError | ResponseType::RuntimeError
        )
    }

    /// Whether no further responses follow under the same token.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ResponseType::SuccessPartial)
    }
}

/// Extra information the server attaches to a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseNote {
    SequenceFeed,
    AtomFeed,
    OrderByLimitFeed,
    UnionedFeed,
    IncludesStates,
}

impl ResponseNote {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(ResponseNote::SequenceFeed),
            2 => Some(ResponseNote::AtomFeed),
            3 => Some(ResponseNote::OrderByLimitFeed),
            4 => Some(ResponseNote::UnionedFeed),
            5 => Some(ResponseNote::IncludesStates),
            _ => None,
        }
    }

    pub fn to_u64(self) -> u64 {
        match self {
            ResponseNote::SequenceFeed => 1,
            ResponseNote::AtomFeed => 2,
            ResponseNote::OrderByLimitFeed => 3,
            ResponseNote::UnionedFeed => 4,
            ResponseNote::IncludesStates => 5,
        }
    }

    pub fn is_feed(self) -> bool {
        !matches!(self, ResponseNote::IncludesStates)
    }
}

/// Category of a RUNTIME_ERROR response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    Internal,
    ResourceLimit,
    QueryLogic,
    NonExistence,
    OpFailed,
    OpIndeterminate,
    User,
    PermissionError,
    Unknown,
}

impl ErrorType {
    pub fn from_u64(value: u64) -> Self {
        match value {
            1_000_000 => ErrorType::Internal,
            2_000_000 => ErrorType::ResourceLimit,
            3_000_000 => ErrorType::QueryLogic,
            3_100_000 => ErrorType::NonExistence,
            4_100_000 => ErrorType::OpFailed,
            4_200_000 => ErrorType::OpIndeterminate,
            5_000_000 => ErrorType::User,
            6_000_000 => ErrorType::PermissionError,
            _ => ErrorType::Unknown,
        }
    }

    pub fn to_u64(self) -> u64 {
        match self {
            ErrorType::Internal => 1_000_000,
            ErrorType::ResourceLimit => 2_000_000,
            ErrorType::QueryLogic => 3_000_000,
            ErrorType::NonExistence => 3_100_000,
            ErrorType::OpFailed => 4_100_000,
            ErrorType::OpIndeterminate => 4_200_000,
            ErrorType::User => 5_000_000,
            ErrorType::PermissionError => 6_000_000,
            ErrorType::Unknown => 0,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::Internal => "INTERNAL",
            ErrorType::ResourceLimit => "RESOURCE_LIMIT",
            ErrorType::QueryLogic => "QUERY_LOGIC",
            ErrorType::NonExistence => "NON_EXISTENCE",
            ErrorType::OpFailed => "OP_FAILED",
            ErrorType::OpIndeterminate => "OP_INDETERMINATE",
            ErrorType::User => "USER",
            ErrorType::PermissionError => "PERMISSION_ERROR",
            ErrorType::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_type_codes() {
        assert_eq!(QueryType::Start.to_u64(), 1);
        assert_eq!(QueryType::from_u64(4), Some(QueryType::NoreplyWait));
        assert_eq!(QueryType::from_u64(9), None);
    }

    #[test]
    fn test_response_type_terminal() {
        assert!(!ResponseType::SuccessPartial.is_terminal());
        assert!(ResponseType::SuccessSequence.is_terminal());
        assert!(ResponseType::RuntimeError.is_error());
        assert_eq!(ResponseType::from_u64(17), Some(ResponseType::CompileError));
    }

    #[test]
    fn test_error_type_codes() {
        assert_eq!(ErrorType::from_u64(3_100_000), ErrorType::NonExistence);
        assert_eq!(ErrorType::from_u64(42), ErrorType::Unknown);
        assert_eq!(ErrorType::OpFailed.to_string(), "OP_FAILED");
    }
}
