//! Results of running a query.

use super::cursor::Cursor;
use crate::error::{Error, Result};
use crate::reql::Datum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What `Connection::run` resolves to
#[derive(Debug)]
pub enum RunResult {
    /// A single value
    Atom {
        value: Datum,
        profile: Option<Value>,
    },
    /// A stream, possibly infinite
    Cursor(Cursor),
    /// The query was sent with `noreply`
    NoReply,
}

impl RunResult {
    pub fn profile(&self) -> Option<Value> {
        match self {
            RunResult::Atom { profile, .. } => profile.clone(),
            RunResult::Cursor(cursor) => cursor.profile(),
            RunResult::NoReply => None,
        }
    }

    pub fn into_atom(self) -> Result<Datum> {
        match self {
            RunResult::Atom { value, .. } => Ok(value),
            RunResult::Cursor(_) => Err(Error::Client("expected a single value, got a stream".to_string())),
            RunResult::NoReply => Err(Error::Client("noreply query has no result".to_string())),
        }
    }

    pub fn into_cursor(self) -> Result<Cursor> {
        match self {
            RunResult::Cursor(cursor) => Ok(cursor),
            RunResult::Atom { .. } => Err(Error::Client("expected a stream, got a single value".to_string())),
            RunResult::NoReply => Err(Error::Client("noreply query has no result".to_string())),
        }
    }

    /// All values: an array atom is unpacked, a finite stream drained.
    pub async fn into_vec(self) -> Result<Vec<Datum>> {
        match self {
            RunResult::Atom { value: Datum::Array(values), .. } => Ok(values),
            RunResult::Atom { value, .. } => Ok(vec![value]),
            RunResult::Cursor(cursor) => cursor.to_vec().await,
            RunResult::NoReply => Ok(Vec::new()),
        }
    }
}

/// Answer to a SERVER_INFO query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: uuid::Uuid,
    pub name: Option<String>,
    #[serde(default)]
    pub proxy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info_decode() {
        let info: ServerInfo = serde_json::from_value(serde_json::json!({
            "id": "6c1ed1d8-7f5e-4b36-9d5b-8a1f0b7c2e11",
            "name": "node_1",
            "proxy": false
        }))
        .unwrap();
        assert_eq!(info.name.as_deref(), Some("node_1"));
        assert!(!info.proxy);
    }

    #[tokio::test]
    async fn test_atom_into_vec() {
        let result = RunResult::Atom {
            value: Datum::Array(vec![Datum::from(1), Datum::from(2)]),
            profile: None,
        };
        assert_eq!(result.into_vec().await.unwrap().len(), 2);
        assert!(RunResult::NoReply.into_atom().is_err());
    }
}
