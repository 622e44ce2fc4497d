//! Run options.
//!
//! Most fields are sent to the server as global optargs of the START query.
//! The three `*_format` fields only change how the client decodes response
//! values and never leave the process.

use crate::reql::ops::optargs_of;
use crate::reql::{r, DecodeOptions, Format, Term};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keys handled on the client that the server never sees.
const CLIENT_ONLY: &[&str] = &["time_format", "binary_format", "group_format"];

/// Default number of unread changes a feed cursor holds.
pub const DEFAULT_CHANGEFEED_QUEUE_SIZE: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    Single,
    Majority,
    Outdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    Hard,
    Soft,
}

/// Options accepted by `Connection::run`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub read_mode: Option<ReadMode>,
    pub time_format: Option<Format>,
    pub profile: Option<bool>,
    pub durability: Option<Durability>,
    pub group_format: Option<Format>,
    /// Do not wait for, or even accept, a reply
    pub noreply: Option<bool>,
    /// Database for tables not qualified with `r::db`
    pub db: Option<String>,
    pub array_limit: Option<u64>,
    pub binary_format: Option<Format>,
    pub min_batch_rows: Option<u64>,
    pub max_batch_rows: Option<u64>,
    pub max_batch_bytes: Option<u64>,
    pub max_batch_seconds: Option<f64>,
    pub first_batch_scaledown_factor: Option<u64>,
    pub changefeed_queue_size: Option<usize>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn db<S: Into<String>>(mut self, db: S) -> Self {
        self.db = Some(db.into());
        self
    }

    pub fn noreply(mut self, noreply: bool) -> Self {
        self.noreply = Some(noreply);
        self
    }

    pub fn profile(mut self, profile: bool) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = Some(durability);
        self
    }

    pub fn read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = Some(read_mode);
        self
    }

    pub fn changefeed_queue_size(mut self, size: usize) -> Self {
        self.changefeed_queue_size = Some(size);
        self
    }

    pub fn is_noreply(&self) -> bool {
        self.noreply.unwrap_or(false)
    }

    pub fn wants_profile(&self) -> bool {
        self.profile.unwrap_or(false)
    }

    /// Format settings used when decoding response values.
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            time_format: self.time_format.unwrap_or_default(),
            binary_format: self.binary_format.unwrap_or_default(),
            group_format: self.group_format.unwrap_or_default(),
        }
    }

    /// Global optargs of the START query.
    ///
    /// `db` is sent as a DB term rather than a plain string.
    pub fn global_optargs(&self) -> BTreeMap<String, Term> {
        let mut optargs = optargs_of(self);
        optargs.retain(|key, _| !CLIENT_ONLY.contains(&key.as_str()));
        if let Some(db) = &self.db {
            optargs.insert("db".to_string(), r::db(db.as_str()));
        }
        optargs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reql::TermType;

    #[test]
    fn test_default_sends_nothing() {
        assert!(RunOptions::default().global_optargs().is_empty());
    }

    #[test]
    fn test_formats_stay_local() {
        let opts = RunOptions {
            time_format: Some(Format::Raw),
            durability: Some(Durability::Soft),
            ..Default::default()
        };
        let optargs = opts.global_optargs();
        assert!(optargs.get("time_format").is_none());
        assert_eq!(
            optargs.get("durability").and_then(|t| t.as_datum()).and_then(|d| d.as_string()),
            Some("soft")
        );
        assert_eq!(opts.decode_options().time_format, Format::Raw);
    }

    #[test]
    fn test_db_is_a_term() {
        let optargs = RunOptions::new().db("blog").global_optargs();
        assert_eq!(optargs.get("db").map(Term::term_type), Some(TermType::Db));
    }

    #[test]
    fn test_deserialize_from_json() {
        let opts: RunOptions = serde_json::from_value(serde_json::json!({
            "read_mode": "outdated",
            "max_batch_rows": 50,
            "binary_format": "raw"
        }))
        .unwrap();
        assert_eq!(opts.read_mode, Some(ReadMode::Outdated));
        assert_eq!(opts.max_batch_rows, Some(50));
        assert_eq!(opts.binary_format, Some(Format::Raw));
    }
}
