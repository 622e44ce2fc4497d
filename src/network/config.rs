//! Connection configuration.
//!
//! Options come from code, the environment (`REQL_*`) or a config file with
//! environment overrides.

use super::protocol::ProtocolVersion;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 28015;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How to reach and greet the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    /// Default database for queries that do not name one. When unset the
    /// server falls back to `test`.
    pub db: Option<String>,
    pub user: String,
    pub password: String,
    /// Key sent in the handshake. Falls back to `password` when empty.
    pub auth_key: String,
    /// Bound on TCP connect plus handshake
    #[serde(with = "secs")]
    pub timeout: Duration,
    pub protocol_version: ProtocolVersion,
    /// How long `close` waits for outstanding queries
    #[serde(with = "secs")]
    pub drain_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db: None,
            user: "admin".to_string(),
            password: String::new(),
            auth_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
            protocol_version: ProtocolVersion::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl ConnectOptions {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Options from `REQL_*` environment variables, defaults elsewhere
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("REQL_HOST").unwrap_or(defaults.host);

        let port = std::env::var("REQL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let db = std::env::var("REQL_DB").ok().filter(|s| !s.is_empty());

        let user = std::env::var("REQL_USER").unwrap_or(defaults.user);

        let password = std::env::var("REQL_PASSWORD").unwrap_or_default();

        let auth_key = std::env::var("REQL_AUTH_KEY").unwrap_or_default();

        let timeout = std::env::var("REQL_TIMEOUT")
            .ok()
            .and_then(|t| parse_secs(&t))
            .unwrap_or(defaults.timeout);

        Self {
            host,
            port,
            db,
            user,
            password,
            auth_key,
            timeout,
            ..defaults
        }
    }

    /// Options from a config file (any format the `config` crate reads),
    /// overridden by `REQL_*` environment variables. A missing file is not
    /// an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("REQL"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Client(format!("invalid connection config: {}", e)))
    }

    pub fn db<S: Into<String>>(mut self, db: S) -> Self {
        self.db = Some(db.into());
        self
    }

    pub fn auth_key<S: Into<String>>(mut self, key: S) -> Self {
        self.auth_key = key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub(crate) fn handshake_key(&self) -> &str {
        if self.auth_key.is_empty() {
            &self.password
        } else {
            &self.auth_key
        }
    }
}

/// Fractional seconds; negative, NaN and overflowing values are rejected
fn parse_secs(text: &str) -> Option<Duration> {
    let secs = text.trim().parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Options of `Connection::close`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseOptions {
    /// Wait for outstanding noreply writes first
    pub noreply_wait: bool,
    /// Overrides `ConnectOptions::drain_timeout`
    pub drain_timeout: Option<Duration>,
}

impl Default for CloseOptions {
    fn default() -> Self {
        Self {
            noreply_wait: true,
            drain_timeout: None,
        }
    }
}

impl CloseOptions {
    /// Fail everything outstanding right away
    pub fn immediate() -> Self {
        Self {
            noreply_wait: false,
            drain_timeout: Some(Duration::ZERO),
        }
    }
}

/// Durations as fractional seconds
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
