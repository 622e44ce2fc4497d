//! RethinkDB Wire Protocol Implementation
//!
//! Handshake plus the frame codec shared by both directions. Every frame is
//!
//! ```text
//! <token: u64 LE><length: u32 LE><JSON payload>
//! ```
//!
//! Client helpers (`write_query`, `read_response`) are used by the connection
//! multiplexer. Server helpers (`Handshake::accept`, `read_query`,
//! `write_response`) let tests stand up a scripted server on any stream.

use crate::error::{Error, Result};
use crate::reql::{Backtrace, ErrorType, ResponseNote, ResponseType, Term};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version constants
pub const VERSION_V0_4: u32 = 0x400c2d20;
pub const VERSION_V1_0: u32 = 0x34c2bdc3;

/// JSON wire protocol magic
pub const PROTOCOL_JSON: u32 = 0x7e6970c7;

/// Size limits
pub const MAX_MESSAGE_SIZE: u32 = 256 * 1024 * 1024; // 256 MB
const MAX_AUTH_KEY_LEN: u32 = 4096;
const MAX_HANDSHAKE_REPLY: usize = 1024;

/// Frame header: token plus length
pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    #[default]
    V0_4,
    V1_0,
}

impl ProtocolVersion {
    pub fn from_magic(magic: u32) -> Result<Self> {
        match magic {
            VERSION_V0_4 => Ok(ProtocolVersion::V0_4),
            VERSION_V1_0 => Ok(ProtocolVersion::V1_0),
            _ => Err(Error::Connection(format!(
                "Unsupported protocol version: 0x{:x}",
                magic
            ))),
        }
    }

    pub fn to_magic(self) -> u32 {
        match self {
            ProtocolVersion::V0_4 => VERSION_V0_4,
            ProtocolVersion::V1_0 => VERSION_V1_0,
        }
    }
}

/// Handshake state
#[derive(Debug)]
pub struct Handshake {
    pub version: ProtocolVersion,
    pub auth_key: String,
}

impl Handshake {
    /// Perform server-side handshake
    pub async fn accept<T>(stream: &mut T) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let version = ProtocolVersion::from_magic(stream.read_u32_le().await?)?;

        let key_len = stream.read_u32_le().await?;
        if key_len > MAX_AUTH_KEY_LEN {
            return Err(Error::Connection(format!(
                "Auth key too long: {} bytes",
                key_len
            )));
        }
        let mut key_bytes = vec![0u8; key_len as usize];
        stream.read_exact(&mut key_bytes).await?;
        let auth_key = String::from_utf8(key_bytes)
            .map_err(|e| Error::Connection(format!("Auth key is not UTF-8: {}", e)))?;

        let protocol = stream.read_u32_le().await?;
        if protocol != PROTOCOL_JSON {
            return Err(Error::Connection(format!(
                "Unknown protocol type: 0x{:x}",
                protocol
            )));
        }

        let reply = match version {
            ProtocolVersion::V1_0 => serde_json::json!({
                "success": true,
                "min_protocol_version": 0,
                "max_protocol_version": 0,
                "server_version": env!("CARGO_PKG_VERSION")
            })
            .to_string(),
            ProtocolVersion::V0_4 => "SUCCESS".to_string(),
        };
        stream.write_all(reply.as_bytes()).await?;
        stream.write_all(b"\0").await?;
        stream.flush().await?;

        tracing::debug!(?version, "Server handshake complete");
        Ok(Handshake { version, auth_key })
    }

    /// Perform client-side handshake
    pub async fn connect<T>(stream: &mut T, auth_key: &str, version: ProtocolVersion) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut hello = BytesMut::with_capacity(12 + auth_key.len());
        hello.put_u32_le(version.to_magic());
        hello.put_u32_le(auth_key.len() as u32);
        hello.put_slice(auth_key.as_bytes());
        hello.put_u32_le(PROTOCOL_JSON);
        stream.write_all(&hello).await?;
        stream.flush().await?;

        let mut reply = Vec::new();
        loop {
            let byte = stream.read_u8().await?;
            if byte == 0 {
                break;
            }
            reply.push(byte);
            if reply.len() > MAX_HANDSHAKE_REPLY {
                return Err(Error::Connection("Handshake response too long".to_string()));
            }
        }
        let reply = String::from_utf8_lossy(&reply);

        let accepted = match version {
            ProtocolVersion::V1_0 => serde_json::from_str::<Value>(&reply)
                .map(|v| v.get("success") == Some(&Value::Bool(true)))
                .unwrap_or(false),
            ProtocolVersion::V0_4 => reply == "SUCCESS",
        };
        if !accepted {
            return Err(Error::Connection(format!("Handshake failed: {}", reply)));
        }

        tracing::debug!(?version, "Client handshake complete");
        Ok(())
    }
}

/// Query message with token
#[derive(Debug, Clone)]
pub struct QueryMessage {
    pub token: u64,
    pub query: Value,
}

/// Response message
#[derive(Debug, Clone)]
pub struct ResponseMessage {
    pub token: u64,
    pub response: Value,
}

/// Header plus payload in one buffer
pub fn encode_frame(token: u64, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u64_le(token);
    frame.put_u32_le(payload.len() as u32);
    frame.put_slice(payload);
    frame.freeze()
}

async fn read_frame<T>(stream: &mut T) -> Result<(u64, Value)>
where
    T: AsyncRead + Unpin,
{
    let token = stream.read_u64_le().await?;
    let size = stream.read_u32_le().await?;
    if size > MAX_MESSAGE_SIZE {
        return Err(Error::Connection(format!(
            "Message too large: {} bytes (max: {})",
            size, MAX_MESSAGE_SIZE
        )));
    }

    let mut buffer = vec![0u8; size as usize];
    stream.read_exact(&mut buffer).await?;
    let value = serde_json::from_slice(&buffer)
        .map_err(|e| Error::Connection(format!("Malformed frame for token {}: {}", token, e)))?;
    Ok((token, value))
}

async fn write_frame<T>(stream: &mut T, token: u64, value: &Value) -> Result<()>
where
    T: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(value)
        .map_err(|e| Error::Connection(format!("Cannot encode frame: {}", e)))?;
    stream.write_all(&encode_frame(token, &payload)).await?;
    stream.flush().await?;
    Ok(())
}

/// Read a query message from the stream (server side)
pub async fn read_query<T>(stream: &mut T) -> Result<QueryMessage>
where
    T: AsyncRead + Unpin,
{
    let (token, query) = read_frame(stream).await?;
    Ok(QueryMessage { token, query })
}

/// Write a response message to the stream (server side)
pub async fn write_response<T>(stream: &mut T, msg: &ResponseMessage) -> Result<()>
where
    T: AsyncWrite + Unpin,
{
    write_frame(stream, msg.token, &msg.response).await
}

/// Read a response message from the stream (client side)
pub async fn read_response<T>(stream: &mut T) -> Result<ResponseMessage>
where
    T: AsyncRead + Unpin,
{
    let (token, response) = read_frame(stream).await?;
    Ok(ResponseMessage { token, response })
}

/// Write a query message to the stream (client side)
pub async fn write_query<T>(stream: &mut T, msg: &QueryMessage) -> Result<()>
where
    T: AsyncWrite + Unpin,
{
    write_frame(stream, msg.token, &msg.query).await
}

#[derive(Deserialize)]
struct RawResponse {
    t: u64,
    #[serde(default)]
    r: Vec<Value>,
    #[serde(default)]
    b: Option<Backtrace>,
    #[serde(default)]
    p: Option<Value>,
    #[serde(default)]
    n: Vec<u64>,
    #[serde(default)]
    e: Option<u64>,
}

/// A parsed server response
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub token: u64,
    pub kind: ResponseType,
    pub data: Vec<Value>,
    pub backtrace: Option<Backtrace>,
    pub profile: Option<Value>,
    pub notes: Vec<ResponseNote>,
    pub error_type: Option<ErrorType>,
}

impl Response {
    pub fn parse(msg: ResponseMessage) -> Result<Self> {
        let raw: RawResponse = serde_json::from_value(msg.response)
            .map_err(|e| Error::Client(format!("Malformed response: {}", e)))?;
        let kind = ResponseType::from_u64(raw.t)
            .ok_or_else(|| Error::Client(format!("Unknown response type: {}", raw.t)))?;

        Ok(Response {
            token: msg.token,
            kind,
            data: raw.r,
            backtrace: raw.b,
            profile: raw.p,
            notes: raw.n.into_iter().filter_map(ResponseNote::from_u64).collect(),
            error_type: raw.e.map(ErrorType::from_u64),
        })
    }

    /// Whether the server marked this as a change feed
    pub fn is_feed(&self) -> bool {
        self.notes.iter().any(|n| n.is_feed())
    }

    fn message(&self) -> String {
        match self.data.first() {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        }
    }

    /// Convert an error response. `term` is the query it answers, used to
    /// point at the failing sub-term.
    pub fn into_error(self, term: Option<&Term>) -> Error {
        let message = self.message();
        match self.kind {
            ResponseType::ClientError => Error::Client(message),
            ResponseType::CompileError => Error::Compile(message),
            ResponseType::RuntimeError => {
                let backtrace = self.backtrace.unwrap_or_default();
                let term = term
                    .and_then(|t| t.locate(&backtrace))
                    .map(|t| t.pretty_print(1));
                Error::Runtime {
                    kind: self.error_type.unwrap_or(ErrorType::Unknown),
                    message,
                    frames: backtrace,
                    term,
                }
            }
            other => Error::Client(format!("Unexpected response type {:?}", other)),
        }
    }
}
