//! Scripted in-memory server for connection tests

#![allow(dead_code)]

use reql_client::network::protocol::{read_query, write_response};
use reql_client::network::{Handshake, QueryMessage, ResponseMessage};
use reql_client::{ConnectOptions, Connection};
use serde_json::{json, Value};
use tokio::io::DuplexStream;
use tokio::time::{timeout, Duration};

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Server end of an in-memory connection
pub struct MockServer {
    pub stream: DuplexStream,
    pub handshake: Handshake,
}

impl MockServer {
    /// Next query from the client
    pub async fn recv(&mut self) -> QueryMessage {
        timeout(QUERY_TIMEOUT, read_query(&mut self.stream))
            .await
            .expect("timed out waiting for a query")
            .expect("failed to read query")
    }

    /// Next query, which must be of the given type (1 START, 2 CONTINUE, ...)
    pub async fn expect(&mut self, query_type: u64) -> QueryMessage {
        let msg = self.recv().await;
        assert_eq!(
            msg.query[0],
            json!(query_type),
            "unexpected query {}",
            msg.query
        );
        msg
    }

    pub async fn reply(&mut self, token: u64, response: Value) {
        write_response(&mut self.stream, &ResponseMessage { token, response })
            .await
            .expect("failed to write response");
    }

    pub async fn reply_atom(&mut self, token: u64, value: Value) {
        self.reply(token, json!({"t": 1, "r": [value]})).await;
    }

    pub async fn reply_partial(&mut self, token: u64, batch: Value) {
        self.reply(token, json!({"t": 3, "r": batch})).await;
    }

    pub async fn reply_sequence(&mut self, token: u64, batch: Value) {
        self.reply(token, json!({"t": 2, "r": batch})).await;
    }
}

/// Connect a client to a fresh mock server
pub async fn connect_pair(options: ConnectOptions) -> (Connection, MockServer) {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let accept = tokio::spawn(async move {
        let handshake = Handshake::accept(&mut server)
            .await
            .expect("server handshake failed");
        (server, handshake)
    });

    let conn = Connection::from_stream(client, options)
        .await
        .expect("client handshake failed");
    let (stream, handshake) = accept.await.expect("accept task panicked");
    (conn, MockServer { stream, handshake })
}

pub async fn mock_pair() -> (Connection, MockServer) {
    connect_pair(ConnectOptions::default()).await
}
