//! Connection multiplexer.
//!
//! One `Connection` owns one transport. Many logical queries share it, told
//! apart by token:
//!
//! ```text
//! run() ──┐                                   ┌── oneshot waiter (atoms, first batch)
//! run() ──┼─► token table ─► writer task ─► socket ─► reader task ─┤
//! cursor ─┘   (one lock)     (one writer)             (demux)      └── cursor state (batches)
//! ```
//!
//! - Tokens come from one counter and are taken under the table lock, so a
//!   route always exists before its query hits the wire.
//! - Every frame goes through a single writer task. Nothing else writes.
//! - The reader task routes each response by token. Responses for tokens
//!   that are no longer registered (STOP replies, late answers) are dropped.
//!
//! # Lifecycle
//!
//! `Closed → Handshaking → Open → Draining → Closed`. A failed handshake goes
//! straight back to `Closed`. A socket error or EOF fails every outstanding
//! token with `Error::Connection` and closes the connection. Nothing is
//! retried.

use super::config::{CloseOptions, ConnectOptions};
use super::protocol::{encode_frame, read_response, Handshake, Response, ResponseMessage};
use crate::error::{Error, Result};
use crate::query::compiler::{Query, QueryCompiler};
use crate::query::cursor::{Cursor, CursorSeed, CursorState, Next};
use crate::query::options::RunOptions;
use crate::query::result::{RunResult, ServerInfo};
use crate::reql::{Datum, QueryType, ResponseType, Term};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Handshaking,
    Open,
    Draining,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Open => "open",
            ConnectionState::Draining => "draining",
        };
        f.write_str(name)
    }
}

/// What the connection answers a waiter with.
enum Reply {
    Response(Response),
    Stream(Arc<CursorState>),
}

enum Route {
    /// Waits for the first response. With a seed, a sequence answer turns
    /// into a cursor.
    Waiter {
        reply: oneshot::Sender<Result<Reply>>,
        seed: Option<CursorSeed>,
    },
    Cursor(Arc<CursorState>),
}

impl Route {
    fn fail(self, error: Error) {
        match self {
            Route::Waiter { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Route::Cursor(state) => state.fail(error),
        }
    }
}

struct TokenTable {
    state: ConnectionState,
    routes: HashMap<u64, Route>,
}

enum Outgoing {
    Frame(Bytes),
    Shutdown,
}

struct Shared {
    options: ConnectOptions,
    /// Connections made by `connect` can be re-established
    tcp: bool,
    local_addr: Option<SocketAddr>,
    default_db: Mutex<Option<String>>,
    next_token: AtomicU64,
    table: Mutex<TokenTable>,
    /// Fires when the token table becomes empty
    drained: Notify,
    writer: mpsc::UnboundedSender<Outgoing>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// A client connection. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Shared>,
}

/// Open a TCP connection and perform the handshake.
pub async fn connect(options: ConnectOptions) -> Result<Connection> {
    let address = options.address();
    tracing::debug!(address = %address, "Connecting");

    let stream = tokio::time::timeout(options.timeout, TcpStream::connect(&address))
        .await
        .map_err(|_| Error::Connection(format!("Timed out connecting to {}", address)))??;
    stream.set_nodelay(true)?;
    let local_addr = stream.local_addr().ok();

    Connection::establish(stream, options, true, local_addr).await
}

impl Connection {
    /// Run the handshake over an already open stream (TLS, in-memory, ...).
    pub async fn from_stream<S>(stream: S, options: ConnectOptions) -> Result<Connection>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::establish(stream, options, false, None).await
    }

    async fn establish<S>(
        mut stream: S,
        options: ConnectOptions,
        tcp: bool,
        local_addr: Option<SocketAddr>,
    ) -> Result<Connection>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        tracing::debug!(state = %ConnectionState::Handshaking, "Starting handshake");
        let handshake = Handshake::connect(
            &mut stream,
            options.handshake_key(),
            options.protocol_version,
        );
        match tokio::time::timeout(options.timeout, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Handshake failed");
                return Err(e);
            }
            Err(_) => return Err(Error::Connection("Handshake timed out".to_string())),
        }

        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            default_db: Mutex::new(options.db.clone()),
            options,
            tcp,
            local_addr,
            next_token: AtomicU64::new(1),
            table: Mutex::new(TokenTable {
                state: ConnectionState::Open,
                routes: HashMap::new(),
            }),
            drained: Notify::new(),
            writer: tx,
            reader: Mutex::new(None),
        });

        tokio::spawn(write_loop(Arc::downgrade(&shared), rx, write_half));
        let reader = tokio::spawn(read_loop(
            Arc::downgrade(&shared),
            BufReader::new(read_half),
        ));
        *shared.reader.lock() = Some(reader);

        tracing::info!(address = %shared.options.address(), "Connection open");
        Ok(Connection { inner: shared })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.table.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn client_address(&self) -> Option<SocketAddr> {
        self.inner.local_addr
    }

    pub fn client_port(&self) -> Option<u16> {
        self.inner.local_addr.map(|a| a.port())
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.inner.options
    }

    /// Default database for subsequent queries
    pub fn use_db<S: Into<String>>(&self, db: S) {
        *self.inner.default_db.lock() = Some(db.into());
    }

    /// Run a query.
    ///
    /// Compile errors are returned before anything is sent. With `noreply`
    /// the query is sent and `RunResult::NoReply` returned at once.
    pub async fn run(&self, term: &Term, options: RunOptions) -> Result<RunResult> {
        let start = Instant::now();
        let mut options = options;
        if options.db.is_none() {
            options.db = self.inner.default_db.lock().clone();
        }

        let query = QueryCompiler::compile(term, &options)?;

        if options.is_noreply() {
            let token = self.inner.register(QueryType::Start, None)?;
            self.inner.send(&query.with_token(token))?;
            return Ok(RunResult::NoReply);
        }

        let decode = options.decode_options();
        let seed = CursorSeed {
            term: term.clone(),
            decode,
            queue_size: options.changefeed_queue_size,
        };
        let reply = self.request(query, Some(seed)).await;

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis(),
            success = reply.is_ok(),
            "Query completed"
        );

        match reply? {
            Reply::Stream(state) => Ok(RunResult::Cursor(Cursor::new(self.clone(), state))),
            Reply::Response(response) if response.kind == ResponseType::SuccessAtom => {
                let profile = response.profile;
                let value = match response.data.into_iter().next() {
                    Some(value) => Datum::from_wire(value, &decode)?,
                    None => Datum::Null,
                };
                Ok(RunResult::Atom { value, profile })
            }
            Reply::Response(response) => Err(response.into_error(Some(term))),
        }
    }

    /// Resolves once the server has processed every noreply query sent so far.
    pub async fn noreply_wait(&self) -> Result<()> {
        match self.request(Query::control(QueryType::NoreplyWait), None).await? {
            Reply::Response(r) if r.kind == ResponseType::WaitComplete => Ok(()),
            Reply::Response(r) => Err(r.into_error(None)),
            Reply::Stream(_) => Err(Error::Client("unexpected stream".to_string())),
        }
    }

    /// Identity of the server at the other end
    pub async fn server(&self) -> Result<ServerInfo> {
        match self.request(Query::control(QueryType::ServerInfo), None).await? {
            Reply::Response(r) if r.kind == ResponseType::ServerInfo => {
                let value = r.data.into_iter().next().unwrap_or_default();
                serde_json::from_value(value)
                    .map_err(|e| Error::Client(format!("malformed server info: {}", e)))
            }
            Reply::Response(r) => Err(r.into_error(None)),
            Reply::Stream(_) => Err(Error::Client("unexpected stream".to_string())),
        }
    }

    /// Stop accepting queries, let outstanding ones finish, then close.
    ///
    /// The noreply barrier and the drain share one timeout. Queries still
    /// outstanding when it runs out fail with `Error::Connection`. Closing
    /// twice is a no-op.
    pub async fn close(&self, options: CloseOptions) -> Result<()> {
        {
            let mut table = self.inner.table.lock();
            match table.state {
                ConnectionState::Closed => return Ok(()),
                ConnectionState::Draining => {}
                _ => table.state = ConnectionState::Draining,
            }
        }
        tracing::debug!(state = %ConnectionState::Draining, "Closing connection");

        let drain_timeout = options
            .drain_timeout
            .unwrap_or(self.inner.options.drain_timeout);
        let drain = async {
            let barrier = if options.noreply_wait {
                self.noreply_wait().await
            } else {
                Ok(())
            };
            self.inner.wait_drained().await;
            barrier
        };

        // The barrier counts against the drain timeout
        let barrier = match tokio::time::timeout(drain_timeout, drain).await {
            Ok(barrier) => barrier,
            Err(_) => {
                tracing::warn!(
                    outstanding = self.inner.table.lock().routes.len(),
                    "Drain timeout elapsed, forcing close"
                );
                Ok(())
            }
        };

        self.inner.teardown(Error::closed());
        barrier
    }

    /// Close, then open a fresh connection with the same options.
    ///
    /// Other clones of this handle keep pointing at the closed connection.
    pub async fn reconnect(&mut self, options: CloseOptions) -> Result<()> {
        if !self.inner.tcp {
            return Err(Error::Client(
                "connections built from a stream cannot reconnect".to_string(),
            ));
        }
        self.close(options).await?;
        let fresh = connect(self.inner.options.clone()).await?;
        if let Some(db) = self.inner.default_db.lock().clone() {
            fresh.use_db(db);
        }
        *self = fresh;
        Ok(())
    }

    async fn request(&self, query: Query, seed: Option<CursorSeed>) -> Result<Reply> {
        let (tx, rx) = oneshot::channel();
        let kind = query.kind();
        let token = self
            .inner
            .register(kind, Some(Route::Waiter { reply: tx, seed }))?;

        if let Err(e) = self.inner.send(&query.with_token(token)) {
            self.inner.forget(token);
            return Err(e);
        }
        rx.await.map_err(|_| Error::closed())?
    }

    pub(crate) fn send_continue(&self, token: u64) -> Result<()> {
        self.inner
            .send(&Query::control(QueryType::Continue).with_token(token))
    }

    /// Drop the route of `token`, telling the server to stop if asked.
    pub(crate) fn release(&self, token: u64, send_stop: bool) {
        self.inner.forget(token);
        if send_stop {
            let stop = Query::control(QueryType::Stop).with_token(token);
            if let Err(e) = self.inner.send(&stop) {
                tracing::debug!(token, error = %e, "STOP not sent");
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.inner.options.address())
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    /// Allocate a token and register its route in one step.
    fn register(&self, kind: QueryType, route: Option<Route>) -> Result<u64> {
        let mut table = self.table.lock();
        match table.state {
            ConnectionState::Open => {}
            ConnectionState::Draining if kind != QueryType::Start => {}
            ConnectionState::Draining => {
                return Err(Error::Client(
                    "connection is closing and accepts no new queries".to_string(),
                ))
            }
            _ => return Err(Error::closed()),
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        if let Some(route) = route {
            table.routes.insert(token, route);
        }
        Ok(token)
    }

    fn send(&self, query: &Query) -> Result<()> {
        let payload = query.encode()?;
        tracing::debug!(
            token = query.token(),
            query_type = %query.kind(),
            bytes = payload.len(),
            "Sending query"
        );
        self.writer
            .send(Outgoing::Frame(encode_frame(query.token(), &payload)))
            .map_err(|_| Error::closed())
    }

    fn send_control(&self, token: u64, kind: QueryType) {
        if let Err(e) = self.send(&Query::control(kind).with_token(token)) {
            tracing::debug!(token, query_type = %kind, error = %e, "Control query not sent");
        }
    }

    fn forget(&self, token: u64) {
        let mut table = self.table.lock();
        if table.routes.remove(&token).is_some() && table.routes.is_empty() {
            self.drained.notify_waiters();
        }
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.table.lock().routes.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Route one inbound frame.
    fn dispatch(&self, msg: ResponseMessage) {
        let token = msg.token;
        let response = match Response::parse(msg) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(token, error = %e, "Malformed response");
                let route = self.table.lock().routes.remove(&token);
                if let Some(route) = route {
                    route.fail(e);
                }
                return;
            }
        };

        tracing::trace!(token, kind = ?response.kind, batch_len = response.data.len(), "Response");

        let mut table = self.table.lock();
        let Some(route) = table.routes.remove(&token) else {
            tracing::debug!(token, "Response for unknown token discarded");
            return;
        };

        match route {
            Route::Waiter { reply, seed } => {
                let streaming = matches!(
                    response.kind,
                    ResponseType::SuccessSequence | ResponseType::SuccessPartial
                );
                match seed {
                    Some(seed) if streaming => {
                        let state = Arc::new(CursorState::new(token, seed, &response));
                        let next = self.accept_batch(&mut table, token, &state, response);
                        if reply.send(Ok(Reply::Stream(state))).is_err() && next != Next::Stop {
                            // Caller went away; nobody will read this stream
                            if table.routes.remove(&token).is_some() {
                                self.send_control(token, QueryType::Stop);
                            }
                        }
                    }
                    _ => {
                        let _ = reply.send(Ok(Reply::Response(response)));
                    }
                }
            }
            Route::Cursor(state) => {
                if response.kind.is_error() {
                    state.fail(response.into_error(Some(state.term())));
                } else {
                    self.accept_batch(&mut table, token, &state, response);
                }
            }
        }

        if table.routes.is_empty() {
            self.drained.notify_waiters();
        }
    }

    fn accept_batch(
        &self,
        table: &mut TokenTable,
        token: u64,
        state: &Arc<CursorState>,
        response: Response,
    ) -> Next {
        let more = !response.kind.is_terminal();
        let next = state.push_batch(response);
        if more && next != Next::Stop {
            table.routes.insert(token, Route::Cursor(Arc::clone(state)));
        }
        match next {
            Next::Fetch => self.send_control(token, QueryType::Continue),
            Next::Stop => self.send_control(token, QueryType::Stop),
            Next::Idle => {}
        }
        next
    }

    /// Close the connection and fail everything still waiting on it.
    fn teardown(&self, error: Error) {
        let routes = {
            let mut table = self.table.lock();
            if table.state == ConnectionState::Closed {
                return;
            }
            table.state = ConnectionState::Closed;
            std::mem::take(&mut table.routes)
        };

        if !routes.is_empty() {
            tracing::debug!(outstanding = routes.len(), error = %error, "Failing outstanding queries");
        }
        for (_, route) in routes {
            route.fail(error.clone());
        }

        let _ = self.writer.send(Outgoing::Shutdown);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.drained.notify_waiters();
        tracing::info!(address = %self.options.address(), "Connection closed");
    }
}

async fn read_loop<R>(shared: Weak<Shared>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    loop {
        let result = read_response(&mut reader).await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match result {
            Ok(msg) => shared.dispatch(msg),
            Err(e) => {
                shared.teardown(e);
                break;
            }
        }
    }
}

async fn write_loop<W>(shared: Weak<Shared>, mut rx: mpsc::UnboundedReceiver<Outgoing>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(outgoing) = rx.recv().await {
        let frame = match outgoing {
            Outgoing::Frame(frame) => frame,
            Outgoing::Shutdown => break,
        };
        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            tracing::warn!(error = %e, "Write failed");
            if let Some(shared) = shared.upgrade() {
                shared.teardown(Error::from(e));
            }
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Draining.to_string(), "draining");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 on localhost is never a ReQL server
        let options = ConnectOptions::new("127.0.0.1", 1).timeout(std::time::Duration::from_secs(2));
        let err = connect(options).await.unwrap_err();
        assert!(err.is_connection());
    }
}
