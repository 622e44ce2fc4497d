//! Cursor Engine.
//!
//! A cursor presents one result stream while the server delivers it in
//! batches under a single token. Two modes:
//!
//! - **Finite sequences**: one CONTINUE is in flight at most. It is sent when
//!   the consumer takes the last buffered value, or finds the buffer empty.
//! - **Change feeds**: the connection sends a CONTINUE as soon as each batch
//!   arrives. Unread changes pile up in the buffer; past the queue limit the
//!   buffer is dropped, the feed is stopped and the consumer gets
//!   `Error::QueueOverflow`.
//!
//! The cursor never touches the socket. Fetching and stopping go through the
//! owning [`Connection`], which also routes incoming batches here.

use crate::error::{Error, Result};
use crate::network::protocol::Response;
use crate::network::Connection;
use crate::query::options::DEFAULT_CHANGEFEED_QUEUE_SIZE;
use crate::reql::{Datum, DecodeOptions, Term, TermType};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

/// What the connection learns at START time about a potential stream.
#[derive(Debug, Clone)]
pub(crate) struct CursorSeed {
    pub term: Term,
    pub decode: DecodeOptions,
    /// Queue size requested through run options
    pub queue_size: Option<usize>,
}

/// Follow-up the connection owes the server after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    Idle,
    Fetch,
    Stop,
}

#[derive(Debug, Default)]
struct CursorInner {
    buffer: VecDeque<Datum>,
    /// The server will send nothing more
    exhausted: bool,
    pending_fetch: bool,
    /// Terminal error not yet handed to the consumer
    error: Option<Error>,
    closed: bool,
    profile: Option<Value>,
}

/// State shared between a cursor handle and the connection's token table.
#[derive(Debug)]
pub(crate) struct CursorState {
    token: u64,
    term: Term,
    feed: bool,
    queue_limit: usize,
    decode: DecodeOptions,
    inner: Mutex<CursorInner>,
    notify: Notify,
}

impl CursorState {
    pub(crate) fn new(token: u64, seed: CursorSeed, first: &Response) -> Self {
        let changes = changes_term(&seed.term);
        let feed = first.is_feed() || seed.term.term_type() == TermType::Changes;

        let queue_limit = changes
            .and_then(|t| t.optarg("changefeed_queue_size"))
            .and_then(Term::as_datum)
            .and_then(Datum::as_number)
            .map(|n| n as usize)
            .or(seed.queue_size)
            .unwrap_or(DEFAULT_CHANGEFEED_QUEUE_SIZE);

        Self {
            token,
            term: seed.term,
            feed,
            queue_limit,
            decode: seed.decode,
            inner: Mutex::new(CursorInner::default()),
            notify: Notify::new(),
        }
    }

    pub(crate) fn term(&self) -> &Term {
        &self.term
    }

    /// Take one batch off the wire.
    pub(crate) fn push_batch(&self, response: Response) -> Next {
        let terminal = response.kind.is_terminal();
        let next = {
            let mut inner = self.inner.lock();
            inner.pending_fetch = false;
            if inner.closed {
                return Next::Idle;
            }
            if inner.profile.is_none() {
                inner.profile = response.profile;
            }

            tracing::trace!(
                token = self.token,
                batch_len = response.data.len(),
                terminal,
                "Cursor batch"
            );

            let mut next = if terminal || !self.feed {
                Next::Idle
            } else {
                Next::Fetch
            };

            for value in response.data {
                match Datum::from_wire(value, &self.decode) {
                    Ok(datum) => inner.buffer.push_back(datum),
                    Err(e) => {
                        inner.error = Some(e);
                        next = Next::Stop;
                        break;
                    }
                }
            }

            if self.feed && next != Next::Stop && inner.buffer.len() > self.queue_limit {
                tracing::warn!(
                    token = self.token,
                    limit = self.queue_limit,
                    "Change feed queue overflow, stopping feed"
                );
                inner.buffer.clear();
                inner.error = Some(Error::QueueOverflow {
                    limit: self.queue_limit,
                });
                next = Next::Stop;
            }

            if terminal || next == Next::Stop {
                inner.exhausted = true;
            }
            if terminal {
                next = Next::Idle;
            }
            next
        };

        self.notify.notify_waiters();
        next
    }

    /// Fail the stream. Only the first error sticks.
    pub(crate) fn fail(&self, error: Error) {
        {
            let mut inner = self.inner.lock();
            if inner.closed || inner.exhausted {
                return;
            }
            inner.exhausted = true;
            inner.pending_fetch = false;
            inner.error.get_or_insert(error);
        }
        self.notify.notify_waiters();
    }
}

/// First CHANGES term along the receiver chain.
fn changes_term(term: &Term) -> Option<&Term> {
    let mut current = term;
    loop {
        if current.term_type() == TermType::Changes {
            return Some(current);
        }
        current = current.first_arg()?;
    }
}

/// A stream of results.
///
/// Dropping a cursor closes it.
pub struct Cursor {
    conn: Connection,
    state: Arc<CursorState>,
}

impl Cursor {
    pub(crate) fn new(conn: Connection, state: Arc<CursorState>) -> Self {
        Self { conn, state }
    }

    pub fn token(&self) -> u64 {
        self.state.token
    }

    /// Whether this is an infinite change feed
    pub fn is_feed(&self) -> bool {
        self.state.feed
    }

    /// Profile of the first batch, if profiling was requested
    pub fn profile(&self) -> Option<Value> {
        self.state.inner.lock().profile.clone()
    }

    /// Next value; `Ok(None)` once the stream is over.
    ///
    /// A failed stream yields its error exactly once and then `Ok(None)`.
    /// After `close` every call returns `Error::CursorClosed`.
    pub async fn next(&self) -> Result<Option<Datum>> {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (value, fetch) = {
                let mut inner = self.state.inner.lock();
                if inner.closed {
                    return Err(Error::CursorClosed);
                }
                let value = inner.buffer.pop_front();
                if value.is_none() {
                    if let Some(err) = inner.error.take() {
                        return Err(err);
                    }
                    if inner.exhausted {
                        return Ok(None);
                    }
                }
                let fetch = !self.state.feed
                    && !inner.exhausted
                    && !inner.pending_fetch
                    && inner.buffer.is_empty();
                if fetch {
                    inner.pending_fetch = true;
                }
                (value, fetch)
            };

            if fetch {
                if let Err(e) = self.conn.send_continue(self.state.token) {
                    self.state.fail(e);
                }
            }
            if value.is_some() {
                return Ok(value);
            }
            notified.await;
        }
    }

    /// Drain a finite stream into a vector.
    pub async fn to_vec(&self) -> Result<Vec<Datum>> {
        if self.state.feed {
            return Err(Error::Client(
                "cannot collect an infinite change feed into a Vec".to_string(),
            ));
        }
        let mut values = Vec::new();
        while let Some(value) = self.next().await? {
            values.push(value);
        }
        Ok(values)
    }

    /// Call `f` for each value until it returns `false` or the stream ends.
    /// Stopping early closes the cursor.
    pub async fn each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Datum) -> bool,
    {
        while let Some(value) = self.next().await? {
            if !f(value) {
                self.close();
                break;
            }
        }
        Ok(())
    }

    /// Like [`Cursor::each`] with an async callback.
    ///
    /// `Ok(false)` stops early. An error from `f` closes the cursor and is
    /// returned as is.
    pub async fn each_async<F, Fut>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Datum) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        while let Some(value) = self.next().await? {
            match f(value).await {
                Ok(true) => {}
                Ok(false) => {
                    self.close();
                    break;
                }
                Err(e) => {
                    self.close();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Like [`Cursor::each`], then hand the outcome to `on_finished`.
    pub async fn each_then<F, G>(&self, f: F, on_finished: G)
    where
        F: FnMut(Datum) -> bool,
        G: FnOnce(Result<()>),
    {
        on_finished(self.each(f).await);
    }

    /// Stop the stream and release its token. Idempotent.
    ///
    /// A STOP is sent unless the server already finished the stream.
    pub fn close(&self) {
        let send_stop = {
            let mut inner = self.state.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.buffer.clear();
            let send_stop = !inner.exhausted;
            inner.exhausted = true;
            send_stop
        };
        self.state.notify.notify_waiters();

        tracing::debug!(token = self.state.token, send_stop, "Closing cursor");
        self.conn.release(self.state.token, send_stop);
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("token", &self.state.token)
            .field("feed", &self.state.feed)
            .finish()
    }
}
