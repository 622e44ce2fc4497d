//! Cursor behavior over a scripted server: batching, feeds, close and failure

mod common;

use common::{mock_pair, MockServer};
use proptest::prelude::*;
use reql_client::reql::ChangesOptions;
use reql_client::{r, Cursor, Datum, Error, RunOptions};
use serde_json::{json, Value};
use std::sync::Arc;

/// Start `term` and answer with `first`, returning the cursor and its token.
async fn open_cursor(
    conn: &reql_client::Connection,
    server: &mut MockServer,
    term: reql_client::Term,
    first: Value,
) -> (Cursor, u64) {
    let run = tokio::spawn({
        let conn = conn.clone();
        async move { conn.run(&term, RunOptions::new()).await }
    });
    let start = server.expect(1).await;
    server.reply(start.token, first).await;
    let cursor = run.await.unwrap().unwrap().into_cursor().unwrap();
    assert_eq!(cursor.token(), start.token);
    (cursor, start.token)
}

/// Serve `batches` one CONTINUE at a time after the first has been sent.
async fn serve_batches(server: &mut MockServer, token: u64, batches: &[Vec<i64>]) {
    for (i, batch) in batches.iter().enumerate() {
        let cont = server.expect(2).await;
        assert_eq!(cont.token, token);
        let t = if i + 1 == batches.len() { 2 } else { 3 };
        server.reply(token, json!({"t": t, "r": batch})).await;
    }
}

#[tokio::test]
async fn test_batches_drain_in_order() {
    let (conn, mut server) = mock_pair().await;
    let (cursor, token) = open_cursor(
        &conn,
        &mut server,
        r::table("t"),
        json!({"t": 3, "r": [1, 2]}),
    )
    .await;
    assert!(!cursor.is_feed());

    let serving = tokio::spawn(async move {
        serve_batches(&mut server, token, &[vec![3, 4], vec![5]]).await;
        server
    });

    let values = cursor.to_vec().await.unwrap();
    assert_eq!(values, (1..=5).map(Datum::from).collect::<Vec<_>>());
    assert_eq!(cursor.next().await.unwrap(), None);

    // A finished stream sends no STOP on close
    let mut server = serving.await.unwrap();
    cursor.close();
    let info = tokio::spawn({
        let conn = conn.clone();
        async move { conn.server().await }
    });
    let next = server.recv().await;
    assert_eq!(next.query, json!([5]));
    drop(info);
}

#[tokio::test]
async fn test_each_stops_early_and_sends_stop() {
    let (conn, mut server) = mock_pair().await;
    let (cursor, token) = open_cursor(
        &conn,
        &mut server,
        r::table("t"),
        json!({"t": 3, "r": [1, 2, 3]}),
    )
    .await;

    let mut seen = Vec::new();
    cursor
        .each(|value| {
            seen.push(value);
            seen.len() < 2
        })
        .await
        .unwrap();
    assert_eq!(seen, vec![Datum::from(1), Datum::from(2)]);

    let stop = server.expect(3).await;
    assert_eq!(stop.token, token);
    assert_eq!(stop.query, json!([3]));
    assert!(matches!(cursor.next().await, Err(Error::CursorClosed)));
}

#[tokio::test]
async fn test_each_async_stops_early() {
    let (conn, mut server) = mock_pair().await;
    let (cursor, token) = open_cursor(
        &conn,
        &mut server,
        r::table("t"),
        json!({"t": 3, "r": [1, 2, 3]}),
    )
    .await;

    let mut seen = Vec::new();
    cursor
        .each_async(|value| {
            seen.push(value);
            let more = seen.len() < 2;
            async move {
                tokio::task::yield_now().await;
                Ok(more)
            }
        })
        .await
        .unwrap();
    assert_eq!(seen, vec![Datum::from(1), Datum::from(2)]);

    let stop = server.expect(3).await;
    assert_eq!(stop.token, token);
    assert!(matches!(cursor.next().await, Err(Error::CursorClosed)));
}

#[tokio::test]
async fn test_each_async_error_closes_cursor() {
    let (conn, mut server) = mock_pair().await;
    let (cursor, token) = open_cursor(
        &conn,
        &mut server,
        r::table("t"),
        json!({"t": 3, "r": [1, 2]}),
    )
    .await;

    let err = cursor
        .each_async(|value| async move {
            if value == Datum::from(2) {
                Err(Error::Client("rejected 2".to_string()))
            } else {
                Ok(true)
            }
        })
        .await
        .unwrap_err();
    assert_eq!(err, Error::Client("rejected 2".to_string()));

    // Taking the last buffered value asked for more before the error
    server.expect(2).await;
    let stop = server.expect(3).await;
    assert_eq!(stop.token, token);
}

#[tokio::test]
async fn test_close_cancels_pending_next() {
    let (conn, mut server) = mock_pair().await;
    let (cursor, token) = open_cursor(
        &conn,
        &mut server,
        r::table("t"),
        json!({"t": 3, "r": []}),
    )
    .await;
    let cursor = Arc::new(cursor);

    let waiting = tokio::spawn({
        let cursor = Arc::clone(&cursor);
        async move { cursor.next().await }
    });

    // The empty buffer triggers a fetch; the pull is now pending
    let cont = server.expect(2).await;
    assert_eq!(cont.token, token);

    cursor.close();
    assert!(matches!(waiting.await.unwrap(), Err(Error::CursorClosed)));

    let stop = server.expect(3).await;
    assert_eq!(stop.token, token);

    // Close is idempotent
    cursor.close();
}

#[tokio::test]
async fn test_runtime_error_mid_stream() {
    let (conn, mut server) = mock_pair().await;
    let (cursor, token) = open_cursor(
        &conn,
        &mut server,
        r::table("t"),
        json!({"t": 3, "r": [1, 2]}),
    )
    .await;

    assert_eq!(cursor.next().await.unwrap(), Some(Datum::from(1)));
    assert_eq!(cursor.next().await.unwrap(), Some(Datum::from(2)));

    server.expect(2).await;
    server
        .reply(
            token,
            json!({"t": 18, "e": 4_100_000, "r": ["Cannot perform read: lost contact with primary replica"], "b": []}),
        )
        .await;

    match cursor.next().await {
        Err(Error::Runtime { message, .. }) => assert!(message.contains("lost contact")),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(cursor.next().await.unwrap(), None);
    assert_eq!(cursor.next().await.unwrap(), None);
}

#[tokio::test]
async fn test_feed_requests_more_eagerly() {
    let (conn, mut server) = mock_pair().await;
    let (cursor, token) = open_cursor(
        &conn,
        &mut server,
        r::table("t").changes(ChangesOptions::default()),
        json!({"t": 3, "r": [{"new_val": {"id": 1}}], "n": [1]}),
    )
    .await;
    assert!(cursor.is_feed());

    // CONTINUE arrives before the consumer reads anything
    let cont = server.expect(2).await;
    assert_eq!(cont.token, token);

    let change = cursor.next().await.unwrap().unwrap();
    assert_eq!(change.get("new_val").and_then(|v| v.get("id")), Some(&Datum::from(1)));

    let err = cursor.to_vec().await.unwrap_err();
    assert!(matches!(err, Error::Client(_)));
}

#[tokio::test]
async fn test_feed_overflow() {
    let (conn, mut server) = mock_pair().await;
    let feed = r::table("t").changes(ChangesOptions {
        changefeed_queue_size: Some(2),
        ..Default::default()
    });
    let (cursor, token) = open_cursor(&conn, &mut server, feed, json!({"t": 3, "r": [1, 2], "n": [1]})).await;

    server.expect(2).await;
    server.reply(token, json!({"t": 3, "r": [3], "n": [1]})).await;

    let stop = server.expect(3).await;
    assert_eq!(stop.token, token);

    assert_eq!(cursor.next().await, Err(Error::QueueOverflow { limit: 2 }));
    assert_eq!(cursor.next().await.unwrap(), None);
}

#[tokio::test]
async fn test_connection_loss_fails_cursor() {
    let (conn, mut server) = mock_pair().await;
    let (cursor, _token) = open_cursor(
        &conn,
        &mut server,
        r::table("t"),
        json!({"t": 3, "r": [1]}),
    )
    .await;
    drop(server);

    assert_eq!(cursor.next().await.unwrap(), Some(Datum::from(1)));
    let err = cursor.next().await.unwrap_err();
    assert!(err.is_connection(), "unexpected error {:?}", err);
    assert_eq!(cursor.next().await.unwrap(), None);
}

#[tokio::test]
async fn test_dropping_cursor_sends_stop() {
    let (conn, mut server) = mock_pair().await;
    let (cursor, token) = open_cursor(
        &conn,
        &mut server,
        r::table("t"),
        json!({"t": 3, "r": [1]}),
    )
    .await;
    drop(cursor);

    let stop = server.expect(3).await;
    assert_eq!(stop.token, token);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_batches_preserve_order(sizes in prop::collection::vec(0usize..6, 1..6)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let mut next = 0i64;
        let batches: Vec<Vec<i64>> = sizes
            .iter()
            .map(|&size| {
                let batch = (next..next + size as i64).collect();
                next += size as i64;
                batch
            })
            .collect();
        let expected: Vec<Datum> = (0..next).map(Datum::from).collect();

        let values = runtime.block_on(async move {
            let (conn, mut server) = mock_pair().await;
            let (first, rest) = batches.split_first().unwrap();
            let t = if rest.is_empty() { 2 } else { 3 };
            let (cursor, token) =
                open_cursor(&conn, &mut server, r::table("t"), json!({"t": t, "r": first})).await;

            let rest = rest.to_vec();
            let serving = tokio::spawn(async move {
                serve_batches(&mut server, token, &rest).await;
                server
            });
            let values = cursor.to_vec().await.unwrap();
            serving.await.unwrap();
            values
        });

        prop_assert_eq!(values, expected);
    }
}
