//! Many requests sharing one socket.
//!
//! ```bash
//! cargo test -p reql-testing --test multiplexing
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config_for, eventually, init_tracing};
use reql_client::{Connection, Datum, Error};
use reql_testing::{MockReqlServer, MockResponse};
use serde_json::{Map, json};

#[tokio::test]
async fn test_responses_never_cross_tokens() {
    init_tracing();
    const QUERIES: i64 = 20;

    // Later queries are answered first.
    let mut builder = MockReqlServer::builder();
    for i in 0..QUERIES {
        let delay = Duration::from_millis(((QUERIES - i) * 10) as u64);
        builder = builder.with_response(json!(i), MockResponse::atom(json!(i * i)).delayed(delay));
    }
    let server = builder.build().await.unwrap();
    let conn = Arc::new(Connection::connect(config_for(&server)).await.unwrap());

    let handles: Vec<_> = (0..QUERIES)
        .map(|i| {
            let conn = conn.clone();
            tokio::spawn(async move {
                let value = conn.start(json!(i), Map::new()).await?.into_value()?;
                Ok::<_, Error>((i, value))
            })
        })
        .collect();

    for handle in handles {
        let (i, value) = handle.await.unwrap().unwrap();
        assert_eq!(value, Datum::from(i * i), "query {i} got another's response");
    }
    assert!(conn.is_open());
}

#[tokio::test]
async fn test_interleaved_cursors() {
    let server = MockReqlServer::builder()
        .with_response(
            json!("a"),
            MockResponse::batches(vec![vec![json!("a1")], vec![json!("a2")], vec![json!("a3")]]),
        )
        .with_response(
            json!("b"),
            MockResponse::batches(vec![vec![json!("b1"), json!("b2")], vec![json!("b3")]]),
        )
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();

    let mut a = conn.start(json!("a"), Map::new()).await.unwrap().into_cursor().unwrap();
    let mut b = conn.start(json!("b"), Map::new()).await.unwrap().into_cursor().unwrap();

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    loop {
        let next_a = a.next(None).await.unwrap();
        let next_b = b.next(None).await.unwrap();
        if next_a.is_none() && next_b.is_none() {
            break;
        }
        seen_a.extend(next_a);
        seen_b.extend(next_b);
    }

    assert_eq!(seen_a, vec![Datum::from("a1"), Datum::from("a2"), Datum::from("a3")]);
    assert_eq!(seen_b, vec![Datum::from("b1"), Datum::from("b2"), Datum::from("b3")]);
}

#[tokio::test]
async fn test_close_fails_every_outstanding_request_and_cursor() {
    const REQUESTS: usize = 3;
    const CURSORS: usize = 2;

    let server = MockReqlServer::builder()
        .with_response(json!("wait"), MockResponse::Silent)
        .with_response(
            json!("rows"),
            MockResponse::batches(vec![vec![json!(1)], vec![json!(2)]]),
        )
        .with_continue_delay(Duration::from_secs(10))
        .build()
        .await
        .unwrap();
    let conn = Arc::new(Connection::connect(config_for(&server)).await.unwrap());

    let mut cursors = Vec::new();
    for _ in 0..CURSORS {
        let mut cursor = conn.start(json!("rows"), Map::new()).await.unwrap().into_cursor().unwrap();
        // Drain the first batch so the cursor is waiting on the server.
        assert_eq!(cursor.next(None).await.unwrap(), Some(Datum::from(1i64)));
        cursors.push(cursor);
    }

    let requests: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let conn = conn.clone();
            tokio::spawn(async move { conn.start(json!("wait"), Map::new()).await })
        })
        .collect();
    let server = &server;
    eventually("every request to reach the server", move || async move {
        server.received().await.len() == CURSORS * 2 + REQUESTS
    })
    .await;

    conn.close(false).await.unwrap();

    for request in requests {
        let err = request.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed(_)));
        assert_eq!(err.to_string(), "Connection is closed.");
    }
    for cursor in &mut cursors {
        let err = cursor.next(Some(Duration::from_secs(1))).await.unwrap_err();
        assert_eq!(err.to_string(), "Connection is closed.");
        // Same error on every later fetch.
        assert!(cursor.next(None).await.is_err());
    }

    conn.close(false).await.unwrap();
    assert!(!conn.is_open());
}

#[tokio::test]
async fn test_waiting_cursor_wakes_on_close() {
    let server = MockReqlServer::builder()
        .with_default_response(MockResponse::batches(vec![vec![json!(1)], vec![json!(2)]]))
        .with_continue_delay(Duration::from_secs(10))
        .build()
        .await
        .unwrap();
    let conn = Arc::new(Connection::connect(config_for(&server)).await.unwrap());

    let mut cursor = conn.start(json!(1), Map::new()).await.unwrap().into_cursor().unwrap();
    assert!(cursor.next(None).await.unwrap().is_some());

    let waiter = tokio::spawn(async move { cursor.next(None).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    conn.close(false).await.unwrap();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed(_)));
}
