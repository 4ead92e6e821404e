//! Connection lifecycle tests against the mock server.
//!
//! ```bash
//! cargo test -p reql-testing --test connection
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::time::Duration;

use common::{config_for, eventually, init_tracing};
use reql_client::{
    Config, Connection, ConnectionState, Datum, Error, QueryResult, ServerErrorKind, TimeoutConfig,
};
use reql_protocol::{ErrorType, QueryType};
use reql_testing::{MockReqlServer, MockResponse};
use serde_json::{Map, json};

#[tokio::test]
async fn test_connect_then_close_without_queries() {
    init_tracing();
    let server = MockReqlServer::builder().build().await.unwrap();

    let conn = Connection::connect(config_for(&server)).await.unwrap();
    assert!(conn.is_open());
    assert_eq!(conn.state(), ConnectionState::Open);

    conn.close(false).await.unwrap();
    assert!(!conn.is_open());
    assert_eq!(conn.state(), ConnectionState::Closed);

    // Closing again is a no-op.
    conn.close(false).await.unwrap();
    let server = &server;
    eventually("server to see the hang-up", move || async move {
        server.connection_count().await == 0
    })
    .await;
}

#[tokio::test]
async fn test_handshake_rejected() {
    let server = MockReqlServer::builder()
        .with_handshake_reply("ERROR: bad proto\n")
        .build()
        .await
        .unwrap();

    let conn = Connection::new(config_for(&server));
    let err = conn.reconnect(false, None).await.unwrap_err();

    match &err {
        Error::Driver(message) => assert!(
            message.contains("ERROR: bad proto"),
            "unexpected message: {message}"
        ),
        other => panic!("expected driver error, got {other:?}"),
    }
    assert!(!conn.is_open());
    assert_eq!(conn.state(), ConnectionState::NotConnected);

    // The client hung up straight away.
    let server = &server;
    eventually("socket to close", move || async move {
        server.connection_count().await == 0
    })
    .await;
}

#[tokio::test]
async fn test_wrong_auth_key_rejected() {
    let server = MockReqlServer::builder()
        .with_auth_key("secret")
        .build()
        .await
        .unwrap();

    let err = Connection::connect(config_for(&server).auth_key("guess"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Server dropped connection with message: \"ERROR: Incorrect authorization key.\""
    );

    let conn = Connection::connect(config_for(&server).auth_key("secret"))
        .await
        .unwrap();
    assert!(conn.is_open());
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = Connection::connect(Config::new().host("127.0.0.1").port(port))
        .await
        .unwrap_err();
    assert!(err.is_connection_error());
    assert!(
        err.to_string()
            .starts_with(&format!("Could not connect to 127.0.0.1:{port}. Error: "))
    );
}

#[tokio::test]
async fn test_connect_timeout_during_handshake() {
    // Accepts the socket but never answers the greeting.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let config = Config::new()
        .host("127.0.0.1")
        .port(port)
        .timeouts(TimeoutConfig::new().connect_timeout(Duration::from_millis(100)));
    let err = Connection::connect(config).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionTimeout));
}

#[tokio::test]
async fn test_atom_query() {
    let server = MockReqlServer::builder()
        .with_response(json!([15, ["posts"]]), MockResponse::atom(json!({"id": 7})))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();

    let value = conn
        .start(json!([15, ["posts"]]), Map::new())
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(value.get("id"), Some(&Datum::Number(7.0)));
}

#[tokio::test]
async fn test_pseudo_types_converted_in_atoms() {
    let server = MockReqlServer::builder()
        .with_default_response(MockResponse::atom(json!({
            "$reql_type$": "BINARY",
            "data": "aGVsbG8="
        })))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();

    let value = conn.start(json!(1), Map::new()).await.unwrap().into_value().unwrap();
    assert_eq!(value, Datum::Binary(bytes::Bytes::from_static(b"hello")));

    let mut options = Map::new();
    options.insert("binary_format".into(), json!("raw"));
    let raw = conn.start(json!(1), options).await.unwrap().into_value().unwrap();
    assert_eq!(raw.get("data").and_then(Datum::as_str), Some("aGVsbG8="));
}

#[tokio::test]
async fn test_default_database_injected() {
    let server = MockReqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config_for(&server).database("blog"))
        .await
        .unwrap();

    conn.start(json!(1), Map::new()).await.unwrap();
    conn.use_db("news");
    conn.start(json!(2), Map::new()).await.unwrap();

    let mut explicit = Map::new();
    explicit.insert("db".into(), json!([14, ["other"]]));
    conn.start(json!(3), explicit).await.unwrap();

    let starts = server.received_of(QueryType::Start).await;
    assert_eq!(starts[0].option("db"), Some(&json!([14, ["blog"]])));
    assert_eq!(starts[1].option("db"), Some(&json!([14, ["news"]])));
    assert_eq!(starts[2].option("db"), Some(&json!([14, ["other"]])));
}

#[tokio::test]
async fn test_runtime_error_keeps_connection_open() {
    let server = MockReqlServer::builder()
        .with_response(
            json!("missing"),
            MockResponse::runtime_error(ErrorType::OpFailed, "Table `test.x` does not exist."),
        )
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();

    let err = conn.start(json!("missing"), Map::new()).await.unwrap_err();
    let server_err = err.server_error().expect("server error");
    assert_eq!(server_err.kind, ServerErrorKind::Runtime(Some(ErrorType::OpFailed)));
    assert_eq!(server_err.message, "Table `test.x` does not exist.");
    assert_eq!(server_err.term, Some(json!("missing")));

    assert!(conn.is_open());
    assert!(conn.start(json!(1), Map::new()).await.is_ok());
}

#[tokio::test]
async fn test_compile_error() {
    let server = MockReqlServer::builder()
        .with_default_response(MockResponse::compile_error("Expected 2 arguments but found 1."))
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();

    let err = conn.start(json!(1), Map::new()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "compile error: Expected 2 arguments but found 1."
    );
}

#[tokio::test]
async fn test_profile_attached_when_requested() {
    let server = MockReqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();

    let mut options = Map::new();
    options.insert("profile".into(), json!(true));
    let result = conn.start(json!(1), options).await.unwrap();
    assert!(result.profile().is_some());
    assert!(matches!(result, QueryResult::Profiled { .. }));

    let plain = conn.start(json!(1), Map::new()).await.unwrap();
    assert!(plain.profile().is_none());
}

#[tokio::test]
async fn test_server_info() {
    let server = MockReqlServer::builder()
        .with_server_name("mock-01")
        .build()
        .await
        .unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();

    let info = conn.server().await.unwrap();
    assert_eq!(info.get("name").and_then(Datum::as_str), Some("mock-01"));
}

#[tokio::test]
async fn test_noreply_and_noreply_wait() {
    let server = MockReqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();

    let mut options = Map::new();
    options.insert("noreply".into(), json!(true));
    let result = conn.start(json!(1), options).await.unwrap();
    assert!(matches!(result, QueryResult::Empty));

    conn.noreply_wait().await.unwrap();

    let received = server.received().await;
    assert_eq!(received.len(), 2);
    assert_eq!(received[1].query_type, QueryType::NoreplyWait);
}

#[tokio::test]
async fn test_close_with_noreply_wait() {
    let server = MockReqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();

    conn.close(true).await.unwrap();
    assert!(!conn.is_open());
    assert_eq!(server.received_of(QueryType::NoreplyWait).await.len(), 1);
}

#[tokio::test]
async fn test_query_after_close_fails() {
    let server = MockReqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();
    conn.close(false).await.unwrap();

    let err = conn.start(json!(1), Map::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "Connection is closed.");
}

#[tokio::test]
async fn test_reconnect_replaces_socket() {
    let server = MockReqlServer::builder().build().await.unwrap();
    let conn = Connection::connect(config_for(&server)).await.unwrap();
    let first = conn.next_token();

    conn.reconnect(false, Some(Duration::from_secs(5))).await.unwrap();
    assert!(conn.is_open());
    assert!(conn.start(json!(1), Map::new()).await.is_ok());

    // Tokens keep increasing across sockets.
    assert!(conn.next_token() > first);
    let server = &server;
    eventually("old socket to close", move || async move {
        server.connection_count().await == 1
    })
    .await;
}

#[tokio::test]
async fn test_query_timeout_then_late_response() {
    let server = MockReqlServer::builder()
        .with_response(
            json!("slow"),
            MockResponse::atom(json!(1)).delayed(Duration::from_millis(200)),
        )
        .build()
        .await
        .unwrap();
    let config = config_for(&server).timeouts(
        TimeoutConfig::new()
            .connect_timeout(Duration::from_secs(5))
            .query_timeout(Duration::from_millis(50)),
    );
    let conn = Connection::connect(config).await.unwrap();

    let err = conn.start(json!("slow"), Map::new()).await.unwrap_err();
    assert!(matches!(err, Error::QueryTimeout));

    // The late response is routed to the abandoned request without harm.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(conn.is_open());
    assert!(conn.start(json!(1), Map::new()).await.is_ok());
}

#[tokio::test]
async fn test_server_disconnect_fails_outstanding() {
    let server = MockReqlServer::builder()
        .with_response(json!("bye"), MockResponse::Disconnect)
        .with_response(json!("wait"), MockResponse::Silent)
        .build()
        .await
        .unwrap();
    let conn = std::sync::Arc::new(Connection::connect(config_for(&server)).await.unwrap());

    let waiting = tokio::spawn({
        let conn = conn.clone();
        async move { conn.start(json!("wait"), Map::new()).await }
    });
    let server = &server;
    eventually("first query to arrive", move || async move {
        server.received().await.len() == 1
    })
    .await;

    let err = conn.start(json!("bye"), Map::new()).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed(_)), "got {err:?}");
    let err = waiting.await.unwrap().unwrap_err();
    assert!(err.to_string().starts_with("Connection is closed ("));

    let conn = &conn;
    eventually("connection to be marked closed", move || async move { !conn.is_open() }).await;
}

#[tokio::test]
async fn test_unexpected_token_tears_down_everything() {
    let server = MockReqlServer::builder()
        .with_response(json!("wait"), MockResponse::Silent)
        .with_response(
            json!("rows"),
            MockResponse::batches(vec![vec![json!(1), json!(2)], vec![json!(3)]]),
        )
        .with_response(
            json!("stray"),
            MockResponse::WrongToken(Box::new(MockResponse::atom(json!(1)))),
        )
        .build()
        .await
        .unwrap();
    let conn = std::sync::Arc::new(Connection::connect(config_for(&server)).await.unwrap());

    let waiting = tokio::spawn({
        let conn = conn.clone();
        async move { conn.start(json!("wait"), Map::new()).await }
    });
    let server = &server;
    eventually("first query to arrive", move || async move {
        server.received().await.len() == 1
    })
    .await;

    let mut cursor = conn
        .start(json!("rows"), Map::new())
        .await
        .unwrap()
        .into_cursor()
        .unwrap();
    assert_eq!(cursor.next(None).await.unwrap(), Some(Datum::Number(1.0)));

    let err = conn.start(json!("stray"), Map::new()).await.unwrap_err();
    let expected = "Connection is closed (Unexpected response received.).";
    assert_eq!(err.to_string(), expected);
    assert_eq!(waiting.await.unwrap().unwrap_err().to_string(), expected);

    // Rows already buffered stay readable, then the cursor fails.
    assert_eq!(cursor.next(None).await.unwrap(), Some(Datum::Number(2.0)));
    assert_eq!(cursor.next(None).await.unwrap_err().to_string(), expected);
    assert!(!conn.is_open());
}
