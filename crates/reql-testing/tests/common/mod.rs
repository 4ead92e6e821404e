//! Shared helpers for the client integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use reql_client::{Config, TimeoutConfig};
use reql_testing::MockReqlServer;

/// Client configuration pointing at `server`.
pub fn config_for(server: &MockReqlServer) -> Config {
    Config::new()
        .host(server.host())
        .port(server.port())
        .timeouts(TimeoutConfig::new().connect_timeout(Duration::from_secs(5)))
}

/// Poll `check` until it returns true, failing the test after two seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Install a log subscriber honouring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
