//! Basic connection and query example.
//!
//! # Running
//!
//! ```bash
//! export REQL_HOST=localhost
//! export REQL_DB=test
//!
//! cargo run --example basic
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use reql_client::{Config, Connection, Error};
use serde_json::{Map, json};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("REQL_HOST").unwrap_or_else(|_| "localhost".into());
    let db = std::env::var("REQL_DB").unwrap_or_else(|_| "test".into());

    let config = Config::from_connection_string(&format!("Host={host};Db={db}"))?;

    println!("Connecting to RethinkDB at {host}...");
    let conn = Connection::connect(config).await?;

    let server = conn.server().await?;
    println!("Connected to {server}");

    // r.db_list()
    let dbs = conn.start(json!([59, []]), Map::new()).await?.into_value()?;
    println!("Databases: {dbs}");

    // r.range(10), delivered as a cursor
    let mut cursor = conn
        .start(json!([173, [10]]), Map::new())
        .await?
        .into_cursor()?;
    while let Some(n) = cursor.next(None).await? {
        println!("row: {n}");
    }

    // A query whose result we do not wait for.
    let mut options = Map::new();
    options.insert("noreply".into(), json!(true));
    conn.start(json!([59, []]), options).await?;
    conn.noreply_wait().await?;

    conn.close(false).await?;
    println!("Connection closed.");
    Ok(())
}
