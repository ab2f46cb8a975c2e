//! # sqlite-single-driver
//!
//! Exposes a single embedded SQLite connection to a query layer that expects
//! a connection pool.
//!
//! [`SqliteDriver`] owns exactly one [`Connection`]. Overlapping callers are
//! serialized through a fair gate: each `acquire_connection` waits until the
//! previous [`Ticket`] is released, then hands out exclusive access.
//! Statements are prepared once per distinct SQL text and kept in a bounded
//! cache.
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use sqlite_single_driver::{CompiledQuery, DriverConfig, QueryKind, SqliteDriver};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> sqlite_single_driver::Result<()> {
//!    let driver = SqliteDriver::new(DriverConfig::default());
//!    driver.init().await?;
//!
//!    let mut conn = driver.acquire_connection().await?;
//!    conn.execute(&CompiledQuery::raw("CREATE TABLE t (v INTEGER)"))?;
//!    conn.execute(&CompiledQuery::new(
//!       "INSERT INTO t (v) VALUES (?)",
//!       vec![json!(5)],
//!       QueryKind::Insert,
//!    ))?;
//!
//!    let rows = conn
//!       .execute(&CompiledQuery::select("SELECT v FROM t", vec![]))?
//!       .into_rows();
//!    assert_eq!(rows[0]["v"], json!(5));
//!
//!    driver.release_connection(conn).await?;
//!    driver.destroy().await
//! }
//! ```

mod config;
mod driver;
mod error;
mod transactions;

pub use config::{ConnectionHook, DatabaseFactory, DatabaseSource, DriverConfig};
pub use driver::SqliteDriver;
pub use error::{Error, Result};
pub use transactions::run_transaction;

pub use sqlite_conn_gate::{ConnectionGate, Ticket};
pub use sqlite_exec::{
   CompiledQuery, Connection, ConnectionOptions, Database, QueryKind, QueryResult, QueryStream, Row,
   WriteQueryResult,
};
