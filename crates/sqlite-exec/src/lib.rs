//! # sqlite-exec
//!
//! One SQLite connection with a bounded cache of prepared statements.
//!
//! A [`Connection`] owns an open [`Database`] and prepares each distinct SQL
//! text once, keeping at most [`ConnectionOptions::statement_cache_capacity`]
//! statements alive. The least recently used statement is finalized when the
//! cache is full. Queries arrive as [`CompiledQuery`] values with JSON
//! parameters and come back as [`QueryResult`]s whose rows are ordered JSON
//! maps keyed by column name.
//!
//! ## Example
//!
//! ```
//! use serde_json::json;
//! use sqlite_exec::{CompiledQuery, Connection, Database, QueryKind, QueryResult};
//!
//! # fn main() -> sqlite_exec::Result<()> {
//! let mut conn = Connection::new(Database::open_in_memory()?);
//!
//! conn.execute(&CompiledQuery::raw("CREATE TABLE t (v INTEGER)"))?;
//!
//! let insert = CompiledQuery::new("INSERT INTO t (v) VALUES (?)", vec![json!(5)], QueryKind::Insert);
//! let written = conn.execute(&insert)?.write_result();
//! assert_eq!(written.map(|w| w.rows_affected), Some(1));
//!
//! let select = CompiledQuery::select("SELECT v FROM t", vec![]);
//! let QueryResult::Rows(rows) = conn.execute(&select)? else {
//!    unreachable!()
//! };
//! assert_eq!(rows[0]["v"], json!(5));
//!
//! conn.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread safety
//!
//! Handles are opened in SQLite's multi-thread mode. [`Connection`] is `Send`
//! but not `Sync`; pair it with a connection gate to share it between tasks.

mod cache;
mod connection;
mod database;
mod error;
mod query;
mod statement;
mod value;

pub use cache::{CacheKey, Cached, DEFAULT_STATEMENT_CACHE_CAPACITY, KeyHasher, StatementCache, sql_hash};
pub use connection::{Connection, ConnectionOptions, DEFAULT_MAX_RESULT_ROWS, QueryStream};
pub use database::Database;
pub use error::{Error, Result};
pub use query::{CompiledQuery, QueryKind, QueryResult, WriteQueryResult};
pub use statement::{Rows, Statement};
pub use value::Row;
