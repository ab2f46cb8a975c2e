//! The single SQLite connection and its statement routing

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tracing::debug;

use crate::cache::{Cached, DEFAULT_STATEMENT_CACHE_CAPACITY, KeyHasher, StatementCache, sql_hash};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::query::{CompiledQuery, QueryResult};
use crate::statement::{Rows, Statement};

/// Default ceiling on rows collected by a single read query
pub const DEFAULT_MAX_RESULT_ROWS: usize = 10_000_000;

/// Tuning knobs for a [`Connection`]
///
/// # Examples
///
/// ```
/// use sqlite_exec::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///    .with_statement_cache_capacity(32)
///    .with_max_result_rows(10_000);
///
/// assert_eq!(options.statement_cache_capacity, 32);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
   /// Maximum number of prepared statements kept alive
   ///
   /// Default: 128
   pub statement_cache_capacity: usize,

   /// Read queries producing more rows than this fail with
   /// [`Error::TooManyRows`] instead of growing without bound
   ///
   /// Default: 10,000,000
   pub max_result_rows: usize,

   /// Hash used for statement cache keys
   ///
   /// Default: [`sql_hash`]
   pub key_hasher: KeyHasher,
}

impl Default for ConnectionOptions {
   fn default() -> Self {
      Self {
         statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
         max_result_rows: DEFAULT_MAX_RESULT_ROWS,
         key_hasher: sql_hash,
      }
   }
}

impl ConnectionOptions {
   pub fn with_statement_cache_capacity(mut self, capacity: usize) -> Self {
      self.statement_cache_capacity = capacity;
      self
   }

   pub fn with_max_result_rows(mut self, max_rows: usize) -> Self {
      self.max_result_rows = max_rows;
      self
   }

   pub fn with_key_hasher(mut self, hasher: KeyHasher) -> Self {
      self.key_hasher = hasher;
      self
   }
}

/// The one connection to an embedded SQLite database.
///
/// Owns the database handle and a bounded cache of prepared statements. Queries
/// are routed by SQLite's own classification of the prepared statement:
/// read-only statements return rows, everything else returns a change count.
///
/// Every execution method takes `&mut self`; sharing the connection between
/// callers goes through a `ConnectionGate`, which hands it to one ticket holder
/// at a time.
///
/// Dropping the connection finalizes every cached statement before the database
/// handle closes. Use [`close`](Self::close) to observe close failures.
#[derive(Debug)]
pub struct Connection {
   // Declared before `db`: cached statements are finalized first on drop
   statements: StatementCache<Statement>,
   db: Database,
   max_result_rows: usize,
   finalized: u64,
}

impl Connection {
   pub fn new(db: Database) -> Self {
      Self::with_options(db, ConnectionOptions::default())
   }

   pub fn with_options(db: Database, options: ConnectionOptions) -> Self {
      debug!(
         path = %db.path(),
         statement_cache_capacity = options.statement_cache_capacity,
         max_result_rows = options.max_result_rows,
         "Created connection"
      );

      Self {
         statements: StatementCache::with_hasher(options.statement_cache_capacity, options.key_hasher),
         db,
         max_result_rows: options.max_result_rows,
         finalized: 0,
      }
   }

   /// Return the cached statement for `sql`, preparing it on a miss.
   ///
   /// Statements displaced from the cache by this call are finalized before it
   /// returns. Finalizing is reserved to the connection, so a cached statement
   /// stays usable:
   ///
   /// ```compile_fail
   /// use sqlite_exec::{Connection, Database};
   ///
   /// let mut conn = Connection::new(Database::open_in_memory().unwrap());
   /// conn.statement("SELECT 1").unwrap().finalize().unwrap();
   /// ```
   pub fn statement(&mut self, sql: &str) -> Result<&mut Statement> {
      // A dead handle is never served from the cache
      if self.statements.get(sql).is_some_and(Statement::is_finalized) {
         debug!(sql, "Dropping finalized statement from cache");
         self.statements.remove(sql);
      }

      let db = &self.db;
      let Cached { value, hit, evicted } = self
         .statements
         .get_or_try_insert_with(sql, || Statement::prepare(db, sql))?;

      if !hit && !evicted.is_empty() {
         debug!(count = evicted.len(), "Finalizing evicted statements");
      }

      for mut stale in evicted {
         if stale.finalize().is_ok() {
            self.finalized += 1;
         }
      }

      Ok(value)
   }

   /// Execute a compiled query.
   ///
   /// Read-only statements are stepped to exhaustion and return
   /// [`QueryResult::Rows`]; all others are stepped once and return
   /// [`QueryResult::Write`]. The query's declared kind does not affect routing.
   pub fn execute(&mut self, query: &CompiledQuery) -> Result<QueryResult> {
      let max_rows = self.max_result_rows;
      let statement = self.statement(&query.sql)?;

      if statement.is_read_only() {
         Ok(QueryResult::Rows(statement.all(&query.parameters, max_rows)?))
      } else {
         Ok(QueryResult::Write(statement.run(&query.parameters)?))
      }
   }

   /// Stream a select query one row at a time.
   ///
   /// Each item is a [`QueryResult::Rows`] holding exactly one row, in the order
   /// SQLite produces them. Fails with [`Error::StreamingUnsupported`] for any
   /// query not declared as a select.
   pub fn stream(&mut self, query: &CompiledQuery) -> Result<QueryStream<'_>> {
      if !query.kind.is_select() {
         return Err(Error::StreamingUnsupported(query.kind));
      }

      let rows = self.statement(&query.sql)?.iterate(&query.parameters)?;
      Ok(QueryStream { rows })
   }

   pub fn begin(&mut self) -> Result<()> {
      self.execute(&CompiledQuery::raw("BEGIN")).map(|_| ())
   }

   pub fn commit(&mut self) -> Result<()> {
      self.execute(&CompiledQuery::raw("COMMIT")).map(|_| ())
   }

   pub fn rollback(&mut self) -> Result<()> {
      self.execute(&CompiledQuery::raw("ROLLBACK")).map(|_| ())
   }

   /// Returns false while an explicit transaction is open.
   pub fn is_autocommit(&self) -> bool {
      self.db.is_autocommit()
   }

   pub fn database(&self) -> &Database {
      &self.db
   }

   /// Number of statements currently cached
   pub fn cached_statements(&self) -> usize {
      self.statements.len()
   }

   /// Total number of statements pushed out of the cache
   pub fn statement_evictions(&self) -> u64 {
      self.statements.evictions()
   }

   /// Total number of statements this connection has finalized
   pub fn finalized_statements(&self) -> u64 {
      self.finalized
   }

   pub fn max_result_rows(&self) -> usize {
      self.max_result_rows
   }

   /// Finalize every cached statement and close the database handle.
   pub fn close(self) -> Result<()> {
      let Connection {
         mut statements,
         db,
         ..
      } = self;

      let remaining = statements.drain();
      debug!(count = remaining.len(), path = %db.path(), "Closing connection");
      for mut statement in remaining {
         if !statement.is_finalized() {
            statement.finalize()?;
         }
      }

      db.close()
   }
}

/// Row-at-a-time stream returned by [`Connection::stream`].
///
/// Usable both as an [`Iterator`] and as a [`futures::Stream`]; every row is
/// already available once the connection is checked out, so the stream never
/// returns `Pending`. Dropping it early resets the underlying statement.
pub struct QueryStream<'c> {
   rows: Rows<'c>,
}

impl Iterator for QueryStream<'_> {
   type Item = Result<QueryResult>;

   fn next(&mut self) -> Option<Self::Item> {
      self
         .rows
         .next()
         .map(|row| row.map(|row| QueryResult::Rows(vec![row])))
   }
}

impl Stream for QueryStream<'_> {
   type Item = Result<QueryResult>;

   fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
      Poll::Ready(self.get_mut().next())
   }
}
