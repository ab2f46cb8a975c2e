//! Configuration for the SQLite driver

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use sqlite_exec::{Connection, ConnectionOptions, DEFAULT_MAX_RESULT_ROWS, DEFAULT_STATEMENT_CACHE_CAPACITY, Database};

/// Deferred producer of the database, invoked once during `init`
pub type DatabaseFactory = Box<dyn FnOnce() -> BoxFuture<'static, sqlite_exec::Result<Database>> + Send>;

/// Callback run with the new connection before any caller can acquire it
pub type ConnectionHook = Box<dyn FnOnce(&mut Connection) -> sqlite_exec::Result<()> + Send>;

/// Where the driver gets its database from.
pub enum DatabaseSource {
   /// A database that is already open
   Database(Database),
   /// A factory that opens the database when the driver is initialized
   Factory(DatabaseFactory),
}

impl DatabaseSource {
   /// Defer opening the database until `init` by calling `factory`.
   pub fn factory<F, Fut>(factory: F) -> Self
   where
      F: FnOnce() -> Fut + Send + 'static,
      Fut: Future<Output = sqlite_exec::Result<Database>> + Send + 'static,
   {
      DatabaseSource::Factory(Box::new(move || factory().boxed()))
   }

   /// Open (creating if needed) the database file at `path` during `init`.
   pub fn path(path: impl Into<PathBuf>) -> Self {
      let path = path.into();
      Self::factory(move || async move { Database::open(path) })
   }

   pub(crate) async fn resolve(self) -> sqlite_exec::Result<Database> {
      match self {
         DatabaseSource::Database(db) => Ok(db),
         DatabaseSource::Factory(factory) => factory().await,
      }
   }
}

/// A private in-memory database opened during `init`
impl Default for DatabaseSource {
   fn default() -> Self {
      Self::factory(|| async { Database::open_in_memory() })
   }
}

impl From<Database> for DatabaseSource {
   fn from(db: Database) -> Self {
      DatabaseSource::Database(db)
   }
}

impl fmt::Debug for DatabaseSource {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         DatabaseSource::Database(db) => f.debug_tuple("Database").field(&db.path()).finish(),
         DatabaseSource::Factory(_) => f.write_str("Factory(..)"),
      }
   }
}

/// Configuration for [`SqliteDriver`](crate::SqliteDriver)
///
/// # Examples
///
/// ```
/// use sqlite_single_driver::{DatabaseSource, DriverConfig};
/// use std::time::Duration;
///
/// // Private in-memory database with default limits
/// let config = DriverConfig::default();
///
/// // On-disk database, smaller statement cache, bounded waits
/// let config = DriverConfig::new(DatabaseSource::path("app.db"))
///    .with_statement_cache_capacity(32)
///    .with_acquire_timeout(Duration::from_secs(5));
/// ```
pub struct DriverConfig {
   /// Database the driver's single connection runs on
   ///
   /// Default: a private in-memory database
   pub database: DatabaseSource,

   /// Maximum number of prepared statements kept alive
   ///
   /// Statements beyond this are finalized least recently used first.
   ///
   /// Default: 128
   pub statement_cache_capacity: usize,

   /// Ceiling on rows collected by a single read query
   ///
   /// Default: 10,000,000
   pub max_result_rows: usize,

   /// How long `acquire_connection` waits before giving up
   ///
   /// Default: `None` (wait indefinitely)
   pub acquire_timeout: Option<Duration>,

   /// Run once with the new connection during `init`, e.g. to set pragmas
   ///
   /// Default: none
   pub on_create_connection: Option<ConnectionHook>,
}

impl DriverConfig {
   pub fn new(database: impl Into<DatabaseSource>) -> Self {
      Self {
         database: database.into(),
         statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
         max_result_rows: DEFAULT_MAX_RESULT_ROWS,
         acquire_timeout: None,
         on_create_connection: None,
      }
   }

   pub fn with_statement_cache_capacity(mut self, capacity: usize) -> Self {
      self.statement_cache_capacity = capacity;
      self
   }

   pub fn with_max_result_rows(mut self, max_rows: usize) -> Self {
      self.max_result_rows = max_rows;
      self
   }

   pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
      self.acquire_timeout = Some(timeout);
      self
   }

   pub fn with_on_create_connection<F>(mut self, hook: F) -> Self
   where
      F: FnOnce(&mut Connection) -> sqlite_exec::Result<()> + Send + 'static,
   {
      self.on_create_connection = Some(Box::new(hook));
      self
   }

   pub(crate) fn connection_options(&self) -> ConnectionOptions {
      ConnectionOptions::default()
         .with_statement_cache_capacity(self.statement_cache_capacity)
         .with_max_result_rows(self.max_result_rows)
   }
}

impl Default for DriverConfig {
   fn default() -> Self {
      Self::new(DatabaseSource::default())
   }
}

impl fmt::Debug for DriverConfig {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("DriverConfig")
         .field("database", &self.database)
         .field("statement_cache_capacity", &self.statement_cache_capacity)
         .field("max_result_rows", &self.max_result_rows)
         .field("acquire_timeout", &self.acquire_timeout)
         .field("on_create_connection", &self.on_create_connection.is_some())
         .finish()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_defaults() {
      let config = DriverConfig::default();
      assert_eq!(config.statement_cache_capacity, 128);
      assert_eq!(config.max_result_rows, 10_000_000);
      assert_eq!(config.acquire_timeout, None);
      assert!(config.on_create_connection.is_none());
      assert!(matches!(config.database, DatabaseSource::Factory(_)));
   }

   #[test]
   fn test_connection_options_follow_config() {
      let options = DriverConfig::default()
         .with_statement_cache_capacity(4)
         .with_max_result_rows(9)
         .connection_options();
      assert_eq!(options.statement_cache_capacity, 4);
      assert_eq!(options.max_result_rows, 9);
   }

   #[tokio::test]
   async fn test_open_database_resolves_to_itself() {
      let db = Database::open_in_memory().unwrap();
      let source = DatabaseSource::from(db);
      assert_eq!(format!("{source:?}"), "Database(\":memory:\")");

      let db = source.resolve().await.unwrap();
      assert_eq!(db.path(), ":memory:");
   }

   #[tokio::test]
   async fn test_path_source_opens_file() {
      let temp_dir = tempfile::TempDir::new().unwrap();
      let path = temp_dir.path().join("config.db");

      let db = DatabaseSource::path(&path).resolve().await.unwrap();
      assert_eq!(db.path(), path.to_string_lossy());
   }
}
