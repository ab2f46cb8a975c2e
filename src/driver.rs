//! Driver exposing one SQLite connection to callers that expect a pool

use std::time::Duration;

use sqlite_conn_gate::{ConnectionGate, Ticket};
use sqlite_exec::{Connection, ConnectionOptions};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{ConnectionHook, DatabaseSource, DriverConfig};
use crate::error::{Error, Result};

/// Setup consumed by the first successful `init`
struct PendingInit {
   database: DatabaseSource,
   options: ConnectionOptions,
   on_create_connection: Option<ConnectionHook>,
}

/// SQLite driver with exactly one connection.
///
/// ## Architecture
///
/// The connection lives inside a [`ConnectionGate`]. Callers check it out with
/// [`acquire_connection`](Self::acquire_connection), which suspends until the
/// previous holder releases it, and get back a [`Ticket`] that dereferences to
/// the [`Connection`]. Waiters are served in arrival order.
///
/// ## Lifecycle
///
/// ```text
/// 1. new(config)          - nothing is opened yet
/// 2. init()               - resolves the database, runs the hook, opens the gate
/// 3. acquire / release    - any number of times, one holder at a time
/// 4. destroy()            - waits for the holder, closes the connection
/// ```
///
/// A failed `init` leaves the driver destroyed.
pub struct SqliteDriver {
   gate: ConnectionGate<Connection>,
   pending: Mutex<Option<PendingInit>>,
   acquire_timeout: Option<Duration>,
}

impl SqliteDriver {
   pub fn new(config: DriverConfig) -> Self {
      let options = config.connection_options();
      let DriverConfig {
         database,
         acquire_timeout,
         on_create_connection,
         ..
      } = config;

      Self {
         gate: ConnectionGate::new(),
         pending: Mutex::new(Some(PendingInit {
            database,
            options,
            on_create_connection,
         })),
         acquire_timeout,
      }
   }

   /// Open the database and make the connection available.
   ///
   /// A factory source is invoked here and never again. The creation hook, if
   /// any, runs before the first caller can acquire the connection.
   pub async fn init(&self) -> Result<()> {
      let mut pending = self.pending.lock().await;

      if self.gate.is_closed() {
         return Err(Error::Destroyed);
      }

      let PendingInit {
         database,
         options,
         on_create_connection,
      } = pending.take().ok_or(Error::AlreadyInitialized)?;

      let connection = match Self::create_connection(database, options, on_create_connection).await {
         Ok(connection) => connection,
         Err(e) => {
            warn!(error = %e, "Driver initialization failed");
            // No connection was installed, so nothing can be waiting on it
            if let Err(close_err) = self.gate.close().await {
               warn!(error = %close_err, "Failed to close gate after initialization failure");
            }
            return Err(e);
         }
      };

      debug!(path = %connection.database().path(), "Driver initialized");
      self.gate.open(connection).await.map_err(|e| match e {
         // destroy() ran while the database was being opened
         sqlite_conn_gate::Error::Closed => Error::Destroyed,
         other => Error::Gate(other),
      })
   }

   async fn create_connection(
      database: DatabaseSource,
      options: ConnectionOptions,
      on_create_connection: Option<ConnectionHook>,
   ) -> Result<Connection> {
      let db = database.resolve().await?;
      let mut connection = Connection::with_options(db, options);

      if let Some(hook) = on_create_connection
         && let Err(e) = hook(&mut connection)
      {
         if let Err(close_err) = connection.close() {
            warn!(error = %close_err, "Failed to close connection after hook failure");
         }
         return Err(Error::Hook(e));
      }

      Ok(connection)
   }

   /// Check out the connection, waiting for the current holder if needed.
   ///
   /// Honors the configured acquire timeout.
   pub async fn acquire_connection(&self) -> Result<Ticket<Connection>> {
      let ticket = match self.acquire_timeout {
         Some(timeout) => self.gate.acquire_timeout(timeout).await,
         None => self.gate.acquire().await,
      };

      ticket.map_err(|e| match e {
         sqlite_conn_gate::Error::NotOpen => Error::NotInitialized,
         sqlite_conn_gate::Error::Closed => Error::Destroyed,
         other => Error::Gate(other),
      })
   }

   pub async fn begin_transaction(&self, connection: &mut Ticket<Connection>) -> Result<()> {
      debug!(ticket = connection.id(), "Beginning transaction");
      Ok(connection.begin()?)
   }

   pub async fn commit_transaction(&self, connection: &mut Ticket<Connection>) -> Result<()> {
      debug!(ticket = connection.id(), "Committing transaction");
      Ok(connection.commit()?)
   }

   pub async fn rollback_transaction(&self, connection: &mut Ticket<Connection>) -> Result<()> {
      debug!(ticket = connection.id(), "Rolling back transaction");
      Ok(connection.rollback()?)
   }

   /// Hand the connection back, waking the next waiter.
   pub async fn release_connection(&self, connection: Ticket<Connection>) -> Result<()> {
      Ok(self.gate.release(connection)?)
   }

   /// Close the connection for good.
   ///
   /// Waits for the current holder to release it. Queued and later acquires
   /// fail with [`Error::Destroyed`], as does a second `destroy`.
   pub async fn destroy(&self) -> Result<()> {
      let connection = self.gate.close().await.map_err(|_| Error::Destroyed)?;

      // Drop a factory that was never invoked
      self.pending.lock().await.take();

      match connection {
         Some(connection) => {
            debug!(path = %connection.database().path(), "Destroying driver");
            connection.close()?;
         }
         None => debug!("Destroying uninitialized driver"),
      }

      Ok(())
   }

   /// Returns true once `init` has succeeded and until `destroy`
   pub fn is_ready(&self) -> bool {
      !self.gate.is_closed() && self.pending.try_lock().is_ok_and(|pending| pending.is_none())
   }

   /// Returns true once `destroy` has been called or `init` failed
   pub fn is_destroyed(&self) -> bool {
      self.gate.is_closed()
   }
}

impl std::fmt::Debug for SqliteDriver {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("SqliteDriver")
         .field("acquire_timeout", &self.acquire_timeout)
         .field("destroyed", &self.gate.is_closed())
         .field("checked_out", &self.gate.is_checked_out())
         .finish_non_exhaustive()
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;
   use sqlite_exec::{CompiledQuery, Database};

   #[tokio::test]
   async fn test_acquire_before_init() {
      let driver = SqliteDriver::new(DriverConfig::default());
      assert_eq!(driver.acquire_connection().await.unwrap_err(), Error::NotInitialized);
      assert!(!driver.is_ready());
   }

   #[tokio::test]
   async fn test_init_twice_fails() {
      let driver = SqliteDriver::new(DriverConfig::default());
      driver.init().await.unwrap();
      assert!(driver.is_ready());
      assert_eq!(driver.init().await.unwrap_err(), Error::AlreadyInitialized);
   }

   #[tokio::test]
   async fn test_transaction_passthrough() {
      let driver = SqliteDriver::new(DriverConfig::new(Database::open_in_memory().unwrap()));
      driver.init().await.unwrap();

      let mut conn = driver.acquire_connection().await.unwrap();
      conn.execute(&CompiledQuery::raw("CREATE TABLE t (v INTEGER)")).unwrap();

      driver.begin_transaction(&mut conn).await.unwrap();
      assert!(!conn.is_autocommit());
      conn
         .execute(&CompiledQuery::new(
            "INSERT INTO t (v) VALUES (?)",
            vec![json!(1)],
            sqlite_exec::QueryKind::Insert,
         ))
         .unwrap();
      driver.rollback_transaction(&mut conn).await.unwrap();
      assert!(conn.is_autocommit());

      driver.begin_transaction(&mut conn).await.unwrap();
      conn.execute(&CompiledQuery::raw("INSERT INTO t (v) VALUES (2)")).unwrap();
      driver.commit_transaction(&mut conn).await.unwrap();

      let rows = conn
         .execute(&CompiledQuery::select("SELECT v FROM t", vec![]))
         .unwrap()
         .into_rows();
      assert_eq!(rows.len(), 1);
      assert_eq!(rows[0]["v"], json!(2));

      driver.release_connection(conn).await.unwrap();
      driver.destroy().await.unwrap();
   }

   #[tokio::test]
   async fn test_destroy_before_init() {
      let driver = SqliteDriver::new(DriverConfig::default());
      driver.destroy().await.unwrap();

      assert!(driver.is_destroyed());
      assert_eq!(driver.init().await.unwrap_err(), Error::Destroyed);
      assert_eq!(driver.acquire_connection().await.unwrap_err(), Error::Destroyed);
   }
}
