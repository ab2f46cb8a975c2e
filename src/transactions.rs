//! Atomic execution of a batch of statements

use sqlite_exec::{CompiledQuery, Connection, QueryResult};
use tracing::{debug, warn};

use crate::driver::SqliteDriver;
use crate::error::{Error, Result};

impl SqliteDriver {
   /// Execute multiple statements atomically within a transaction.
   ///
   /// This method:
   /// 1. Acquires the connection
   /// 2. Begins a transaction (BEGIN)
   /// 3. Executes all statements in order
   /// 4. Commits on success (COMMIT)
   /// 5. Rolls back on the first error, including a failed COMMIT (ROLLBACK)
   ///
   /// The connection is held for the entire transaction and released on every
   /// path. Returns the result of each statement.
   pub async fn execute_transaction(&self, statements: &[CompiledQuery]) -> Result<Vec<QueryResult>> {
      let mut connection = self.acquire_connection().await?;
      let result = run_transaction(&mut connection, statements);
      self.release_connection(connection).await?;
      result
   }
}

/// Run `statements` between BEGIN and COMMIT, rolling back on the first error.
///
/// The connection never comes back with a transaction left open by this call.
pub fn run_transaction(connection: &mut Connection, statements: &[CompiledQuery]) -> Result<Vec<QueryResult>> {
   connection.begin()?;

   // A failed COMMIT (e.g. a deferred foreign key) leaves the transaction open
   let result = statements
      .iter()
      .map(|statement| connection.execute(statement))
      .collect::<sqlite_exec::Result<Vec<_>>>()
      .and_then(|results| connection.commit().map(|()| results));

   match result {
      Ok(results) => {
         debug!(statements = results.len(), "Transaction committed");
         Ok(results)
      }
      // SQLite already rolled back on its own (e.g. SQLITE_FULL)
      Err(e) if connection.is_autocommit() => {
         debug!(error = %e, "Transaction ended by SQLite");
         Err(e.into())
      }
      Err(e) => match connection.rollback() {
         // Rollback succeeded, return original error
         Ok(()) => {
            debug!(error = %e, "Transaction rolled back");
            Err(e.into())
         }

         // Rollback also failed, report both
         Err(rollback_err) => {
            warn!(error = %e, rollback_error = %rollback_err, "Rollback failed");
            Err(Error::TransactionRollbackFailed {
               transaction_error: e.to_string(),
               rollback_error: rollback_err.to_string(),
            })
         }
      },
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;
   use sqlite_exec::{Database, QueryKind};

   fn setup_conn() -> Connection {
      let mut conn = Connection::new(Database::open_in_memory().unwrap());
      conn
         .execute(&CompiledQuery::raw(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, val INTEGER NOT NULL)",
         ))
         .unwrap();
      conn
         .execute(&CompiledQuery::raw("INSERT INTO t (id, val) VALUES (1, 100), (2, 50)"))
         .unwrap();
      conn
   }

   fn val(conn: &mut Connection, id: i64) -> serde_json::Value {
      let rows = conn
         .execute(&CompiledQuery::select("SELECT val FROM t WHERE id = ?", vec![json!(id)]))
         .unwrap()
         .into_rows();
      rows[0]["val"].clone()
   }

   #[test]
   fn test_successful_transaction_commits() {
      let mut conn = setup_conn();

      let results = run_transaction(
         &mut conn,
         &[
            CompiledQuery::raw("UPDATE t SET val = val - 30 WHERE id = 1"),
            CompiledQuery::raw("UPDATE t SET val = val + 30 WHERE id = 2"),
         ],
      )
      .unwrap();

      assert_eq!(results.len(), 2);
      assert!(conn.is_autocommit());
      assert_eq!(val(&mut conn, 1), json!(70));
      assert_eq!(val(&mut conn, 2), json!(80));
   }

   #[test]
   fn test_failed_transaction_rolls_back() {
      let mut conn = setup_conn();

      // NULL violates NOT NULL
      let err = run_transaction(
         &mut conn,
         &[
            CompiledQuery::raw("UPDATE t SET val = 999 WHERE id = 1"),
            CompiledQuery::new(
               "INSERT INTO t (id, val) VALUES (?, ?)",
               vec![json!(3), json!(null)],
               QueryKind::Insert,
            ),
         ],
      )
      .unwrap_err();

      assert!(err.error_code().starts_with("SQLITE_"));
      assert!(conn.is_autocommit());
      assert_eq!(val(&mut conn, 1), json!(100));
   }

   #[test]
   fn test_failed_commit_rolls_back() {
      let mut conn = setup_conn();
      for sql in [
         "PRAGMA foreign_keys = ON",
         "CREATE TABLE parent (id INTEGER PRIMARY KEY)",
         "CREATE TABLE child (pid INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED)",
      ] {
         conn.execute(&CompiledQuery::raw(sql)).unwrap();
      }

      // Deferred, so the violation only surfaces at COMMIT
      let err = run_transaction(
         &mut conn,
         &[
            CompiledQuery::raw("UPDATE t SET val = 1 WHERE id = 1"),
            CompiledQuery::raw("INSERT INTO child (pid) VALUES (99)"),
         ],
      )
      .unwrap_err();

      assert!(matches!(err, Error::Exec(sqlite_exec::Error::Sqlite { code: 787, .. })));
      assert!(conn.is_autocommit());
      assert_eq!(val(&mut conn, 1), json!(100));

      let rows = conn
         .execute(&CompiledQuery::select("SELECT COUNT(*) AS c FROM child", vec![]))
         .unwrap()
         .into_rows();
      assert_eq!(rows[0]["c"], json!(0));

      conn.begin().unwrap();
      conn.rollback().unwrap();
   }

   #[test]
   fn test_begin_inside_open_transaction_fails() {
      let mut conn = setup_conn();
      conn.begin().unwrap();

      let err = run_transaction(&mut conn, &[]).unwrap_err();
      assert!(matches!(err, Error::Exec(sqlite_exec::Error::Sqlite { .. })));

      // The outer transaction is untouched
      assert!(!conn.is_autocommit());
      conn.rollback().unwrap();
   }
}
