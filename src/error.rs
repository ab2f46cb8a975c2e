//! Driver error type

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`SqliteDriver`](crate::SqliteDriver).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
   /// Error from statement preparation or execution.
   #[error(transparent)]
   Exec(#[from] sqlite_exec::Error),

   /// Error from the connection gate.
   #[error(transparent)]
   Gate(#[from] sqlite_conn_gate::Error),

   /// `acquire_connection` or a transaction helper was called before `init`.
   #[error("driver has not been initialized")]
   NotInitialized,

   /// `init` was called more than once.
   #[error("driver has already been initialized")]
   AlreadyInitialized,

   /// The driver has been destroyed and cannot be used again.
   #[error("driver has been destroyed")]
   Destroyed,

   /// The connection creation hook failed; the driver did not start.
   #[error("connection hook failed: {0}")]
   Hook(#[source] sqlite_exec::Error),

   /// Transaction failed and rollback also failed.
   #[error("transaction failed: {transaction_error}; rollback also failed: {rollback_error}")]
   TransactionRollbackFailed {
      transaction_error: String,
      rollback_error: String,
   },
}

impl Error {
   /// Extended SQLite result code behind this error, if the engine raised it.
   pub fn sqlite_code(&self) -> Option<i32> {
      match self {
         Error::Exec(e) | Error::Hook(e) => e.sqlite_code(),
         _ => None,
      }
   }

   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Exec(e) => match e {
            sqlite_exec::Error::Sqlite { code, .. } | sqlite_exec::Error::OpenFailed { code, .. } => {
               format!("SQLITE_{code}")
            }
            sqlite_exec::Error::InvalidPath(_) => "INVALID_PATH".to_string(),
            sqlite_exec::Error::StatementFinalized => "STATEMENT_FINALIZED".to_string(),
            sqlite_exec::Error::EmptyStatement => "EMPTY_STATEMENT".to_string(),
            sqlite_exec::Error::MultipleStatements => "MULTIPLE_STATEMENTS".to_string(),
            sqlite_exec::Error::ParameterCount { .. } => "PARAMETER_COUNT".to_string(),
            sqlite_exec::Error::TooManyRows(_) => "TOO_MANY_ROWS".to_string(),
            sqlite_exec::Error::StreamingUnsupported(_) => "STREAMING_UNSUPPORTED".to_string(),
         },
         Error::Gate(e) => match e {
            sqlite_conn_gate::Error::AcquireTimeout(_) => "ACQUIRE_TIMEOUT".to_string(),
            sqlite_conn_gate::Error::UnknownTicket { .. } => "UNKNOWN_TICKET".to_string(),
            _ => "CONNECTION_ERROR".to_string(),
         },
         Error::NotInitialized => "NOT_INITIALIZED".to_string(),
         Error::AlreadyInitialized => "ALREADY_INITIALIZED".to_string(),
         Error::Destroyed => "DESTROYED".to_string(),
         Error::Hook(_) => "HOOK_FAILED".to_string(),
         Error::TransactionRollbackFailed { .. } => "TRANSACTION_ROLLBACK_FAILED".to_string(),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_error_code_sqlite() {
      let err = Error::from(sqlite_exec::Error::Sqlite {
         code: 2067,
         message: "UNIQUE constraint failed: t.id".into(),
      });
      assert_eq!(err.error_code(), "SQLITE_2067");
      assert!(err.to_string().contains("UNIQUE constraint failed"));
   }

   #[test]
   fn test_error_code_too_many_rows() {
      let err = Error::from(sqlite_exec::Error::TooManyRows(10));
      assert_eq!(err.error_code(), "TOO_MANY_ROWS");
      assert!(err.to_string().contains("10 rows"));
   }

   #[test]
   fn test_error_code_gate() {
      let err = Error::from(sqlite_conn_gate::Error::AcquireTimeout(std::time::Duration::from_millis(5)));
      assert_eq!(err.error_code(), "ACQUIRE_TIMEOUT");

      let err = Error::from(sqlite_conn_gate::Error::Closed);
      assert_eq!(err.error_code(), "CONNECTION_ERROR");
   }

   #[test]
   fn test_error_code_lifecycle() {
      assert_eq!(Error::NotInitialized.error_code(), "NOT_INITIALIZED");
      assert_eq!(Error::AlreadyInitialized.error_code(), "ALREADY_INITIALIZED");
      assert_eq!(Error::Destroyed.error_code(), "DESTROYED");
      assert_eq!(Error::Hook(sqlite_exec::Error::EmptyStatement).error_code(), "HOOK_FAILED");
   }

   #[test]
   fn test_hook_error_keeps_sqlite_source() {
      let err = Error::Hook(sqlite_exec::Error::Sqlite {
         code: 1,
         message: "near \"NOT\": syntax error".into(),
      });
      assert_eq!(err.error_code(), "HOOK_FAILED");
      assert_eq!(err.sqlite_code(), Some(1));
      assert!(err.to_string().starts_with("connection hook failed: "));

      let source = std::error::Error::source(&err).unwrap();
      assert!(source.to_string().contains("syntax error"));
   }

   #[test]
   fn test_sqlite_code() {
      let err = Error::from(sqlite_exec::Error::Sqlite {
         code: 787,
         message: "FOREIGN KEY constraint failed".into(),
      });
      assert_eq!(err.sqlite_code(), Some(787));
      assert_eq!(Error::Destroyed.sqlite_code(), None);
      assert_eq!(Error::from(sqlite_exec::Error::TooManyRows(1)).sqlite_code(), None);
   }

   #[test]
   fn test_error_code_transaction_rollback_failed() {
      let err = Error::TransactionRollbackFailed {
         transaction_error: "constraint".into(),
         rollback_error: "busy".into(),
      };
      assert_eq!(err.error_code(), "TRANSACTION_ROLLBACK_FAILED");
      assert!(err.to_string().contains("rollback also failed: busy"));
   }
}
