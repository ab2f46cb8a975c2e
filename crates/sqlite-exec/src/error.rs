//! Error types for the sqlite-exec crate.

use std::ffi::{CStr, c_int};

use libsqlite3_sys as ffi;

use crate::query::QueryKind;

/// Errors that can occur while preparing or executing statements.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
   /// Error reported by SQLite (malformed SQL, constraint violation, ...).
   ///
   /// `code` is the extended result code.
   #[error("SQLite error {code}: {message}")]
   Sqlite { code: i32, message: String },

   /// The database file could not be opened.
   #[error("Failed to open database '{path}': {message} (code {code})")]
   OpenFailed {
      path: String,
      code: i32,
      message: String,
   },

   /// Database path contains an interior NUL byte.
   #[error("Invalid database path: {0:?}")]
   InvalidPath(String),

   /// The statement handle has been finalized and cannot be used again.
   #[error("Statement has already been finalized")]
   StatementFinalized,

   /// SQL text contained no statement (only whitespace or comments).
   #[error("SQL text contains no statement")]
   EmptyStatement,

   /// SQL text contained more than one statement.
   #[error("SQL text contains more than one statement")]
   MultipleStatements,

   /// Number of bound values does not match the statement's parameters.
   #[error("Statement expects {expected} parameters but {actual} were provided")]
   ParameterCount { expected: usize, actual: usize },

   /// A read query produced more rows than the configured ceiling.
   #[error("Query returned more than {0} rows")]
   TooManyRows(usize),

   /// Only select queries can be streamed.
   #[error("Streaming is only supported for select queries, got {0:?}")]
   StreamingUnsupported(QueryKind),
}

impl Error {
   /// Extended SQLite result code, for engine errors.
   pub fn sqlite_code(&self) -> Option<i32> {
      match self {
         Error::Sqlite { code, .. } | Error::OpenFailed { code, .. } => Some(*code),
         _ => None,
      }
   }

   /// Build an error from the connection's last error, falling back to the
   /// generic description of `code` when there is no connection.
   ///
   /// # Safety
   ///
   /// `db` must be null or a valid, open connection handle.
   pub(crate) unsafe fn from_handle(db: *mut ffi::sqlite3, code: c_int) -> Self {
      if db.is_null() {
         return Error::Sqlite {
            code,
            message: describe(code),
         };
      }

      unsafe {
         let message = cstr_to_string(ffi::sqlite3_errmsg(db)).unwrap_or_else(|| describe(code));
         Error::Sqlite {
            code: ffi::sqlite3_extended_errcode(db),
            message,
         }
      }
   }
}

fn describe(code: c_int) -> String {
   // SAFETY: sqlite3_errstr returns a pointer to a static string
   unsafe { cstr_to_string(ffi::sqlite3_errstr(code)) }.unwrap_or_else(|| format!("result code {code}"))
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn cstr_to_string(ptr: *const std::ffi::c_char) -> Option<String> {
   if ptr.is_null() {
      return None;
   }
   Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
