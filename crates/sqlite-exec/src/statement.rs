//! Prepared statement handle and its execute lifecycle

use std::ffi::c_int;
use std::iter::FusedIterator;
use std::ptr::{self, NonNull};

use libsqlite3_sys as ffi;
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::query::WriteQueryResult;
use crate::value::{Row, bind_value, read_row};

/// Owns one prepared `sqlite3_stmt`.
///
/// Every execution follows the same lifecycle: reset and clear old bindings,
/// bind positional parameters, step, then reset again so the handle is ready for
/// reuse. Once [`finalize`](Self::finalize)d the handle is dead and every
/// operation fails with [`Error::StatementFinalized`].
///
/// A statement never outlives the [`Connection`](crate::Connection) that
/// prepared it; the connection finalizes it on eviction or teardown.
#[derive(Debug)]
pub struct Statement {
   raw: Option<NonNull<ffi::sqlite3_stmt>>,
   db: NonNull<ffi::sqlite3>,
   read_only: bool,
   sql: String,
}

// SAFETY: see `Database`; statements are only touched through `&mut`
// access to the connection that owns them.
unsafe impl Send for Statement {}

impl Statement {
   /// Prepare exactly one statement from `sql`.
   pub(crate) fn prepare(db: &Database, sql: &str) -> Result<Self> {
      let db_ptr = db.as_ptr();
      let (raw, consumed) = unsafe { prepare_raw(db_ptr, sql)? };
      let raw = raw.ok_or(Error::EmptyStatement)?;

      let statement = Self {
         raw: Some(raw),
         // SAFETY: handle of an open Database
         db: unsafe { NonNull::new_unchecked(db_ptr) },
         read_only: unsafe { ffi::sqlite3_stmt_readonly(raw.as_ptr()) } != 0,
         sql: sql.to_string(),
      };

      let tail = sql.get(consumed..).unwrap_or_default();
      if !tail.trim().is_empty() {
         // A tail holding only comments prepares to nothing
         match unsafe { prepare_raw(db_ptr, tail) } {
            Ok((None, _)) => {}
            Ok((Some(extra), _)) => {
               unsafe { ffi::sqlite3_finalize(extra.as_ptr()) };
               return Err(Error::MultipleStatements);
            }
            Err(_) => return Err(Error::MultipleStatements),
         }
      }

      trace!(sql = %statement.sql, read_only = statement.read_only, "Prepared statement");
      Ok(statement)
   }

   /// True when SQLite classifies the statement as non-mutating.
   pub fn is_read_only(&self) -> bool {
      self.read_only
   }

   pub fn is_finalized(&self) -> bool {
      self.raw.is_none()
   }

   pub fn sql(&self) -> &str {
      &self.sql
   }

   /// Execute one step and report the change count of that step.
   ///
   /// `rows_affected` is the delta of the connection's cumulative change counter
   /// sampled around the step, so back-to-back runs never accumulate. Rows
   /// written by triggers fired from the step are included.
   pub fn run(&mut self, params: &[JsonValue]) -> Result<WriteQueryResult> {
      let raw = self.bind(params)?;

      let before = self.total_changes();
      let stepped = self.step(raw);
      self.reset();
      stepped?;
      let after = self.total_changes();

      Ok(WriteQueryResult {
         rows_affected: after - before,
         last_insert_id: unsafe { ffi::sqlite3_last_insert_rowid(self.db.as_ptr()) },
      })
   }

   /// Step to exhaustion, collecting every row.
   ///
   /// Fails with [`Error::TooManyRows`] instead of collecting more than
   /// `max_rows` rows. The statement is reset on every path.
   pub fn all(&mut self, params: &[JsonValue], max_rows: usize) -> Result<Vec<Row>> {
      let raw = self.bind(params)?;
      let rows = self.collect_rows(raw, max_rows);
      self.reset();
      rows
   }

   fn collect_rows(&mut self, raw: *mut ffi::sqlite3_stmt, max_rows: usize) -> Result<Vec<Row>> {
      let mut rows = Vec::new();
      while self.step(raw)? {
         if rows.len() >= max_rows {
            return Err(Error::TooManyRows(max_rows));
         }
         rows.push(unsafe { read_row(raw) });
      }
      Ok(rows)
   }

   /// Bind `params` and return a lazy, forward-only iterator over the rows.
   ///
   /// The statement is reset when the iterator is exhausted, hits an error, or is
   /// dropped early. Call `iterate` again to read from the start.
   pub fn iterate(&mut self, params: &[JsonValue]) -> Result<Rows<'_>> {
      self.bind(params)?;
      Ok(Rows {
         statement: self,
         done: false,
      })
   }

   /// Release the underlying SQLite statement.
   ///
   /// Only the owning connection finalizes, after the statement has left its
   /// cache. Finalizing twice is a lifecycle error and fails with
   /// [`Error::StatementFinalized`].
   pub(crate) fn finalize(&mut self) -> Result<()> {
      let raw = self.raw.take().ok_or(Error::StatementFinalized)?;
      // The return code repeats the last step error, which was already reported
      unsafe { ffi::sqlite3_finalize(raw.as_ptr()) };
      trace!(sql = %self.sql, "Finalized statement");
      Ok(())
   }

   fn raw(&self) -> Result<*mut ffi::sqlite3_stmt> {
      self
         .raw
         .map(NonNull::as_ptr)
         .ok_or(Error::StatementFinalized)
   }

   fn bind(&mut self, params: &[JsonValue]) -> Result<*mut ffi::sqlite3_stmt> {
      let raw = self.raw()?;
      self.reset();

      let expected = usize::try_from(unsafe { ffi::sqlite3_bind_parameter_count(raw) }).unwrap_or_default();
      if expected != params.len() {
         return Err(Error::ParameterCount {
            expected,
            actual: params.len(),
         });
      }

      for (i, value) in params.iter().enumerate() {
         let index = c_int::try_from(i + 1).map_err(|_| Error::ParameterCount {
            expected,
            actual: params.len(),
         })?;
         let rc = unsafe { bind_value(raw, index, value) };
         if rc != ffi::SQLITE_OK {
            let err = self.error(rc);
            self.reset();
            return Err(err);
         }
      }

      Ok(raw)
   }

   fn step(&mut self, raw: *mut ffi::sqlite3_stmt) -> Result<bool> {
      match unsafe { ffi::sqlite3_step(raw) } {
         ffi::SQLITE_ROW => Ok(true),
         ffi::SQLITE_DONE => Ok(false),
         rc => Err(self.error(rc)),
      }
   }

   /// Reset for reuse and drop any bound values.
   fn reset(&mut self) {
      if let Some(raw) = self.raw {
         unsafe {
            ffi::sqlite3_reset(raw.as_ptr());
            ffi::sqlite3_clear_bindings(raw.as_ptr());
         }
      }
   }

   fn error(&self, rc: c_int) -> Error {
      unsafe { Error::from_handle(self.db.as_ptr(), rc) }
   }

   fn total_changes(&self) -> i64 {
      unsafe { ffi::sqlite3_total_changes64(self.db.as_ptr()) }
   }
}

impl Drop for Statement {
   fn drop(&mut self) {
      if let Some(raw) = self.raw.take() {
         unsafe { ffi::sqlite3_finalize(raw.as_ptr()) };
      }
   }
}

/// Prepares the first statement in `sql`, returning it (if any) and the number
/// of bytes consumed.
///
/// # Safety
///
/// `db` must be a valid, open connection handle.
unsafe fn prepare_raw(db: *mut ffi::sqlite3, sql: &str) -> Result<(Option<NonNull<ffi::sqlite3_stmt>>, usize)> {
   let len = c_int::try_from(sql.len()).map_err(|_| Error::Sqlite {
      code: ffi::SQLITE_TOOBIG,
      message: "SQL text is too large".into(),
   })?;

   let mut raw = ptr::null_mut();
   let mut tail = ptr::null();
   let rc = unsafe { ffi::sqlite3_prepare_v2(db, sql.as_ptr().cast(), len, &mut raw, &mut tail) };
   if rc != ffi::SQLITE_OK {
      return Err(unsafe { Error::from_handle(db, rc) });
   }

   let consumed = if tail.is_null() {
      sql.len()
   } else {
      (tail as usize).saturating_sub(sql.as_ptr() as usize).min(sql.len())
   };

   Ok((NonNull::new(raw), consumed))
}

/// Lazy row iterator returned by [`Statement::iterate`].
///
/// Single pass and forward only. Resets its statement on exhaustion, on error,
/// and on drop.
pub struct Rows<'s> {
   statement: &'s mut Statement,
   done: bool,
}

impl Rows<'_> {
   fn finish(&mut self) {
      self.done = true;
      self.statement.reset();
   }
}

impl Iterator for Rows<'_> {
   type Item = Result<Row>;

   fn next(&mut self) -> Option<Self::Item> {
      if self.done {
         return None;
      }

      let raw = match self.statement.raw() {
         Ok(raw) => raw,
         Err(e) => {
            self.done = true;
            return Some(Err(e));
         }
      };

      match self.statement.step(raw) {
         Ok(true) => Some(Ok(unsafe { read_row(raw) })),
         Ok(false) => {
            self.finish();
            None
         }
         Err(e) => {
            self.finish();
            Some(Err(e))
         }
      }
   }
}

impl FusedIterator for Rows<'_> {}

impl Drop for Rows<'_> {
   fn drop(&mut self) {
      if !self.done {
         trace!(sql = %self.statement.sql, "Row iterator dropped early; resetting statement");
         self.statement.reset();
      }
   }
}
