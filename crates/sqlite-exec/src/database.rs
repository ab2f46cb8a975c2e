//! Owned SQLite database handle

use std::ffi::{CString, c_int};
use std::mem::ManuallyDrop;
use std::path::Path;
use std::ptr::{self, NonNull};

use tracing::{debug, warn};

use crate::error::{Error, Result};

// libsqlite3-sys blocklists the `sqlite3_close_v2` binding, but the symbol is
// part of the linked SQLite library, so declare it here.
mod ffi {
   pub use libsqlite3_sys::*;

   unsafe extern "C" {
      pub fn sqlite3_close_v2(db: *mut sqlite3) -> std::ffi::c_int;
   }
}

const MEMORY_PATH: &str = ":memory:";

/// An open SQLite database handle.
///
/// The handle is opened in multi-thread mode (`SQLITE_OPEN_NOMUTEX`): SQLite does
/// no locking of its own, so the handle must never be used from two threads at
/// once. Callers serialize access through the connection gate.
#[derive(Debug)]
pub struct Database {
   handle: NonNull<ffi::sqlite3>,
   path: String,
}

// SAFETY: SQLite handles opened in multi-thread mode may move between threads
// as long as they are not used concurrently, which `&mut` access and the
// connection gate guarantee.
unsafe impl Send for Database {}

impl Database {
   /// Open (creating if needed) a read-write database at `path`.
   pub fn open(path: impl AsRef<Path>) -> Result<Self> {
      let path = path.as_ref().to_string_lossy().into_owned();
      Self::open_with_flags(
         &path,
         ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_URI,
      )
   }

   /// Open an existing database at `path` without write access.
   pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
      let path = path.as_ref().to_string_lossy().into_owned();
      Self::open_with_flags(&path, ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_URI)
   }

   /// Open a private, in-memory database.
   pub fn open_in_memory() -> Result<Self> {
      Self::open_with_flags(MEMORY_PATH, ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE)
   }

   fn open_with_flags(path: &str, flags: c_int) -> Result<Self> {
      let c_path = CString::new(path).map_err(|_| Error::InvalidPath(path.to_string()))?;
      let mut db = ptr::null_mut();

      let rc = unsafe {
         ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags | ffi::SQLITE_OPEN_NOMUTEX, ptr::null())
      };

      if rc != ffi::SQLITE_OK {
         // SAFETY: db is either null or a handle that must still be closed
         let (code, message) = match unsafe { Error::from_handle(db, rc) } {
            Error::Sqlite { code, message } => (code, message),
            other => (rc, other.to_string()),
         };
         if !db.is_null() {
            unsafe { ffi::sqlite3_close(db) };
         }
         return Err(Error::OpenFailed {
            path: path.to_string(),
            code,
            message,
         });
      }

      let handle = NonNull::new(db).ok_or_else(|| Error::OpenFailed {
         path: path.to_string(),
         code: ffi::SQLITE_NOMEM,
         message: "sqlite3_open_v2 returned no handle".into(),
      })?;

      unsafe { ffi::sqlite3_extended_result_codes(handle.as_ptr(), 1) };

      debug!(path = %path, "Opened SQLite database");
      Ok(Self {
         handle,
         path: path.to_string(),
      })
   }

   /// Path this database was opened with (`:memory:` for in-memory databases)
   pub fn path(&self) -> &str {
      &self.path
   }

   /// Cumulative number of rows modified since the handle was opened.
   pub fn total_changes(&self) -> i64 {
      unsafe { ffi::sqlite3_total_changes64(self.handle.as_ptr()) }
   }

   /// Rowid of the most recent successful INSERT on this handle.
   pub fn last_insert_rowid(&self) -> i64 {
      unsafe { ffi::sqlite3_last_insert_rowid(self.handle.as_ptr()) }
   }

   /// Returns false while an explicit transaction is open.
   pub fn is_autocommit(&self) -> bool {
      unsafe { ffi::sqlite3_get_autocommit(self.handle.as_ptr()) != 0 }
   }

   pub(crate) fn as_ptr(&self) -> *mut ffi::sqlite3 {
      self.handle.as_ptr()
   }

   /// Close the handle, reporting any failure.
   ///
   /// Statements still alive keep the handle as a zombie until they are
   /// finalized (`sqlite3_close_v2` semantics).
   pub fn close(self) -> Result<()> {
      let mut this = ManuallyDrop::new(self);
      let path = std::mem::take(&mut this.path);
      let rc = unsafe { ffi::sqlite3_close_v2(this.handle.as_ptr()) };
      if rc != ffi::SQLITE_OK {
         return Err(unsafe { Error::from_handle(this.handle.as_ptr(), rc) });
      }

      debug!(path = %path, "Closed SQLite database");
      Ok(())
   }
}

impl Drop for Database {
   fn drop(&mut self) {
      let rc = unsafe { ffi::sqlite3_close_v2(self.handle.as_ptr()) };
      if rc != ffi::SQLITE_OK {
         warn!(path = %self.path, rc, "Failed to close SQLite database on drop");
      }
   }
}
