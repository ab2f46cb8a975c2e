//! Conversions between JSON values and SQLite storage classes.
//!
//! Parameters are bound from [`serde_json::Value`] and result rows are decoded
//! into an ordered map of column name to JSON value.

use std::ffi::c_int;
use std::slice;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use libsqlite3_sys as ffi;
use serde_json::{Number, Value as JsonValue};

use crate::error::cstr_to_string;

/// One result row, keyed by column name in select-list order.
///
/// Columns sharing a name collapse into one key: the last value wins, kept at
/// the position of the first. Alias columns to keep every value.
pub type Row = IndexMap<String, JsonValue>;

/// Binds `value` to the 1-based parameter `index`, returning SQLite's result code.
///
/// - null binds NULL, booleans bind 0/1
/// - integers bind as INTEGER; a u64 above `i64::MAX` falls back to REAL
/// - other numbers bind as REAL
/// - arrays and objects bind as their JSON text
///
/// # Safety
///
/// `stmt` must be a valid, unfinalized statement handle.
pub(crate) unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &JsonValue) -> c_int {
   unsafe {
      match value {
         JsonValue::Null => ffi::sqlite3_bind_null(stmt, index),
         JsonValue::Bool(flag) => ffi::sqlite3_bind_int64(stmt, index, i64::from(*flag)),
         JsonValue::Number(number) => bind_number(stmt, index, number),
         JsonValue::String(text) => bind_text(stmt, index, text),
         other => bind_text(stmt, index, &other.to_string()),
      }
   }
}

unsafe fn bind_number(stmt: *mut ffi::sqlite3_stmt, index: c_int, number: &Number) -> c_int {
   unsafe {
      if let Some(int_val) = number.as_i64() {
         ffi::sqlite3_bind_int64(stmt, index, int_val)
      } else if let Some(uint_val) = number.as_u64() {
         // Too large for SQLite's INTEGER; keep the magnitude as REAL
         ffi::sqlite3_bind_double(stmt, index, uint_val as f64)
      } else {
         ffi::sqlite3_bind_double(stmt, index, number.as_f64().unwrap_or_default())
      }
   }
}

unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
   let Ok(len) = c_int::try_from(text.len()) else {
      return ffi::SQLITE_TOOBIG;
   };
   unsafe { ffi::sqlite3_bind_text(stmt, index, text.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT()) }
}

/// Decodes the current row of a statement that just returned `SQLITE_ROW`.
///
/// # Safety
///
/// `stmt` must be a valid statement positioned on a row.
pub(crate) unsafe fn read_row(stmt: *mut ffi::sqlite3_stmt) -> Row {
   unsafe {
      let count = ffi::sqlite3_column_count(stmt);
      let mut row = Row::with_capacity(usize::try_from(count).unwrap_or_default());
      for i in 0..count {
         let name = cstr_to_string(ffi::sqlite3_column_name(stmt, i)).unwrap_or_else(|| format!("column{i}"));
         row.insert(name, column_value(stmt, i));
      }
      row
   }
}

/// Decodes one column of the current row.
///
/// INTEGER keeps full i64 precision, REAL becomes a JSON number (null for NaN
/// and infinities), TEXT a string, BLOB a base64 string.
unsafe fn column_value(stmt: *mut ffi::sqlite3_stmt, i: c_int) -> JsonValue {
   unsafe {
      match ffi::sqlite3_column_type(stmt, i) {
         ffi::SQLITE_INTEGER => JsonValue::from(ffi::sqlite3_column_int64(stmt, i)),
         ffi::SQLITE_FLOAT => Number::from_f64(ffi::sqlite3_column_double(stmt, i))
            .map_or(JsonValue::Null, JsonValue::Number),
         ffi::SQLITE_TEXT => {
            // column_text must be called before column_bytes
            let ptr = ffi::sqlite3_column_text(stmt, i);
            let bytes = column_bytes(stmt, i, ptr.cast());
            JsonValue::String(String::from_utf8_lossy(bytes).into_owned())
         }
         ffi::SQLITE_BLOB => {
            let ptr = ffi::sqlite3_column_blob(stmt, i);
            let bytes = column_bytes(stmt, i, ptr.cast());
            JsonValue::String(STANDARD.encode(bytes))
         }
         _ => JsonValue::Null,
      }
   }
}

unsafe fn column_bytes<'a>(stmt: *mut ffi::sqlite3_stmt, i: c_int, ptr: *const u8) -> &'a [u8] {
   let len = usize::try_from(unsafe { ffi::sqlite3_column_bytes(stmt, i) }).unwrap_or_default();
   if ptr.is_null() || len == 0 {
      return &[];
   }
   unsafe { slice::from_raw_parts(ptr, len) }
}
