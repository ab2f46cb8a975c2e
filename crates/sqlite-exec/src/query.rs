//! Compiled query input and query result output types

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::value::Row;

/// Kind of statement a compiled query was built from.
///
/// Informational for [`Connection::execute`](crate::Connection::execute), which
/// routes on SQLite's own read-only classification, but authoritative for
/// [`Connection::stream`](crate::Connection::stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
   Select,
   Insert,
   Update,
   Delete,
   /// Raw SQL with no known shape (DDL, pragmas, transaction control)
   #[default]
   Raw,
}

impl QueryKind {
   pub fn is_select(self) -> bool {
      matches!(self, QueryKind::Select)
   }
}

/// Parameterized SQL produced by a query compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
   pub sql: String,
   #[serde(default)]
   pub parameters: Vec<JsonValue>,
   #[serde(default)]
   pub kind: QueryKind,
}

impl CompiledQuery {
   pub fn new(sql: impl Into<String>, parameters: Vec<JsonValue>, kind: QueryKind) -> Self {
      Self {
         sql: sql.into(),
         parameters,
         kind,
      }
   }

   /// Raw SQL without parameters, e.g. `BEGIN`
   pub fn raw(sql: impl Into<String>) -> Self {
      Self::new(sql, Vec::new(), QueryKind::Raw)
   }

   pub fn select(sql: impl Into<String>, parameters: Vec<JsonValue>) -> Self {
      Self::new(sql, parameters, QueryKind::Select)
   }
}

/// Result returned from write operations (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteQueryResult {
   /// Rows changed by this statement alone.
   ///
   /// Measured as the difference of the connection's cumulative change counter
   /// around the step, so it counts trigger changes too.
   pub rows_affected: i64,
   /// The last inserted row ID (SQLite ROWID).
   ///
   /// Reports the connection's most recent insert, so it is unchanged by
   /// statements that insert nothing. Tables created with `WITHOUT ROWID` never
   /// set it.
   pub last_insert_id: i64,
}

/// Outcome of executing one compiled query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryResult {
   /// Rows produced by a read-only statement
   Rows(Vec<Row>),
   /// Change count of a mutating statement
   Write(WriteQueryResult),
}

impl QueryResult {
   /// Rows of a read result; empty for writes.
   pub fn rows(&self) -> &[Row] {
      match self {
         QueryResult::Rows(rows) => rows,
         QueryResult::Write(_) => &[],
      }
   }

   pub fn into_rows(self) -> Vec<Row> {
      match self {
         QueryResult::Rows(rows) => rows,
         QueryResult::Write(_) => Vec::new(),
      }
   }

   pub fn write_result(&self) -> Option<WriteQueryResult> {
      match self {
         QueryResult::Write(result) => Some(*result),
         QueryResult::Rows(_) => None,
      }
   }
}
