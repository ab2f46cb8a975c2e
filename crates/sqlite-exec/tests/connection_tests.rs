//! Integration tests for query routing, streaming and the statement cache.

use serde_json::json;
use sqlite_exec::{
   CompiledQuery, Connection, ConnectionOptions, Database, Error, QueryKind, QueryResult, Row, WriteQueryResult,
};
use tempfile::NamedTempFile;

fn setup_conn(options: ConnectionOptions) -> Connection {
   let mut conn = Connection::with_options(Database::open_in_memory().unwrap(), options);
   conn
      .execute(&CompiledQuery::raw("CREATE TABLE t (id INTEGER PRIMARY KEY, v INTEGER)"))
      .unwrap();
   conn
}

fn insert(conn: &mut Connection, v: i64) -> WriteQueryResult {
   let query = CompiledQuery::new("INSERT INTO t (v) VALUES (?)", vec![json!(v)], QueryKind::Insert);
   conn.execute(&query).unwrap().write_result().unwrap()
}

fn row(v: i64) -> Row {
   let mut row = Row::new();
   row.insert("v".into(), json!(v));
   row
}

#[test]
fn test_insert_then_stream_from_file_database() {
   let temp_file = NamedTempFile::new().unwrap();
   let mut conn = Connection::new(Database::open(temp_file.path()).unwrap());

   conn
      .execute(&CompiledQuery::raw("CREATE TABLE t (v INTEGER)"))
      .unwrap();

   let written = insert(&mut conn, 5);
   assert_eq!(
      written,
      WriteQueryResult {
         rows_affected: 1,
         last_insert_id: 1,
      }
   );

   let chunks: Vec<_> = conn
      .stream(&CompiledQuery::select("SELECT v FROM t", vec![]))
      .unwrap()
      .map(|chunk| chunk.unwrap())
      .collect::<Vec<_>>();
   assert_eq!(chunks, vec![QueryResult::Rows(vec![row(5)])]);

   conn.close().unwrap();
}

#[test]
fn test_execute_routes_on_read_only_classification() {
   let mut conn = setup_conn(ConnectionOptions::default());
   insert(&mut conn, 1);

   // Declared kind is ignored: a select labelled as raw still returns rows
   let result = conn
      .execute(&CompiledQuery::new("SELECT v FROM t", vec![], QueryKind::Raw))
      .unwrap();
   assert_eq!(result, QueryResult::Rows(vec![row(1)]));

   let result = conn
      .execute(&CompiledQuery::new("UPDATE t SET v = v + 1", vec![], QueryKind::Select))
      .unwrap();
   assert_eq!(result.write_result().map(|w| w.rows_affected), Some(1));
}

#[test]
fn test_rows_affected_does_not_accumulate() {
   let mut conn = setup_conn(ConnectionOptions::default());
   insert(&mut conn, 1);
   insert(&mut conn, 2);

   let delete = CompiledQuery::new("DELETE FROM t WHERE v = ?", vec![json!(1)], QueryKind::Delete);
   assert_eq!(conn.execute(&delete).unwrap().write_result().unwrap().rows_affected, 1);
   assert_eq!(conn.execute(&delete).unwrap().write_result().unwrap().rows_affected, 0);

   // No insert happened, so the last rowid is unchanged
   assert_eq!(conn.execute(&delete).unwrap().write_result().unwrap().last_insert_id, 2);
}

#[test]
fn test_stream_rejects_non_select() {
   let mut conn = setup_conn(ConnectionOptions::default());

   for kind in [QueryKind::Raw, QueryKind::Insert, QueryKind::Update, QueryKind::Delete] {
      let query = CompiledQuery::new("SELECT v FROM t", vec![], kind);
      assert!(matches!(
         conn.stream(&query),
         Err(Error::StreamingUnsupported(k)) if k == kind
      ));
   }

   // Nothing was prepared for the rejected queries
   assert_eq!(conn.cached_statements(), 1);
}

#[tokio::test]
async fn test_stream_as_futures_stream() {
   let mut conn = setup_conn(ConnectionOptions::default());
   for v in 1..=3 {
      insert(&mut conn, v);
   }

   let query = CompiledQuery::select("SELECT v FROM t WHERE v >= ? ORDER BY v", vec![json!(2)]);
   let mut stream = conn.stream(&query).unwrap();

   // Both Iterator and Stream are implemented, so call the Stream method by path
   let mut seen = Vec::new();
   while let Some(chunk) = futures::StreamExt::next(&mut stream).await {
      let rows = chunk.unwrap().into_rows();
      assert_eq!(rows.len(), 1);
      seen.push(rows[0]["v"].clone());
   }
   assert_eq!(seen, vec![json!(2), json!(3)]);
}

#[test]
fn test_abandoned_stream_releases_statement() {
   let mut conn = setup_conn(ConnectionOptions::default());
   insert(&mut conn, 1);
   insert(&mut conn, 2);

   {
      let mut stream = conn
         .stream(&CompiledQuery::select("SELECT v FROM t", vec![]))
         .unwrap();
      assert!(stream.next().is_some());
   }

   // An active read would make this fail with SQLITE_LOCKED
   conn.execute(&CompiledQuery::raw("DROP TABLE t")).unwrap();
}

#[test]
fn test_cache_bounded_and_evictions_finalized() {
   let mut conn = Connection::new(Database::open_in_memory().unwrap());

   for i in 0..200 {
      let result = conn
         .execute(&CompiledQuery::select(format!("SELECT {i} AS n"), vec![]))
         .unwrap();
      assert_eq!(result.rows()[0]["n"], json!(i));
      assert!(conn.cached_statements() <= 128);
      assert_eq!(conn.finalized_statements(), conn.statement_evictions());
   }

   assert_eq!(conn.cached_statements(), 128);
   assert_eq!(conn.statement_evictions(), 72);
   assert_eq!(conn.finalized_statements(), 72);
}

#[test]
fn test_repeated_sql_reuses_statement() {
   let mut conn = setup_conn(ConnectionOptions::default().with_statement_cache_capacity(2));

   for v in 0..10 {
      insert(&mut conn, v);
   }

   // CREATE TABLE plus INSERT
   assert_eq!(conn.cached_statements(), 2);
   assert_eq!(conn.statement_evictions(), 0);
}

#[test]
fn test_hash_collision_returns_correct_rows() {
   let mut conn = Connection::with_options(
      Database::open_in_memory().unwrap(),
      ConnectionOptions::default().with_key_hasher(|_| 0),
   );

   let one = CompiledQuery::select("SELECT 1 AS n", vec![]);
   let two = CompiledQuery::select("SELECT 2 AS n", vec![]);

   assert_eq!(conn.execute(&one).unwrap().rows()[0]["n"], json!(1));
   assert_eq!(conn.execute(&two).unwrap().rows()[0]["n"], json!(2));
   assert_eq!(conn.execute(&one).unwrap().rows()[0]["n"], json!(1));

   assert_eq!(conn.cached_statements(), 1);
   assert_eq!(conn.statement_evictions(), 2);
   assert_eq!(conn.finalized_statements(), 2);
}

#[test]
fn test_row_ceiling() {
   let mut conn = setup_conn(ConnectionOptions::default().with_max_result_rows(2));
   for v in 0..3 {
      insert(&mut conn, v);
   }

   let all = CompiledQuery::select("SELECT v FROM t", vec![]);
   assert_eq!(conn.execute(&all), Err(Error::TooManyRows(2)));

   let two = CompiledQuery::select("SELECT v FROM t WHERE v < ?", vec![json!(2)]);
   assert_eq!(conn.execute(&two).unwrap().rows().len(), 2);
}

#[test]
fn test_transaction_rollback_discards_writes() {
   let mut conn = setup_conn(ConnectionOptions::default());

   conn.begin().unwrap();
   assert!(!conn.is_autocommit());
   insert(&mut conn, 1);
   conn.rollback().unwrap();
   assert!(conn.is_autocommit());

   let count = conn
      .execute(&CompiledQuery::select("SELECT COUNT(*) AS c FROM t", vec![]))
      .unwrap();
   assert_eq!(count.rows()[0]["c"], json!(0));

   conn.begin().unwrap();
   insert(&mut conn, 2);
   conn.commit().unwrap();

   let count = conn
      .execute(&CompiledQuery::select("SELECT COUNT(*) AS c FROM t", vec![]))
      .unwrap();
   assert_eq!(count.rows()[0]["c"], json!(1));
}

#[test]
fn test_failed_prepare_is_not_cached() {
   let mut conn = setup_conn(ConnectionOptions::default());
   let before = conn.cached_statements();

   let err = conn
      .execute(&CompiledQuery::raw("SELECT * FROM missing_table"))
      .unwrap_err();
   assert!(err.sqlite_code().is_some());
   assert_eq!(conn.cached_statements(), before);
}

#[test]
fn test_close_finalizes_cached_statements() {
   let temp_file = NamedTempFile::new().unwrap();
   let path = temp_file.path().to_path_buf();

   let mut conn = Connection::new(Database::open(&path).unwrap());
   conn
      .execute(&CompiledQuery::raw("CREATE TABLE t (v INTEGER)"))
      .unwrap();
   insert_plain(&mut conn);
   conn.close().unwrap();

   // Data was persisted and the file can be reopened
   let mut conn = Connection::new(Database::open(&path).unwrap());
   let rows = conn
      .execute(&CompiledQuery::select("SELECT v FROM t", vec![]))
      .unwrap()
      .into_rows();
   assert_eq!(rows, vec![row(7)]);
}

fn insert_plain(conn: &mut Connection) {
   conn
      .execute(&CompiledQuery::raw("INSERT INTO t (v) VALUES (7)"))
      .unwrap();
}
