//! Differential tests: queries in the shared SQL subset must return the same
//! rows here as in SQLite.

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use sqlframe::{Session, Table, Value};

fn t_rows() -> Vec<Vec<Value>> {
    let row = |a: i64, b: Option<i64>, g: Option<&str>| {
        vec![Value::Integer(a), Value::from(b), Value::from(g)]
    };
    vec![
        row(1, Some(10), Some("x")),
        row(2, Some(20), Some("y")),
        row(3, Some(30), Some("x")),
        row(4, None, Some("y")),
        row(5, Some(50), None),
    ]
}

fn u_rows() -> Vec<Vec<Value>> {
    [(1, "one"), (3, "three"), (3, "tres"), (6, "six")]
        .into_iter()
        .map(|(a, c)| vec![Value::Integer(a), Value::from(c)])
        .collect()
}

fn sqlframe_session() -> Session {
    let mut session = Session::new();
    session.register_table("t", Table::from_rows(&["a", "b", "g"], t_rows()).unwrap());
    session.register_table("u", Table::from_rows(&["a", "c"], u_rows()).unwrap());
    session
}

fn to_sql(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(v) => rusqlite::types::Value::Integer(*v),
        Value::Real(v) => rusqlite::types::Value::Real(*v),
        Value::Text(v) => rusqlite::types::Value::Text(v.clone()),
    }
}

fn sqlite_connection() -> Connection {
    let conn = Connection::open_in_memory().expect("create sqlite");
    conn.execute_batch("CREATE TABLE t(a INTEGER, b INTEGER, g TEXT); CREATE TABLE u(a INTEGER, c TEXT);")
        .expect("create tables");
    for row in t_rows() {
        let params: Vec<_> = row.iter().map(to_sql).collect();
        conn.execute(
            "INSERT INTO t VALUES (?1, ?2, ?3)",
            rusqlite::params_from_iter(params),
        )
        .expect("insert t");
    }
    for row in u_rows() {
        let params: Vec<_> = row.iter().map(to_sql).collect();
        conn.execute("INSERT INTO u VALUES (?1, ?2)", rusqlite::params_from_iter(params))
            .expect("insert u");
    }
    conn
}

fn sqlite_rows(conn: &Connection, sql: &str) -> Vec<Vec<Value>> {
    let mut stmt = conn.prepare(sql).expect("prepare");
    let columns = stmt.column_count();
    let mut rows = stmt.query([]).expect("query");
    let mut out = Vec::new();
    while let Some(row) = rows.next().expect("row") {
        let values = (0..columns)
            .map(|i| match row.get_ref(i).expect("value") {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(v) => Value::Integer(v),
                ValueRef::Real(v) => Value::Real(v),
                ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
                ValueRef::Blob(_) => Value::Null,
            })
            .collect();
        out.push(values);
    }
    out
}

fn sqlframe_rows(session: &mut Session, sql: &str) -> Vec<Vec<Value>> {
    session
        .execute(sql)
        .unwrap_or_else(|e| panic!("{} failed: {}", sql, e));
    session.fetch_result().expect("result").rows()
}

fn assert_same_rows(sql: &str) {
    let conn = sqlite_connection();
    let mut session = sqlframe_session();
    assert_eq!(
        sqlframe_rows(&mut session, sql),
        sqlite_rows(&conn, sql),
        "{}",
        sql
    );
}

#[test]
fn filter_matches_sqlite() {
    assert_same_rows("SELECT t.a, t.b FROM t WHERE t.b > 15 ORDER BY t.a");
    assert_same_rows("SELECT t.a FROM t WHERE t.b > 10 AND t.g = 'x' OR t.a = 5 ORDER BY t.a");
    assert_same_rows("SELECT t.a FROM t WHERE t.g <> 'x' ORDER BY t.a DESC");
}

#[test]
fn arithmetic_matches_sqlite() {
    assert_same_rows("SELECT t.a, t.b * 2 + 1 AS x FROM t ORDER BY t.a");
    assert_same_rows("SELECT t.a, t.b / 3 AS q, t.b % 7 AS m FROM t ORDER BY t.a");
    assert_same_rows("SELECT t.a, t.b / 0 AS z FROM t ORDER BY t.a");
    assert_same_rows("SELECT t.a, t.b / 4.0 AS r FROM t ORDER BY t.a");
}

#[test]
fn ordering_matches_sqlite() {
    assert_same_rows("SELECT t.a, t.b FROM t ORDER BY t.b DESC, t.a");
    assert_same_rows("SELECT t.a, t.g FROM t ORDER BY t.g, t.a DESC");
}

#[test]
fn grouping_matches_sqlite() {
    assert_same_rows(
        "SELECT t.g, SUM(t.b), COUNT(t.b), MIN(t.b), MAX(t.b) FROM t GROUP BY t.g ORDER BY t.g",
    );
    assert_same_rows("SELECT AVG(t.b) FROM t");
    assert_same_rows("SELECT COUNT(t.a), SUM(t.b) FROM t WHERE t.a > 100");
}

#[test]
fn joins_match_sqlite() {
    assert_same_rows("SELECT t.a, u.c FROM t JOIN u ON t.a = u.a ORDER BY t.a, u.c");
    assert_same_rows("SELECT t.a, u.c FROM t LEFT JOIN u ON t.a = u.a ORDER BY t.a, u.c");
    assert_same_rows("SELECT u.a, t.b FROM t RIGHT JOIN u ON t.a = u.a ORDER BY u.a, u.c");
    assert_same_rows("SELECT t.a, u.a FROM t FULL OUTER JOIN u ON t.a = u.a ORDER BY t.a, u.a");
}

#[test]
fn case_matches_sqlite() {
    assert_same_rows(
        "SELECT t.a, CASE WHEN t.b >= 30 THEN 'high' WHEN t.b >= 20 THEN 'mid' ELSE 'low' END AS lvl FROM t ORDER BY t.a",
    );
    assert_same_rows("SELECT t.a, CASE WHEN t.g = 'x' THEN t.b END AS xb FROM t ORDER BY t.a");
}

#[test]
fn sub_queries_match_sqlite() {
    assert_same_rows(
        "SELECT s.a FROM (SELECT t.a, t.b FROM t WHERE t.b > 10) AS s WHERE s.b < 50 ORDER BY s.a DESC",
    );
    assert_same_rows(
        "SELECT t.a, v.c FROM t JOIN (SELECT u.a, u.c FROM u WHERE u.a > 1) AS v ON t.a = v.a ORDER BY v.c",
    );
}

#[test]
fn literals_match_sqlite() {
    assert_same_rows("SELECT t.a, 'k' AS tag, 2.5 AS r FROM t WHERE t.a < 3 ORDER BY t.a");
}

#[test]
fn both_reject_unknown_names() {
    let conn = sqlite_connection();
    let mut session = sqlframe_session();
    for sql in ["SELECT t.zz FROM t", "SELECT m.a FROM missing AS m"] {
        assert!(conn.prepare(sql).is_err(), "sqlite accepted {}", sql);
        assert!(session.execute(sql).is_err(), "sqlframe accepted {}", sql);
    }
}
