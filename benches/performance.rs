//! Criterion benchmarks for parsing and query execution.
//!
//! Run with: `cargo bench --bench performance`
//!
//! Results are saved to `target/criterion/` with HTML reports.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sqlframe::parser::parse;
use sqlframe::{Session, Table, Value};

fn numbers(size: i64) -> Table {
    let rows = (0..size)
        .map(|i| {
            vec![
                Value::Integer(i),
                Value::Integer(i % 100),
                Value::Text(format!("g{}", i % 10)),
            ]
        })
        .collect();
    Table::from_rows(&["id", "val", "grp"], rows).unwrap()
}

fn session(size: i64) -> Session {
    let mut session = Session::new();
    session.register_table("t1", numbers(size));
    session.register_table("t2", numbers(size / 10));
    session
}

fn bench_parse(c: &mut Criterion) {
    let sql = "SELECT a.grp, SUM(a.val) AS total, \
               CASE WHEN a.val > 50 THEN 'high' WHEN a.val > 10 THEN 'mid' ELSE 'low' END AS band \
               FROM (SELECT t.id, t.val, t.grp FROM t1 AS t WHERE t.val >= 5) AS a \
               LEFT JOIN t2 AS b ON a.id = b.id \
               WHERE (a.val * 2 + 1) > 7 GROUP BY a.grp ORDER BY total DESC";
    c.bench_function("parse_complex_select", |b| {
        b.iter(|| parse(black_box(sql)).unwrap());
    });
}

fn bench_select_where(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_where");
    for size in [1_000i64, 10_000, 100_000] {
        let mut db = session(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                db.execute(black_box("SELECT t1.id FROM t1 WHERE t1.val = 50"))
                    .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_group_by(c: &mut Criterion) {
    let mut db = session(10_000);
    c.bench_function("group_by_sum", |b| {
        b.iter(|| {
            db.execute(black_box(
                "SELECT t1.grp, SUM(t1.val), COUNT(t1.id) FROM t1 GROUP BY t1.grp",
            ))
            .unwrap();
        });
    });
}

fn bench_join(c: &mut Criterion) {
    let mut db = session(10_000);
    c.bench_function("inner_join", |b| {
        b.iter(|| {
            db.execute(black_box(
                "SELECT t1.id, t2.val FROM t1 JOIN t2 ON t1.id = t2.id",
            ))
            .unwrap();
        });
    });
}

fn bench_order_by(c: &mut Criterion) {
    let mut db = session(10_000);
    c.bench_function("order_by_desc", |b| {
        b.iter(|| {
            db.execute(black_box("SELECT t1.id FROM t1 ORDER BY t1.val DESC, t1.id"))
                .unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_select_where,
    bench_group_by,
    bench_join,
    bench_order_by
);
criterion_main!(benches);
