use sqlframe::expr::{BinaryOperator, Expr};
use sqlframe::parser::parse;
use sqlframe::plan::{Alias, Clause, ColumnRef, Computation, Projection, SUBQUERY_PREFIX};
use sqlframe::table::JoinKind;
use sqlframe::{SqlError, Value};

fn parse_error(sql: &str) -> String {
    match parse(sql) {
        Err(SqlError::Parse(message)) => message,
        other => panic!("expected parse error for {}, got {:?}", sql, other),
    }
}

#[test]
fn select_from_where_shape() {
    let plan = parse("SELECT t.a, b FROM t WHERE t.b > 10").unwrap();
    assert_eq!(
        plan.select,
        Projection::Columns(vec![ColumnRef::new("t.a"), ColumnRef::new("b")])
    );
    assert_eq!(plan.from.table, "t");
    assert_eq!(plan.from.alias, "t");
    assert_eq!(
        plan.aliases,
        vec![Alias {
            name: "b".into(),
            source: None
        }]
    );
    assert_eq!(
        plan.selection,
        Some(Expr::binary(
            Expr::column("t.b"),
            BinaryOperator::Gt,
            Expr::Literal(Value::Integer(10))
        ))
    );
}

#[test]
fn wildcard_projection() {
    let plan = parse("select * from people p").unwrap();
    assert_eq!(plan.select, Projection::Wildcard);
    assert_eq!(plan.from.alias, "p");
}

#[test]
fn aliases_record_their_source() {
    let plan = parse("SELECT t.a AS x, SUM(t.b) AS total FROM t").unwrap();
    assert_eq!(
        plan.alias("x").and_then(|alias| alias.source.clone()),
        Some(ColumnRef::new("t.a"))
    );
    assert_eq!(
        plan.alias("total").and_then(|alias| alias.source.clone()),
        Some(ColumnRef::aggregated("t.b", "sum"))
    );
    assert_eq!(plan.functions.get("t.b"), Some(&vec!["sum".to_string()]));
}

#[test]
fn functions_are_collected_from_every_clause() {
    let plan = parse(
        "SELECT g, COUNT(v) FROM t GROUP BY g \
         ORDER BY CASE WHEN MAX(v) > 3 THEN 1 ELSE 0 END",
    )
    .unwrap();
    assert_eq!(
        plan.functions.get("v"),
        Some(&vec!["count".to_string(), "max".to_string()])
    );
    assert!(plan.has_aggregates());
    assert_eq!(plan.cases(Clause::OrderBy).count(), 1);
}

#[test]
fn joins_keep_written_key_order() {
    let plan = parse(
        "SELECT a.x FROM a LEFT OUTER JOIN b ON b.id = a.id \
         RIGHT JOIN c AS cc ON a.id = cc.id JOIN d ON a.id == d.id",
    )
    .unwrap();
    let joins: Vec<_> = plan
        .joins
        .iter()
        .map(|join| {
            (
                join.kind,
                join.alias.as_str(),
                join.left_key.as_str(),
                join.right_key.as_str(),
            )
        })
        .collect();
    assert_eq!(
        joins,
        vec![
            (JoinKind::Left, "b", "b.id", "a.id"),
            (JoinKind::Right, "cc", "a.id", "cc.id"),
            (JoinKind::Inner, "d", "a.id", "d.id"),
        ]
    );
}

#[test]
fn sub_queries_get_placeholders() {
    let plan = parse(
        "SELECT s.a FROM (SELECT t.a FROM t) AS s \
         JOIN (SELECT u.a FROM u) v ON s.a = v.a",
    )
    .unwrap();
    let placeholders: Vec<_> = plan
        .nested_queries
        .iter()
        .map(|nested| nested.placeholder.as_str())
        .collect();
    assert_eq!(
        placeholders,
        vec![
            format!("{}1_s", SUBQUERY_PREFIX),
            format!("{}2_v", SUBQUERY_PREFIX)
        ]
    );
    assert_eq!(plan.from.table, placeholders[0]);
    assert_eq!(plan.from.alias, "s");
    assert_eq!(plan.joins[0].table, placeholders[1]);
    assert_eq!(plan.nested_queries[0].plan.from.table, "t");
}

#[test]
fn operations_are_named_after_their_expression() {
    let plan = parse("SELECT (t.a + t.b) * 2, t.a - 1 AS d FROM t").unwrap();
    let targets: Vec<_> = plan
        .operations(Clause::Select)
        .map(|operation| operation.target.as_str())
        .collect();
    assert_eq!(targets, vec!["(t.a+t.b)*2", "d"]);
    assert_eq!(
        plan.select,
        Projection::Columns(vec![ColumnRef::new("(t.a+t.b)*2"), ColumnRef::new("d")])
    );
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let plan = parse("SELECT t.a + t.b * t.c - 1 AS x FROM t").unwrap();
    let operation = plan.operations(Clause::Select).next().unwrap();
    let expected = Expr::binary(
        Expr::binary(
            Expr::column("t.a"),
            BinaryOperator::Plus,
            Expr::binary(
                Expr::column("t.b"),
                BinaryOperator::Multiply,
                Expr::column("t.c"),
            ),
        ),
        BinaryOperator::Minus,
        Expr::Literal(Value::Integer(1)),
    );
    assert_eq!(operation.expr, expected);
}

#[test]
fn operations_are_recorded_for_their_clause() {
    let plan = parse("SELECT t.a FROM t GROUP BY t.a % 2 ORDER BY t.b * -1").unwrap();
    assert_eq!(plan.group_by, vec!["t.a%2".to_string()]);
    assert_eq!(plan.operations(Clause::GroupBy).count(), 1);
    assert_eq!(plan.operations(Clause::OrderBy).count(), 1);
    assert_eq!(plan.order_by[0].column, ColumnRef::new("t.b*-1"));
}

#[test]
fn case_branches_keep_declared_order() {
    let plan = parse(
        "SELECT CASE WHEN t.a > 1 THEN 'big' WHEN t.a > 0 THEN 'small' ELSE 'none' END AS size FROM t",
    )
    .unwrap();
    let case = plan.cases(Clause::Select).next().unwrap();
    assert_eq!(case.target, "size");
    let values: Vec<_> = case.branches.iter().map(|b| b.value.clone()).collect();
    assert_eq!(
        values,
        vec![
            Expr::Literal(Value::Text("big".into())),
            Expr::Literal(Value::Text("small".into()))
        ]
    );
    assert_eq!(case.else_value, Some(Expr::Literal(Value::Text("none".into()))));
}

#[test]
fn nested_case_is_computed_before_its_parent() {
    let plan = parse(
        "SELECT CASE WHEN t.a > 0 THEN CASE WHEN t.b > 0 THEN 1 ELSE 2 END ELSE 3 END FROM t",
    )
    .unwrap();
    let targets: Vec<_> = plan
        .computations
        .get(Clause::Select)
        .iter()
        .map(Computation::target)
        .collect();
    assert_eq!(targets, vec!["case1", "case2"]);
    let outer = plan.cases(Clause::Select).nth(1).unwrap();
    assert_eq!(outer.branches[0].value, Expr::column("case1"));
}

#[test]
fn order_by_directions() {
    let plan = parse("SELECT t.a FROM t ORDER BY t.a DESC, t.b ASC, t.c").unwrap();
    let directions: Vec<_> = plan.order_by.iter().map(|item| item.descending).collect();
    assert_eq!(directions, vec![true, false, false]);
}

#[test]
fn into_target() {
    let plan = parse("SELECT t.a FROM t INTO saved;").unwrap();
    assert_eq!(plan.into.as_deref(), Some("saved"));
}

#[test]
fn conditions_group_and_before_or() {
    let plan = parse("SELECT t.a FROM t WHERE t.a = 1 OR t.b = 2 AND t.c = 3").unwrap();
    match plan.selection {
        Some(Expr::BinaryOp { op, right, .. }) => {
            assert_eq!(op, BinaryOperator::Or);
            assert!(matches!(*right, Expr::BinaryOp { op: BinaryOperator::And, .. }));
        }
        other => panic!("unexpected condition {:?}", other),
    }
}

#[test]
fn duplicate_names_are_rejected() {
    assert!(parse_error("SELECT t.a AS x, t.b AS x FROM t").contains("duplicate"));
    assert!(parse_error("SELECT t.a FROM t WHERE t.a > 1 WHERE t.b > 1").contains("duplicate"));
}

#[test]
fn malformed_statements() {
    parse_error("SELECT t.a");
    parse_error("FROM t SELECT t.a");
    parse_error("SELECT t.a FROM t WHERE t.a");
    parse_error("SELECT t.a FROM t WHERE t.a > 1 > 2");
    parse_error("SELECT t.a FROM (SELECT t.a FROM t)");
    parse_error("SELECT t.a FROM t JOIN u ON t.a > u.a");
    parse_error("SELECT t.a FROM t JOIN u");
    parse_error("SELECT CASE t.a WHEN 1 THEN 2 END FROM t");
    parse_error("SELECT CASE WHEN t.a > 1 THEN 2 FROM t");
    parse_error("SELECT t.a, * FROM t");
    parse_error("SELECT (t.a FROM t");
    parse_error("SELECT 'open FROM t");
    parse_error("SELECT t.a FROM t GROUP BY SUM(t.a)");
    parse_error("SELECT t.a FROM t INTO a b");
    parse_error("SELECT t.a FROM t WHERE t.a > (SELECT u.a FROM u)");
}
