//! Query plans produced by the parser and replayed by the executor.
//!
//! A plan is plain data. Every clause of the statement has its own field, and
//! deferred computations (arithmetic operations and CASE expressions) are
//! stored per clause so the executor knows at which stage to materialize
//! them.
//!
//! # Examples
//! ```
//! use sqlframe::parser::parse;
//! use sqlframe::plan::{ColumnRef, Projection};
//!
//! let plan = parse("SELECT t.a FROM t WHERE t.b > 10").unwrap();
//! assert_eq!(plan.select, Projection::Columns(vec![ColumnRef::new("t.a")]));
//! assert_eq!(plan.from.table, "t");
//! ```

use crate::expr::Expr;
use crate::table::JoinKind;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Prefix of generated sub-query table names. The tokenizer never produces
/// an identifier starting with `#`, so placeholders cannot shadow real tables.
pub const SUBQUERY_PREFIX: &str = "#subquery";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A column as written in the statement, optionally wrapped in an aggregate.
pub struct ColumnRef {
    /// `alias.column` or a bare name.
    pub name: String,
    /// Lowercased aggregate function name, e.g. `sum`.
    pub function: Option<String>,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            function: None,
        }
    }

    pub fn aggregated(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            function: Some(function.into()),
        }
    }

    /// Name of the column this reference reads once grouping has run:
    /// `name_fn` for aggregates, `name` otherwise.
    pub fn output_name(&self) -> String {
        match &self.function {
            Some(function) => format!("{}_{}", self.name, function),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(function) => write!(f, "{}({})", function, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Clause sections of a statement.
pub enum Clause {
    Select,
    From,
    Where,
    GroupBy,
    OrderBy,
    Into,
}

impl Clause {
    /// Execution order, which differs from lexical order.
    pub const STAGES: [Clause; 5] = [
        Clause::From,
        Clause::Where,
        Clause::GroupBy,
        Clause::OrderBy,
        Clause::Select,
    ];
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Clause::Select => "SELECT",
            Clause::From => "FROM",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::OrderBy => "ORDER BY",
            Clause::Into => "INTO",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One list of `T` per clause section.
pub struct ClauseMap<T> {
    select: Vec<T>,
    from: Vec<T>,
    selection: Vec<T>,
    group_by: Vec<T>,
    order_by: Vec<T>,
    into: Vec<T>,
}

impl<T> Default for ClauseMap<T> {
    fn default() -> Self {
        Self {
            select: Vec::new(),
            from: Vec::new(),
            selection: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            into: Vec::new(),
        }
    }
}

impl<T> ClauseMap<T> {
    pub fn get(&self, clause: Clause) -> &[T] {
        match clause {
            Clause::Select => &self.select,
            Clause::From => &self.from,
            Clause::Where => &self.selection,
            Clause::GroupBy => &self.group_by,
            Clause::OrderBy => &self.order_by,
            Clause::Into => &self.into,
        }
    }

    pub fn push(&mut self, clause: Clause, item: T) {
        let slot = match clause {
            Clause::Select => &mut self.select,
            Clause::From => &mut self.from,
            Clause::Where => &mut self.selection,
            Clause::GroupBy => &mut self.group_by,
            Clause::OrderBy => &mut self.order_by,
            Clause::Into => &mut self.into,
        };
        slot.push(item);
    }

    /// All entries, in clause declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.select
            .iter()
            .chain(&self.from)
            .chain(&self.selection)
            .chain(&self.group_by)
            .chain(&self.order_by)
            .chain(&self.into)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `SELECT *`: keep every column of the current result.
    Wildcard,
    Columns(Vec<ColumnRef>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSource {
    /// Registry name, or a sub-query placeholder.
    pub table: String,
    /// Prefix given to every column of the table.
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
/// A JOIN entry. The keys keep their written order; which side each one
/// belongs to is settled at execution time.
pub struct Join {
    pub table: String,
    pub alias: String,
    pub kind: JoinKind,
    pub left_key: String,
    pub right_key: String,
}

#[derive(Debug, Clone, PartialEq)]
/// `source AS name`, or a bare SELECT identifier when `source` is `None`.
pub struct Alias {
    pub name: String,
    pub source: Option<ColumnRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub condition: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
/// A searched CASE expression materialized as the column `target`.
pub struct Case {
    pub target: String,
    /// In declared order. The first true branch wins.
    pub branches: Vec<CaseBranch>,
    pub else_value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
/// An arithmetic expression materialized as the column `target`.
pub struct Operation {
    pub target: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
/// A column computed before a clause runs.
pub enum Computation {
    Operation(Operation),
    Case(Case),
}

impl Computation {
    pub fn target(&self) -> &str {
        match self {
            Computation::Operation(operation) => &operation.target,
            Computation::Case(case) => &case.target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub column: ColumnRef,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
/// A constant projected as a column named `name`.
pub struct Literal {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedQuery {
    pub placeholder: String,
    pub plan: QueryPlan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub select: Projection,
    pub from: TableSource,
    pub joins: Vec<Join>,
    /// WHERE condition.
    pub selection: Option<Expr>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderByItem>,
    pub into: Option<String>,
    pub aliases: Vec<Alias>,
    pub literals: Vec<Literal>,
    /// Operations and CASE expressions, per clause, in the order they were
    /// parsed. Inner expressions always precede the expressions using them.
    pub computations: ClauseMap<Computation>,
    /// Every aggregate call in the statement: written column name to the
    /// function names applied to it.
    pub functions: BTreeMap<String, Vec<String>>,
    pub nested_queries: Vec<NestedQuery>,
}

impl QueryPlan {
    pub fn alias(&self, name: &str) -> Option<&Alias> {
        self.aliases.iter().find(|alias| alias.name == name)
    }

    /// Arithmetic operations recorded for `clause`.
    pub fn operations(&self, clause: Clause) -> impl Iterator<Item = &Operation> {
        self.computations
            .get(clause)
            .iter()
            .filter_map(|computation| match computation {
                Computation::Operation(operation) => Some(operation),
                Computation::Case(_) => None,
            })
    }

    /// CASE expressions recorded for `clause`.
    pub fn cases(&self, clause: Clause) -> impl Iterator<Item = &Case> {
        self.computations
            .get(clause)
            .iter()
            .filter_map(|computation| match computation {
                Computation::Case(case) => Some(case),
                Computation::Operation(_) => None,
            })
    }

    pub fn has_aggregates(&self) -> bool {
        !self.functions.is_empty()
    }

    /// Aliases of the FROM table and every joined table.
    pub fn table_aliases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.from.alias.as_str())
            .chain(self.joins.iter().map(|join| join.alias.as_str()))
    }

    /// Whether a stage running before `clause` computes the same operation.
    pub fn computed_before(&self, clause: Clause, operation: &Operation) -> bool {
        Clause::STAGES
            .iter()
            .take_while(|stage| **stage != clause)
            .any(|stage| self.operations(*stage).any(|earlier| earlier == operation))
    }
}
