//! Replays a [`QueryPlan`] against the tables of a [`TableRegistry`].

use crate::error::{SqlError, TableError};
use crate::expr::{self, Expr};
use crate::plan::{Alias, Case, Clause, ColumnRef, Computation, Projection, QueryPlan};
use crate::table::{Aggregate, AggregateFunction, SortKey, Table, TableRegistry};
use crate::value::Value;
use log::{debug, trace};

/// Executes plans against a borrowed registry.
///
/// The registry is borrowed mutably for the whole statement: nested
/// sub-query results are registered in it while the statement runs, and
/// INTO writes its result back to it.
pub struct Executor<'r> {
    registry: &'r mut TableRegistry,
}

impl<'r> Executor<'r> {
    pub fn new(registry: &'r mut TableRegistry) -> Self {
        Self { registry }
    }

    /// Runs `plan` and returns its result, or `None` when INTO stored the
    /// result in the registry instead. Stored tables drop the table alias
    /// prefix from their column names, the same as sub-query results.
    ///
    /// Sub-query tables registered for the statement are removed before
    /// returning, whether it succeeded or not.
    pub fn execute(&mut self, plan: &QueryPlan) -> Result<Option<Table>, SqlError> {
        let mut placeholders = Vec::new();
        let result = self.run(plan, &mut placeholders);
        for placeholder in &placeholders {
            self.registry.remove(placeholder);
            trace!("dropped {}", placeholder);
        }
        let mut table = result?;
        match &plan.into {
            Some(name) => {
                table.rename_columns(|column| strip_alias(column, plan).to_string())?;
                debug!("storing {} rows into {}", table.row_count(), name);
                self.registry.insert(name.clone(), table);
                Ok(None)
            }
            None => Ok(Some(table)),
        }
    }

    fn run(&mut self, plan: &QueryPlan, placeholders: &mut Vec<String>) -> Result<Table, SqlError> {
        for nested in &plan.nested_queries {
            let mut table = Executor::new(&mut *self.registry)
                .execute(&nested.plan)?
                .ok_or_else(|| SqlError::parse("sub-query produced no result"))?;
            table.rename_columns(|name| strip_alias(name, &nested.plan).to_string())?;
            debug!(
                "registered {} ({} rows)",
                nested.placeholder,
                table.row_count()
            );
            self.registry.insert(nested.placeholder.clone(), table);
            placeholders.push(nested.placeholder.clone());
        }

        let mut pipeline = Pipeline {
            plan,
            registry: &*self.registry,
            current: Table::default(),
        };
        for stage in Clause::STAGES {
            pipeline.prepare(stage)?;
            match stage {
                Clause::From => pipeline.from()?,
                Clause::Where => pipeline.filter()?,
                Clause::GroupBy => pipeline.group()?,
                Clause::OrderBy => pipeline.order()?,
                Clause::Select => pipeline.select()?,
                Clause::Into => {}
            }
            trace!(
                "after {}: {} rows x {} columns",
                stage,
                pipeline.current.row_count(),
                pipeline.current.column_count()
            );
        }
        Ok(pipeline.current)
    }
}

/// State threaded through the stages of a single plan.
struct Pipeline<'a> {
    plan: &'a QueryPlan,
    registry: &'a TableRegistry,
    current: Table,
}

impl Pipeline<'_> {
    fn resolve(&self, column: &ColumnRef) -> Result<String, SqlError> {
        resolve_column(&self.current, &self.plan.aliases, column)
    }

    fn evaluate(&self, expr: &Expr) -> Result<Vec<Value>, SqlError> {
        expr::evaluate(expr, &self.current, &|column: &ColumnRef| self.resolve(column))
    }

    /// Materializes the operations and CASE expressions recorded for `clause`.
    /// An operation an earlier stage already produced is kept as is, since
    /// grouping may have dropped the columns it reads.
    fn prepare(&mut self, clause: Clause) -> Result<(), SqlError> {
        for computation in self.plan.computations.get(clause) {
            let values = match computation {
                Computation::Operation(operation)
                    if self.current.has_column(&operation.target)
                        && self.plan.computed_before(clause, operation) =>
                {
                    trace!("{}: reusing {}", clause, operation.target);
                    continue;
                }
                Computation::Operation(operation) => self.evaluate(&operation.expr)?,
                Computation::Case(case) => self.evaluate_case(case)?,
            };
            trace!("{}: computed {}", clause, computation.target());
            self.current.set_column(computation.target(), values)?;
        }
        Ok(())
    }

    /// Every row takes the value of the first branch whose condition holds,
    /// else the ELSE value, else NULL.
    fn evaluate_case(&self, case: &Case) -> Result<Vec<Value>, SqlError> {
        let rows = self.current.row_count();
        let mut values = match &case.else_value {
            Some(else_value) => self.evaluate(else_value)?,
            None => vec![Value::Null; rows],
        };
        let mut assigned = vec![false; rows];
        for branch in &case.branches {
            let hits = expr::mask(&branch.condition, &self.current, &|column: &ColumnRef| {
                self.resolve(column)
            })?;
            let branch_values = self.evaluate(&branch.value)?;
            for (row, (hit, value)) in hits.into_iter().zip(branch_values).enumerate() {
                if hit && !assigned[row] {
                    values[row] = value;
                    assigned[row] = true;
                }
            }
        }
        Ok(values)
    }

    /// A registry table with every column qualified by `alias`.
    fn load(&self, table: &str, alias: &str) -> Result<Table, SqlError> {
        let mut loaded = self
            .registry
            .get(table)
            .cloned()
            .ok_or_else(|| SqlError::TableNotFound(table.to_string()))?;
        loaded.rename_columns(|column| format!("{}.{}", alias, column))?;
        Ok(loaded)
    }

    fn add_literals(&mut self) -> Result<(), SqlError> {
        let rows = self.current.row_count();
        for literal in &self.plan.literals {
            self.current
                .set_column(&literal.name, vec![literal.value.clone(); rows])?;
        }
        Ok(())
    }

    fn from(&mut self) -> Result<(), SqlError> {
        let source = &self.plan.from;
        self.current = self.load(&source.table, &source.alias)?;
        debug!(
            "FROM {} AS {}: {} rows",
            source.table,
            source.alias,
            self.current.row_count()
        );

        for join in &self.plan.joins {
            let right = self.load(&join.table, &join.alias)?;
            let aliases = &self.plan.aliases;
            let left_key = ColumnRef::new(join.left_key.as_str());
            let right_key = ColumnRef::new(join.right_key.as_str());
            // Keys may be written in either order.
            let (left, right_name) = match self.resolve(&left_key) {
                Ok(left) => (left, resolve_column(&right, aliases, &right_key)?),
                Err(_) => (
                    self.resolve(&right_key)?,
                    resolve_column(&right, aliases, &left_key)?,
                ),
            };
            self.current = self.current.join(&right, join.kind, &left, &right_name)?;
            debug!(
                "{} JOIN {} ON {} = {}: {} rows",
                join.kind,
                join.table,
                left,
                right_name,
                self.current.row_count()
            );
        }
        self.add_literals()
    }

    fn filter(&mut self) -> Result<(), SqlError> {
        let Some(condition) = &self.plan.selection else {
            return Ok(());
        };
        let keep = expr::mask(condition, &self.current, &|column: &ColumnRef| {
            self.resolve(column)
        })?;
        self.current = self.current.filter(&keep)?;
        debug!("WHERE {}: {} rows", condition, self.current.row_count());
        Ok(())
    }

    fn group(&mut self) -> Result<(), SqlError> {
        if self.plan.group_by.is_empty() && !self.plan.has_aggregates() {
            return Ok(());
        }
        let keys = self
            .plan
            .group_by
            .iter()
            .map(|key| self.resolve(&ColumnRef::new(key.as_str())))
            .collect::<Result<Vec<_>, _>>()?;

        let mut aggregates = Vec::new();
        for (column, functions) in &self.plan.functions {
            let source = self.resolve(&ColumnRef::new(column.as_str()))?;
            for function in functions {
                let parsed: AggregateFunction = function.parse()?;
                aggregates.push(Aggregate {
                    column: source.clone(),
                    function: parsed,
                    output: ColumnRef::aggregated(column.as_str(), function.as_str()).output_name(),
                });
            }
        }

        self.current = self.current.group_aggregate(&keys, &aggregates)?;
        debug!(
            "GROUP BY [{}] with {} aggregates: {} groups",
            keys.join(", "),
            aggregates.len(),
            self.current.row_count()
        );
        self.add_literals()
    }

    fn order(&mut self) -> Result<(), SqlError> {
        if self.plan.order_by.is_empty() {
            return Ok(());
        }
        let keys = self
            .plan
            .order_by
            .iter()
            .map(|item| {
                let column = self.resolve(&item.column)?;
                Ok(if item.descending {
                    SortKey::descending(column)
                } else {
                    SortKey::ascending(column)
                })
            })
            .collect::<Result<Vec<_>, SqlError>>()?;
        self.current = self.current.sort(&keys)?;
        debug!("ORDER BY {} keys", keys.len());
        Ok(())
    }

    fn select(&mut self) -> Result<(), SqlError> {
        let columns = match &self.plan.select {
            Projection::Wildcard => return Ok(()),
            Projection::Columns(columns) => columns,
        };
        for alias in &self.plan.aliases {
            let source = match &alias.source {
                Some(source) => self.resolve(source)?,
                None => self.resolve(&ColumnRef::new(alias.name.as_str()))?,
            };
            if source != alias.name {
                let values = self.current.column(&source)?.values().to_vec();
                self.current.set_column(&alias.name, values)?;
            }
        }
        let names = columns
            .iter()
            .map(|column| self.resolve(column))
            .collect::<Result<Vec<_>, _>>()?;
        self.current = self.current.project(&names)?;
        debug!("SELECT {} columns", names.len());
        Ok(())
    }
}

/// Maps a column reference to a column of `table`.
///
/// In order: the exact output name, then an alias with a source, then for
/// bare names the single column whose unqualified part matches.
pub fn resolve_column(
    table: &Table,
    aliases: &[Alias],
    column: &ColumnRef,
) -> Result<String, SqlError> {
    resolve_with_depth(table, aliases, column, 0)
}

fn resolve_with_depth(
    table: &Table,
    aliases: &[Alias],
    column: &ColumnRef,
    depth: usize,
) -> Result<String, SqlError> {
    let name = column.output_name();
    if table.has_column(&name) {
        return Ok(name);
    }
    if depth <= aliases.len() && column.function.is_none() {
        let source = aliases
            .iter()
            .find(|alias| alias.name == name)
            .and_then(|alias| alias.source.as_ref());
        if let Some(source) = source {
            return resolve_with_depth(table, aliases, source, depth + 1);
        }
    }
    if name.contains('.') {
        return Err(TableError::ColumnNotFound(name).into());
    }
    let candidates: Vec<String> = table
        .column_names()
        .filter(|candidate| candidate.split_once('.').is_some_and(|(_, rest)| rest == name))
        .map(str::to_string)
        .collect();
    match candidates.as_slice() {
        [single] => Ok(single.clone()),
        _ => Err(SqlError::AmbiguousColumn { name, candidates }),
    }
}

/// Drops a leading `alias.` when `alias` is one of the plan's table
/// aliases and the rest is a plain column name. Literal and computed names
/// such as `2.5` or `t.a+t.b` are left alone.
fn strip_alias<'n>(name: &'n str, plan: &QueryPlan) -> &'n str {
    match name.split_once('.') {
        Some((prefix, rest))
            if !rest.contains(|c: char| "+-*/%().".contains(c))
                && plan.table_aliases().any(|alias| alias == prefix) =>
        {
            rest
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_rows(
            &["t.a", "u.a", "t.b"],
            vec![vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]],
        )
        .unwrap()
    }

    #[test]
    fn resolves_exact_then_unique_suffix() {
        let table = table();
        assert_eq!(
            resolve_column(&table, &[], &ColumnRef::new("t.a")).unwrap(),
            "t.a"
        );
        assert_eq!(resolve_column(&table, &[], &ColumnRef::new("b")).unwrap(), "t.b");
    }

    #[test]
    fn ambiguous_suffix_lists_candidates() {
        let err = resolve_column(&table(), &[], &ColumnRef::new("a")).unwrap_err();
        match err {
            SqlError::AmbiguousColumn { name, candidates } => {
                assert_eq!(name, "a");
                assert_eq!(candidates, vec!["t.a".to_string(), "u.a".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn alias_resolves_through_source() {
        let aliases = vec![Alias {
            name: "x".into(),
            source: Some(ColumnRef::new("t.b")),
        }];
        assert_eq!(
            resolve_column(&table(), &aliases, &ColumnRef::new("x")).unwrap(),
            "t.b"
        );
    }

    #[test]
    fn self_referencing_alias_terminates() {
        let aliases = vec![Alias {
            name: "x".into(),
            source: Some(ColumnRef::new("x")),
        }];
        assert!(resolve_column(&table(), &aliases, &ColumnRef::new("x")).is_err());
    }

    #[test]
    fn missing_qualified_column_is_an_engine_error() {
        let err = resolve_column(&table(), &[], &ColumnRef::new("t.zz")).unwrap_err();
        assert!(matches!(err, SqlError::Engine(TableError::ColumnNotFound(_))));
    }

    #[test]
    fn strip_alias_only_touches_table_prefixes() {
        let plan = crate::parser::parse("SELECT t.a FROM t JOIN u AS v ON t.a = v.a").unwrap();
        assert_eq!(strip_alias("t.a", &plan), "a");
        assert_eq!(strip_alias("v.b_sum", &plan), "b_sum");
        assert_eq!(strip_alias("u.a", &plan), "u.a");
        assert_eq!(strip_alias("2.5", &plan), "2.5");
        assert_eq!(strip_alias("t.a+t.b", &plan), "t.a+t.b");
        assert_eq!(strip_alias("case1", &plan), "case1");
    }
}
