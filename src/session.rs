//! Statement-level entry point: a registry of named tables plus the result of
//! the last statement.

use crate::error::SqlError;
use crate::executor::Executor;
use crate::parser;
use crate::table::{Table, TableRegistry};
use crate::value::Value;
use log::debug;
use sqllogictest::{DBOutput, DefaultColumnType};
use std::collections::BTreeMap;

/// Runs statements against its own table registry.
///
/// # Examples
/// ```
/// use sqlframe::{Session, Table, Value};
///
/// let mut session = Session::new();
/// let t = Table::from_rows(&["a", "b"], vec![
///     vec![Value::Integer(1), Value::Integer(5)],
///     vec![Value::Integer(2), Value::Integer(15)],
/// ]).unwrap();
/// session.register_table("t", t);
/// session.execute("SELECT t.a FROM t WHERE t.b > 10").unwrap();
/// let result = session.fetch_result().unwrap();
/// assert_eq!(result.rows(), vec![vec![Value::Integer(2)]]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Session {
    registry: TableRegistry,
    result: Option<Table>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: TableRegistry) -> Self {
        Self {
            registry,
            result: None,
        }
    }

    /// Registers `table` under `name`, replacing any table of that name.
    pub fn register_table(&mut self, name: impl Into<String>, table: Table) -> Option<Table> {
        self.registry.insert(name, table)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.registry.get(name)
    }

    pub fn remove_table(&mut self, name: &str) -> Option<Table> {
        self.registry.remove(name)
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    /// Parses and runs one statement. On success the result is available
    /// through [`Session::fetch_result`], unless the statement used INTO.
    /// On failure there is no result.
    pub fn execute(&mut self, sql: &str) -> Result<(), SqlError> {
        self.result = None;
        let plan = parser::parse(sql)?;
        debug!("executing {}", sql.trim());
        self.result = Executor::new(&mut self.registry).execute(&plan)?;
        Ok(())
    }

    pub fn fetch_result(&self) -> Option<&Table> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<Table> {
        self.result.take()
    }

    /// The current result as one column-name to value map per row.
    pub fn fetch_records(&self) -> Vec<BTreeMap<String, Value>> {
        let Some(table) = &self.result else {
            return Vec::new();
        };
        let names: Vec<&str> = table.column_names().collect();
        table
            .rows()
            .into_iter()
            .map(|row| {
                names
                    .iter()
                    .map(|name| name.to_string())
                    .zip(row)
                    .collect()
            })
            .collect()
    }
}

impl sqllogictest::DB for Session {
    type Error = SqlError;
    type ColumnType = DefaultColumnType;

    fn run(&mut self, sql: &str) -> Result<DBOutput<Self::ColumnType>, Self::Error> {
        self.execute(sql)?;
        let Some(table) = &self.result else {
            return Ok(DBOutput::StatementComplete(0));
        };
        let types = table
            .columns()
            .iter()
            .map(|column| column_type(column.values()))
            .collect();
        let rows = table
            .rows()
            .iter()
            .map(|row| row.iter().map(format_cell).collect())
            .collect();
        Ok(DBOutput::Rows { types, rows })
    }
}

/// Integer when every non-null value is an integer, floating point when the
/// values are numeric with at least one real, text otherwise.
fn column_type(values: &[Value]) -> DefaultColumnType {
    let mut column_type = None;
    for value in values {
        column_type = match (value, column_type) {
            (Value::Null, current) => current,
            (Value::Text(_), _) => return DefaultColumnType::Text,
            (Value::Real(_), _) => Some(DefaultColumnType::FloatingPoint),
            (Value::Integer(_), None) => Some(DefaultColumnType::Integer),
            (Value::Integer(_), current) => current,
        };
    }
    column_type.unwrap_or(DefaultColumnType::Text)
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Text(text) if text.is_empty() => "(empty)".to_string(),
        other => other.render(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_types_follow_values() {
        assert_eq!(
            column_type(&[Value::Integer(1), Value::Null]),
            DefaultColumnType::Integer
        );
        assert_eq!(
            column_type(&[Value::Integer(1), Value::Real(0.5)]),
            DefaultColumnType::FloatingPoint
        );
        assert_eq!(
            column_type(&[Value::Real(0.5), Value::Integer(1)]),
            DefaultColumnType::FloatingPoint
        );
        assert_eq!(
            column_type(&[Value::Integer(1), Value::from("x")]),
            DefaultColumnType::Text
        );
        assert_eq!(column_type(&[Value::Null]), DefaultColumnType::Text);
    }

    #[test]
    fn failed_statement_clears_result() {
        let mut session = Session::new();
        session.register_table(
            "t",
            Table::from_rows(&["a"], vec![vec![Value::Integer(1)]]).unwrap(),
        );
        session.execute("SELECT t.a FROM t").unwrap();
        assert!(session.fetch_result().is_some());
        assert!(session.execute("SELECT t.zz FROM t").is_err());
        assert!(session.fetch_result().is_none());
    }
}
