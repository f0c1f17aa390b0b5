//! Column-oriented in-memory tables, the registry that names them, and the
//! bulk operations the executor drives: projection, filtering, joins,
//! grouping with aggregation, sorting and CSV loading.

use crate::error::TableError;
use crate::value::{numeric_to_f64, numeric_value, NumericValue, Value, ValueKey};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// An ordered set of uniquely named columns over an equal number of rows.
///
/// The row count is kept separately so a table stays well defined even when
/// it has no columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Outer,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Outer => "outer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Sum,
    Min,
    Max,
    Count,
    Avg,
    First,
    Last,
}

impl FromStr for AggregateFunction {
    type Err = TableError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregateFunction::Sum),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            "count" => Ok(AggregateFunction::Count),
            "avg" | "mean" => Ok(AggregateFunction::Avg),
            "first" => Ok(AggregateFunction::First),
            "last" => Ok(AggregateFunction::Last),
            _ => Err(TableError::UnknownAggregate(name.to_string())),
        }
    }
}

/// One aggregate output column: `function(column)` written to `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub column: String,
    pub function: AggregateFunction,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub has_headers: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_headers: true,
        }
    }
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let rows = columns.first().map_or(0, |column| column.values.len());
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if column.values.len() != rows {
                return Err(TableError::LengthMismatch {
                    name: column.name.clone(),
                    expected: rows,
                    actual: column.values.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Builds a table from row-major data.
    pub fn from_rows<S: AsRef<str>>(
        names: &[S],
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, TableError> {
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for (index, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                return Err(TableError::LengthMismatch {
                    name: format!("row {}", index),
                    expected: names.len(),
                    actual: row.len(),
                });
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Table::new(
            names
                .iter()
                .zip(columns)
                .map(|(name, values)| Column::new(name.as_ref(), values))
                .collect(),
        )
    }

    pub fn from_csv_reader<R: Read>(reader: R, options: CsvOptions) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(options.has_headers)
            .from_reader(reader);
        let mut names: Vec<String> = if options.has_headers {
            reader.headers()?.iter().map(|h| h.trim().to_string()).collect()
        } else {
            Vec::new()
        };
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if names.is_empty() {
                names = (1..=record.len()).map(|i| format!("column{}", i)).collect();
            }
            rows.push(record.iter().map(Value::infer).collect());
        }
        Table::from_rows(&names, rows)
    }

    pub fn from_csv_path(path: impl AsRef<Path>, options: CsvOptions) -> Result<Self, TableError> {
        let file = std::fs::File::open(path)?;
        Table::from_csv_reader(file, options)
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }

    /// Row-major copy of the data.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        (0..self.rows)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|column| column.values[row].clone())
                    .collect()
            })
            .collect()
    }

    /// Renames every column through `rename`. Fails if two columns end up
    /// with the same name.
    pub fn rename_columns<F>(&mut self, rename: F) -> Result<(), TableError>
    where
        F: Fn(&str) -> String,
    {
        let mut seen = HashSet::new();
        for column in &mut self.columns {
            column.name = rename(&column.name);
            if !seen.insert(column.name.clone()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(())
    }

    /// Replaces the named column, or appends it when absent.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), TableError> {
        if values.len() != self.rows && !self.columns.is_empty() {
            return Err(TableError::LengthMismatch {
                name: name.to_string(),
                expected: self.rows,
                actual: values.len(),
            });
        }
        if self.columns.is_empty() {
            self.rows = values.len();
        }
        match self.columns.iter_mut().find(|column| column.name == name) {
            Some(column) => column.values = values,
            None => self.columns.push(Column::new(name, values)),
        }
        Ok(())
    }

    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Result<Table, TableError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if columns.iter().any(|column: &Column| column.name == name) {
                return Err(TableError::DuplicateColumn(name.to_string()));
            }
            columns.push(self.column(name)?.clone());
        }
        Ok(Table {
            columns,
            rows: self.rows,
        })
    }

    /// Keeps the rows where `mask` is true, preserving order.
    pub fn filter(&self, mask: &[bool]) -> Result<Table, TableError> {
        if mask.len() != self.rows {
            return Err(TableError::LengthMismatch {
                name: "filter mask".to_string(),
                expected: self.rows,
                actual: mask.len(),
            });
        }
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(row, keep)| keep.then_some(row))
            .collect();
        Ok(self.take(&indices))
    }

    fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|column| {
                    Column::new(
                        column.name.clone(),
                        indices.iter().map(|&row| column.values[row].clone()).collect(),
                    )
                })
                .collect(),
            rows: indices.len(),
        }
    }

    fn take_optional(&self, indices: &[Option<usize>]) -> Vec<Column> {
        self.columns
            .iter()
            .map(|column| {
                Column::new(
                    column.name.clone(),
                    indices
                        .iter()
                        .map(|row| row.map_or(Value::Null, |row| column.values[row].clone()))
                        .collect(),
                )
            })
            .collect()
    }

    /// Equi-join on `left_key = right_key`. NULL keys never match.
    ///
    /// Inner, left and outer joins emit rows in left-table order, outer joins
    /// then append unmatched right rows. Right joins emit rows in right-table
    /// order.
    pub fn join(
        &self,
        right: &Table,
        kind: JoinKind,
        left_key: &str,
        right_key: &str,
    ) -> Result<Table, TableError> {
        let left_values = self.column(left_key)?.values();
        let right_values = right.column(right_key)?.values();
        check_join_key_types(left_key, left_values, right_key, right_values)?;

        let pairs = match kind {
            JoinKind::Right => {
                let index = key_index(left_values);
                let mut pairs = Vec::new();
                for (row, value) in right_values.iter().enumerate() {
                    match lookup(&index, value) {
                        Some(matches) => {
                            pairs.extend(matches.iter().map(|&left| (Some(left), Some(row))))
                        }
                        None => pairs.push((None, Some(row))),
                    }
                }
                pairs
            }
            JoinKind::Inner | JoinKind::Left | JoinKind::Outer => {
                let index = key_index(right_values);
                let mut matched = vec![false; right.rows];
                let mut pairs = Vec::new();
                for (row, value) in left_values.iter().enumerate() {
                    match lookup(&index, value) {
                        Some(matches) => {
                            for &right_row in matches {
                                matched[right_row] = true;
                                pairs.push((Some(row), Some(right_row)));
                            }
                        }
                        None if kind != JoinKind::Inner => pairs.push((Some(row), None)),
                        None => {}
                    }
                }
                if kind == JoinKind::Outer {
                    pairs.extend(
                        matched
                            .iter()
                            .enumerate()
                            .filter(|(_, seen)| !**seen)
                            .map(|(row, _)| (None, Some(row))),
                    );
                }
                pairs
            }
        };

        let (left_rows, right_rows): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        let mut columns = self.take_optional(&left_rows);
        columns.extend(right.take_optional(&right_rows));
        Table::new(columns)
    }

    /// Groups rows by `keys` in first-encounter order and computes each
    /// aggregate per group. The output holds the key columns followed by one
    /// column per aggregate.
    ///
    /// With no keys every row falls into a single group, and that group
    /// exists even when the table is empty.
    pub fn group_aggregate<S: AsRef<str>>(
        &self,
        keys: &[S],
        aggregates: &[Aggregate],
    ) -> Result<Table, TableError> {
        let key_columns = keys
            .iter()
            .map(|key| self.column(key.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: Vec<Vec<usize>> = Vec::new();
        if key_columns.is_empty() {
            groups.push((0..self.rows).collect());
        } else {
            let mut positions: HashMap<Vec<ValueKey>, usize> = HashMap::new();
            for row in 0..self.rows {
                let key: Vec<ValueKey> = key_columns
                    .iter()
                    .map(|column| column.values[row].key())
                    .collect();
                match positions.entry(key) {
                    Entry::Occupied(entry) => groups[*entry.get()].push(row),
                    Entry::Vacant(entry) => {
                        entry.insert(groups.len());
                        groups.push(vec![row]);
                    }
                }
            }
        }

        let mut columns = Vec::with_capacity(key_columns.len() + aggregates.len());
        for column in &key_columns {
            columns.push(Column::new(
                column.name.clone(),
                groups
                    .iter()
                    .map(|rows| rows.first().map_or(Value::Null, |&row| column.values[row].clone()))
                    .collect(),
            ));
        }
        for aggregate in aggregates {
            let source = self.column(&aggregate.column)?;
            let values = groups
                .iter()
                .map(|rows| compute_aggregate(aggregate.function, source, rows))
                .collect::<Result<Vec<_>, _>>()?;
            columns.push(Column::new(aggregate.output.clone(), values));
        }
        let rows = groups.len();
        let mut table = Table::new(columns)?;
        table.rows = rows;
        Ok(table)
    }

    /// Stable multi-key sort.
    pub fn sort(&self, keys: &[SortKey]) -> Result<Table, TableError> {
        let key_columns = keys
            .iter()
            .map(|key| self.column(&key.column).map(|column| (column, key.descending)))
            .collect::<Result<Vec<_>, _>>()?;
        let mut indices: Vec<usize> = (0..self.rows).collect();
        indices.sort_by(|&a, &b| {
            for (column, descending) in &key_columns {
                let ordering = column.values[a].sort_cmp(&column.values[b]);
                if ordering != std::cmp::Ordering::Equal {
                    return if *descending {
                        ordering.reverse()
                    } else {
                        ordering
                    };
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(self.take(&indices))
    }
}

fn key_index(values: &[Value]) -> HashMap<ValueKey, Vec<usize>> {
    let mut index: HashMap<ValueKey, Vec<usize>> = HashMap::new();
    for (row, value) in values.iter().enumerate() {
        if !value.is_null() {
            index.entry(value.key()).or_default().push(row);
        }
    }
    index
}

fn lookup<'a>(index: &'a HashMap<ValueKey, Vec<usize>>, value: &Value) -> Option<&'a Vec<usize>> {
    if value.is_null() {
        return None;
    }
    index.get(&value.key())
}

#[derive(Clone, Copy, PartialEq)]
enum KeyClass {
    Numeric,
    Text,
}

fn key_class(values: &[Value]) -> Option<(KeyClass, &'static str)> {
    values.iter().find_map(|value| match value {
        Value::Null => None,
        Value::Integer(_) | Value::Real(_) => Some((KeyClass::Numeric, value.kind_name())),
        Value::Text(_) => Some((KeyClass::Text, value.kind_name())),
    })
}

fn check_join_key_types(
    left_key: &str,
    left: &[Value],
    right_key: &str,
    right: &[Value],
) -> Result<(), TableError> {
    if let (Some((left_class, left_kind)), Some((right_class, right_kind))) =
        (key_class(left), key_class(right))
    {
        if left_class != right_class {
            return Err(TableError::JoinKeyMismatch {
                left_key: left_key.to_string(),
                left: left_kind,
                right_key: right_key.to_string(),
                right: right_kind,
            });
        }
    }
    Ok(())
}

fn compute_aggregate(
    function: AggregateFunction,
    column: &Column,
    rows: &[usize],
) -> Result<Value, TableError> {
    let mut values = rows
        .iter()
        .map(|&row| &column.values[row])
        .filter(|value| !value.is_null());
    match function {
        AggregateFunction::Count => Ok(Value::Integer(values.count() as i64)),
        AggregateFunction::First => Ok(values.next().cloned().unwrap_or(Value::Null)),
        AggregateFunction::Last => Ok(values.last().cloned().unwrap_or(Value::Null)),
        AggregateFunction::Min => Ok(values
            .min_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null)),
        AggregateFunction::Max => Ok(values
            .max_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null)),
        AggregateFunction::Sum => sum_values(column.name(), values),
        AggregateFunction::Avg => {
            let mut count = 0usize;
            let mut total = 0.0;
            for value in values {
                let num = numeric_value(value)
                    .ok_or_else(|| TableError::NonNumericOperand(column.name().to_string()))?;
                total += numeric_to_f64(num).0;
                count += 1;
            }
            if count == 0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Real(total / count as f64))
            }
        }
    }
}

fn sum_values<'a>(
    name: &str,
    values: impl Iterator<Item = &'a Value>,
) -> Result<Value, TableError> {
    let mut sum_int = 0i64;
    let mut sum_real = 0.0;
    let mut any_real = false;
    let mut has_value = false;
    for value in values {
        let num =
            numeric_value(value).ok_or_else(|| TableError::NonNumericOperand(name.to_string()))?;
        has_value = true;
        match num {
            NumericValue::Integer(v) => {
                if any_real {
                    sum_real += v as f64;
                } else if let Some(next) = sum_int.checked_add(v) {
                    sum_int = next;
                } else {
                    any_real = true;
                    sum_real = sum_int as f64 + v as f64;
                }
            }
            NumericValue::Real(v) => {
                if !any_real {
                    any_real = true;
                    sum_real = sum_int as f64;
                }
                sum_real += v;
            }
        }
    }
    if !has_value {
        Ok(Value::Null)
    } else if any_real {
        Ok(Value::Real(sum_real))
    } else {
        Ok(Value::Integer(sum_int))
    }
}

/// Named tables shared by every statement of a session.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, Table>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `table` under `name`, returning any table it replaced.
    pub fn insert(&mut self, name: impl Into<String>, table: Table) -> Option<Table> {
        self.tables.insert(name.into(), table)
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Table> {
        self.tables.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
