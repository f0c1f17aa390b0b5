//! Error types shared by the tokenizer, parser, executor and table engine.

use thiserror::Error;

/// Failure raised by a table engine operation.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("no such column: {0}")]
    ColumnNotFound(String),
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
    #[error("unknown aggregate function: {0}")]
    UnknownAggregate(String),
    #[error("cannot join {left_key} ({left}) with {right_key} ({right})")]
    JoinKeyMismatch {
        left_key: String,
        left: &'static str,
        right_key: String,
        right: &'static str,
    },
    #[error("non-numeric operand: {0}")]
    NonNumericOperand(String),
    #[error("column {name} has {actual} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every way a statement can fail. All variants abort the statement.
#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("no such table: {0}")]
    TableNotFound(String),
    #[error("ambiguous or non-existent column name: {name}")]
    AmbiguousColumn { name: String, candidates: Vec<String> },
    #[error("engine error: {0}")]
    Engine(#[from] TableError),
}

impl SqlError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        SqlError::Parse(message.into())
    }
}
