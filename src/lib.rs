//! SQL-flavoured queries over named in-memory tables.
//!
//! A statement goes through [`tokenizer::tokenize`], then [`parser::parse`]
//! which produces a [`plan::QueryPlan`], then [`executor::Executor`] which
//! replays the plan against a [`table::TableRegistry`]. [`Session`] wires
//! the three together.

use std::error::Error;
use std::fs;
use std::path::Path;

pub mod error;
pub mod executor;
pub mod expr;
pub mod parser;
pub mod plan;
pub mod session;
pub mod table;
pub mod tokenizer;
pub mod value;

pub use error::{SqlError, TableError};
pub use plan::QueryPlan;
pub use session::Session;
pub use table::{Column, CsvOptions, Table, TableRegistry};
pub use value::Value;

/// Loads every `*.csv` file in `dir` as a table named after the file stem.
pub fn load_csv_dir(dir: &Path, options: CsvOptions) -> Result<TableRegistry, TableError> {
    let mut registry = TableRegistry::new();
    if !dir.is_dir() {
        return Ok(registry);
    }
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    paths.sort();
    for path in paths {
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let table = Table::from_csv_path(&path, options)?;
        log::debug!("loaded {} ({} rows) from {}", name, table.row_count(), path.display());
        registry.insert(name, table);
    }
    Ok(registry)
}

/// Runs one sqllogictest file. Every CSV in the `data/` directory next to
/// the file is registered before the first record runs.
pub fn run_test_file(test_file: &str) -> Result<(), Box<dyn Error>> {
    let data_dir = Path::new(test_file)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("data");
    let tables = load_csv_dir(&data_dir, CsvOptions::default())?;
    let mut tester = sqllogictest::Runner::new(move || {
        let session = Session::with_registry(tables.clone());
        async move { Ok::<_, SqlError>(session) }
    });
    tester.run_file(test_file)?;
    Ok(())
}
