use log::info;
use sqlframe::{CsvOptions, Session, Table};
use std::io::{self, Write};
use std::process;

const USAGE: &str = "usage: sqlframe --table NAME=PATH.csv ... [--delimiter C] QUERY...";

struct Args {
    tables: Vec<(String, String)>,
    delimiter: u8,
    queries: Vec<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut tables = Vec::new();
    let mut delimiter = b',';
    let mut queries = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--table" => {
                let value = args.next().ok_or("--table expects NAME=PATH")?;
                let (name, path) = value
                    .split_once('=')
                    .ok_or_else(|| format!("--table expects NAME=PATH, got {}", value))?;
                tables.push((name.to_string(), path.to_string()));
            }
            "--delimiter" => {
                let value = args.next().ok_or("--delimiter expects a character")?;
                match value.as_bytes() {
                    [byte] => delimiter = *byte,
                    _ => return Err(format!("--delimiter expects one character, got {}", value)),
                }
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                process::exit(0);
            }
            _ => queries.push(arg),
        }
    }

    Ok(Args {
        tables,
        delimiter,
        queries,
    })
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let options = CsvOptions {
        delimiter: args.delimiter,
        ..CsvOptions::default()
    };
    let mut session = Session::new();
    for (name, path) in &args.tables {
        let table = Table::from_csv_path(path, options)?;
        info!("loaded {} ({} rows) from {}", name, table.row_count(), path);
        session.register_table(name.as_str(), table);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for query in &args.queries {
        session.execute(query)?;
        match session.fetch_result() {
            Some(table) => {
                let header: Vec<&str> = table.column_names().collect();
                writeln!(out, "{}", header.join("\t"))?;
                for row in table.rows() {
                    let cells: Vec<String> = row.iter().map(|value| value.render()).collect();
                    writeln!(out, "{}", cells.join("\t"))?;
                }
            }
            None => writeln!(out, "ok")?,
        }
    }
    out.flush()?;
    Ok(())
}

fn main() {
    env_logger::init();
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}\n{}", message, USAGE);
            process::exit(2);
        }
    };
    if args.queries.is_empty() {
        eprintln!("{}", USAGE);
        process::exit(2);
    }
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
