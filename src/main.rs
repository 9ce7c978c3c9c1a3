use std::io::{self, BufRead, Write};

use minidb::db::{Db, QueryResult};
use minidb::parser;

fn main() {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let data_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./data".to_string());

    let mut db = match Db::new(&data_dir) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("failed to open database at {}: {}", data_dir, e);
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    'outer: for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let statements = match parser::parse(line) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("SQL_SYNTAX: {}", e);
                continue;
            }
        };

        for statement in statements {
            match db.execute(statement) {
                Ok(QueryResult::Exit) => break 'outer,
                Ok(result) => print_result(&result),
                Err(e) => eprintln!("{}: {}", e.code(), e),
            }
            let _ = stdout.flush();
        }
    }
}

fn print_result(result: &QueryResult) {
    match result {
        QueryResult::Empty => println!("SUCCESS"),
        QueryResult::RowsAffected(count) => {
            println!("SUCCESS");
            println!("{} rows", count);
        }
        QueryResult::ResultSet(headers, rows) => {
            println!("{}", headers.join(","));
            for row in rows {
                println!("{}", row.join(","));
            }
        }
        QueryResult::List(items) => {
            for item in items {
                println!("{}", item);
            }
        }
        QueryResult::Message(text) => println!("{}", text),
        QueryResult::Exit => {}
    }
}
