#![cfg(not(tarpaulin_include))]

use excel_analytics::{insights, loader, normalizer};
use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

const USAGE: &str = "Usage: cli <file.xlsx|file.xls> [--insights]";

/// Decode a local workbook and print its normalized payload as JSON
///
/// With `--insights`, prints the summary report instead.
fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(path) = args.iter().find(|a| !a.starts_with("--")) else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };
    let want_insights = args.iter().any(|a| a == "--insights");

    match run(Path::new(path), want_insights) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(path: &Path, want_insights: bool) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let workbook = loader::load_path(path)?;
    let payload = normalizer::normalize(&workbook)?;

    let json = if want_insights {
        serde_json::to_string_pretty(&insights::summarize(&payload))?
    } else {
        serde_json::to_string_pretty(&payload)?
    };
    println!("{}", json);
    eprintln!(
        "[{:.3}s] {} rows x {} columns",
        start.elapsed().as_secs_f64(),
        payload.row_count,
        payload.columns.len()
    );
    Ok(())
}
