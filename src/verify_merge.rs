/*
cargo run --bin verify_merge -- data/bird_interact_data.jsonl

cargo run --bin verify_merge -- --json data/bird_interact_data.jsonl
*/

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;
use serde::Serialize;
use serde_json::{Map, Value};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

/// Report field-population statistics for a merged benchmark JSONL file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSONL file to scan (never mutated)
    input: PathBuf,

    /// Emit the statistics as JSON instead of the human-readable report
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default, Serialize)]
struct MergeStats {
    total_records: usize,
    records_with_sol_sql: usize,
    records_with_empty_sol_sql: usize,
    records_with_external_knowledge: usize,
    records_with_empty_external_knowledge: usize,
    records_with_test_cases: usize,
    follow_up_with_sol_sql: usize,
    follow_up_with_external_knowledge: usize,
}

// Empty means null, "" or []. Zero and false stay meaningful values.
fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn has_value(record: &Map<String, Value>, field: &str) -> bool {
    record.get(field).map(|v| !is_empty_value(v)).unwrap_or(false)
}

/// Scan a JSONL file and tally how well the overlay fields are populated.
/// Malformed lines are skipped with a warning, same as during the merge.
fn collect_stats(path: &Path) -> Result<MergeStats> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let mut stats = MergeStats::default();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(
                    "line {} of {} is not a JSON object; skipped",
                    idx + 1,
                    path.display()
                );
                continue;
            }
            Err(e) => {
                warn!(
                    "could not parse line {} of {}: {}; skipped",
                    idx + 1,
                    path.display(),
                    e
                );
                continue;
            }
        };

        stats.total_records += 1;

        if has_value(&record, "sol_sql") {
            stats.records_with_sol_sql += 1;
        } else {
            stats.records_with_empty_sol_sql += 1;
        }

        if has_value(&record, "external_knowledge") {
            stats.records_with_external_knowledge += 1;
        } else {
            stats.records_with_empty_external_knowledge += 1;
        }

        if has_value(&record, "test_cases") {
            stats.records_with_test_cases += 1;
        }

        if let Some(follow) = record.get("follow_up").and_then(Value::as_object) {
            if !follow.is_empty() {
                if has_value(follow, "sol_sql") {
                    stats.follow_up_with_sol_sql += 1;
                }
                if has_value(follow, "external_knowledge") {
                    stats.follow_up_with_external_knowledge += 1;
                }
            }
        }
    }
    Ok(stats)
}

// 0 records must report 0.0%, not a division fault
fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

fn print_report(stats: &MergeStats) {
    println!("Merge Verification Results:");
    println!("{}", "=".repeat(40));
    println!("Total records: {}", stats.total_records);
    println!("Records with sol_sql: {}", stats.records_with_sol_sql);
    println!("Records with empty sol_sql: {}", stats.records_with_empty_sol_sql);
    println!(
        "Records with external_knowledge: {}",
        stats.records_with_external_knowledge
    );
    println!(
        "Records with empty external_knowledge: {}",
        stats.records_with_empty_external_knowledge
    );
    println!("Records with test_cases: {}", stats.records_with_test_cases);
    println!("Follow-up with sol_sql: {}", stats.follow_up_with_sol_sql);
    println!(
        "Follow-up with external_knowledge: {}",
        stats.follow_up_with_external_knowledge
    );

    let total = stats.total_records;
    println!();
    println!("Success Rates:");
    println!("{}", "=".repeat(20));
    println!(
        "sol_sql populated: {}/{} ({:.1}%)",
        stats.records_with_sol_sql,
        total,
        percent(stats.records_with_sol_sql, total)
    );
    println!(
        "external_knowledge populated: {}/{} ({:.1}%)",
        stats.records_with_external_knowledge,
        total,
        percent(stats.records_with_external_knowledge, total)
    );
    println!(
        "test_cases populated: {}/{} ({:.1}%)",
        stats.records_with_test_cases,
        total,
        percent(stats.records_with_test_cases, total)
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // diagnostics on stderr so --json output stays parseable
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    let stats = collect_stats(&cli.input)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_report(&stats);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_jsonl(lines: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        fs::write(&path, lines.join("\n")).unwrap();
        (dir, path)
    }

    #[test]
    fn counts_field_population() {
        let (_dir, path) = write_jsonl(&[
            r#"{"instance_id":"a","sol_sql":"SELECT 1","external_knowledge":"kg","test_cases":["t1"]}"#,
            r#"{"instance_id":"b","sol_sql":"","external_knowledge":null}"#,
            r#"{"instance_id":"c","sol_sql":"SELECT 2","follow_up":{"sol_sql":"SELECT 3","external_knowledge":""}}"#,
        ]);

        let stats = collect_stats(&path).unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.records_with_sol_sql, 2);
        assert_eq!(stats.records_with_empty_sol_sql, 1);
        assert_eq!(stats.records_with_external_knowledge, 1);
        assert_eq!(stats.records_with_empty_external_knowledge, 2);
        assert_eq!(stats.records_with_test_cases, 1);
        assert_eq!(stats.follow_up_with_sol_sql, 1);
        assert_eq!(stats.follow_up_with_external_knowledge, 0);
    }

    #[test]
    fn empty_file_reports_zero_rates() {
        let (_dir, path) = write_jsonl(&[]);

        let stats = collect_stats(&path).unwrap();
        assert_eq!(stats.total_records, 0);
        assert_eq!(percent(stats.records_with_sol_sql, stats.total_records), 0.0);
    }

    #[test]
    fn malformed_and_blank_lines_are_skipped() {
        let (_dir, path) = write_jsonl(&[
            r#"{"instance_id":"a","sol_sql":"SELECT 1"}"#,
            "not json",
            "",
            "[1,2,3]",
            r#"{"instance_id":"b"}"#,
        ]);

        let stats = collect_stats(&path).unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.records_with_sol_sql, 1);
        assert_eq!(stats.records_with_empty_sol_sql, 1);
    }

    #[test]
    fn zero_counts_as_populated() {
        let (_dir, path) = write_jsonl(&[r#"{"instance_id":"a","external_knowledge":0}"#]);

        let stats = collect_stats(&path).unwrap();
        assert_eq!(stats.records_with_external_knowledge, 1);
        assert_eq!(stats.records_with_empty_external_knowledge, 0);
    }

    #[test]
    fn empty_follow_up_object_tallies_nothing() {
        let (_dir, path) = write_jsonl(&[
            r#"{"instance_id":"a","follow_up":{}}"#,
            r#"{"instance_id":"b","follow_up":{"sol_sql":"SELECT 1"}}"#,
        ]);

        let stats = collect_stats(&path).unwrap();
        assert_eq!(stats.follow_up_with_sol_sql, 1);
        assert_eq!(stats.follow_up_with_external_knowledge, 0);
    }

    #[test]
    fn percent_rounds_to_one_decimal() {
        assert_eq!(format!("{:.1}%", percent(1, 3)), "33.3%");
        assert_eq!(format!("{:.1}%", percent(2, 3)), "66.7%");
        assert_eq!(format!("{:.1}%", percent(0, 0)), "0.0%");
    }

    #[test]
    fn stats_serialize_with_stable_keys() {
        let stats = MergeStats {
            total_records: 2,
            records_with_sol_sql: 1,
            ..MergeStats::default()
        };
        let v = serde_json::to_value(&stats).unwrap();
        assert_eq!(v["total_records"], json!(2));
        assert_eq!(v["records_with_sol_sql"], json!(1));
        assert_eq!(v["follow_up_with_external_knowledge"], json!(0));
    }
}
