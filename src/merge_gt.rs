/*
cargo run --bin merge_gt -- \
    --main-file data/bird_interact_data.jsonl \
    --gt-file data/bird_interact_gt_kg_testcases.jsonl

cargo run --bin merge_gt -- \
    --main-file data/bird_interact_data.jsonl \
    --gt-file data/bird_interact_gt_kg_testcases.jsonl \
    --backup-file data/bird_interact_data_backup.jsonl \
    --log-dir logs
*/

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::{info, warn};
use serde_json::{Map, Value};
use simplelog::*;

// Fields overlaid from the ground-truth side whenever it carries a non-empty value
const GT_FIELDS: [&str; 3] = ["sol_sql", "external_knowledge", "test_cases"];

/// Overlay ground-truth fields onto the main benchmark file by `instance_id`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Main benchmark JSONL, overwritten in place with the merged result
    #[arg(short, long)]
    main_file: PathBuf,

    /// Ground-truth JSONL supplying sol_sql / external_knowledge / test_cases
    #[arg(short, long)]
    gt_file: PathBuf,

    /// Backup copy of the main file, taken before the overwrite
    /// (default: main file with a `_backup` stem suffix)
    #[arg(short, long)]
    backup_file: Option<PathBuf>,

    /// Scratch path the merged output is written to before the atomic rename
    /// (default: main file with a `_merged` stem suffix)
    #[arg(short, long)]
    output_file: Option<PathBuf>,

    /// Directory for the run log
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

impl Cli {
    fn backup_path(&self) -> PathBuf {
        self.backup_file
            .clone()
            .unwrap_or_else(|| sibling_with_suffix(&self.main_file, "_backup"))
    }

    fn scratch_path(&self) -> PathBuf {
        self.output_file
            .clone()
            .unwrap_or_else(|| sibling_with_suffix(&self.main_file, "_merged"))
    }
}

// data/foo.jsonl -> data/foo_backup.jsonl
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("data");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("jsonl");
    path.with_file_name(format!("{stem}{suffix}.{ext}"))
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

type Dataset = BTreeMap<String, Map<String, Value>>;

/// Load a JSONL file into a map keyed by `instance_id`.
///
/// Malformed lines and lines without an identifier are skipped with a
/// warning; blank lines are skipped silently. On duplicate identifiers
/// the last record in file order wins.
fn load_jsonl(path: &Path) -> Result<Dataset> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let mut data = Dataset::new();
    for (idx, line) in raw.lines().enumerate() {
        let line_num = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(
                    "line {} of {} is not a JSON object; skipped",
                    line_num,
                    path.display()
                );
                continue;
            }
            Err(e) => {
                warn!(
                    "could not parse line {} of {}: {}; skipped",
                    line_num,
                    path.display(),
                    e
                );
                continue;
            }
        };
        match record.get("instance_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => {
                data.insert(id.to_string(), record);
            }
            _ => warn!(
                "no instance_id in line {} of {}; skipped",
                line_num,
                path.display()
            ),
        }
    }
    Ok(data)
}

/// Merge one main record with its ground-truth counterpart.
///
/// Ground truth wins for each of `GT_FIELDS` when it holds a non-empty
/// value; everything else in the main record is preserved. The same rule
/// applies inside `follow_up`, but only when the main record already has a
/// `follow_up` object — otherwise ground-truth follow-up data is dropped.
fn merge_records(main: &Map<String, Value>, gt: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = main.clone();

    for field in GT_FIELDS {
        if let Some(gt_value) = gt.get(field) {
            if !is_empty_value(gt_value) {
                merged.insert(field.to_string(), gt_value.clone());
            }
        }
    }

    if let Some(gt_follow) = gt.get("follow_up").and_then(Value::as_object) {
        if !gt_follow.is_empty() {
            if let Some(Value::Object(target)) = merged.get_mut("follow_up") {
                for field in GT_FIELDS {
                    if let Some(gt_value) = gt_follow.get(field) {
                        if !is_empty_value(gt_value) {
                            target.insert(field.to_string(), gt_value.clone());
                        }
                    }
                }
            }
        }
    }

    merged
}

fn save_jsonl(data: &Dataset, path: &Path) -> Result<()> {
    let out = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(out);
    for record in data.values() {
        serde_json::to_writer(&mut writer, record)
            .with_context(|| format!("writing {}", path.display()))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug)]
struct MergeSummary {
    matches: usize,
    main_only: usize,
    gt_only: usize,
    total: usize,
}

fn run(cli: &Cli) -> Result<MergeSummary> {
    info!("loading main file {}", cli.main_file.display());
    let main_data = load_jsonl(&cli.main_file)?;
    info!("loaded {} records from main file", main_data.len());

    info!("loading ground-truth file {}", cli.gt_file.display());
    let gt_data = load_jsonl(&cli.gt_file)?;
    info!("loaded {} records from ground-truth file", gt_data.len());

    // backup must exist before anything destructive happens to the main file
    let backup_path = cli.backup_path();
    fs::copy(&cli.main_file, &backup_path).with_context(|| {
        format!(
            "backing up {} to {}",
            cli.main_file.display(),
            backup_path.display()
        )
    })?;
    info!("backup saved to {}", backup_path.display());

    let mut merged: Dataset = Dataset::new();
    let mut matches = 0usize;
    let mut main_only = 0usize;
    let mut gt_only = 0usize;

    for (id, main_rec) in &main_data {
        match gt_data.get(id) {
            Some(gt_rec) => {
                matches += 1;
                merged.insert(id.clone(), merge_records(main_rec, gt_rec));
            }
            None => {
                main_only += 1;
                warn!("instance_id '{id}' found only in main file");
                merged.insert(id.clone(), main_rec.clone());
            }
        }
    }
    for (id, gt_rec) in &gt_data {
        if !main_data.contains_key(id) {
            gt_only += 1;
            warn!("instance_id '{id}' found only in ground-truth file");
            merged.insert(id.clone(), gt_rec.clone());
        }
    }

    let summary = MergeSummary {
        matches,
        main_only,
        gt_only,
        total: merged.len(),
    };
    info!("merge statistics:");
    info!("  matched records: {}", summary.matches);
    info!("  main-only records: {}", summary.main_only);
    info!("  gt-only records: {}", summary.gt_only);
    info!("  total merged records: {}", summary.total);

    let scratch_path = cli.scratch_path();
    info!("saving merged data to {}", scratch_path.display());
    save_jsonl(&merged, &scratch_path)?;

    fs::rename(&scratch_path, &cli.main_file).with_context(|| {
        format!(
            "replacing {} with {}",
            cli.main_file.display(),
            scratch_path.display()
        )
    })?;

    info!("merge completed successfully");
    info!("original file backed up to {}", backup_path.display());
    info!("merged data saved to {}", cli.main_file.display());

    // spot check: first ground-truth id that also exists in main
    if matches > 0 {
        if let Some((id, gt_rec)) = gt_data.iter().find(|(id, _)| main_data.contains_key(*id)) {
            info!("example merge for instance_id '{id}':");
            for field in GT_FIELDS {
                let updated = gt_rec.get(field).map(|v| !is_empty_value(v)).unwrap_or(false);
                info!("  {} updated: {}", field, if updated { "yes" } else { "no" });
            }
        }
    }

    Ok(summary)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fs::create_dir_all(&cli.log_dir)
        .with_context(|| format!("creating {}", cli.log_dir.display()))?;
    let log_path = cli.log_dir.join(format!(
        "merge_{}.log",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            LevelFilter::Info,
            ConfigBuilder::new().build(),
            File::create(&log_path)
                .with_context(|| format!("creating {}", log_path.display()))?,
        ),
    ])?;

    run(&cli)?;
    Ok(())
}
