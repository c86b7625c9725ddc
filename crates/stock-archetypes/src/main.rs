//! CLI entry point for building-stock archetype imputation.

use anyhow::{Result, anyhow};
use clap::Parser;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use stock_archetypes::{ArchetypePipeline, PipelineConfig, RunSummary, filter_by_substrings};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Fill missing building survey attributes from archetypes",
    long_about = "Groups dwellings by key columns, reduces each group to an archetype and \
                  fills missing values of a target column pass by pass.\n\n\
                  EXAMPLES:\n  \
                  # Run the passes in passes.json\n  \
                  stock-archetypes -i bers.csv -c passes.json\n\n  \
                  # Only Dublin records, written to a chosen file\n  \
                  stock-archetypes -i bers.csv -c passes.json -o dublin.csv \\\n    \
                  --filter-column countyname --select Dublin --universe Dublin Cork Galway\n\n  \
                  # Machine-readable summary\n  \
                  stock-archetypes -i bers.csv -c passes.json --json | jq .remaining_missing"
)]
struct Args {
    /// Path to the CSV file of survey records
    #[arg(short, long)]
    input: String,

    /// Path to the JSON pass configuration
    #[arg(short, long)]
    config: String,

    /// Path of the completed CSV
    ///
    /// Defaults to <input_name>_filled.csv next to the input
    #[arg(short, long)]
    output: Option<String>,

    /// Column to select records on before building archetypes
    #[arg(long, requires = "select")]
    filter_column: Option<String>,

    /// Substrings of --filter-column to keep (case-insensitive)
    #[arg(long, num_args = 1.., requires = "filter_column")]
    select: Vec<String>,

    /// Every recognised value of --filter-column; defaults to --select
    #[arg(long, num_args = 1..)]
    universe: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output the run summary as JSON on stdout instead of a human-readable summary
    ///
    /// Disables all logs; useful for piping: `... --json | jq .passes`
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only carries JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    if !Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    let config = PipelineConfig::from_json_file(&args.config)
        .map_err(|e| anyhow!("Could not load pass configuration {}: {}", args.config, e))?;
    info!(
        "Loaded {} passes for target '{}'",
        config.passes.len(),
        config.target_column
    );

    info!("Loading dataset from: {}", args.input);
    let mut data = load_csv_with_fallbacks(&args.input)?;
    info!("Dataset loaded successfully: {:?}", data.shape());

    if let Some(ref column) = args.filter_column {
        let universe = if args.universe.is_empty() {
            &args.select
        } else {
            &args.universe
        };
        data = filter_by_substrings(&data, column, &args.select, universe)?;
        info!("Selected {} records on '{}'", data.height(), column);
    }

    let mut builder = ArchetypePipeline::builder().config(config);
    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {} ({}): {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.archetype_name,
                update.message
            );
        });
    }
    let pipeline = builder.build()?;

    let result = match pipeline.run(&data) {
        Ok(result) => result,
        Err(e) => {
            error!("Archetype passes failed: {}", e);
            return Err(anyhow!("Archetype passes failed: {}", e));
        }
    };

    let output_path = args
        .output
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(&args.input));
    let mut completed = result.data;
    write_csv(&mut completed, &output_path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.summary)?);
        return Ok(());
    }

    print_human_readable_summary(&result.summary, &args.input, &output_path);
    Ok(())
}

/// `<dir>/<stem>_filled.csv` for an input at `<dir>/<stem>.csv`.
fn default_output_path(input: &str) -> PathBuf {
    let path = Path::new(input);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    path.with_file_name(format!("{}_filled.csv", stem))
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
            info!("Created output directory: {}", parent.display());
        }
    }

    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .with_quote_char(b'"')
        .finish(df)?;

    info!("Dataset saved: {}", path.display());
    Ok(())
}

/// Print a human-readable summary of the run.
fn print_human_readable_summary(summary: &RunSummary, input: &str, output: &Path) {
    println!();
    println!("{}", "=".repeat(80));
    println!("ARCHETYPE IMPUTATION COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!("Input:  {} ({} rows)", input, summary.rows);
    println!("Output: {}", output.display());
    println!("Target Column: {}", summary.target_column);
    println!("Duration: {}ms", summary.duration_ms);
    println!();

    println!(
        "{:<40} {:<12} {:<10} {:<10}",
        "Pass", "Archetypes", "Labelled", "Filled"
    );
    println!("{}", "-".repeat(72));
    for pass in &summary.passes {
        println!(
            "{:<40} {:<12} {:<10} {:<10}",
            truncate_str(&pass.archetype_name, 39),
            pass.archetypes_built,
            pass.rows_matched,
            pass.filled()
        );
    }
    println!();

    println!(
        "Missing values: {} -> {}",
        summary.missing_before, summary.remaining_missing
    );
    if summary.remaining_missing > 0 {
        println!("  ! Add a coarser pass to fill the remaining records");
    }
    println!();
    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Load CSV, retrying without quote handling if the first attempt fails
fn load_csv_with_fallbacks(path: &str) -> Result<DataFrame> {
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(1000))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Standard loading failed: {}", e);
        }
    }

    CsvReadOptions::default()
        .with_infer_schema_length(Some(1000))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(None))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
        .map_err(|e| anyhow!("Could not read {}: {}", path, e))
}
