//! smelter: Convert a categorized JSON event stream into per-category tables
//!
//! Usage:
//!   # CSV tables into ./output
//!   smelter events.jsonl
//!
//!   # MySQL script with prefixed table names
//!   smelter -t sql --sql-database mysql --sql-table-prefix ga_ events.jsonl
//!
//!   # Custom categories, 8 workers
//!   smelter --schema categories.json -j 8 -d tables events.jsonl

// Use MiMalloc allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use smelter::{OutputMode, Processor, SchemaRegistry, SmeltConfig, SqlDialect};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "smelter")]
#[command(
    about = "Flatten categorized JSON events into per-category CSV or SQL tables",
    long_about = None
)]
struct Args {
    /// Newline-delimited JSON input (already decompressed)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output type: csv or sql
    #[arg(short = 't', long = "type", default_value = "csv")]
    output: OutputMode,

    /// Output directory
    #[arg(short = 'd', long = "dir", default_value = "output")]
    output_dir: PathBuf,

    /// Keep timestamps as epoch seconds in CSV output
    #[arg(long)]
    csv_no_conv_timestamp: bool,

    /// Emit TEXT columns instead of sized VARCHARs
    #[arg(long)]
    sql_text_as_text: bool,

    /// Emit ALTER statements instead of CREATE TABLE, for existing databases
    #[arg(long)]
    sql_generate_alter: bool,

    /// DBMS to generate SQL for: postgres, sqlserver or mysql
    #[arg(long, default_value = "postgres")]
    sql_database: SqlDialect,

    /// Prefix for SQL table names
    #[arg(long, default_value = "")]
    sql_table_prefix: String,

    /// Number of worker threads (and input shards)
    #[arg(short = 'j', long, default_value_t = 4)]
    jobs: usize,

    /// JSON file mapping categories to column paths (replaces the built-in catalogue)
    #[arg(long, value_name = "FILE")]
    schema: Option<PathBuf>,

    /// Dotted path of the field holding the event category
    #[arg(long, default_value = "data.category")]
    category_field: String,

    /// Directory for temporary shard buffers
    #[arg(long, value_name = "DIR")]
    spool_dir: Option<PathBuf>,

    /// Don't draw the progress spinner
    #[arg(long)]
    no_progress: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let schemas = match &args.schema {
        Some(path) => SchemaRegistry::from_json_file(path)?,
        None => SchemaRegistry::game_analytics()?,
    };

    let config = SmeltConfig {
        output: args.output,
        output_dir: args.output_dir,
        csv_convert_timestamps: !args.csv_no_conv_timestamp,
        sql_table_prefix: args.sql_table_prefix,
        sql_text_as_varchar: !args.sql_text_as_text,
        sql_generate_alter: args.sql_generate_alter,
        sql_dialect: args.sql_database,
        concurrency: args.jobs,
        category_field: args.category_field,
        spool_dir: args.spool_dir,
        show_progress: !args.no_progress && std::io::stderr().is_terminal(),
        ..SmeltConfig::default()
    };

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    match config.output {
        OutputMode::Sql => info!(dialect = %config.sql_dialect, "outputting using sql outputter"),
        OutputMode::Csv => info!("outputting using csv outputter"),
    }
    info!(
        categories = ?schemas.categories(),
        jobs = config.concurrency,
        "registered event categories"
    );

    let processor = Processor::new(config, schemas)?;
    processor
        .process_file(&args.input)
        .with_context(|| format!("Failed to process {}", args.input.display()))?;
    processor.finish().context("Failed to write output")?;

    Ok(())
}
