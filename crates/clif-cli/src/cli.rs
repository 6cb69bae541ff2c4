//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "clif",
    version,
    about = "CLIF event-table toolkit",
    long_about = "Build wide and hourly event tables from a CLIF data directory.\n\n\
                  The wide table carries one row per hospitalization per event\n\
                  minute with pivoted category columns; the hourly table reduces\n\
                  it into per-hour buckets."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the wide event table from a data directory.
    Wide(WideArgs),

    /// Aggregate a wide event table into hourly buckets.
    Hourly(HourlyArgs),

    /// Convert vasopressor doses into a canonical unit.
    ConvertUnits(ConvertUnitsArgs),

    /// Validate tables against the CLIF schema registry.
    Validate(ValidateArgs),
}

#[derive(Parser)]
pub struct WideArgs {
    /// Directory containing the clif_{table}.{parquet|csv} files.
    #[arg(value_name = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// Input file format.
    #[arg(long = "format", value_enum, default_value = "parquet")]
    pub format: FormatArg,

    /// IANA timezone the site's wall clocks run in (e.g. America/Chicago).
    #[arg(long = "site-tz", value_name = "TZ")]
    pub site_tz: Option<String>,

    /// Optional event table to include; repeatable.
    #[arg(long = "table", value_name = "NAME")]
    pub tables: Vec<String>,

    /// Category filter as table=cat1,cat2; repeatable.
    #[arg(long = "categories", value_name = "TABLE=LIST")]
    pub categories: Vec<String>,

    /// Restrict to a specific hospitalization id; repeatable.
    #[arg(long = "hospitalization-id", value_name = "ID")]
    pub hospitalization_ids: Vec<String>,

    /// Random sample of up to this many hospitalizations (max 20).
    #[arg(long = "sample", value_name = "N", conflicts_with = "hospitalization_ids")]
    pub sample: Option<usize>,

    /// Write the result into DATA_DIR under this filename stem.
    #[arg(long = "output-name", value_name = "NAME")]
    pub output_name: Option<String>,

    /// Output file format when writing.
    #[arg(long = "output-format", value_enum, default_value = "parquet")]
    pub output_format: FormatArg,
}

#[derive(Parser)]
pub struct HourlyArgs {
    /// Wide event table written by the wide subcommand.
    #[arg(value_name = "WIDE_FILE")]
    pub input: PathBuf,

    /// JSON aggregation spec mapping method names to column lists.
    #[arg(long = "config", value_name = "PATH")]
    pub config: PathBuf,

    /// Where to write the hourly table; extension picks the format.
    #[arg(long = "output", value_name = "PATH")]
    pub output: PathBuf,
}

#[derive(Parser)]
pub struct ConvertUnitsArgs {
    /// Directory containing the clif_{table}.{parquet|csv} files.
    #[arg(value_name = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// Input file format.
    #[arg(long = "format", value_enum, default_value = "parquet")]
    pub format: FormatArg,

    /// IANA timezone the site's wall clocks run in.
    #[arg(long = "site-tz", value_name = "TZ")]
    pub site_tz: Option<String>,

    /// Target dose unit (e.g. mcg/kg/min, units/hr).
    #[arg(long = "target-unit", value_name = "UNIT", default_value = "mcg/kg/min")]
    pub target_unit: String,

    /// Vital category holding the weight observations.
    #[arg(long = "weight-category", value_name = "CATEGORY", default_value = "weight_kg")]
    pub weight_category: String,

    /// Where to write the rewritten medication table.
    #[arg(long = "output", value_name = "PATH")]
    pub output: PathBuf,
}

#[derive(Parser)]
pub struct ValidateArgs {
    /// Directory containing the clif_{table}.{parquet|csv} files.
    #[arg(value_name = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// Input file format.
    #[arg(long = "format", value_enum, default_value = "parquet")]
    pub format: FormatArg,

    /// Table to validate; repeatable. Defaults to every known table.
    #[arg(long = "table", value_name = "NAME")]
    pub tables: Vec<String>,

    /// Write a machine-readable JSON report to this path. Use '-' for stdout.
    #[arg(long = "json", value_name = "PATH")]
    pub json: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Parquet,
    Csv,
}
