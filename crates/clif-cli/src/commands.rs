//! Subcommand implementations.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use polars::prelude::{
    CsvReadOptions, CsvWriter, DataFrame, ParquetReader, ParquetWriter, SerReader, SerWriter,
};
use tracing::warn;

use clif_core::{
    AggregationConfig, BaseTables, CohortSelector, OutputTarget, WideOptions, build_wide,
    convert_hourly, convert_vaso_units,
};
use clif_ingest::{LoadOptions, LoadedTable, TableFormat, load_table};
use clif_model::{ClifError, ValidationReport, known_tables, optional_table_names};

use crate::cli::{ConvertUnitsArgs, FormatArg, HourlyArgs, ValidateArgs, WideArgs};

impl FormatArg {
    fn to_table_format(self) -> TableFormat {
        match self {
            FormatArg::Parquet => TableFormat::Parquet,
            FormatArg::Csv => TableFormat::Csv,
        }
    }
}

fn parse_site_tz(raw: Option<&str>) -> Result<Option<Tz>> {
    match raw {
        None => Ok(None),
        Some(name) => {
            let tz = Tz::from_str(name).map_err(|e| anyhow::anyhow!("invalid timezone: {e}"))?;
            Ok(Some(tz))
        }
    }
}

fn load(
    table: &str,
    data_dir: &Path,
    format: TableFormat,
    site_tz: Option<Tz>,
) -> Result<LoadedTable> {
    let mut options = LoadOptions::new(table, data_dir, format);
    options.site_tz = site_tz;
    load_table(&options)
}

fn report_summary(report: &ValidationReport) {
    if report.issues.is_empty() {
        return;
    }
    warn!(
        table = report.table_name.as_str(),
        errors = report.error_count(),
        warnings = report.warning_count(),
        "validation findings"
    );
}

/// Parse repeated `table=cat1,cat2` flags.
fn parse_category_filters(raw: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut filters = BTreeMap::new();
    for entry in raw {
        let Some((table, list)) = entry.split_once('=') else {
            return Err(ClifError::Message(format!(
                "--categories expects table=cat1,cat2, got: {entry}"
            ))
            .into());
        };
        let categories: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect();
        filters.insert(table.trim().to_string(), categories);
    }
    Ok(filters)
}

pub fn run_wide(args: &WideArgs) -> Result<()> {
    let known = optional_table_names();
    for table in &args.tables {
        if !known.contains(&table.as_str()) {
            return Err(ClifError::Message(format!(
                "unknown optional table {table}; expected one of {}",
                known.join(", ")
            ))
            .into());
        }
    }

    let format = args.format.to_table_format();
    let site_tz = parse_site_tz(args.site_tz.as_deref())?;

    let patient = load("patient", &args.data_dir, format, site_tz)
        .context("required table patient")?;
    let hospitalization = load("hospitalization", &args.data_dir, format, site_tz)
        .context("required table hospitalization")?;
    let adt = load("adt", &args.data_dir, format, site_tz).context("required table adt")?;
    for loaded in [&patient, &hospitalization, &adt] {
        report_summary(&loaded.report);
    }

    let mut event_tables = BTreeMap::new();
    for table in &args.tables {
        match load(table, &args.data_dir, format, site_tz) {
            Ok(loaded) => {
                report_summary(&loaded.report);
                event_tables.insert(table.clone(), loaded.data);
            }
            Err(error) => warn!(table = table.as_str(), %error, "optional table not loaded"),
        }
    }

    let cohort = if !args.hospitalization_ids.is_empty() {
        CohortSelector::Ids(args.hospitalization_ids.clone())
    } else if let Some(size) = args.sample {
        CohortSelector::Sample(size)
    } else {
        CohortSelector::All
    };

    let options = WideOptions {
        optional_tables: args.tables.clone(),
        category_filters: parse_category_filters(&args.categories)?,
        cohort,
        base_table_columns: None,
        output: args.output_name.as_ref().map(|name| OutputTarget {
            dir: args.data_dir.clone(),
            filename: name.clone(),
            format: args.output_format.to_table_format(),
        }),
    };

    let base = BaseTables {
        patient: patient.data,
        hospitalization: hospitalization.data,
        adt: adt.data,
    };
    let wide = build_wide(&base, &event_tables, &options)?;
    println!("wide table: {} rows, {} columns", wide.height(), wide.width());
    Ok(())
}

pub fn run_hourly(args: &HourlyArgs) -> Result<()> {
    let wide = read_frame(&args.input)?;
    let config_text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("read {}", args.config.display()))?;
    let config: AggregationConfig =
        serde_json::from_str(&config_text).context("parse aggregation config")?;

    let mut hourly = convert_hourly(&wide, &config)?;
    write_frame(&mut hourly, &args.output)?;
    println!(
        "hourly table: {} rows, {} columns ({} wide rows in)",
        hourly.height(),
        hourly.width(),
        wide.height()
    );
    Ok(())
}

pub fn run_convert_units(args: &ConvertUnitsArgs) -> Result<()> {
    let format = args.format.to_table_format();
    let site_tz = parse_site_tz(args.site_tz.as_deref())?;

    let meds = load("medication_admin_continuous", &args.data_dir, format, site_tz)
        .context("required table medication_admin_continuous")?;
    let vitals = load("vitals", &args.data_dir, format, site_tz)
        .context("required table vitals")?;
    report_summary(&meds.report);
    report_summary(&vitals.report);

    let mut converted = convert_vaso_units(
        &meds.data,
        &vitals.data,
        &args.target_unit,
        &args.weight_category,
    )?;
    write_frame(&mut converted, &args.output)?;
    println!(
        "converted {} medication rows to {}",
        converted.height(),
        args.target_unit
    );
    Ok(())
}

pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let format = args.format.to_table_format();
    let tables: Vec<String> = if args.tables.is_empty() {
        known_tables().into_iter().map(String::from).collect()
    } else {
        args.tables.clone()
    };

    let mut reports: Vec<ValidationReport> = Vec::new();
    let mut total_errors = 0usize;
    for table in &tables {
        match load(table, &args.data_dir, format, None) {
            Ok(loaded) => {
                println!(
                    "{}: {} rows, {} errors, {} warnings",
                    table,
                    loaded.record_count(),
                    loaded.report.error_count(),
                    loaded.report.warning_count()
                );
                total_errors += loaded.report.error_count();
                reports.push(loaded.report);
            }
            Err(error) => {
                println!("{table}: not loaded ({error})");
            }
        }
    }

    if let Some(json) = &args.json {
        let out = serde_json::to_string_pretty(&reports)?;
        if json == "-" {
            println!("{out}");
        } else {
            std::fs::write(json, out)?;
            println!("wrote {json}");
        }
    }

    println!("{} table(s) checked, {} error(s)", reports.len(), total_errors);
    Ok(())
}

fn read_frame(path: &Path) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    match extension.as_str() {
        "parquet" => {
            let file =
                File::open(path).with_context(|| format!("open {}", path.display()))?;
            Ok(ParquetReader::new(file).finish()?)
        }
        "csv" => Ok(CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?),
        other => Err(ClifError::Unsupported(format!("input extension: {other}")).into()),
    }
}

fn write_frame(df: &mut DataFrame, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    match extension.as_str() {
        "csv" => {
            CsvWriter::new(file).include_header(true).finish(df)?;
        }
        _ => {
            ParquetWriter::new(file).finish(df)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_filter_parsing() {
        let filters = parse_category_filters(&[
            "vitals=heart_rate,map".to_string(),
            "labs=lactate".to_string(),
        ])
        .unwrap();
        assert_eq!(
            filters.get("vitals"),
            Some(&vec!["heart_rate".to_string(), "map".to_string()])
        );
        assert_eq!(filters.get("labs"), Some(&vec!["lactate".to_string()]));
        assert!(parse_category_filters(&["vitals".to_string()]).is_err());
    }
}
