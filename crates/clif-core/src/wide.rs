//! Wide event-table builder.
//!
//! Unifies the event timestamps of every selected source onto one temporal
//! axis per hospitalization, pivots the long-form sources into one column
//! per category, and joins everything through the minute-granular
//! `combo_id` key. One output row per `(hospitalization_id, event_time)`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::{AnyValue, Column, CsvWriter, DataFrame, ParquetWriter, SerWriter};
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use clif_ingest::TableFormat;
use clif_model::{ClifError, EventSource, EventSourceKind, event_source_for};

use crate::column::{CellValue, ColumnData};
use crate::combo::{combo_id, hosp_day_key, truncate_to_minute};
use crate::frame::{
    column_names, datetime_column, filter_rows, has_column, numeric_column_f64,
    opt_string_column, string_column,
};

/// Hard cap on the random-sample cohort mode.
const SAMPLE_LIMIT: usize = 20;

/// Which hospitalizations the build covers.
#[derive(Debug, Clone, Default)]
pub enum CohortSelector {
    /// Every hospitalization in the loaded table.
    #[default]
    All,
    /// An explicit id list; ids without a hospitalization row contribute
    /// nothing.
    Ids(Vec<String>),
    /// A uniform random sample without replacement, capped at 20.
    Sample(usize),
}

/// Where to persist the built table, if anywhere.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub dir: PathBuf,
    pub filename: String,
    pub format: TableFormat,
}

#[derive(Debug, Clone, Default)]
pub struct WideOptions {
    /// Optional event tables to include, in join order.
    pub optional_tables: Vec<String>,
    /// Per-table category restrictions; for respiratory_support the values
    /// are column names to keep. Entries for tables outside
    /// `optional_tables` are ignored.
    pub category_filters: BTreeMap<String, Vec<String>>,
    pub cohort: CohortSelector,
    /// Per-base-table column projections; identity columns are always
    /// re-added.
    pub base_table_columns: Option<BTreeMap<String, Vec<String>>>,
    pub output: Option<OutputTarget>,
}

/// The three required base tables.
#[derive(Debug, Clone)]
pub struct BaseTables {
    pub patient: DataFrame,
    pub hospitalization: DataFrame,
    pub adt: DataFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Float,
    Text,
}

/// A pivoted source: observed output columns and first-wins cells keyed on
/// `combo_id`.
struct PivotResult {
    columns: BTreeMap<String, CellKind>,
    cells: BTreeMap<String, BTreeMap<String, CellValue>>,
}

/// A wide (non-pivoted) source joined row-for-row on `combo_id`,
/// first-wins when several rows share a key.
struct ComboJoin {
    df: DataFrame,
    columns: Vec<String>,
    index: BTreeMap<String, usize>,
}

/// Build the wide event table.
///
/// Fatal only when the base tables lack their identity columns; per-source
/// problems are logged and the source is skipped.
pub fn build_wide(
    base: &BaseTables,
    event_tables: &BTreeMap<String, DataFrame>,
    options: &WideOptions,
) -> Result<DataFrame> {
    for column in ["hospitalization_id", "patient_id"] {
        if !has_column(&base.hospitalization, column) {
            return Err(ClifError::MissingColumn {
                table: "hospitalization".to_string(),
                column: column.to_string(),
            }
            .into());
        }
    }
    if !has_column(&base.patient, "patient_id") {
        return Err(ClifError::MissingColumn {
            table: "patient".to_string(),
            column: "patient_id".to_string(),
        }
        .into());
    }

    let cohort_ids = resolve_cohort(&base.hospitalization, &options.cohort)?;
    debug!(cohort = cohort_ids.len(), "cohort resolved");

    let patient = project_base(&base.patient, "patient", &["patient_id"], options)?;
    let hospitalization = project_base(
        &base.hospitalization,
        "hospitalization",
        &["hospitalization_id", "patient_id"],
        options,
    )?;
    let adt = project_base(&base.adt, "adt", &["hospitalization_id"], options)?;

    let hospitalization = filter_to_cohort(&hospitalization, &cohort_ids)?;
    let adt = filter_to_cohort(&adt, &cohort_ids)?;

    let base_cohort = join_base_cohort(&hospitalization, &patient)?;
    let base_ids = string_column(&base_cohort, "hospitalization_id")?;
    let mut base_index: BTreeMap<&str, usize> = BTreeMap::new();
    for (idx, id) in base_ids.iter().enumerate() {
        base_index.entry(id.as_str()).or_insert(idx);
    }

    // Event-time union, minute-truncated; sorted by (hospitalization_id,
    // event_time) which fixes the output row order.
    let mut event_times: BTreeSet<(String, NaiveDateTime)> = BTreeSet::new();

    let adt_join = if has_column(&adt, "in_dttm") {
        collect_event_times(&adt, "in_dttm", &mut event_times)?;
        Some(build_combo_join(
            &adt,
            "in_dttm",
            &["hospitalization_id", "patient_id"],
        )?)
    } else {
        warn!("adt table has no in_dttm column; location transfers contribute no events");
        None
    };

    let mut pivots: Vec<PivotResult> = Vec::new();
    let mut wide_joins: Vec<ComboJoin> = Vec::new();
    for table_name in &options.optional_tables {
        let Some(source) = event_source_for(table_name) else {
            warn!(table = table_name.as_str(), "unknown optional table; skipping");
            continue;
        };
        let Some(df) = event_tables.get(table_name) else {
            warn!(table = table_name.as_str(), "selected table not loaded; skipping");
            continue;
        };
        let df = filter_to_cohort(df, &cohort_ids)?;
        let columns = column_names(&df);
        let Some(ts_col) = source.resolve_timestamp(&columns) else {
            warn!(
                table = table_name.as_str(),
                "no recognized timestamp column; source excluded"
            );
            continue;
        };
        match source.kind {
            EventSourceKind::Pivot => {
                let filter = options.category_filters.get(table_name);
                let Some(pivot) = pivot_source(&df, source, ts_col, filter)? else {
                    continue;
                };
                collect_event_times(&df, ts_col, &mut event_times)?;
                pivots.push(pivot);
            }
            EventSourceKind::Wide => {
                collect_event_times(&df, ts_col, &mut event_times)?;
                let df = select_wide_columns(&df, ts_col, options.category_filters.get(table_name));
                wide_joins.push(build_combo_join(
                    &df,
                    ts_col,
                    &["hospitalization_id", ts_col],
                )?);
            }
        }
    }

    // Output column plan: base, event_time, location transfer, pivots,
    // wide sources; day columns appended after the scan.
    let mut names: Vec<String> = Vec::new();
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut builders: Vec<ColumnData> = Vec::new();

    // Derived column names are owned by the builder; a base column that
    // happens to reuse one is dropped rather than shadowed.
    let base_columns: Vec<String> = column_names(&base_cohort)
        .into_iter()
        .filter(|name| {
            let reserved =
                matches!(name.as_str(), "event_time" | "day_number" | "hosp_id_day_key");
            if reserved {
                warn!(column = name.as_str(), "base column shadows a derived column; dropping");
            }
            !reserved
        })
        .collect();
    for name in &base_columns {
        let dtype = base_cohort.column(name)?.dtype().clone();
        register(name, ColumnData::for_dtype(&dtype), &mut names, &mut builders, &mut used);
    }
    register("event_time", ColumnData::timestamp(), &mut names, &mut builders, &mut used);

    // Per-join bookkeeping: which output builder indexes a join feeds.
    let mut adt_plan: Vec<usize> = Vec::new();
    if let Some(join) = &adt_join {
        for column in &join.columns {
            let dtype = join.df.column(column)?.dtype().clone();
            if register(column, ColumnData::for_dtype(&dtype), &mut names, &mut builders, &mut used)
            {
                adt_plan.push(names.len() - 1);
            } else {
                adt_plan.push(usize::MAX);
            }
        }
    }

    let mut pivot_plans: Vec<Vec<(String, usize)>> = Vec::new();
    for pivot in &pivots {
        let mut plan = Vec::new();
        for (column, kind) in &pivot.columns {
            let builder = match kind {
                CellKind::Float => ColumnData::float(),
                CellKind::Text => ColumnData::text(),
            };
            if register(column, builder, &mut names, &mut builders, &mut used) {
                plan.push((column.clone(), names.len() - 1));
            }
        }
        pivot_plans.push(plan);
    }

    let mut wide_plans: Vec<Vec<usize>> = Vec::new();
    for join in &wide_joins {
        let mut plan = Vec::new();
        for column in &join.columns {
            let dtype = join.df.column(column)?.dtype().clone();
            if register(column, ColumnData::for_dtype(&dtype), &mut names, &mut builders, &mut used)
            {
                plan.push(names.len() - 1);
            } else {
                plan.push(usize::MAX);
            }
        }
        wide_plans.push(plan);
    }

    let event_time_idx = names.iter().position(|n| n == "event_time").unwrap();

    // Expansion scan: one output row per (hospitalization_id, event_time).
    let mut day_numbers: Vec<Option<i64>> = Vec::new();
    let mut day_keys: Vec<Option<String>> = Vec::new();
    let mut current_hosp: Option<&str> = None;
    let mut current_date: Option<NaiveDate> = None;
    let mut day_rank: i64 = 0;

    for (hosp, ts) in &event_times {
        let Some(&base_row) = base_index.get(hosp.as_str()) else {
            continue;
        };
        for (idx, name) in base_columns.iter().enumerate() {
            let value = base_cohort.column(name)?.get(base_row).unwrap_or(AnyValue::Null);
            builders[idx].push_any(value);
        }
        if let ColumnData::Timestamp(values) = &mut builders[event_time_idx] {
            values.push(Some(*ts));
        }

        let combo = combo_id(hosp, *ts);

        if let Some(join) = &adt_join {
            push_join_row(join, &adt_plan, &combo, &mut builders)?;
        }
        for (pivot, plan) in pivots.iter().zip(&pivot_plans) {
            let row_cells = pivot.cells.get(&combo);
            for (column, builder_idx) in plan {
                match row_cells.and_then(|cells| cells.get(column)) {
                    Some(cell) => builders[*builder_idx].push_cell(cell),
                    None => builders[*builder_idx].push_null(),
                }
            }
        }
        for (join, plan) in wide_joins.iter().zip(&wide_plans) {
            push_join_row(join, plan, &combo, &mut builders)?;
        }

        // Dense date rank; rows are already event-time sorted per
        // hospitalization, so the rank just advances on date changes.
        let date = ts.date();
        if current_hosp != Some(hosp.as_str()) {
            current_hosp = Some(hosp.as_str());
            current_date = Some(date);
            day_rank = 1;
        } else if current_date != Some(date) {
            current_date = Some(date);
            day_rank += 1;
        }
        day_numbers.push(Some(day_rank));
        day_keys.push(Some(hosp_day_key(hosp, day_rank)));
    }

    let height = day_numbers.len();
    let mut columns: Vec<Column> = Vec::with_capacity(names.len() + 2);
    for (name, mut builder) in names.iter().zip(builders) {
        builder.pad_to(height);
        columns.push(builder.finish(name));
    }
    columns.push(ColumnData::Int(day_numbers).finish("day_number"));
    columns.push(ColumnData::Text(day_keys).finish("hosp_id_day_key"));

    let mut df = DataFrame::new(columns)?;
    append_ghost_columns(&mut df, options)?;

    debug!(rows = df.height(), columns = df.width(), "wide dataset built");

    if let Some(target) = &options.output {
        let path = write_artifact(&mut df, target)?;
        debug!(path = %path.display(), "wide dataset written");
    }
    Ok(df)
}

/// Add an output column to the plan unless the name is already taken.
fn register(
    name: &str,
    builder: ColumnData,
    names: &mut Vec<String>,
    builders: &mut Vec<ColumnData>,
    used: &mut BTreeSet<String>,
) -> bool {
    if !used.insert(name.to_string()) {
        warn!(column = name, "duplicate output column name; keeping the first");
        return false;
    }
    names.push(name.to_string());
    builders.push(builder);
    true
}

fn resolve_cohort(
    hospitalization: &DataFrame,
    selector: &CohortSelector,
) -> Result<BTreeSet<String>> {
    let ids = string_column(hospitalization, "hospitalization_id")?;
    let mut distinct: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();
    for id in ids {
        if !id.is_empty() && seen.insert(id.clone()) {
            distinct.push(id);
        }
    }
    Ok(match selector {
        CohortSelector::All => distinct.into_iter().collect(),
        CohortSelector::Ids(list) => list.iter().cloned().collect(),
        CohortSelector::Sample(size) => {
            let take = (*size).min(SAMPLE_LIMIT).min(distinct.len());
            let mut rng = rand::thread_rng();
            distinct
                .choose_multiple(&mut rng, take)
                .cloned()
                .collect()
        }
    })
}

fn project_base(
    df: &DataFrame,
    table: &str,
    identity: &[&str],
    options: &WideOptions,
) -> Result<DataFrame> {
    let Some(requested) = options
        .base_table_columns
        .as_ref()
        .and_then(|m| m.get(table))
    else {
        return Ok(df.clone());
    };
    let mut keep: Vec<String> = Vec::new();
    for column in identity {
        if has_column(df, column) {
            keep.push((*column).to_string());
        }
    }
    for column in requested {
        if keep.iter().any(|k| k == column) {
            continue;
        }
        if has_column(df, column) {
            keep.push(column.clone());
        } else {
            warn!(
                table,
                column = column.as_str(),
                "base column filter names a column that does not exist; dropping"
            );
        }
    }
    Ok(df.select(keep)?)
}

fn filter_to_cohort(df: &DataFrame, cohort_ids: &BTreeSet<String>) -> Result<DataFrame> {
    if !has_column(df, "hospitalization_id") {
        return Ok(df.clone());
    }
    let ids = string_column(df, "hospitalization_id")?;
    let keep: Vec<bool> = ids.iter().map(|id| cohort_ids.contains(id)).collect();
    filter_rows(df, &keep)
}

fn join_base_cohort(hospitalization: &DataFrame, patient: &DataFrame) -> Result<DataFrame> {
    let patient_ids = string_column(patient, "patient_id")?;
    let mut patient_index: BTreeMap<&str, usize> = BTreeMap::new();
    for (idx, id) in patient_ids.iter().enumerate() {
        patient_index.entry(id.as_str()).or_insert(idx);
    }

    let hosp_columns = column_names(hospitalization);
    let patient_columns: Vec<String> = column_names(patient)
        .into_iter()
        .filter(|name| !hosp_columns.contains(name))
        .collect();

    let mut builders: Vec<(String, ColumnData)> = Vec::new();
    for name in &hosp_columns {
        let dtype = hospitalization.column(name)?.dtype().clone();
        builders.push((name.clone(), ColumnData::for_dtype(&dtype)));
    }
    for name in &patient_columns {
        let dtype = patient.column(name)?.dtype().clone();
        builders.push((name.clone(), ColumnData::for_dtype(&dtype)));
    }

    let link_ids = string_column(hospitalization, "patient_id")?;
    for row in 0..hospitalization.height() {
        let Some(&patient_row) = patient_index.get(link_ids[row].as_str()) else {
            continue;
        };
        for (offset, name) in hosp_columns.iter().enumerate() {
            let value = hospitalization.column(name)?.get(row).unwrap_or(AnyValue::Null);
            builders[offset].1.push_any(value);
        }
        for (offset, name) in patient_columns.iter().enumerate() {
            let value = patient.column(name)?.get(patient_row).unwrap_or(AnyValue::Null);
            builders[hosp_columns.len() + offset].1.push_any(value);
        }
    }

    let columns: Vec<Column> = builders
        .into_iter()
        .map(|(name, builder)| builder.finish(&name))
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn collect_event_times(
    df: &DataFrame,
    ts_col: &str,
    event_times: &mut BTreeSet<(String, NaiveDateTime)>,
) -> Result<()> {
    let ids = string_column(df, "hospitalization_id")?;
    let times = datetime_column(df, ts_col)?;
    for (id, ts) in ids.into_iter().zip(times) {
        if id.is_empty() {
            continue;
        }
        if let Some(ts) = ts {
            event_times.insert((id, truncate_to_minute(ts)));
        }
    }
    Ok(())
}

/// Hash-grouped first-wins pivot of a long-form source.
///
/// Returns `None` when the source is missing its category or value column
/// (it then contributes neither events nor columns). An empty result after
/// filtering is returned as-is; the ghost-column pass fills the requested
/// categories with nulls.
fn pivot_source(
    df: &DataFrame,
    source: &EventSource,
    ts_col: &str,
    filter: Option<&Vec<String>>,
) -> Result<Option<PivotResult>> {
    let table = source.table_name;
    let Some(category_col) = source.category_column else {
        return Ok(None);
    };
    if !has_column(df, category_col) {
        warn!(table, column = category_col, "category column missing; source excluded");
        return Ok(None);
    }
    let columns = column_names(df);
    let Some(value_col) = source.resolve_value(&columns) else {
        warn!(table, "value column missing; source excluded");
        return Ok(None);
    };

    let ids = string_column(df, "hospitalization_id")?;
    let categories = string_column(df, category_col)?;
    let times = datetime_column(df, ts_col)?;
    let values = numeric_column_f64(df, value_col)?;
    let aux: Vec<(&str, Vec<Option<String>>)> = source
        .aux_value_columns
        .iter()
        .filter(|(column, _)| has_column(df, column))
        .map(|(column, suffix)| Ok((*suffix, opt_string_column(df, column)?)))
        .collect::<Result<_>>()?;

    let allowed: Option<BTreeSet<&str>> = filter
        .filter(|list| !list.is_empty())
        .map(|list| list.iter().map(String::as_str).collect());
    if let Some(allowed) = &allowed {
        debug!(table, categories = allowed.len(), "category filter applied");
    }

    let mut result = PivotResult {
        columns: BTreeMap::new(),
        cells: BTreeMap::new(),
    };
    for idx in 0..df.height() {
        let Some(ts) = times[idx] else {
            continue;
        };
        let category = categories[idx].as_str();
        if category.is_empty() {
            continue;
        }
        if let Some(allowed) = &allowed {
            if !allowed.contains(category) {
                continue;
            }
        }
        let combo = combo_id(&ids[idx], truncate_to_minute(ts));
        result.columns.entry(category.to_string()).or_insert(CellKind::Float);
        if let Some(value) = values[idx] {
            result
                .cells
                .entry(combo.clone())
                .or_default()
                .entry(category.to_string())
                .or_insert(CellValue::Float(value));
        }
        for (suffix, aux_values) in &aux {
            let Some(text) = aux_values[idx].as_deref() else {
                continue;
            };
            let name = format!("{category}_{suffix}");
            result.columns.entry(name.clone()).or_insert(CellKind::Text);
            result
                .cells
                .entry(combo.clone())
                .or_default()
                .entry(name)
                .or_insert(CellValue::Text(text.to_string()));
        }
    }

    if result.cells.is_empty() {
        warn!(table, "pivot produced no rows after filtering");
    } else {
        debug!(
            table,
            combos = result.cells.len(),
            columns = result.columns.len(),
            "pivoted"
        );
    }
    Ok(Some(result))
}

/// Column filter for the already-wide respiratory-support table: the
/// category-filter entry lists columns to keep.
fn select_wide_columns(df: &DataFrame, ts_col: &str, filter: Option<&Vec<String>>) -> DataFrame {
    let Some(requested) = filter.filter(|list| !list.is_empty()) else {
        return df.clone();
    };
    let mut keep: Vec<String> = vec!["hospitalization_id".to_string(), ts_col.to_string()];
    for column in requested {
        if keep.iter().any(|k| k == column) {
            continue;
        }
        if has_column(df, column) {
            keep.push(column.clone());
        } else {
            warn!(column = column.as_str(), "requested column not found; dropping");
        }
    }
    df.select(keep).unwrap_or_else(|_| df.clone())
}

fn build_combo_join(df: &DataFrame, ts_col: &str, exclude: &[&str]) -> Result<ComboJoin> {
    let ids = string_column(df, "hospitalization_id")?;
    let times = datetime_column(df, ts_col)?;
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    for idx in 0..df.height() {
        let Some(ts) = times[idx] else {
            continue;
        };
        if ids[idx].is_empty() {
            continue;
        }
        let combo = combo_id(&ids[idx], truncate_to_minute(ts));
        index.entry(combo).or_insert(idx);
    }
    let columns: Vec<String> = column_names(df)
        .into_iter()
        .filter(|name| !exclude.contains(&name.as_str()))
        .collect();
    Ok(ComboJoin {
        df: df.clone(),
        columns,
        index,
    })
}

fn push_join_row(
    join: &ComboJoin,
    plan: &[usize],
    combo: &str,
    builders: &mut [ColumnData],
) -> Result<()> {
    let row = join.index.get(combo).copied();
    for (column, builder_idx) in join.columns.iter().zip(plan) {
        if *builder_idx == usize::MAX {
            continue;
        }
        match row {
            Some(row) => {
                let value = join.df.column(column)?.get(row).unwrap_or(AnyValue::Null);
                builders[*builder_idx].push_any(value);
            }
            None => builders[*builder_idx].push_null(),
        }
    }
    Ok(())
}

/// Categories the caller asked for that produced no column become all-null
/// columns, so downstream selections stay stable.
fn append_ghost_columns(df: &mut DataFrame, options: &WideOptions) -> Result<()> {
    let height = df.height();
    let existing: BTreeSet<String> = column_names(df).into_iter().collect();
    for (table, categories) in &options.category_filters {
        if !options.optional_tables.contains(table) {
            continue;
        }
        for category in categories {
            if existing.contains(category) {
                continue;
            }
            let mut builder = ColumnData::float();
            builder.pad_to(height);
            df.with_column(builder.finish(category))?;
            debug!(column = category.as_str(), "ghost column added");
        }
    }
    Ok(())
}

/// Persist the wide table next to the source data.
pub fn write_artifact(df: &mut DataFrame, target: &OutputTarget) -> Result<PathBuf> {
    let path = target
        .dir
        .join(format!("{}.{}", target.filename, target.format.extension()));
    let file = File::create(&path)
        .with_context(|| format!("create output: {}", path.display()))?;
    match target.format {
        TableFormat::Parquet => {
            ParquetWriter::new(file).finish(df)?;
        }
        TableFormat::Csv => {
            CsvWriter::new(file).include_header(true).finish(df)?;
        }
    }
    Ok(path)
}
