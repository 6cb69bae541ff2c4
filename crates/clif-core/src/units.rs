//! Vasopressor dose-unit conversion.
//!
//! Rewrites the dose and unit fields of continuous-infusion rows for a
//! closed set of vasoactive categories into a caller-chosen canonical
//! unit. Weight-normalized targets look the patient's weight up in the
//! vitals table, taking the observation closest in time to the
//! administration (ties go to the earlier one).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use clif_model::ClifError;
use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use tracing::warn;

use clif_model::event_source_for;

use crate::column::ColumnData;
use crate::frame::{
    datetime_column, has_column, numeric_column_f64, opt_string_column, string_column,
};

/// Categories the converter touches; all other rows pass through.
pub const VASOACTIVE_CATEGORIES: &[&str] = &[
    "norepinephrine",
    "epinephrine",
    "dopamine",
    "dobutamine",
    "phenylephrine",
    "vasopressin",
    "angiotensin_ii",
    "isoproterenol",
    "milrinone",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MassUnit {
    Mcg,
    Mg,
    /// International units; vasopressin only.
    Units,
}

impl MassUnit {
    /// Scale into micrograms; `Units` has no mass equivalent.
    fn in_mcg(&self) -> Option<f64> {
        match self {
            MassUnit::Mcg => Some(1.0),
            MassUnit::Mg => Some(1_000.0),
            MassUnit::Units => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            MassUnit::Mcg => "mcg",
            MassUnit::Mg => "mg",
            MassUnit::Units => "units",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBase {
    Minute,
    Hour,
}

impl TimeBase {
    fn as_str(&self) -> &'static str {
        match self {
            TimeBase::Minute => "min",
            TimeBase::Hour => "hr",
        }
    }
}

/// A parsed dose-rate unit such as `mcg/kg/min` or `units/hr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoseUnit {
    pub mass: MassUnit,
    pub per_weight: bool,
    pub per: TimeBase,
}

impl DoseUnit {
    pub fn weight_based(&self) -> bool {
        self.per_weight
    }
}

impl fmt::Display for DoseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.per_weight {
            write!(f, "{}/kg/{}", self.mass.as_str(), self.per.as_str())
        } else {
            write!(f, "{}/{}", self.mass.as_str(), self.per.as_str())
        }
    }
}

impl FromStr for DoseUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(' ', "");
        let parts: Vec<&str> = normalized.split('/').collect();
        let (mass_part, per_weight, time_part) = match parts.as_slice() {
            [mass, time] => (*mass, false, *time),
            [mass, "kg", time] => (*mass, true, *time),
            _ => return Err(format!("unrecognized dose unit: {s}")),
        };
        let mass = match mass_part {
            "mcg" | "ug" | "µg" => MassUnit::Mcg,
            "mg" => MassUnit::Mg,
            "units" | "unit" | "u" => MassUnit::Units,
            _ => return Err(format!("unrecognized dose unit: {s}")),
        };
        let per = match time_part {
            "min" | "minute" => TimeBase::Minute,
            "hr" | "hour" | "h" => TimeBase::Hour,
            _ => return Err(format!("unrecognized dose unit: {s}")),
        };
        if mass == MassUnit::Units && per_weight {
            return Err(format!("unrecognized dose unit: {s}"));
        }
        Ok(DoseUnit { mass, per_weight, per })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeightOp {
    None,
    DivideByWeight,
    MultiplyByWeight,
}

/// Composable conversion: multiplier plus the weight operation.
fn conversion(from: DoseUnit, to: DoseUnit) -> Option<(f64, WeightOp)> {
    let mass_factor = match (from.mass.in_mcg(), to.mass.in_mcg()) {
        (Some(from_mcg), Some(to_mcg)) => from_mcg / to_mcg,
        // units convert only to units
        (None, None) => 1.0,
        _ => return None,
    };
    let time_factor = match (from.per, to.per) {
        (TimeBase::Minute, TimeBase::Hour) => 60.0,
        (TimeBase::Hour, TimeBase::Minute) => 1.0 / 60.0,
        _ => 1.0,
    };
    let weight_op = match (from.per_weight, to.per_weight) {
        (false, true) => WeightOp::DivideByWeight,
        (true, false) => WeightOp::MultiplyByWeight,
        _ => WeightOp::None,
    };
    Some((mass_factor * time_factor, weight_op))
}

/// Per-hospitalization weight observations sorted by time.
struct WeightIndex {
    by_hospitalization: BTreeMap<String, Vec<(NaiveDateTime, f64)>>,
}

impl WeightIndex {
    fn build(vitals: &DataFrame, weight_category: &str) -> Result<Self> {
        let mut by_hospitalization: BTreeMap<String, Vec<(NaiveDateTime, f64)>> = BTreeMap::new();
        if vitals.height() == 0 {
            return Ok(Self { by_hospitalization });
        }
        let source = event_source_for("vitals")
            .context("vitals descriptor missing from registry")?;
        let columns = crate::frame::column_names(vitals);
        let Some(ts_col) = source.resolve_timestamp(&columns) else {
            warn!("vitals table has no recognized timestamp column; no weights available");
            return Ok(Self { by_hospitalization });
        };
        let ids = string_column(vitals, "hospitalization_id")?;
        let categories = string_column(vitals, "vital_category")?;
        let times = datetime_column(vitals, ts_col)?;
        let values = numeric_column_f64(vitals, "vital_value")?;
        for idx in 0..vitals.height() {
            if categories[idx] != weight_category {
                continue;
            }
            let (Some(ts), Some(value)) = (times[idx], values[idx]) else {
                continue;
            };
            by_hospitalization
                .entry(ids[idx].clone())
                .or_default()
                .push((ts, value));
        }
        for observations in by_hospitalization.values_mut() {
            observations.sort_by_key(|(ts, _)| *ts);
        }
        Ok(Self { by_hospitalization })
    }

    /// The observation closest in time to `at`; ties break toward the
    /// earlier observation.
    fn closest(&self, hospitalization_id: &str, at: NaiveDateTime) -> Option<f64> {
        let observations = self.by_hospitalization.get(hospitalization_id)?;
        let mut best: Option<(chrono::Duration, NaiveDateTime, f64)> = None;
        for (ts, value) in observations {
            let distance = (*ts - at).abs();
            let candidate = (distance, *ts, *value);
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    if candidate.0 < current.0
                        || (candidate.0 == current.0 && candidate.1 < current.1)
                    {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }
        best.map(|(_, _, value)| value)
    }
}

/// Rewrite `med_dose`/`med_dose_unit` of the vasoactive rows into the
/// target unit, appending a per-row `unit_conversion_applied` marker.
///
/// Non-vasoactive rows pass through with a null marker. Unknown source
/// units and missing weights null the dose and set the marker false; they
/// never abort the conversion.
pub fn convert_vaso_units(
    meds: &DataFrame,
    vitals: &DataFrame,
    target: &str,
    weight_category: &str,
) -> Result<DataFrame> {
    let target_unit: DoseUnit = target
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("parse target unit")?;
    for column in ["hospitalization_id", "med_category", "med_dose", "med_dose_unit"] {
        if !has_column(meds, column) {
            return Err(ClifError::MissingColumn {
                table: "medication_admin_continuous".to_string(),
                column: column.to_string(),
            }
            .into());
        }
    }
    let source = event_source_for("medication_admin_continuous")
        .context("medication descriptor missing from registry")?;
    let columns = crate::frame::column_names(meds);
    let Some(ts_col) = source.resolve_timestamp(&columns) else {
        return Err(ClifError::MissingColumn {
            table: "medication_admin_continuous".to_string(),
            column: "admin_dttm".to_string(),
        }
        .into());
    };

    let vaso: BTreeSet<&str> = VASOACTIVE_CATEGORIES.iter().copied().collect();
    let weights = WeightIndex::build(vitals, weight_category)?;

    let ids = string_column(meds, "hospitalization_id")?;
    let categories = string_column(meds, "med_category")?;
    let doses = numeric_column_f64(meds, "med_dose")?;
    let units = opt_string_column(meds, "med_dose_unit")?;
    let times = datetime_column(meds, ts_col)?;

    let mut out_doses: Vec<Option<f64>> = Vec::with_capacity(meds.height());
    let mut out_units: Vec<Option<String>> = Vec::with_capacity(meds.height());
    let mut applied: Vec<Option<bool>> = Vec::with_capacity(meds.height());
    let mut unknown_units: BTreeSet<String> = BTreeSet::new();

    for idx in 0..meds.height() {
        let category = categories[idx].as_str();
        if !vaso.contains(category) {
            out_doses.push(doses[idx]);
            out_units.push(units[idx].clone());
            applied.push(None);
            continue;
        }
        let unit_text = units[idx].as_deref().unwrap_or("");

        // Vasopressin doses stay in units; only the time base follows the
        // target.
        let row_target = if category == "vasopressin" {
            DoseUnit {
                mass: MassUnit::Units,
                per_weight: false,
                per: target_unit.per,
            }
        } else {
            target_unit
        };

        let source_unit = match unit_text.parse::<DoseUnit>() {
            Ok(unit) => unit,
            Err(_) => {
                if unknown_units.insert(unit_text.to_string()) {
                    warn!(unit = unit_text, "unknown dose unit; doses nulled");
                }
                out_doses.push(None);
                out_units.push(units[idx].clone());
                applied.push(Some(false));
                continue;
            }
        };

        if source_unit == row_target {
            out_doses.push(doses[idx]);
            out_units.push(Some(row_target.to_string()));
            applied.push(Some(true));
            continue;
        }

        let Some((multiplier, weight_op)) = conversion(source_unit, row_target) else {
            if unknown_units.insert(unit_text.to_string()) {
                warn!(
                    unit = unit_text,
                    category, "dose unit incompatible with target; doses nulled"
                );
            }
            out_doses.push(None);
            out_units.push(units[idx].clone());
            applied.push(Some(false));
            continue;
        };

        let weight = match weight_op {
            WeightOp::None => None,
            _ => {
                let Some(at) = times[idx] else {
                    out_doses.push(None);
                    out_units.push(units[idx].clone());
                    applied.push(Some(false));
                    continue;
                };
                match weights.closest(&ids[idx], at) {
                    Some(weight) if weight > 0.0 => Some(weight),
                    _ => {
                        out_doses.push(None);
                        out_units.push(units[idx].clone());
                        applied.push(Some(false));
                        continue;
                    }
                }
            }
        };

        let converted = doses[idx].map(|dose| {
            let scaled = dose * multiplier;
            match (weight_op, weight) {
                (WeightOp::DivideByWeight, Some(weight)) => scaled / weight,
                (WeightOp::MultiplyByWeight, Some(weight)) => scaled * weight,
                _ => scaled,
            }
        });
        out_doses.push(converted);
        out_units.push(Some(row_target.to_string()));
        applied.push(Some(true));
    }

    let mut result = meds.clone();
    result.with_column(ColumnData::Float(out_doses).finish("med_dose"))?;
    result.with_column(ColumnData::Text(out_units).finish("med_dose_unit"))?;
    result.with_column(ColumnData::Bool(applied).finish("unit_conversion_applied"))?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(s: &str) -> DoseUnit {
        s.parse().unwrap()
    }

    #[test]
    fn unit_parsing() {
        assert_eq!(
            unit("mcg/kg/min"),
            DoseUnit { mass: MassUnit::Mcg, per_weight: true, per: TimeBase::Minute }
        );
        assert_eq!(
            unit("mg/hr"),
            DoseUnit { mass: MassUnit::Mg, per_weight: false, per: TimeBase::Hour }
        );
        assert_eq!(
            unit("Units/HR"),
            DoseUnit { mass: MassUnit::Units, per_weight: false, per: TimeBase::Hour }
        );
        assert!("units/kg/min".parse::<DoseUnit>().is_err());
        assert!("ml/hr".parse::<DoseUnit>().is_err());
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(unit("MCG / KG / MIN").to_string(), "mcg/kg/min");
        assert_eq!(unit("u/min").to_string(), "units/min");
    }

    #[test]
    fn conversion_composes_mass_time_and_weight() {
        // mg/hr -> mcg/kg/min: x1000 for mass, /60 for time, divide by kg
        let (factor, op) = conversion(unit("mg/hr"), unit("mcg/kg/min")).unwrap();
        assert!((factor - 1000.0 / 60.0).abs() < 1e-9);
        assert_eq!(op, WeightOp::DivideByWeight);

        let (factor, op) = conversion(unit("mcg/kg/min"), unit("mcg/min")).unwrap();
        assert!((factor - 1.0).abs() < 1e-12);
        assert_eq!(op, WeightOp::MultiplyByWeight);

        let (factor, op) = conversion(unit("units/min"), unit("units/hr")).unwrap();
        assert!((factor - 60.0).abs() < 1e-12);
        assert_eq!(op, WeightOp::None);

        assert!(conversion(unit("units/min"), unit("mcg/min")).is_none());
    }
}
