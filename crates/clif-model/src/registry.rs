//! Static table descriptors for the CLIF tables this toolkit consumes.
//!
//! One constructor per table, cached in a process-wide registry. The
//! descriptors define the loader's typed frame build and drive schema
//! validation; category columns carry their permissible value sets.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::schema::{ColumnSpec, DataType, TableSchema};

const LOCATION_CATEGORIES: &[&str] = &[
    "ed",
    "ward",
    "stepdown",
    "icu",
    "procedural",
    "l&d",
    "hospice",
    "psych",
    "rehab",
    "radiology",
    "dialysis",
    "other",
];

const VITAL_CATEGORIES: &[&str] = &[
    "temp_c",
    "heart_rate",
    "sbp",
    "dbp",
    "spo2",
    "respiratory_rate",
    "map",
    "height_cm",
    "weight_kg",
];

const LAB_CATEGORIES: &[&str] = &[
    "albumin",
    "alt",
    "ast",
    "basophils_percent",
    "bicarbonate",
    "bilirubin_total",
    "bun",
    "calcium_total",
    "chloride",
    "creatinine",
    "crp",
    "eosinophils_percent",
    "ferritin",
    "glucose_serum",
    "hemoglobin",
    "inr",
    "lactate",
    "lymphocytes_percent",
    "magnesium",
    "monocytes_percent",
    "neutrophils_percent",
    "pco2_arterial",
    "ph_arterial",
    "ph_venous",
    "phosphate",
    "platelet_count",
    "po2_arterial",
    "potassium",
    "pt",
    "ptt",
    "sodium",
    "so2_arterial",
    "troponin_i",
    "wbc",
];

const MED_CATEGORIES: &[&str] = &[
    "norepinephrine",
    "epinephrine",
    "phenylephrine",
    "vasopressin",
    "dopamine",
    "dobutamine",
    "milrinone",
    "isoproterenol",
    "angiotensin_ii",
    "nicardipine",
    "nitroprusside",
    "clevidipine",
    "propofol",
    "fentanyl",
    "midazolam",
    "dexmedetomidine",
    "ketamine",
    "hydromorphone",
    "morphine",
    "insulin",
    "heparin",
];

const ASSESSMENT_CATEGORIES: &[&str] = &[
    "gcs_total",
    "gcs_eye",
    "gcs_verbal",
    "gcs_motor",
    "rass",
    "cam_total",
    "braden_total",
    "nrs_pain",
    "sbt_delivery_pass_fail",
    "sat_delivery_pass_fail",
];

const DEVICE_CATEGORIES: &[&str] = &[
    "imv",
    "nippv",
    "cpap",
    "high flow nc",
    "face mask",
    "trach collar",
    "nasal cannula",
    "room air",
    "other",
];

const MODE_CATEGORIES: &[&str] = &[
    "assist control-volume control",
    "pressure control",
    "pressure-regulated volume control",
    "simv",
    "pressure support/cpap",
    "volume support",
    "blow by",
    "other",
];

fn patient() -> TableSchema {
    TableSchema::new(
        "patient",
        vec![
            ColumnSpec::new("patient_id", DataType::Varchar)
                .required()
                .group(),
            ColumnSpec::new("race_name", DataType::Varchar),
            ColumnSpec::new("race_category", DataType::Varchar).category(&[
                "black or african american",
                "white",
                "american indian or alaska native",
                "asian",
                "native hawaiian or other pacific islander",
                "unknown",
                "other",
            ]),
            ColumnSpec::new("ethnicity_name", DataType::Varchar),
            ColumnSpec::new("ethnicity_category", DataType::Varchar).category(&[
                "hispanic",
                "non-hispanic",
                "unknown",
            ]),
            ColumnSpec::new("sex_name", DataType::Varchar),
            ColumnSpec::new("sex_category", DataType::Varchar).category(&[
                "male", "female", "unknown",
            ]),
            ColumnSpec::new("birth_date", DataType::Datetime),
            ColumnSpec::new("death_dttm", DataType::Datetime),
            ColumnSpec::new("language_name", DataType::Varchar),
            ColumnSpec::new("language_category", DataType::Varchar),
        ],
    )
}

fn hospitalization() -> TableSchema {
    TableSchema::new(
        "hospitalization",
        vec![
            ColumnSpec::new("hospitalization_id", DataType::Varchar)
                .required()
                .group(),
            ColumnSpec::new("patient_id", DataType::Varchar)
                .required()
                .group(),
            ColumnSpec::new("admission_dttm", DataType::Datetime).required(),
            ColumnSpec::new("discharge_dttm", DataType::Datetime).required(),
            ColumnSpec::new("age_at_admission", DataType::Integer),
            ColumnSpec::new("admission_type_name", DataType::Varchar),
            ColumnSpec::new("admission_type_category", DataType::Varchar),
            ColumnSpec::new("discharge_name", DataType::Varchar),
            ColumnSpec::new("discharge_category", DataType::Varchar).category(&[
                "home",
                "skilled nursing facility (snf)",
                "expired",
                "acute inpatient rehab facility",
                "hospice",
                "long term care hospital (ltach)",
                "acute care hospital",
                "group home",
                "psychiatric hospital",
                "against medical advice (ama)",
                "other",
            ]),
            ColumnSpec::new("zipcode_nine_digit", DataType::Varchar),
            ColumnSpec::new("zipcode_five_digit", DataType::Varchar),
        ],
    )
}

fn adt() -> TableSchema {
    TableSchema::new(
        "adt",
        vec![
            ColumnSpec::new("hospitalization_id", DataType::Varchar)
                .required()
                .group(),
            ColumnSpec::new("hospital_id", DataType::Varchar),
            ColumnSpec::new("in_dttm", DataType::Datetime).required(),
            ColumnSpec::new("out_dttm", DataType::Datetime).required(),
            ColumnSpec::new("location_name", DataType::Varchar),
            ColumnSpec::new("location_category", DataType::Varchar)
                .required()
                .category(LOCATION_CATEGORIES),
        ],
    )
}

fn vitals() -> TableSchema {
    let mut schema = TableSchema::new(
        "vitals",
        vec![
            ColumnSpec::new("hospitalization_id", DataType::Varchar)
                .required()
                .group(),
            ColumnSpec::new("recorded_dttm", DataType::Datetime).required(),
            ColumnSpec::new("vital_name", DataType::Varchar),
            ColumnSpec::new("vital_category", DataType::Varchar)
                .required()
                .category(VITAL_CATEGORIES),
            ColumnSpec::new("vital_value", DataType::Double).required(),
            ColumnSpec::new("meas_site_name", DataType::Varchar),
        ],
    );
    let mut units = BTreeMap::new();
    units.insert("temp_c".to_string(), "celsius".to_string());
    units.insert("heart_rate".to_string(), "bpm".to_string());
    units.insert("sbp".to_string(), "mmhg".to_string());
    units.insert("dbp".to_string(), "mmhg".to_string());
    units.insert("map".to_string(), "mmhg".to_string());
    units.insert("spo2".to_string(), "percent".to_string());
    units.insert("respiratory_rate".to_string(), "breaths_per_minute".to_string());
    units.insert("height_cm".to_string(), "cm".to_string());
    units.insert("weight_kg".to_string(), "kg".to_string());
    let mut ranges = BTreeMap::new();
    ranges.insert("temp_c".to_string(), (25.0, 44.0));
    ranges.insert("heart_rate".to_string(), (0.0, 300.0));
    ranges.insert("sbp".to_string(), (0.0, 300.0));
    ranges.insert("dbp".to_string(), (0.0, 200.0));
    ranges.insert("map".to_string(), (0.0, 250.0));
    ranges.insert("spo2".to_string(), (0.0, 100.0));
    ranges.insert("respiratory_rate".to_string(), (0.0, 80.0));
    ranges.insert("height_cm".to_string(), (30.0, 250.0));
    ranges.insert("weight_kg".to_string(), (0.3, 500.0));
    schema.vital_units = Some(units);
    schema.vital_ranges = Some(ranges);
    schema
}

fn labs() -> TableSchema {
    TableSchema::new(
        "labs",
        vec![
            ColumnSpec::new("hospitalization_id", DataType::Varchar)
                .required()
                .group(),
            ColumnSpec::new("lab_order_dttm", DataType::Datetime),
            ColumnSpec::new("lab_collect_dttm", DataType::Datetime),
            ColumnSpec::new("lab_result_dttm", DataType::Datetime).required(),
            ColumnSpec::new("lab_name", DataType::Varchar),
            ColumnSpec::new("lab_category", DataType::Varchar)
                .required()
                .category(LAB_CATEGORIES),
            ColumnSpec::new("lab_value", DataType::Varchar),
            ColumnSpec::new("lab_value_numeric", DataType::Double).required(),
            ColumnSpec::new("reference_unit", DataType::Varchar),
            ColumnSpec::new("lab_specimen_name", DataType::Varchar),
        ],
    )
}

fn medication_admin_continuous() -> TableSchema {
    TableSchema::new(
        "medication_admin_continuous",
        vec![
            ColumnSpec::new("hospitalization_id", DataType::Varchar)
                .required()
                .group(),
            ColumnSpec::new("admin_dttm", DataType::Datetime).required(),
            ColumnSpec::new("med_name", DataType::Varchar),
            ColumnSpec::new("med_category", DataType::Varchar)
                .required()
                .category(MED_CATEGORIES),
            ColumnSpec::new("med_route_name", DataType::Varchar),
            ColumnSpec::new("med_dose", DataType::Double).required(),
            ColumnSpec::new("med_dose_unit", DataType::Varchar).required(),
            ColumnSpec::new("mar_action_name", DataType::Varchar),
        ],
    )
}

fn patient_assessments() -> TableSchema {
    TableSchema::new(
        "patient_assessments",
        vec![
            ColumnSpec::new("hospitalization_id", DataType::Varchar)
                .required()
                .group(),
            ColumnSpec::new("recorded_dttm", DataType::Datetime).required(),
            ColumnSpec::new("assessment_name", DataType::Varchar),
            ColumnSpec::new("assessment_category", DataType::Varchar)
                .required()
                .category(ASSESSMENT_CATEGORIES),
            ColumnSpec::new("numerical_value", DataType::Double),
            ColumnSpec::new("categorical_value", DataType::Varchar),
            ColumnSpec::new("text_value", DataType::Varchar),
        ],
    )
}

fn respiratory_support() -> TableSchema {
    TableSchema::new(
        "respiratory_support",
        vec![
            ColumnSpec::new("hospitalization_id", DataType::Varchar)
                .required()
                .group(),
            ColumnSpec::new("recorded_dttm", DataType::Datetime).required(),
            ColumnSpec::new("device_name", DataType::Varchar),
            ColumnSpec::new("device_category", DataType::Varchar).category(DEVICE_CATEGORIES),
            ColumnSpec::new("mode_name", DataType::Varchar),
            ColumnSpec::new("mode_category", DataType::Varchar).category(MODE_CATEGORIES),
            ColumnSpec::new("tracheostomy", DataType::Boolean),
            ColumnSpec::new("fio2_set", DataType::Double),
            ColumnSpec::new("lpm_set", DataType::Double),
            ColumnSpec::new("tidal_volume_set", DataType::Double),
            ColumnSpec::new("resp_rate_set", DataType::Double),
            ColumnSpec::new("pressure_control_set", DataType::Double),
            ColumnSpec::new("pressure_support_set", DataType::Double),
            ColumnSpec::new("peep_set", DataType::Double),
            ColumnSpec::new("resp_rate_obs", DataType::Double),
            ColumnSpec::new("plateau_pressure_obs", DataType::Double),
            ColumnSpec::new("peak_inspiratory_pressure_obs", DataType::Double),
            ColumnSpec::new("minute_vent_obs", DataType::Double),
            ColumnSpec::new("mean_airway_pressure_obs", DataType::Double),
        ],
    )
}

static REGISTRY: OnceLock<BTreeMap<&'static str, TableSchema>> = OnceLock::new();

fn build_registry() -> BTreeMap<&'static str, TableSchema> {
    let mut map = BTreeMap::new();
    map.insert("patient", patient());
    map.insert("hospitalization", hospitalization());
    map.insert("adt", adt());
    map.insert("vitals", vitals());
    map.insert("labs", labs());
    map.insert("medication_admin_continuous", medication_admin_continuous());
    map.insert("patient_assessments", patient_assessments());
    map.insert("respiratory_support", respiratory_support());
    map
}

/// Look up the descriptor for a table by its CLIF name.
pub fn schema_for(table_name: &str) -> Option<&'static TableSchema> {
    REGISTRY.get_or_init(build_registry).get(table_name)
}

/// All table names known to the registry.
pub fn known_tables() -> Vec<&'static str> {
    REGISTRY.get_or_init(build_registry).keys().copied().collect()
}
