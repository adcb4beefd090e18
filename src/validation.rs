//! Input checks and derived fields applied before any model is touched.

use crate::{
    contract::FeatureContract,
    error::{RangeViolation, ValidationError},
    types::{fields, RaceEntryInput},
};

/// Fields every race entry must carry, whatever the contract says.
pub const BASE_REQUIRED: [&str; 10] = [
    fields::GRID_POSITION,
    fields::Q1,
    fields::Q2,
    fields::Q3,
    fields::YEAR,
    fields::ROUND,
    fields::LAPS,
    fields::CONSTRUCTOR_ENCODED,
    fields::TRACK_ENCODED,
    fields::POINTS,
];

/// Team and history aggregates; required only when the contract uses them.
pub const AGGREGATE_FIELDS: [&str; 5] = [
    fields::TEAM_SEASON_POINTS,
    fields::TEAM_AVG_POINTS,
    fields::RECENT_AVG_POSITION,
    fields::TRACK_EXPERIENCE,
    fields::AVG_TRACK_POSITION,
];

#[derive(Debug, Clone, Copy)]
pub struct FieldRange {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
}

/// Inclusive bounds: a 20-car grid, 10 constructors, 22 tracks.
pub const RANGES: [FieldRange; 3] = [
    FieldRange {
        field: fields::GRID_POSITION,
        min: 1.0,
        max: 20.0,
    },
    FieldRange {
        field: fields::CONSTRUCTOR_ENCODED,
        min: 0.0,
        max: 9.0,
    },
    FieldRange {
        field: fields::TRACK_ENCODED,
        min: 0.0,
        max: 21.0,
    },
];

pub fn required_fields(contract: &FeatureContract) -> Vec<&'static str> {
    BASE_REQUIRED
        .iter()
        .chain(AGGREGATE_FIELDS.iter().filter(|f| contract.contains(f)))
        .copied()
        .collect()
}

/// Check presence, type and range of every field the models depend on.
/// Collects every problem rather than stopping at the first.
pub fn validate(entry: &RaceEntryInput, contract: &FeatureContract) -> Result<(), ValidationError> {
    let mut err = ValidationError::default();

    for field in required_fields(contract) {
        if entry.is_non_numeric(field) {
            err.non_numeric.push(field.to_string());
        } else if !entry.contains(field) {
            err.missing.push(field.to_string());
        }
    }

    for field in &contract.feature_columns {
        let listed = err.non_numeric.iter().any(|f| f == field);
        if !listed && entry.is_non_numeric(field) {
            err.non_numeric.push(field.clone());
        }
    }

    let mut numeric_fields: Vec<&str> = required_fields(contract);
    numeric_fields.extend(contract.feature_columns.iter().map(String::as_str));
    for field in numeric_fields {
        if let Some(v) = entry.get(field) {
            if !v.is_finite() && !err.non_numeric.iter().any(|f| f == field) {
                err.non_numeric.push(field.to_string());
            }
        }
    }

    for range in RANGES {
        if let Some(v) = entry.get(range.field) {
            if v.is_finite() && (v < range.min || v > range.max) {
                err.out_of_range.push(RangeViolation {
                    field: range.field.to_string(),
                    value: v,
                    min: range.min,
                    max: range.max,
                });
            }
        }
    }

    if err.is_empty() {
        Ok(())
    } else {
        Err(err)
    }
}

/// Best qualifying time when the caller did not supply one: the fastest
/// positive segment time, or Q1 when no segment time is positive.
pub fn best_quali_time(q1: f64, q2: f64, q3: f64) -> f64 {
    [q1, q2, q3]
        .into_iter()
        .filter(|t| *t > 0.0)
        .fold(None, |best: Option<f64>, t| Some(best.map_or(t, |b| b.min(t))))
        .unwrap_or(q1)
}

/// Fill in derived fields that are absent. Explicit values win.
pub fn derive_fields(entry: &mut RaceEntryInput) {
    if entry.contains(fields::BEST_QUALI_TIME) {
        return;
    }
    if let (Some(q1), Some(q2), Some(q3)) = (
        entry.get(fields::Q1),
        entry.get(fields::Q2),
        entry.get(fields::Q3),
    ) {
        entry.insert(fields::BEST_QUALI_TIME, best_quali_time(q1, q2, q3));
    }
}

/// Validate `entry` and return a copy with derived fields filled in.
pub fn prepare(
    entry: &RaceEntryInput,
    contract: &FeatureContract,
) -> Result<RaceEntryInput, ValidationError> {
    validate(entry, contract)?;
    let mut prepared = entry.clone();
    derive_fields(&mut prepared);
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ColumnKind;
    use std::collections::BTreeMap;

    fn contract() -> FeatureContract {
        let cols = [
            "GridPosition",
            "Q1_seconds",
            "Q2_seconds",
            "Q3_seconds",
            "BestQualiTime",
            "TeamSeasonPoints",
            "year",
            "round",
            "Points",
            "laps",
            "Constructor_encoded",
            "raceName_encoded",
        ];
        FeatureContract::derive(cols.iter().map(|c| (*c, ColumnKind::Numeric)), BTreeMap::new())
    }

    fn entry() -> RaceEntryInput {
        RaceEntryInput::new()
            .with("GridPosition", 4.0)
            .with("Q1_seconds", 82.5)
            .with("Q2_seconds", 81.9)
            .with("Q3_seconds", 81.4)
            .with("TeamSeasonPoints", 120.0)
            .with("year", 2023.0)
            .with("round", 7.0)
            .with("Points", 30.0)
            .with("laps", 57.0)
            .with("Constructor_encoded", 2.0)
            .with("raceName_encoded", 5.0)
    }

    #[test]
    fn complete_entry_passes() {
        assert!(validate(&entry(), &contract()).is_ok());
    }

    #[test]
    fn every_missing_field_is_named() {
        let mut e = entry();
        e.remove("GridPosition");
        e.remove("laps");
        e.remove("TeamSeasonPoints");
        let err = validate(&e, &contract()).unwrap_err();
        assert_eq!(err.missing, vec!["GridPosition", "laps", "TeamSeasonPoints"]);
    }

    #[test]
    fn aggregates_outside_the_contract_are_optional() {
        let required = required_fields(&contract());
        assert!(required.contains(&"TeamSeasonPoints"));
        assert!(!required.contains(&"RecentAvgPosition"));
    }

    #[test]
    fn out_of_range_values_name_their_bound() {
        let e = entry()
            .with("Constructor_encoded", 15.0)
            .with("GridPosition", 0.0)
            .with("raceName_encoded", 22.0);
        let err = validate(&e, &contract()).unwrap_err();
        let fields: Vec<&str> = err.out_of_range.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["GridPosition", "Constructor_encoded", "raceName_encoded"]);
        assert_eq!(err.out_of_range[1].max, 9.0);
        assert!(err.to_string().contains("Constructor_encoded=15 outside [0, 9]"));
    }

    #[test]
    fn bounds_are_inclusive() {
        let e = entry()
            .with("GridPosition", 20.0)
            .with("Constructor_encoded", 9.0)
            .with("raceName_encoded", 0.0);
        assert!(validate(&e, &contract()).is_ok());
    }

    #[test]
    fn qualifying_times_are_required_not_defaulted() {
        let mut e = entry();
        e.remove("Q1_seconds");
        e.remove("Q2_seconds");
        e.remove("Q3_seconds");
        let err = validate(&e, &contract()).unwrap_err();
        assert_eq!(err.missing, vec!["Q1_seconds", "Q2_seconds", "Q3_seconds"]);
    }

    #[test]
    fn string_values_are_reported_as_non_numeric() {
        let json = serde_json::json!({ "GridPosition": "P4", "BestQualiTime": "fast" });
        let e: RaceEntryInput = serde_json::from_value(json).unwrap();
        let err = validate(&e, &contract()).unwrap_err();
        assert_eq!(err.non_numeric, vec!["GridPosition", "BestQualiTime"]);
        assert!(!err.missing.contains(&"GridPosition".to_string()));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let e = entry().with("Points", f64::NAN);
        let err = validate(&e, &contract()).unwrap_err();
        assert_eq!(err.non_numeric, vec!["Points"]);
    }

    #[test]
    fn best_quali_time_uses_fastest_positive_segment() {
        assert_eq!(best_quali_time(82.5, 0.0, 0.0), 82.5);
        assert_eq!(best_quali_time(82.5, 81.9, 0.0), 81.9);
        assert_eq!(best_quali_time(82.5, 81.9, 81.4), 81.4);
        assert_eq!(best_quali_time(0.0, 0.0, 0.0), 0.0);
        assert_eq!(best_quali_time(-1.0, 0.0, 0.0), -1.0);
    }

    #[test]
    fn explicit_best_quali_time_is_kept() {
        let e = entry().with("BestQualiTime", 90.0);
        let prepared = prepare(&e, &contract()).unwrap();
        assert_eq!(prepared.get("BestQualiTime"), Some(90.0));
    }

    #[test]
    fn prepare_derives_best_quali_time() {
        let e = entry()
            .with("Q1_seconds", 82.5)
            .with("Q2_seconds", 0.0)
            .with("Q3_seconds", 0.0);
        let prepared = prepare(&e, &contract()).unwrap();
        assert_eq!(prepared.get("BestQualiTime"), Some(82.5));
    }
}
