use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::target::Target;

/// Column names shared by the trainer, the contract and the front-ends.
pub mod fields {
    pub const POSITION: &str = "Position";
    pub const GRID_POSITION: &str = "GridPosition";
    pub const POSITIONS_GAINED: &str = "PositionsGained";
    pub const Q1: &str = "Q1_seconds";
    pub const Q2: &str = "Q2_seconds";
    pub const Q3: &str = "Q3_seconds";
    pub const BEST_QUALI_TIME: &str = "BestQualiTime";
    pub const QUALIFYING_POSITION: &str = "QualifyingPosition";
    pub const RECENT_AVG_POSITION: &str = "RecentAvgPosition";
    pub const AVG_TRACK_POSITION: &str = "AvgTrackPosition";
    pub const TRACK_EXPERIENCE: &str = "TrackExperience";
    pub const TEAM_SEASON_POINTS: &str = "TeamSeasonPoints";
    pub const TEAM_AVG_POINTS: &str = "TeamAvgPoints";
    pub const CONSTRUCTOR: &str = "Constructor";
    pub const RACE_NAME: &str = "raceName";
    pub const STATUS: &str = "Status";
    pub const YEAR: &str = "year";
    pub const ROUND: &str = "round";
    pub const POINTS: &str = "Points";
    pub const LAPS: &str = "laps";
    pub const CONSTRUCTOR_ENCODED: &str = "Constructor_encoded";
    pub const TRACK_ENCODED: &str = "raceName_encoded";

    pub const ENCODED_SUFFIX: &str = "_encoded";
}

/// One driver's state for one race, as a flat name → number map.
///
/// Built from an arbitrary JSON object: numbers are kept, anything else
/// is remembered by key so validation can say the field was not numeric
/// instead of claiming it was missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "HashMap<String, Value>")]
pub struct RaceEntryInput {
    values: HashMap<String, f64>,
    non_numeric: BTreeSet<String>,
}

impl RaceEntryInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: f64) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: f64) {
        let field = field.into();
        self.non_numeric.remove(&field);
        self.values.insert(field, value);
    }

    pub fn remove(&mut self, field: &str) -> Option<f64> {
        self.non_numeric.remove(field);
        self.values.remove(field)
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn is_non_numeric(&self, field: &str) -> bool {
        self.non_numeric.contains(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<HashMap<String, Value>> for RaceEntryInput {
    fn from(map: HashMap<String, Value>) -> Self {
        let mut entry = RaceEntryInput::new();
        for (key, value) in map {
            match value.as_f64() {
                Some(v) => {
                    entry.values.insert(key, v);
                }
                None => {
                    entry.non_numeric.insert(key);
                }
            }
        }
        entry
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for RaceEntryInput {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut entry = RaceEntryInput::new();
        for (k, v) in iter {
            entry.insert(k, v);
        }
        entry
    }
}

/// Target → probability of the positive outcome, or `None` when that
/// target's model failed for this entry. Iterates in target order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionResult(BTreeMap<Target, Option<f64>>);

impl PredictionResult {
    pub fn insert(&mut self, target: Target, probability: Option<f64>) {
        self.0.insert(target, probability);
    }

    /// Outer `None`: target not served. Inner `None`: prediction failed.
    pub fn get(&self, target: Target) -> Option<Option<f64>> {
        self.0.get(&target).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Target, Option<f64>)> + '_ {
        self.0.iter().map(|(t, p)| (*t, *p))
    }

    pub fn targets(&self) -> Vec<Target> {
        self.0.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
