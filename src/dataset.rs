//! Cleaned historical race data loading and preprocessing
//!
//! Reads the processed results CSV (one row per driver per race), keeps the
//! modelling columns, drops incomplete rows and label-encodes the nominal
//! columns so every feature is numeric.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::Read,
    path::Path,
};

use crate::{
    contract::{ColumnKind, FeatureContract},
    error::{ArtifactError, DatasetError},
    types::fields,
};

/// Columns the models are built from, in dataset order. The free-text
/// finishing `Status` is left out: it is only known after the race.
pub const DEFAULT_SELECTED_COLUMNS: [&str; 19] = [
    fields::GRID_POSITION,
    fields::POSITION,
    fields::POSITIONS_GAINED,
    fields::Q1,
    fields::Q2,
    fields::Q3,
    fields::BEST_QUALI_TIME,
    fields::QUALIFYING_POSITION,
    fields::RECENT_AVG_POSITION,
    fields::AVG_TRACK_POSITION,
    fields::TRACK_EXPERIENCE,
    fields::TEAM_SEASON_POINTS,
    fields::TEAM_AVG_POINTS,
    fields::CONSTRUCTOR,
    fields::RACE_NAME,
    fields::YEAR,
    fields::ROUND,
    fields::POINTS,
    fields::LAPS,
];

pub const DEFAULT_CATEGORICAL_COLUMNS: [&str; 2] = [fields::CONSTRUCTOR, fields::RACE_NAME];

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub selected_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            selected_columns: DEFAULT_SELECTED_COLUMNS.iter().map(|s| s.to_string()).collect(),
            categorical_columns: DEFAULT_CATEGORICAL_COLUMNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn kind(&self) -> ColumnKind {
        match self.data {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }
}

/// Cleaned, fully numeric-or-text table with no missing cells.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: usize,
    category_levels: BTreeMap<String, Vec<String>>,
}

impl Dataset {
    pub fn from_csv<P: AsRef<Path>>(path: P, config: &DatasetConfig) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|source| ArtifactError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_reader(reader, config)
    }

    pub fn from_csv_str(content: &str, config: &DatasetConfig) -> Result<Self, DatasetError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());
        Self::from_reader(reader, config)
    }

    fn from_reader<R: Read>(mut reader: csv::Reader<R>, config: &DatasetConfig) -> Result<Self, DatasetError> {
        let header = reader.headers().map_err(csv_error)?.clone();
        if header.iter().all(|h| h.trim().is_empty()) {
            return Err(DatasetError::MissingHeader);
        }

        // Keep only the selected columns that exist, in selection order.
        let selected: Vec<(String, usize)> = config
            .selected_columns
            .iter()
            .filter_map(|name| {
                header
                    .iter()
                    .position(|h| h.trim() == name)
                    .map(|idx| (name.clone(), idx))
            })
            .collect();
        tracing::info!(
            "using {} of {} selected columns: {:?}",
            selected.len(),
            config.selected_columns.len(),
            selected.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>()
        );
        if !selected.iter().any(|(n, _)| n == fields::POSITION) {
            return Err(DatasetError::MissingColumn(fields::POSITION.to_string()));
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); selected.len()];
        let mut total = 0usize;
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            total += 1;
            let values: Option<Vec<&str>> = selected.iter().map(|(_, idx)| record.get(*idx)).collect();
            let Some(values) = values else { continue };
            if values.iter().any(|v| is_missing(v)) {
                continue;
            }
            for (col, value) in cells.iter_mut().zip(values) {
                col.push(value.to_string());
            }
        }

        let rows = cells.first().map_or(0, Vec::len);
        tracing::info!("loaded {} rows, {} after removing missing values", total, rows);
        if rows == 0 {
            return Err(DatasetError::Empty);
        }

        let mut columns: Vec<Column> = selected
            .into_iter()
            .zip(cells)
            .map(|((name, _), raw)| {
                let data = parse_column(&name, raw);
                Column { name, data }
            })
            .collect();

        let mut category_levels = BTreeMap::new();
        for name in &config.categorical_columns {
            let Some(col) = columns.iter().find(|c| &c.name == name) else {
                continue;
            };
            tracing::info!("encoding {}", name);
            let (codes, levels) = label_encode(&col.data);
            let encoded = format!("{name}{}", fields::ENCODED_SUFFIX);
            category_levels.insert(encoded.clone(), levels);
            columns.push(Column {
                name: encoded,
                data: ColumnData::Numeric(codes),
            });
        }

        Ok(Self {
            columns,
            rows,
            category_levels,
        })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_kinds(&self) -> impl Iterator<Item = (&str, ColumnKind)> {
        self.columns.iter().map(|c| (c.name.as_str(), c.kind()))
    }

    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find(|c| c.name == name).and_then(|c| match &c.data {
            ColumnData::Numeric(v) => Some(v.as_slice()),
            ColumnData::Text(_) => None,
        })
    }

    pub fn category_levels(&self) -> &BTreeMap<String, Vec<String>> {
        &self.category_levels
    }

    /// Feature contract implied by this dataset's columns.
    pub fn feature_contract(&self) -> FeatureContract {
        FeatureContract::derive(self.column_kinds(), self.category_levels.clone())
    }

    /// Row-major feature matrix in contract column order.
    pub fn feature_matrix(&self, contract: &FeatureContract) -> Result<Vec<Vec<f64>>, DatasetError> {
        let cols: Vec<&[f64]> = contract
            .feature_columns
            .iter()
            .map(|name| {
                self.numeric(name)
                    .ok_or_else(|| DatasetError::MissingColumn(name.clone()))
            })
            .collect::<Result<_, _>>()?;
        Ok((0..self.rows)
            .map(|r| cols.iter().map(|c| c[r]).collect())
            .collect())
    }
}

/// Reproducible shuffled split into (train, test) row indices. The test
/// share is rounded up, so any non-zero fraction holds out at least one row.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
    let n_test = n_test.min(n);
    let train = indices.split_off(n_test);
    (train, indices)
}

/// Qualifying time in seconds from `m:ss.sss` or plain seconds.
pub fn parse_lap_time(s: &str) -> Option<f64> {
    let s = s.trim().trim_matches('"').trim();
    match s.split_once(':') {
        Some((minutes, rest)) => {
            let minutes: f64 = minutes.trim().parse().ok()?;
            let seconds: f64 = rest.trim().parse().ok()?;
            Some(minutes * 60.0 + seconds)
        }
        None => s.parse().ok(),
    }
}

fn is_missing(s: &str) -> bool {
    matches!(
        s.trim(),
        "" | "nan" | "NaN" | "NA" | "N/A" | "null" | "None" | "\\N"
    )
}

fn is_time_column(name: &str) -> bool {
    name.ends_with("_seconds") || name == fields::BEST_QUALI_TIME
}

fn parse_column(name: &str, raw: Vec<String>) -> ColumnData {
    let parsed: Option<Vec<f64>> = raw
        .iter()
        .map(|s| {
            if is_time_column(name) {
                parse_lap_time(s)
            } else {
                s.trim().parse::<f64>().ok()
            }
        })
        .collect();
    match parsed {
        Some(values) => ColumnData::Numeric(values),
        None => ColumnData::Text(raw),
    }
}

/// Codes are indices into the sorted distinct values.
fn label_encode(data: &ColumnData) -> (Vec<f64>, Vec<String>) {
    let raw: Vec<String> = match data {
        ColumnData::Text(v) => v.clone(),
        ColumnData::Numeric(v) => v.iter().map(|x| x.to_string()).collect(),
    };
    let levels: Vec<String> = raw
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let codes = raw
        .iter()
        .map(|v| levels.binary_search(v).unwrap_or_default() as f64)
        .collect();
    (codes, levels)
}

/// Rows must be as wide as the header; report which line is not.
pub(crate) fn csv_error(err: csv::Error) -> DatasetError {
    if let csv::ErrorKind::UnequalLengths {
        pos,
        expected_len,
        len,
    } = err.kind()
    {
        return DatasetError::RaggedRow {
            line: pos.as_ref().map_or(0, |p| p.line() as usize),
            expected: *expected_len as usize,
            got: *len as usize,
        };
    }
    DatasetError::Csv(err)
}
