//! The ordered feature schema shared by training and serving.

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};

use crate::{
    artifacts,
    error::{ArtifactError, ContractError, PredictError},
    types::{fields, RaceEntryInput},
};

/// Kind of a cleaned dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Exact column order the scalers and classifiers were fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContract {
    pub feature_columns: Vec<String>,
    pub categorical_encoded: Vec<String>,
    pub numeric_features: Vec<String>,
    /// Encoded column → original category values, indexed by code.
    #[serde(default)]
    pub category_levels: BTreeMap<String, Vec<String>>,
}

impl FeatureContract {
    /// Numeric columns first, then label-encoded columns, each in dataset
    /// order. The raw position label and the text sources of encoded
    /// columns never become features.
    pub fn derive<'a>(
        columns: impl IntoIterator<Item = (&'a str, ColumnKind)>,
        category_levels: BTreeMap<String, Vec<String>>,
    ) -> Self {
        let columns: Vec<(&str, ColumnKind)> = columns.into_iter().collect();
        let names: HashSet<&str> = columns.iter().map(|(n, _)| *n).collect();

        let categorical_encoded: Vec<String> = columns
            .iter()
            .filter(|(n, _)| n.ends_with(fields::ENCODED_SUFFIX))
            .map(|(n, _)| n.to_string())
            .collect();

        let numeric_features: Vec<String> = columns
            .iter()
            .filter(|(n, kind)| {
                *kind == ColumnKind::Numeric
                    && *n != fields::POSITION
                    && !n.ends_with(fields::ENCODED_SUFFIX)
                    && !names.contains(format!("{n}{}", fields::ENCODED_SUFFIX).as_str())
            })
            .map(|(n, _)| n.to_string())
            .collect();

        let feature_columns = numeric_features
            .iter()
            .chain(categorical_encoded.iter())
            .cloned()
            .collect();

        let category_levels = category_levels
            .into_iter()
            .filter(|(k, _)| categorical_encoded.contains(k))
            .collect();

        Self {
            feature_columns,
            categorical_encoded,
            numeric_features,
            category_levels,
        }
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        if self.feature_columns.is_empty() {
            return Err(ContractError::Empty);
        }

        let mut seen = HashSet::new();
        for name in &self.feature_columns {
            if !seen.insert(name.as_str()) {
                return Err(ContractError::Duplicate(name.clone()));
            }
        }

        let numeric: HashSet<&str> = self.numeric_features.iter().map(String::as_str).collect();
        let categorical: HashSet<&str> =
            self.categorical_encoded.iter().map(String::as_str).collect();

        if let Some(name) = self.numeric_features.iter().find(|n| categorical.contains(n.as_str())) {
            return Err(ContractError::Overlap(name.clone()));
        }
        if let Some(name) = self
            .feature_columns
            .iter()
            .find(|n| !numeric.contains(n.as_str()) && !categorical.contains(n.as_str()))
        {
            return Err(ContractError::Unclassified(name.clone()));
        }
        if let Some(name) = numeric
            .iter()
            .chain(categorical.iter())
            .find(|n| !seen.contains(**n))
        {
            return Err(ContractError::NotAColumn(name.to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.feature_columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feature_columns.is_empty()
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.feature_columns.iter().any(|f| f == feature)
    }

    /// Select the contract's features from `entry`, in contract order.
    ///
    /// An absent feature means the deployed contract and the serving code
    /// disagree; it is never filled in with a default.
    pub fn assemble(&self, entry: &RaceEntryInput) -> Result<Vec<f64>, PredictError> {
        let mut vec = Vec::with_capacity(self.feature_columns.len());
        let mut absent = Vec::new();
        for name in &self.feature_columns {
            match entry.get(name) {
                Some(v) => vec.push(v),
                None => absent.push(name.as_str()),
            }
        }
        if !absent.is_empty() {
            return Err(PredictError::SchemaMismatch(format!(
                "features absent after derivation: {}",
                absent.join(", ")
            )));
        }
        Ok(vec)
    }

    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        artifacts::read_json(&artifacts::contract_path(dir))
    }

    pub fn save(&self, dir: &Path) -> Result<(), ArtifactError> {
        artifacts::write_json(&artifacts::contract_path(dir), self)
    }
}
