//! On-disk layout of everything the trainer hands to the inference service.

use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{error::ArtifactError, target::Target};

pub const CONTRACT_FILE: &str = "feature_info.json";
pub const RESULTS_FILE: &str = "model_results.csv";
pub const DIAGNOSTICS_DIR: &str = "diagnostics";
pub const IMPORTANCE_DIR: &str = "feature_importance";

pub fn contract_path(dir: &Path) -> PathBuf {
    dir.join(CONTRACT_FILE)
}

/// Scaler and classifier for one target live in a single file, so a
/// rename swaps both at once.
pub fn bundle_path(dir: &Path, target: Target) -> PathBuf {
    dir.join(format!("{}_bundle.json", target.file_stem()))
}

pub fn importance_path(dir: &Path, target: Target) -> PathBuf {
    dir.join(IMPORTANCE_DIR)
        .join(format!("{}.csv", target.file_stem()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let txt = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&txt).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let txt = serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, txt.as_bytes())
}

/// Serialize `rows` under a header taken from the row type's field names.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ArtifactError> {
    let csv_err = |source| ArtifactError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut bytes);
        for row in rows {
            writer.serialize(row).map_err(csv_err)?;
        }
        writer.flush().map_err(|e| csv_err(e.into()))?;
    }
    write_atomic(path, &bytes)
}

/// Write to a sibling temp file, then rename over `path` so readers never
/// observe a half-written artifact.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_are_deterministic() {
        let dir = Path::new("out");
        assert_eq!(
            bundle_path(dir, Target::Top5),
            Path::new("out/top_5_bundle.json")
        );
        assert_eq!(
            importance_path(dir, Target::RaceWinner),
            Path::new("out/feature_importance/race_winner.csv")
        );
    }

    #[derive(Serialize)]
    struct Row {
        #[serde(rename = "Target")]
        target: &'static str,
        #[serde(rename = "Score")]
        score: f64,
    }

    #[test]
    fn csv_rows_are_quoted_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let rows = [
            Row { target: "Top 5", score: 0.5 },
            Row { target: "Points, Finish", score: 0.25 },
        ];
        write_csv(&path, &rows).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Target,Score\n"));
        assert!(text.contains("\"Points, Finish\""));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let back: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(&back[1][0], "Points, Finish");
        assert_eq!(&back[1][1], "0.25");
        assert!(!dir.path().join("rows.csv.tmp").exists());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");
        write_json(&path, &vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
        assert!(!dir.path().join("nested").join("value.json.tmp").exists());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_json::<Vec<i32>>(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
