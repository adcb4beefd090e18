//! Offline training pipeline: dataset → contract → one bundle per target.

use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    artifacts,
    contract::FeatureContract,
    dataset::{train_test_split, Dataset, DatasetConfig},
    error::{ArtifactError, TrainError},
    gbdt::{GbdtConfig, GradientBoostedTrees},
    logistic::{LogisticConfig, LogisticRegression},
    metrics::Evaluation,
    model::{Classifier, ModelBundle, ModelKind},
    scaler::StandardScaler,
    target::Target,
    types::fields,
};

/// Number of leading features summarised per class in the diagnostics.
const DISTRIBUTION_FEATURES: usize = 5;

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub data_path: PathBuf,
    pub output_dir: PathBuf,
    pub targets: Vec<Target>,
    pub test_fraction: f64,
    pub seed: u64,
    /// Candidate kinds, in tie-break order.
    pub model_kinds: Vec<ModelKind>,
    pub logistic: LogisticConfig,
    pub gbdt: GbdtConfig,
    pub dataset: DatasetConfig,
}

impl TrainingConfig {
    pub fn new(data_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            output_dir: output_dir.into(),
            targets: Target::ALL.to_vec(),
            test_fraction: 0.2,
            seed: 42,
            model_kinds: vec![ModelKind::LogisticRegression, ModelKind::GradientBoosting],
            logistic: LogisticConfig::default(),
            gbdt: GbdtConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelResult {
    pub target: Target,
    pub model: ModelKind,
    pub accuracy: f64,
    pub roc_auc: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub target: Target,
    pub chosen: ModelKind,
    pub train_rows: usize,
    pub test_rows: usize,
    pub results: Vec<ModelResult>,
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub contract: FeatureContract,
    pub trained: Vec<TargetOutcome>,
    pub failed: Vec<(Target, String)>,
}

impl TrainingReport {
    pub fn succeeded(&self) -> Vec<Target> {
        self.trained.iter().map(|o| o.target).collect()
    }
}

/// One line of `model_results.csv`.
#[derive(Debug, Serialize)]
struct ResultRow {
    #[serde(rename = "Target")]
    target: &'static str,
    #[serde(rename = "Model")]
    model: &'static str,
    #[serde(rename = "Accuracy")]
    accuracy: f64,
}

#[derive(Debug, Serialize)]
struct FeatureScore {
    feature: String,
    importance: f64,
}

#[derive(Debug, Serialize)]
struct ClassMeans {
    feature: String,
    mean_positive: Option<f64>,
    mean_negative: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Diagnostics {
    target: Target,
    chosen: ModelKind,
    evaluations: Vec<(ModelKind, Evaluation)>,
    feature_importance: Vec<FeatureScore>,
    class_feature_means: Vec<ClassMeans>,
}

struct TargetRun {
    bundle: ModelBundle,
    outcome: TargetOutcome,
    diagnostics: Diagnostics,
    boosted_importance: Option<Vec<FeatureScore>>,
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn run(&self) -> Result<TrainingReport, TrainError> {
        tracing::info!("loading dataset from {}", self.config.data_path.display());
        let dataset = Dataset::from_csv(&self.config.data_path, &self.config.dataset)?;
        self.train_dataset(&dataset)
    }

    /// Train every configured target. A target that fails is logged and
    /// skipped; the run fails only if nothing could be trained.
    pub fn train_dataset(&self, dataset: &Dataset) -> Result<TrainingReport, TrainError> {
        let out = &self.config.output_dir;
        let contract = dataset.feature_contract();
        contract.validate()?;
        tracing::info!(
            "feature contract: {} features {:?}",
            contract.len(),
            contract.feature_columns
        );
        let x = dataset.feature_matrix(&contract)?;

        let mut trained = Vec::new();
        let mut failed = Vec::new();
        let mut results_rows = Vec::new();

        for &target in &self.config.targets {
            tracing::info!("training models for {} prediction", target);
            match self.train_target(target, dataset, &x, &contract) {
                Ok(run) => {
                    run.bundle.save(out)?;
                    artifacts::write_json(
                        &out.join(artifacts::DIAGNOSTICS_DIR)
                            .join(format!("{}.json", target.file_stem())),
                        &run.diagnostics,
                    )?;
                    if let Some(scores) = &run.boosted_importance {
                        artifacts::write_csv(&artifacts::importance_path(out, target), scores)?;
                    }
                    results_rows.extend(run.outcome.results.iter().map(|r| ResultRow {
                        target: r.target.label(),
                        model: r.model.name(),
                        accuracy: r.accuracy,
                    }));
                    tracing::info!(
                        "saved {} bundle for {} (accuracy {:.3})",
                        run.outcome.chosen,
                        target,
                        run.outcome
                            .results
                            .iter()
                            .find(|r| r.model == run.outcome.chosen)
                            .map_or(0.0, |r| r.accuracy)
                    );
                    trained.push(run.outcome);
                }
                Err(err) => {
                    tracing::warn!("skipping {}: {}", target, err);
                    remove_stale_bundle(out, target)?;
                    failed.push((target, err.to_string()));
                }
            }
        }

        if trained.is_empty() {
            return Err(TrainError::NothingTrained(failed.len()));
        }

        // The contract goes last: bundles already on disk match it.
        contract.save(out)?;
        artifacts::write_csv(&out.join(artifacts::RESULTS_FILE), &results_rows)?;

        let report = TrainingReport {
            contract,
            trained,
            failed,
        };
        tracing::info!(
            "trained {:?}; failed {:?}",
            report.succeeded(),
            report.failed.iter().map(|(t, _)| *t).collect::<Vec<_>>()
        );
        Ok(report)
    }

    fn train_target(
        &self,
        target: Target,
        dataset: &Dataset,
        x: &[Vec<f64>],
        contract: &FeatureContract,
    ) -> Result<TargetRun, TrainError> {
        let fail = |reason: String| TrainError::Target { target, reason };

        let y = derive_labels(dataset, target)?;
        let (train_idx, test_idx) = train_test_split(x.len(), self.config.test_fraction, self.config.seed);

        let x_train: Vec<Vec<f64>> = train_idx.iter().map(|&i| x[i].clone()).collect();
        let y_train: Vec<bool> = train_idx.iter().map(|&i| y[i]).collect();
        let x_test: Vec<Vec<f64>> = test_idx.iter().map(|&i| x[i].clone()).collect();
        let y_test: Vec<bool> = test_idx.iter().map(|&i| y[i]).collect();

        // Fit on the training split only.
        let scaler = StandardScaler::fit(&x_train).map_err(|e| fail(e.to_string()))?;
        let x_train_scaled = scaler.transform_all(&x_train).map_err(|e| fail(e.to_string()))?;
        let x_test_scaled = scaler.transform_all(&x_test).map_err(|e| fail(e.to_string()))?;

        let mut best: Option<(Classifier, f64)> = None;
        let mut results = Vec::new();
        let mut evaluations = Vec::new();
        let mut boosted_importance = None;

        for &kind in &self.config.model_kinds {
            tracing::info!("training {} for {}", kind, target);
            let classifier = match kind {
                ModelKind::LogisticRegression => {
                    LogisticRegression::fit(&x_train_scaled, &y_train, &self.config.logistic)
                        .map(Classifier::LogisticRegression)
                }
                ModelKind::GradientBoosting => {
                    GradientBoostedTrees::fit(&x_train_scaled, &y_train, &self.config.gbdt)
                        .map(Classifier::GradientBoosting)
                }
            }
            .map_err(|e| fail(format!("{kind}: {e}")))?;

            let scores = x_test_scaled
                .iter()
                .map(|row| classifier.predict_proba(row))
                .collect::<Result<Vec<f64>, _>>()
                .map_err(|e| fail(format!("{kind}: {e}")))?;
            let evaluation = Evaluation::compute(&y_test, &scores);
            tracing::info!(
                "{} / {}: accuracy {:.3}, roc auc {}",
                target,
                kind,
                evaluation.accuracy,
                evaluation
                    .roc_auc
                    .map_or_else(|| "n/a".to_string(), |a| format!("{a:.3}"))
            );

            if kind == ModelKind::GradientBoosting {
                boosted_importance = Some(importance_table(contract, &classifier));
            }
            results.push(ModelResult {
                target,
                model: kind,
                accuracy: evaluation.accuracy,
                roc_auc: evaluation.roc_auc,
            });

            let better = best.as_ref().map_or(true, |(_, acc)| evaluation.accuracy > *acc);
            evaluations.push((kind, evaluation));
            if better {
                let accuracy = results.last().map_or(0.0, |r| r.accuracy);
                best = Some((classifier, accuracy));
            }
        }

        let (classifier, _) = best.ok_or_else(|| fail("no model kinds configured".to_string()))?;
        let chosen = classifier.kind();
        let diagnostics = Diagnostics {
            target,
            chosen,
            evaluations,
            feature_importance: importance_table(contract, &classifier),
            class_feature_means: class_means(contract, x, &y),
        };

        Ok(TargetRun {
            bundle: ModelBundle::new(target, scaler, classifier),
            outcome: TargetOutcome {
                target,
                chosen,
                train_rows: train_idx.len(),
                test_rows: test_idx.len(),
                results,
            },
            diagnostics,
            boosted_importance,
        })
    }
}

/// Binary labels for `target` from the finishing position and grid columns.
pub fn derive_labels(dataset: &Dataset, target: Target) -> Result<Vec<bool>, TrainError> {
    let position = dataset.numeric(fields::POSITION).ok_or_else(|| TrainError::Target {
        target,
        reason: format!("column '{}' is not numeric", fields::POSITION),
    })?;
    let grid = dataset.numeric(fields::GRID_POSITION);
    let gained = dataset.numeric(fields::POSITIONS_GAINED);

    position
        .iter()
        .enumerate()
        .map(|(i, pos)| {
            target
                .label_for(*pos, grid.map(|g| g[i]), gained.map(|g| g[i]))
                .ok_or_else(|| TrainError::Target {
                    target,
                    reason: "label column unavailable in the cleaned dataset".to_string(),
                })
        })
        .collect()
}

fn importance_table(contract: &FeatureContract, classifier: &Classifier) -> Vec<FeatureScore> {
    let mut scores: Vec<FeatureScore> = contract
        .feature_columns
        .iter()
        .zip(classifier.feature_importance())
        .map(|(feature, importance)| FeatureScore {
            feature: feature.clone(),
            importance,
        })
        .collect();
    scores.sort_by(|a, b| a.importance.total_cmp(&b.importance));
    scores
}

fn class_means(contract: &FeatureContract, x: &[Vec<f64>], y: &[bool]) -> Vec<ClassMeans> {
    let mean = |col: usize, class: bool| {
        let values: Vec<f64> = x
            .iter()
            .zip(y)
            .filter(|(_, label)| **label == class)
            .map(|(row, _)| row[col])
            .collect();
        (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
    };
    contract
        .feature_columns
        .iter()
        .take(DISTRIBUTION_FEATURES)
        .enumerate()
        .map(|(col, feature)| ClassMeans {
            feature: feature.clone(),
            mean_positive: mean(col, true),
            mean_negative: mean(col, false),
        })
        .collect()
}

/// Drop the bundle left by an earlier run for a target that failed now,
/// so the service reports it missing instead of serving a stale model.
fn remove_stale_bundle(out: &Path, target: Target) -> Result<(), ArtifactError> {
    let path = artifacts::bundle_path(out, target);
    match fs::remove_file(&path) {
        Ok(()) => tracing::info!("removed stale {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => return Err(ArtifactError::Io { path, source }),
    }
    Ok(())
}
