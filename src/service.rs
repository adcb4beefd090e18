//! Inference service: owns the loaded contract and bundles and turns one
//! race entry into per-target probabilities.
//!
//! The service starts `Uninitialized` and moves to `Ready` exactly once,
//! after the contract and every requested bundle loaded and agreed on the
//! feature width. Readers take a cheap `Arc` snapshot, so concurrent
//! predictions never contend on the lock beyond the clone.

use parking_lot::RwLock;
use std::{path::Path, sync::Arc};

use crate::{
    artifacts,
    contract::FeatureContract,
    error::{LoadError, PredictError},
    model::ModelBundle,
    target::Target,
    types::{PredictionResult, RaceEntryInput},
    validation,
};

#[derive(Debug)]
pub struct LoadedModels {
    pub contract: FeatureContract,
    /// One bundle per served target, in target order.
    pub bundles: Vec<ModelBundle>,
}

impl LoadedModels {
    pub fn targets(&self) -> Vec<Target> {
        self.bundles.iter().map(|b| b.target).collect()
    }
}

#[derive(Debug)]
enum ServiceState {
    Uninitialized,
    Ready(Arc<LoadedModels>),
}

#[derive(Debug)]
pub struct Predictor {
    state: RwLock<ServiceState>,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ServiceState::Uninitialized),
        }
    }

    /// Load `feature_info.json` and one bundle per target from `dir`.
    pub fn load_from_dir(&self, dir: &Path, targets: &[Target]) -> Result<(), LoadError> {
        if targets.is_empty() {
            return Err(LoadError::NoTargets);
        }
        tracing::info!("loading feature contract and models from {}", dir.display());
        let contract = FeatureContract::load(dir)?;

        let mut bundles = Vec::with_capacity(targets.len());
        for &target in targets {
            if !artifacts::bundle_path(dir, target).exists() {
                return Err(LoadError::MissingBundle(target));
            }
            let bundle = ModelBundle::load(dir, target)?;
            tracing::info!("loaded {} model for {}", bundle.classifier.kind(), target);
            bundles.push(bundle);
        }
        self.install(contract, targets, bundles)
    }

    /// Check the contract and bundles against each other and go `Ready`.
    /// Bundles for targets not in `targets` are dropped. At least one
    /// target must be requested.
    pub fn install(
        &self,
        contract: FeatureContract,
        targets: &[Target],
        bundles: Vec<ModelBundle>,
    ) -> Result<(), LoadError> {
        let mut state = self.state.write();
        if matches!(*state, ServiceState::Ready(_)) {
            return Err(LoadError::AlreadyReady);
        }
        if targets.is_empty() {
            return Err(LoadError::NoTargets);
        }
        contract.validate()?;

        let mut wanted: Vec<Target> = targets.to_vec();
        wanted.sort();
        wanted.dedup();

        let mut served = Vec::with_capacity(wanted.len());
        let mut bundles = bundles;
        for target in wanted {
            let idx = bundles
                .iter()
                .position(|b| b.target == target)
                .ok_or(LoadError::MissingBundle(target))?;
            let bundle = bundles.swap_remove(idx);
            match bundle.n_features() {
                Some(n) if n == contract.len() => served.push(bundle),
                got => {
                    return Err(LoadError::WidthMismatch {
                        target,
                        expected: contract.len(),
                        got: got.unwrap_or(bundle.scaler.n_features()),
                    })
                }
            }
        }

        tracing::info!(
            "prediction service ready: {} features, targets {:?}",
            contract.len(),
            served.iter().map(|b| b.target.label()).collect::<Vec<_>>()
        );
        *state = ServiceState::Ready(Arc::new(LoadedModels {
            contract,
            bundles: served,
        }));
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), ServiceState::Ready(_))
    }

    /// The loaded models, if any. Holding the snapshot does not block loads.
    pub fn snapshot(&self) -> Option<Arc<LoadedModels>> {
        match &*self.state.read() {
            ServiceState::Ready(models) => Some(Arc::clone(models)),
            ServiceState::Uninitialized => None,
        }
    }

    pub fn targets(&self) -> Vec<Target> {
        self.snapshot().map(|m| m.targets()).unwrap_or_default()
    }

    pub fn contract(&self) -> Option<FeatureContract> {
        self.snapshot().map(|m| m.contract.clone())
    }

    /// Validated, derived and contract-ordered raw feature vector.
    pub fn feature_vector(&self, entry: &RaceEntryInput) -> Result<Vec<f64>, PredictError> {
        let models = self.snapshot().ok_or(PredictError::NotReady)?;
        assemble(&models, entry)
    }

    /// Probability per served target. A target whose model fails is
    /// reported as `None`; only entry-level problems fail the call.
    pub fn predict(&self, entry: &RaceEntryInput) -> Result<PredictionResult, PredictError> {
        let models = self.snapshot().ok_or(PredictError::NotReady)?;
        let features = assemble(&models, entry)?;

        let mut result = PredictionResult::default();
        for bundle in &models.bundles {
            let probability = match bundle.predict(&features) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!("{} prediction failed: {}", bundle.target, e);
                    None
                }
            };
            result.insert(bundle.target, probability);
        }
        Ok(result)
    }
}

fn assemble(models: &LoadedModels, entry: &RaceEntryInput) -> Result<Vec<f64>, PredictError> {
    let prepared = validation::prepare(entry, &models.contract)?;
    models.contract.assemble(&prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cart::{Node, Tree},
        contract::ColumnKind,
        error::ArtifactError,
        gbdt::GradientBoostedTrees,
        logistic::LogisticRegression,
        model::Classifier,
        scaler::StandardScaler,
    };
    use std::collections::BTreeMap;

    const FEATURES: [&str; 4] = [
        "GridPosition",
        "BestQualiTime",
        "Constructor_encoded",
        "raceName_encoded",
    ];

    fn contract() -> FeatureContract {
        FeatureContract::derive(
            FEATURES.iter().map(|c| (*c, ColumnKind::Numeric)),
            BTreeMap::new(),
        )
    }

    fn bundle(target: Target, weight: f64) -> ModelBundle {
        ModelBundle::new(
            target,
            StandardScaler {
                mean: vec![10.0, 90.0, 4.0, 10.0],
                scale: vec![5.0, 1.0, 3.0, 6.0],
            },
            Classifier::LogisticRegression(LogisticRegression {
                weights: vec![weight, -0.5, 0.1, 0.0],
                bias: -1.0,
            }),
        )
    }

    fn served_bundles() -> Vec<ModelBundle> {
        Target::SERVED
            .iter()
            .enumerate()
            .map(|(i, t)| bundle(*t, -0.5 * (i as f64 + 1.0)))
            .collect()
    }

    fn ready() -> Predictor {
        let p = Predictor::new();
        p.install(contract(), &Target::SERVED, served_bundles()).unwrap();
        p
    }

    fn entry() -> RaceEntryInput {
        RaceEntryInput::new()
            .with("GridPosition", 3.0)
            .with("Q1_seconds", 90.1)
            .with("Q2_seconds", 89.8)
            .with("Q3_seconds", 89.5)
            .with("year", 2023.0)
            .with("round", 5.0)
            .with("laps", 57.0)
            .with("Constructor_encoded", 2.0)
            .with("raceName_encoded", 4.0)
            .with("Points", 0.0)
    }

    #[test]
    fn not_ready_before_install() {
        let p = Predictor::new();
        assert!(!p.is_ready());
        assert!(matches!(p.predict(&entry()), Err(PredictError::NotReady)));
    }

    #[test]
    fn predicts_every_served_target_in_range() {
        let result = ready().predict(&entry()).unwrap();
        assert_eq!(result.targets(), Target::SERVED.to_vec());
        for (_, p) in result.iter() {
            let p = p.unwrap();
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn prediction_is_idempotent_and_ignores_extras() {
        let p = ready();
        let a = p.predict(&entry()).unwrap();
        let b = p.predict(&entry().with("DriverNumber", 44.0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(p.predict(&entry()).unwrap(), a);
    }

    #[test]
    fn derived_best_quali_time_feeds_the_model() {
        let p = ready();
        let derived = p.feature_vector(&entry()).unwrap();
        assert_eq!(derived[1], 89.5);
        let explicit = p.feature_vector(&entry().with("BestQualiTime", 91.0)).unwrap();
        assert_eq!(explicit[1], 91.0);
    }

    #[test]
    fn invalid_entry_fails_the_whole_call() {
        let mut e = entry();
        e.remove("laps");
        let e = e.with("GridPosition", 25.0);
        match ready().predict(&e) {
            Err(PredictError::Validation(err)) => {
                assert!(err.mentions("laps"));
                assert!(err.mentions("GridPosition"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn absent_contract_feature_is_schema_mismatch() {
        let mut cols: Vec<&str> = FEATURES.to_vec();
        cols.insert(1, "PositionsGained");
        let contract = FeatureContract::derive(
            cols.iter().map(|c| (*c, ColumnKind::Numeric)),
            BTreeMap::new(),
        );
        let widen = |mut b: ModelBundle| {
            b.scaler.mean.push(0.0);
            b.scaler.scale.push(1.0);
            if let Classifier::LogisticRegression(m) = &mut b.classifier {
                m.weights.push(0.0);
            }
            b
        };
        let p = Predictor::new();
        p.install(contract, &Target::SERVED, served_bundles().into_iter().map(widen).collect())
            .unwrap();
        assert!(matches!(
            p.predict(&entry()),
            Err(PredictError::SchemaMismatch(msg)) if msg.contains("PositionsGained")
        ));
    }

    #[test]
    fn corrupted_bundle_yields_null_for_that_target_only() {
        let mut bundles = served_bundles();
        bundles[1].classifier = Classifier::GradientBoosting(GradientBoostedTrees {
            n_features: 4,
            base_margin: 0.0,
            learning_rate: 0.1,
            trees: vec![Tree {
                nodes: vec![Node {
                    feature: 0,
                    threshold: 0.0,
                    left: 7,
                    right: 8,
                    value: None,
                }],
            }],
            feature_importance: vec![0.0; 4],
        });
        let p = Predictor::new();
        p.install(contract(), &Target::SERVED, bundles).unwrap();

        let result = p.predict(&entry()).unwrap();
        assert_eq!(result.get(Target::Podium), Some(None));
        assert!(result.get(Target::RaceWinner).unwrap().is_some());
        assert!(result.get(Target::Top5).unwrap().is_some());
    }

    #[test]
    fn failed_install_stays_uninitialized() {
        let p = Predictor::new();
        let mut bundles = served_bundles();
        bundles.pop();
        assert!(matches!(
            p.install(contract(), &Target::SERVED, bundles),
            Err(LoadError::MissingBundle(Target::Top5))
        ));
        assert!(!p.is_ready());

        let mut bundles = served_bundles();
        bundles[0].scaler.mean.pop();
        bundles[0].scaler.scale.pop();
        assert!(matches!(
            p.install(contract(), &Target::SERVED, bundles),
            Err(LoadError::WidthMismatch { target: Target::RaceWinner, .. })
        ));
        assert!(matches!(p.predict(&entry()), Err(PredictError::NotReady)));
    }

    #[test]
    fn second_install_is_refused() {
        let p = ready();
        assert!(matches!(
            p.install(contract(), &Target::SERVED, served_bundles()),
            Err(LoadError::AlreadyReady)
        ));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        contract().save(dir.path()).unwrap();
        for b in served_bundles() {
            b.save(dir.path()).unwrap();
        }
        let p = Predictor::new();
        p.load_from_dir(dir.path(), &Target::SERVED).unwrap();
        assert_eq!(p.targets(), Target::SERVED.to_vec());

        let missing = Predictor::new();
        assert!(matches!(
            missing.load_from_dir(dir.path(), &[Target::TopQualifier]),
            Err(LoadError::MissingBundle(Target::TopQualifier))
        ));
        assert!(!missing.is_ready());
    }

    #[test]
    fn empty_target_list_is_refused() {
        let p = Predictor::new();
        assert!(matches!(
            p.install(contract(), &[], served_bundles()),
            Err(LoadError::NoTargets)
        ));
        assert!(!p.is_ready());
        assert!(matches!(p.predict(&entry()), Err(PredictError::NotReady)));

        let dir = tempfile::tempdir().unwrap();
        contract().save(dir.path()).unwrap();
        assert!(matches!(
            p.load_from_dir(dir.path(), &[]),
            Err(LoadError::NoTargets)
        ));
        assert!(!p.is_ready());
    }

    #[test]
    fn truncated_bundle_keeps_service_unready() {
        let dir = tempfile::tempdir().unwrap();
        contract().save(dir.path()).unwrap();
        for b in served_bundles() {
            b.save(dir.path()).unwrap();
        }
        let path = artifacts::bundle_path(dir.path(), Target::Podium);
        let full = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, &full[..full.len() / 2]).unwrap();

        let p = Predictor::new();
        assert!(matches!(
            p.load_from_dir(dir.path(), &Target::SERVED),
            Err(LoadError::Artifact(ArtifactError::Json { .. }))
        ));
        assert!(!p.is_ready());

        // Only an unrenamed temp file: the bundle does not exist yet.
        std::fs::rename(&path, path.with_extension("json.tmp")).unwrap();
        assert!(matches!(
            p.load_from_dir(dir.path(), &Target::SERVED),
            Err(LoadError::MissingBundle(Target::Podium))
        ));
        assert!(!p.is_ready());
    }
}
