//! Hyperparameter grid and the cross-validated search over it.

use linfa_trees::SplitQuality;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::LabeledData;
use crate::error::{Error, Result};
use crate::model::FailureModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gini,
    Entropy,
    LogLoss,
}

impl Criterion {
    pub const ALL: [Criterion; 3] = [Criterion::Gini, Criterion::Entropy, Criterion::LogLoss];

    /// Log loss and entropy select the same splits.
    pub fn split_quality(self) -> SplitQuality {
        match self {
            Criterion::Gini => SplitQuality::Gini,
            Criterion::Entropy | Criterion::LogLoss => SplitQuality::Entropy,
        }
    }
}

/// How many feature columns a tree may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
}

impl MaxFeatures {
    pub const ALL: [MaxFeatures; 3] = [MaxFeatures::All, MaxFeatures::Sqrt, MaxFeatures::Log2];

    pub fn count(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperParams {
    pub criterion: Criterion,
    pub max_depth: usize,
    pub max_features: MaxFeatures,
}

/// Every combination searched by [`GridSearch`], in search order.
pub fn param_grid() -> Vec<HyperParams> {
    let mut grid = Vec::new();
    for criterion in Criterion::ALL {
        for max_depth in 1..=5 {
            for max_features in MaxFeatures::ALL {
                grid.push(HyperParams {
                    criterion,
                    max_depth,
                    max_features,
                });
            }
        }
    }
    grid
}

/// A grid point with its feature columns drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub params: HyperParams,
    pub features: Vec<usize>,
}

impl Candidate {
    fn draw(params: HyperParams, n_features: usize, rng: &mut StdRng) -> Self {
        let k = params.max_features.count(n_features);
        let mut features = if k >= n_features {
            (0..n_features).collect()
        } else {
            rand::seq::index::sample(rng, n_features, k).into_vec()
        };
        features.sort_unstable();
        Self { params, features }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best: Candidate,
    pub best_score: f64,
    pub evaluated: usize,
}

/// Exhaustive search scored by mean accuracy over stratified folds.
#[derive(Debug, Clone)]
pub struct GridSearch {
    grid: Vec<HyperParams>,
    folds: usize,
    seed: u64,
}

impl GridSearch {
    pub fn new(grid: Vec<HyperParams>, folds: usize, seed: u64) -> Result<Self> {
        if folds < 2 {
            return Err(Error::training(format!(
                "cross-validation needs at least two folds, got {folds}"
            )));
        }
        Ok(Self { grid, folds, seed })
    }

    pub fn fit(&self, data: &LabeledData) -> Result<SearchResult> {
        if data.nsamples() == 0 {
            return Err(Error::training("training set is empty"));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let folds = stratified_folds(data.targets.iter().copied(), self.folds);
        let splits: Vec<(LabeledData, LabeledData)> = (0..self.folds)
            .filter_map(|k| {
                let (train, valid): (Vec<_>, Vec<_>) =
                    (0..data.nsamples()).partition(|&i| folds[i] != k);
                if train.is_empty() || valid.is_empty() {
                    None
                } else {
                    Some((data.subset(&train), data.subset(&valid)))
                }
            })
            .collect();

        let mut best: Option<(Candidate, f64)> = None;
        for &params in &self.grid {
            let candidate = Candidate::draw(params, data.nfeatures(), &mut rng);
            let score = self.score(&candidate, &splits)?;
            debug!(?params, features = ?candidate.features, score, "grid point scored");
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((candidate, score));
            }
        }

        let (best, best_score) =
            best.ok_or_else(|| Error::training("hyperparameter grid is empty"))?;
        info!(params = ?best.params, score = best_score, "grid search finished");
        Ok(SearchResult {
            best,
            best_score,
            evaluated: self.grid.len(),
        })
    }

    fn score(&self, candidate: &Candidate, splits: &[(LabeledData, LabeledData)]) -> Result<f64> {
        if splits.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for (train, valid) in splits {
            let model = FailureModel::fit(candidate, train)?;
            total += model.evaluate(valid)?.accuracy;
        }
        Ok(total / splits.len() as f64)
    }
}

/// Fold number for each sample; every class is dealt round-robin so folds
/// keep the class balance.
fn stratified_folds(targets: impl IntoIterator<Item = usize>, k: usize) -> Vec<usize> {
    let mut seen = [0usize; 2];
    targets
        .into_iter()
        .map(|label| {
            let slot = &mut seen[label.min(1)];
            let fold = *slot % k;
            *slot += 1;
            fold
        })
        .collect()
}
