//! The trained failure classifier and its on-disk artifact.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use linfa::prelude::*;
use linfa_trees::{DecisionTree, TreeNode};
use ndarray::{Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::{LabeledData, FEATURE_COUNT};
use crate::error::{Error, Result};
use crate::grid::{Candidate, HyperParams};
use crate::metrics::Evaluation;

/// One machine's sensor readings, as accepted by `/predict`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SensorReading {
    pub air_temperature: f64,
    pub process_temperature: f64,
    pub rotational_speed: i64,
    pub torque: f64,
    pub tool_wear: i64,
}

impl SensorReading {
    /// Features in training column order.
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [
            self.air_temperature,
            self.process_temperature,
            self.rotational_speed as f64,
            self.torque,
            self.tool_wear as f64,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureLabel {
    #[serde(rename = "No Failure")]
    NoFailure,
    #[serde(rename = "Failure")]
    Failure,
}

impl From<usize> for FailureLabel {
    fn from(class: usize) -> Self {
        if class == 0 {
            FailureLabel::NoFailure
        } else {
            FailureLabel::Failure
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub prediction: FailureLabel,
    pub confidence: f64,
}

/// Decision tree plus the class counts of the training samples that landed
/// in each leaf, so predictions can carry a probability.
///
/// Leaves are keyed by heap position: the root is 1, the children of `n`
/// are `2n` (left) and `2n + 1` (right).
#[derive(Debug, Serialize, Deserialize)]
pub struct FailureModel {
    params: HyperParams,
    features: Vec<usize>,
    feature_names: Vec<String>,
    tree: DecisionTree<f64, usize>,
    leaf_counts: BTreeMap<u64, [u64; 2]>,
}

impl FailureModel {
    pub fn fit(candidate: &Candidate, data: &LabeledData) -> Result<Self> {
        let params = candidate.params;
        let dataset = data.to_dataset(&candidate.features);
        let tree = DecisionTree::params()
            .split_quality(params.criterion.split_quality())
            .max_depth(Some(params.max_depth))
            .fit(&dataset)?;

        let mut leaf_counts = BTreeMap::new();
        for (row, &label) in dataset.records().rows().into_iter().zip(data.targets.iter()) {
            let (leaf, _) = descend(tree.root_node(), row);
            let counts = leaf_counts.entry(leaf).or_insert([0u64; 2]);
            counts[label.min(1)] += 1;
        }

        Ok(Self {
            params,
            features: candidate.features.clone(),
            feature_names: data.feature_names.clone(),
            tree,
            leaf_counts,
        })
    }

    pub fn params(&self) -> HyperParams {
        self.params
    }

    /// Names of the columns the tree actually splits on.
    pub fn used_feature_names(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter_map(|&i| self.feature_names.get(i).map(String::as_str))
            .collect()
    }

    pub fn predict_labels(&self, data: &LabeledData) -> Result<Array1<usize>> {
        let dataset = data.to_dataset(&self.features);
        dataset
            .records()
            .rows()
            .into_iter()
            .map(|row| self.leaf_vote(row).map(|(label, _)| label))
            .collect()
    }

    pub fn evaluate(&self, data: &LabeledData) -> Result<Evaluation> {
        let predicted = self.predict_labels(data)?;
        Evaluation::compute(&predicted, &data.to_dataset(&self.features))
    }

    /// Class label and probability estimates `[p(no failure), p(failure)]`
    /// for one full feature row.
    pub fn predict_proba(&self, row: ArrayView1<f64>) -> Result<(usize, [f64; 2])> {
        if row.len() != self.feature_names.len() {
            return Err(Error::prediction(format!(
                "expected {} features, got {}",
                self.feature_names.len(),
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(Error::prediction("feature values must be finite"));
        }
        let projected = row.select(Axis(0), &self.features);
        self.leaf_vote(projected.view())
    }

    /// Majority class of the training rows in the leaf `row` lands in.
    /// Ties go to the lower label.
    fn leaf_vote(&self, row: ArrayView1<f64>) -> Result<(usize, [f64; 2])> {
        let (leaf, node) = descend(self.tree.root_node(), row);
        match self.leaf_counts.get(&leaf) {
            Some(counts) if counts[0] + counts[1] > 0 => {
                let total = (counts[0] + counts[1]) as f64;
                let label = usize::from(counts[1] > counts[0]);
                Ok((label, [counts[0] as f64 / total, counts[1] as f64 / total]))
            }
            _ => {
                let label = node
                    .prediction()
                    .ok_or_else(|| Error::prediction("tree walk ended on an internal node"))?
                    .min(1);
                let mut one_hot = [0.0; 2];
                one_hot[label] = 1.0;
                Ok((label, one_hot))
            }
        }
    }

    pub fn predict(&self, reading: &SensorReading) -> Result<Prediction> {
        let row = Array1::from(reading.features().to_vec());
        let (label, proba) = self.predict_proba(row.view())?;
        Ok(Prediction {
            prediction: FailureLabel::from(label),
            confidence: round4(proba[label]),
        })
    }

    /// Write the artifact, replacing any previous one in a single rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(self)?)?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), "model artifact written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let model: Self = serde_json::from_slice(&bytes)?;
        info!(path = %path.display(), params = ?model.params, "model artifact loaded");
        Ok(model)
    }
}

/// Follow `row` down to its leaf, using the same `<` rule as the tree's own
/// prediction.
fn descend<'a>(
    root: &'a TreeNode<f64, usize>,
    row: ArrayView1<f64>,
) -> (u64, &'a TreeNode<f64, usize>) {
    let mut node = root;
    let mut id = 1u64;
    while !node.is_leaf() {
        let (feature, split, _) = node.split();
        let go_right = row[feature] >= split;
        let children = node.children();
        let child: &'a Option<Box<TreeNode<f64, usize>>> = children[usize::from(go_right)];
        match child.as_deref() {
            Some(child) => {
                node = child;
                id = id * 2 + u64::from(go_right);
            }
            None => break,
        }
    }
    (id, node)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
