//! Held-out scores reported after training.

use linfa::prelude::*;
use linfa::Dataset;
use ndarray::{Array1, Ix1};
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub f1_score: f64,
}

impl Evaluation {
    pub fn compute(predicted: &Array1<usize>, truth: &Dataset<f64, usize, Ix1>) -> Result<Self> {
        if predicted.is_empty() {
            return Ok(Self {
                accuracy: 0.0,
                f1_score: 0.0,
            });
        }
        let cm = predicted.confusion_matrix(truth)?;
        let per_class: Vec<f32> = cm.split_one_vs_all().iter().map(|m| m.f1_score()).collect();
        Ok(Self {
            accuracy: cm.accuracy() as f64,
            f1_score: weighted_f1(&per_class, predicted, &truth.targets),
        })
    }
}

/// Average the per-class F1 scores of a confusion matrix, weighting each class
/// by its support in `truth`.
///
/// `per_class` follows the matrix's class order, which is ascending label
/// order over the labels seen in either array. A class with no true positives
/// has an undefined F1 and counts as zero.
fn weighted_f1(per_class: &[f32], predicted: &Array1<usize>, truth: &Array1<usize>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let mut classes: Vec<usize> = truth.iter().chain(predicted.iter()).copied().collect();
    classes.sort_unstable();
    classes.dedup();

    let total = truth.len() as f64;
    per_class
        .iter()
        .zip(&classes)
        .map(|(&f1, &class)| {
            let support = truth.iter().filter(|&&t| t == class).count() as f64;
            let f1 = if f1.is_finite() { f64::from(f1) } else { 0.0 };
            f1 * support / total
        })
        .sum()
}
