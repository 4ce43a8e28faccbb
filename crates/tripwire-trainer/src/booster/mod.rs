//! Gradient-boosted trees for binary classification.
//!
//! The booster minimises logistic loss with second-order (Newton) steps:
//!
//! - `p = σ(margin)`, `g = w·(p − y)`, `h = w·p·(1 − p)`, where `w` is
//!   `scale_pos_weight` for positive rows and 1 otherwise
//! - each round grows one [`Tree`] on a Bernoulli row sample and a per-tree
//!   column sample, both drawn from a `StdRng` seeded by [`BoosterParams::seed`]
//! - after every round the evaluation split is scored by average precision;
//!   training stops once `early_stopping_rounds` rounds pass without
//!   improvement and the model is truncated to the best round
//!
//! Given the same inputs and parameters, training is fully deterministic.
//!
//! # Example
//!
//! ```rust
//! use tripwire_features::FeatureMatrix;
//! use tripwire_trainer::booster::{Booster, BoosterParams, LabeledMatrix};
//!
//! let x = FeatureMatrix::from_dense(1, &[vec![1.0], vec![0.9], vec![0.0], vec![0.0]]);
//! let y = [1, 1, 0, 0];
//! let data = LabeledMatrix::new(&x, &y)?;
//!
//! let params = BoosterParams { num_rounds: 10, subsample: 1.0, colsample_bytree: 1.0, min_child_weight: 0.0, ..Default::default() };
//! let booster = Booster::train(&params, 1.0, &data, Some(&data))?;
//! let p = booster.predict_proba(&x)?;
//! assert!(p[0] > p[2]);
//! # Ok::<(), tripwire_trainer::TrainingError>(())
//! ```

pub mod tree;

pub use tree::{Node, Tree};

use crate::error::{Result, TrainingError};
use crate::metrics::average_precision;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tree::{TreeBuilder, TreeParams};
use tripwire_features::FeatureMatrix;

const MODEL_FORMAT: &str = "tripwire-gbdt";
const MODEL_VERSION: u32 = 1;
const OBJECTIVE: &str = "binary:logistic";

/// Floor for hessians so saturated rows never produce a zero denominator.
const MIN_HESSIAN: f64 = 1e-16;

/// Boosting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    /// Maximum boosting rounds. Default: 400
    pub num_rounds: usize,
    /// Rounds without evaluation improvement before stopping. Default: 50
    pub early_stopping_rounds: usize,
    /// Default: 6
    pub max_depth: usize,
    /// Learning rate. Default: 0.2
    pub eta: f64,
    /// Row sampling ratio per tree. Default: 0.9
    pub subsample: f64,
    /// Column sampling ratio per tree. Default: 0.9
    pub colsample_bytree: f64,
    /// L2 regularisation on leaf weights. Default: 1.0
    pub lambda: f64,
    /// Minimum hessian sum in each child. Default: 1.0
    pub min_child_weight: f64,
    /// Default: 0
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            num_rounds: 400,
            early_stopping_rounds: 50,
            max_depth: 6,
            eta: 0.2,
            subsample: 0.9,
            colsample_bytree: 0.9,
            lambda: 1.0,
            min_child_weight: 1.0,
            seed: 0,
        }
    }
}

impl BoosterParams {
    /// Check ranges; the error names the offending field.
    pub fn validate(&self) -> std::result::Result<(), (&'static str, String)> {
        let unit = |field: &'static str, value: f64| {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err((field, format!("{} is outside (0, 1]", value)))
            }
        };

        if self.num_rounds == 0 {
            return Err(("num_rounds", "must be at least 1".to_string()));
        }
        if self.early_stopping_rounds == 0 {
            return Err(("early_stopping_rounds", "must be at least 1".to_string()));
        }
        if self.max_depth == 0 {
            return Err(("max_depth", "must be at least 1".to_string()));
        }
        unit("eta", self.eta)?;
        unit("subsample", self.subsample)?;
        unit("colsample_bytree", self.colsample_bytree)?;
        if !(self.lambda >= 0.0) {
            return Err(("lambda", format!("{} is negative", self.lambda)));
        }
        if !(self.min_child_weight >= 0.0) {
            return Err((
                "min_child_weight",
                format!("{} is negative", self.min_child_weight),
            ));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            eta: self.eta,
            lambda: self.lambda,
            min_child_weight: self.min_child_weight,
        }
    }
}

/// Features paired with their 0/1 labels.
#[derive(Debug, Clone, Copy)]
pub struct LabeledMatrix<'a> {
    features: &'a FeatureMatrix,
    labels: &'a [u8],
}

impl<'a> LabeledMatrix<'a> {
    pub fn new(features: &'a FeatureMatrix, labels: &'a [u8]) -> Result<Self> {
        if features.n_rows() != labels.len() {
            return Err(TrainingError::InvalidData(format!(
                "{} feature rows but {} labels",
                features.n_rows(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&y| y > 1) {
            return Err(TrainingError::InvalidData(format!(
                "labels must be 0 or 1, found {}",
                bad
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn features(&self) -> &'a FeatureMatrix {
        self.features
    }

    pub fn labels(&self) -> &'a [u8] {
        self.labels
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// A trained tree ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    format: String,
    version: u32,
    objective: String,
    base_margin: f64,
    num_features: usize,
    best_iteration: usize,
    best_score: Option<f64>,
    trees: Vec<Tree>,
}

impl Booster {
    /// Fit an ensemble on `train`, early-stopping on `eval` when given.
    pub fn train(
        params: &BoosterParams,
        scale_pos_weight: f64,
        train: &LabeledMatrix<'_>,
        eval: Option<&LabeledMatrix<'_>>,
    ) -> Result<Self> {
        params
            .validate()
            .map_err(|(field, reason)| TrainingError::InvalidConfig(format!("{}: {}", field, reason)))?;
        if !(scale_pos_weight.is_finite() && scale_pos_weight > 0.0) {
            return Err(TrainingError::InvalidConfig(format!(
                "scale_pos_weight must be positive, got {}",
                scale_pos_weight
            )));
        }

        let x = train.features();
        let y = train.labels();
        let n_rows = x.n_rows();
        let n_cols = x.n_cols();
        if let Some(eval) = eval
            && eval.features().n_cols() != n_cols
        {
            return Err(TrainingError::InvalidData(format!(
                "evaluation matrix has {} columns, training matrix {}",
                eval.features().n_cols(),
                n_cols
            )));
        }

        let base_margin = 0.0;
        let mut margins = vec![base_margin; n_rows];
        let mut eval_margins = vec![base_margin; eval.map_or(0, |e| e.features().n_rows())];
        let mut gradients = vec![0.0; n_rows];
        let mut hessians = vec![0.0; n_rows];

        let all_columns: Vec<u32> = (0..n_cols as u32).collect();
        let n_sampled_cols = ((params.colsample_bytree * n_cols as f64).round() as usize)
            .clamp(n_cols.min(1), n_cols);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let tree_params = params.tree_params();

        let mut trees: Vec<Tree> = Vec::new();
        let mut best: Option<(usize, f64)> = None;

        info!(
            "Training booster: {} rows x {} features, up to {} rounds, scale_pos_weight={:.4}",
            n_rows, n_cols, params.num_rounds, scale_pos_weight
        );

        for round in 0..params.num_rounds {
            for i in 0..n_rows {
                let p = sigmoid(margins[i]);
                let target = f64::from(y[i]);
                let w = if y[i] == 1 { scale_pos_weight } else { 1.0 };
                gradients[i] = w * (p - target);
                hessians[i] = (w * p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let rows: Vec<usize> = if params.subsample < 1.0 {
                (0..n_rows)
                    .filter(|_| rng.gen_bool(params.subsample))
                    .collect()
            } else {
                (0..n_rows).collect()
            };

            let mut columns: Vec<u32> = if n_sampled_cols < n_cols {
                all_columns
                    .choose_multiple(&mut rng, n_sampled_cols)
                    .copied()
                    .collect()
            } else {
                all_columns.clone()
            };
            columns.sort_unstable();

            let tree = TreeBuilder::new(x, &gradients, &hessians, &columns, tree_params).build(&rows);

            for (i, row) in x.rows().enumerate() {
                margins[i] += tree.predict(&row);
            }

            if let Some(eval) = eval {
                for (i, row) in eval.features().rows().enumerate() {
                    eval_margins[i] += tree.predict(&row);
                }
            }
            trees.push(tree);

            let Some(eval) = eval else {
                continue;
            };
            let probabilities: Vec<f64> = eval_margins.iter().map(|&m| sigmoid(m)).collect();
            let score = average_precision(eval.labels(), &probabilities);
            debug!("[{}] test-aucpr: {:.5}", round, score);

            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((round, score)),
            }
            if let Some((best_round, _)) = best
                && round - best_round >= params.early_stopping_rounds
            {
                info!(
                    "Early stopping at round {}; best round {} (aucpr={:.5})",
                    round,
                    best_round,
                    best.map_or(0.0, |b| b.1)
                );
                break;
            }
        }

        let (best_iteration, best_score) = match best {
            Some((round, score)) => {
                trees.truncate(round + 1);
                (round, Some(score))
            }
            None => (trees.len().saturating_sub(1), None),
        };

        info!(
            "Booster trained: {} trees, best_iteration={}",
            trees.len(),
            best_iteration
        );

        Ok(Self {
            format: MODEL_FORMAT.to_string(),
            version: MODEL_VERSION,
            objective: OBJECTIVE.to_string(),
            base_margin,
            num_features: n_cols,
            best_iteration,
            best_score,
            trees,
        })
    }

    /// Raw additive scores (log-odds).
    pub fn predict_margin(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.n_cols() != self.num_features {
            return Err(TrainingError::InvalidData(format!(
                "model expects {} features, got {}",
                self.num_features,
                features.n_cols()
            )));
        }
        Ok(features
            .rows()
            .map(|row| {
                self.base_margin + self.trees.iter().map(|t| t.predict(&row)).sum::<f64>()
            })
            .collect())
    }

    /// Positive-class probabilities.
    pub fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(self
            .predict_margin(features)?
            .into_iter()
            .map(sigmoid)
            .collect())
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Zero-based round kept as the last tree.
    pub fn best_iteration(&self) -> usize {
        self.best_iteration
    }

    /// Evaluation average precision at [`best_iteration`](Self::best_iteration).
    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Serialized model, as stored in `model.bst`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let booster: Booster = serde_json::from_slice(bytes)?;
        if booster.format != MODEL_FORMAT || booster.version != MODEL_VERSION {
            return Err(TrainingError::InvalidData(format!(
                "unsupported model format {} v{}",
                booster.format, booster.version
            )));
        }
        let in_range = booster
            .trees
            .iter()
            .all(|t| t.is_well_formed() && t.max_feature().is_none_or(|f| (f as usize) < booster.num_features));
        if !in_range {
            return Err(TrainingError::InvalidData(
                "model contains malformed trees".to_string(),
            ));
        }
        Ok(booster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Column 0 marks positives, column 1 negatives, column 2 is noise.
    fn toy_data(n: usize) -> (FeatureMatrix, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let positive = i % 4 == 0;
            let noise = ((i * 7) % 5) as f32 / 5.0;
            rows.push(if positive {
                vec![0.8, 0.0, noise]
            } else {
                vec![0.0, 0.6, noise]
            });
            labels.push(u8::from(positive));
        }
        (FeatureMatrix::from_dense(3, &rows), labels)
    }

    #[test]
    fn test_learns_separable_data() {
        let (x, y) = toy_data(80);
        let data = LabeledMatrix::new(&x, &y).unwrap();
        let booster = Booster::train(&BoosterParams::default(), 3.0, &data, Some(&data)).unwrap();

        let p = booster.predict_proba(&x).unwrap();
        for (prob, label) in p.iter().zip(&y) {
            if *label == 1 {
                assert!(*prob > 0.5, "positive scored {prob}");
            } else {
                assert!(*prob < 0.5, "negative scored {prob}");
            }
        }
        assert_eq!(booster.best_score(), Some(1.0));
    }

    #[test]
    fn test_early_stopping_truncates_to_best_round() {
        let (x, y) = toy_data(40);
        let data = LabeledMatrix::new(&x, &y).unwrap();
        let params = BoosterParams {
            num_rounds: 200,
            early_stopping_rounds: 5,
            ..BoosterParams::default()
        };
        let booster = Booster::train(&params, 1.0, &data, Some(&data)).unwrap();

        // Perfect ranking from the first round: nothing ever beats round 0.
        assert_eq!(booster.best_iteration(), 0);
        assert_eq!(booster.num_trees(), 1);
    }

    #[test]
    fn test_without_eval_keeps_all_rounds() {
        let (x, y) = toy_data(20);
        let data = LabeledMatrix::new(&x, &y).unwrap();
        let params = BoosterParams {
            num_rounds: 7,
            ..BoosterParams::default()
        };
        let booster = Booster::train(&params, 1.0, &data, None).unwrap();
        assert_eq!(booster.num_trees(), 7);
        assert_eq!(booster.best_iteration(), 6);
        assert_eq!(booster.best_score(), None);
    }

    #[test]
    fn test_deterministic() {
        let (x, y) = toy_data(60);
        let data = LabeledMatrix::new(&x, &y).unwrap();
        let params = BoosterParams {
            num_rounds: 20,
            ..BoosterParams::default()
        };
        let a = Booster::train(&params, 2.0, &data, None).unwrap();
        let b = Booster::train(&params, 2.0, &data, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn test_bytes_round_trip_predicts_identically() {
        let (x, y) = toy_data(40);
        let data = LabeledMatrix::new(&x, &y).unwrap();
        let params = BoosterParams {
            num_rounds: 10,
            ..BoosterParams::default()
        };
        let booster = Booster::train(&params, 1.0, &data, None).unwrap();
        let restored = Booster::from_bytes(&booster.to_bytes().unwrap()).unwrap();
        assert_eq!(
            booster.predict_margin(&x).unwrap(),
            restored.predict_margin(&x).unwrap()
        );
    }

    #[test]
    fn test_from_bytes_rejects_foreign_documents() {
        assert!(Booster::from_bytes(b"not json").is_err());
        let foreign = serde_json::json!({
            "format": "other",
            "version": 1,
            "objective": "binary:logistic",
            "base_margin": 0.0,
            "num_features": 1,
            "best_iteration": 0,
            "best_score": null,
            "trees": []
        });
        let err = Booster::from_bytes(foreign.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidData(_)));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = toy_data(8);
        let data = LabeledMatrix::new(&x, &y).unwrap();
        let params = BoosterParams {
            num_rounds: 1,
            ..BoosterParams::default()
        };
        let booster = Booster::train(&params, 1.0, &data, None).unwrap();
        assert!(booster.predict_margin(&FeatureMatrix::new(5)).is_err());
    }

    #[test]
    fn test_labeled_matrix_validation() {
        let x = FeatureMatrix::from_dense(1, &[vec![1.0], vec![0.0]]);
        assert!(LabeledMatrix::new(&x, &[1]).is_err());
        assert!(LabeledMatrix::new(&x, &[1, 2]).is_err());
        assert!(LabeledMatrix::new(&x, &[1, 0]).is_ok());
    }

    #[test]
    fn test_params_validation() {
        assert!(BoosterParams::default().validate().is_ok());
        let bad = BoosterParams {
            subsample: 1.5,
            ..BoosterParams::default()
        };
        assert_eq!(bad.validate().unwrap_err().0, "subsample");
    }
}
