//! Evaluation metrics.
//!
//! Precision, recall and F1 follow the zero-division-is-zero convention: a
//! ratio whose denominator is empty evaluates to `0.0` instead of failing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Area under the precision-recall curve as average precision:
/// `Σ (R_k − R_{k−1}) · P_k` over descending distinct score thresholds.
///
/// Returns `0.0` when there are no positives.
pub fn average_precision(labels: &[u8], scores: &[f64]) -> f64 {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    if positives == 0 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let (mut tp, mut fp) = (0usize, 0usize);
    let mut previous_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let score = scores[order[i]];
        while i < order.len() && scores[order[i]] == score {
            if labels[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let recall = tp as f64 / positives as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - previous_recall) * precision;
        previous_recall = recall;
    }
    ap
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Precision, recall, F1 and support of one class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn for_class(class: u8, truth: &[u8], predicted: &[u8]) -> Self {
        let mut tp = 0;
        let mut fp = 0;
        let mut fn_ = 0;
        for (&y, &p) in truth.iter().zip(predicted) {
            match (y == class, p == class) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        Self {
            precision,
            recall,
            f1: f1(precision, recall),
            support: tp + fn_,
        }
    }
}

/// Per-class table with accuracy and averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Classes present in either the truth or the predictions, ascending.
    pub classes: Vec<(u8, ClassMetrics)>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn new(truth: &[u8], predicted: &[u8]) -> Self {
        let labels: BTreeSet<u8> = truth.iter().chain(predicted).copied().collect();
        let classes: Vec<(u8, ClassMetrics)> = labels
            .into_iter()
            .map(|c| (c, ClassMetrics::for_class(c, truth, predicted)))
            .collect();

        let total = truth.len();
        let correct = truth.iter().zip(predicted).filter(|(y, p)| y == p).count();

        let k = classes.len().max(1) as f64;
        let macro_avg = ClassMetrics {
            precision: classes.iter().map(|(_, m)| m.precision).sum::<f64>() / k,
            recall: classes.iter().map(|(_, m)| m.recall).sum::<f64>() / k,
            f1: classes.iter().map(|(_, m)| m.f1).sum::<f64>() / k,
            support: total,
        };

        let weight = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|(_, m)| f(m) * m.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weight(|m| m.precision),
            recall: weight(|m| m.recall),
            f1: weight(|m| m.f1),
            support: total,
        };

        Self {
            accuracy: ratio(correct, total),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (class, m) in &self.classes {
            writeln!(
                f,
                "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                class, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.4} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        Ok(())
    }
}

/// Outcome of scoring the test split at a fixed threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub threshold: f64,
    /// Positive-class precision.
    pub precision: f64,
    /// Positive-class recall.
    pub recall: f64,
    /// Positive-class F1.
    pub f1: f64,
    pub report: ClassificationReport,
}

/// Threshold probabilities (`p >= threshold` is positive) and score them.
pub fn evaluate(truth: &[u8], probabilities: &[f64], threshold: f64) -> EvaluationReport {
    let predicted: Vec<u8> = probabilities
        .iter()
        .map(|&p| u8::from(p >= threshold))
        .collect();
    let positive = ClassMetrics::for_class(1, truth, &predicted);

    EvaluationReport {
        threshold,
        precision: positive.precision,
        recall: positive.recall,
        f1: positive.f1,
        report: ClassificationReport::new(truth, &predicted),
    }
}
