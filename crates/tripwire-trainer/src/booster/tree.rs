//! Regression tree over sparse rows.
//!
//! Trees are grown exact-greedy on second-order statistics. Absent sparse
//! entries are real zeros and take part in the split search like any other
//! value. A row goes left when `x < threshold`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tripwire_features::{FeatureMatrix, SparseRow};

/// Gains at or below this are not worth a split.
const MIN_SPLIT_GAIN: f64 = 1e-6;

/// One node of a [`Tree`]. Children are indices into [`Tree::nodes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: u32,
        threshold: f32,
        left: u32,
        right: u32,
    },
    Leaf {
        value: f64,
    },
}

/// A regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Margin contribution of this tree for one row.
    pub fn predict(&self, row: &SparseRow<'_>) -> f64 {
        let mut idx = 0usize;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if row.get(*feature) < *threshold {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
                None => return 0.0,
            }
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Largest feature index used by a split, if any.
    pub fn max_feature(&self) -> Option<u32> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }

    /// Whether every child index points inside the tree and after its parent.
    pub(crate) fn is_well_formed(&self) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Leaf { value } => value.is_finite(),
                Node::Split { left, right, .. } => [*left, *right]
                    .iter()
                    .all(|&c| (c as usize) > i && (c as usize) < self.nodes.len()),
            })
    }
}

/// Per-tree growth settings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub eta: f64,
    pub lambda: f64,
    pub min_child_weight: f64,
}

/// Split candidate; among equal gains the first one found wins, which is the
/// lowest feature index and then the lowest threshold.
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: u32,
    threshold: f32,
    gain: f64,
}

/// Grows one tree from gradients and hessians of the sampled rows.
pub(crate) struct TreeBuilder<'a> {
    features: &'a FeatureMatrix,
    gradients: &'a [f64],
    hessians: &'a [f64],
    allowed: Vec<bool>,
    params: TreeParams,
}

impl<'a> TreeBuilder<'a> {
    /// `columns` are the feature indices this tree may split on.
    pub fn new(
        features: &'a FeatureMatrix,
        gradients: &'a [f64],
        hessians: &'a [f64],
        columns: &[u32],
        params: TreeParams,
    ) -> Self {
        let mut allowed = vec![false; features.n_cols()];
        for &c in columns {
            if let Some(slot) = allowed.get_mut(c as usize) {
                *slot = true;
            }
        }
        Self {
            features,
            gradients,
            hessians,
            allowed,
            params,
        }
    }

    pub fn build(&self, rows: &[usize]) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(rows, 0, &mut nodes);
        Tree { nodes }
    }

    fn build_node(&self, rows: &[usize], depth: usize, nodes: &mut Vec<Node>) -> u32 {
        let current = nodes.len();
        let (g, h) = self.sums(rows);

        let split = if depth < self.params.max_depth {
            self.find_best_split(rows, g, h)
        } else {
            None
        };

        let Some(split) = split else {
            nodes.push(Node::Leaf {
                value: self.leaf_value(g, h),
            });
            return current as u32;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&r| self.features.row(r).get(split.feature) < split.threshold);

        // Reserve the slot; children are patched in once built.
        nodes.push(Node::Leaf { value: 0.0 });
        let left = self.build_node(&left_rows, depth + 1, nodes);
        let right = self.build_node(&right_rows, depth + 1, nodes);
        nodes[current] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        current as u32
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.gradients[r], h + self.hessians[r])
        })
    }

    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        if h + self.params.lambda <= 0.0 {
            return 0.0;
        }
        -self.params.eta * g / (h + self.params.lambda)
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn find_best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        if h_total < 2.0 * self.params.min_child_weight {
            return None;
        }

        // feature -> (value, gradient, hessian) of rows with a stored entry
        let mut by_feature: BTreeMap<u32, Vec<(f32, f64, f64)>> = BTreeMap::new();
        for &r in rows {
            for (col, value) in self.features.row(r).iter() {
                if self.allowed[col as usize] {
                    by_feature
                        .entry(col)
                        .or_default()
                        .push((value, self.gradients[r], self.hessians[r]));
                }
            }
        }

        let parent = self.score(g_total, h_total);
        let mut best: Option<SplitCandidate> = None;

        for (feature, mut entries) in by_feature {
            let zero_rows = rows.len() - entries.len();
            if zero_rows > 0 {
                let (g_nz, h_nz) = entries
                    .iter()
                    .fold((0.0, 0.0), |(g, h), e| (g + e.1, h + e.2));
                entries.push((0.0, g_total - g_nz, h_total - h_nz));
            }
            entries.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (mut g_left, mut h_left) = (0.0, 0.0);
            let mut i = 0;
            while i < entries.len() {
                let value = entries[i].0;
                while i < entries.len() && entries[i].0 == value {
                    g_left += entries[i].1;
                    h_left += entries[i].2;
                    i += 1;
                }
                if i == entries.len() {
                    break;
                }

                let (g_right, h_right) = (g_total - g_left, h_total - h_left);
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                    continue;
                }

                let gain =
                    0.5 * (self.score(g_left, h_left) + self.score(g_right, h_right) - parent);
                if gain <= MIN_SPLIT_GAIN {
                    continue;
                }
                if best.is_none_or(|b| gain > b.gain) {
                    let next = entries[i].0;
                    best = Some(SplitCandidate {
                        feature,
                        threshold: split_threshold(value, next),
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Midpoint of two neighbouring values, strictly above `lower`.
///
/// The mean is taken in f64; when it rounds back onto `lower` (adjacent
/// floats) `upper` is used, which still sends `lower` left and `upper` right.
fn split_threshold(lower: f32, upper: f32) -> f32 {
    let mid = ((f64::from(lower) + f64::from(upper)) / 2.0) as f32;
    if mid > lower { mid } else { upper }
}
