//! Seeded stratified train/test split.
//!
//! `n_test = ceil(test_fraction * n)`. Each class contributes the floor of its
//! proportional share of test rows; leftover slots go to the classes with the
//! largest fractional remainder, lower class label first on ties. Rows within
//! a class are shuffled before the test quota is taken, and both partitions
//! are shuffled afterwards, all from one `StdRng` seeded with the run's seed.

use crate::error::{Result, TrainingError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::debug;

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    /// Gather `items` into (train, test) following the split.
    pub fn apply<T: Clone>(&self, items: &[T]) -> (Vec<T>, Vec<T>) {
        let pick = |idx: &[usize]| -> Vec<T> { idx.iter().map(|&i| items[i].clone()).collect() };
        (pick(&self.train), pick(&self.test))
    }
}

/// Split row indices so both partitions keep the class ratio of `labels`.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    let n = labels.len();
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(TrainingError::InvalidConfig(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let mut classes: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        classes.entry(label).or_default().push(i);
    }

    if let Some((label, members)) = classes.iter().find(|(_, members)| members.len() < 2) {
        return Err(TrainingError::InvalidData(format!(
            "class {} has {} member(s); the stratified split needs at least 2 per class",
            label,
            members.len()
        )));
    }

    let n_test = (test_fraction * n as f64).ceil() as usize;
    let n_train = n - n_test;
    let n_classes = classes.len();
    if n_test < n_classes || n_train < n_classes {
        return Err(TrainingError::InvalidData(format!(
            "a split of {} rows into train={} / test={} cannot hold all {} classes",
            n, n_train, n_test, n_classes
        )));
    }

    let quotas = test_quotas(&classes, n, n_test);
    debug!("Stratified split: n={}, n_test={}, quotas={:?}", n, n_test, quotas);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (label, members) in &classes {
        let mut shuffled = members.clone();
        shuffled.shuffle(&mut rng);
        let quota = quotas[label];
        test.extend_from_slice(&shuffled[..quota]);
        train.extend_from_slice(&shuffled[quota..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(SplitIndices { train, test })
}

fn test_quotas(classes: &BTreeMap<u8, Vec<usize>>, n: usize, n_test: usize) -> BTreeMap<u8, usize> {
    let mut quotas = BTreeMap::new();
    let mut remainders: Vec<(u8, f64)> = Vec::new();
    for (&label, members) in classes {
        let exact = members.len() as f64 * n_test as f64 / n as f64;
        let floor = exact.floor();
        quotas.insert(label, floor as usize);
        remainders.push((label, exact - floor));
    }

    let assigned: usize = quotas.values().sum();
    // Stable: equal remainders keep ascending label order.
    remainders.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (label, _) in remainders.into_iter().take(n_test.saturating_sub(assigned)) {
        if let Some(q) = quotas.get_mut(&label) {
            *q += 1;
        }
    }
    quotas
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn labels(pos: usize, neg: usize) -> Vec<u8> {
        let mut y = vec![1u8; pos];
        y.extend(vec![0u8; neg]);
        y
    }

    #[test]
    fn test_sizes_and_class_ratio() {
        let y = labels(20, 80);
        let split = stratified_split(&y, 0.2, 42).unwrap();

        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        assert_eq!(split.test.iter().filter(|&&i| y[i] == 1).count(), 4);
        assert_eq!(split.train.iter().filter(|&&i| y[i] == 1).count(), 16);
    }

    #[test]
    fn test_partitions_cover_all_rows_once() {
        let y = labels(7, 30);
        let split = stratified_split(&y, 0.2, 42).unwrap();

        let all: HashSet<usize> = split.train.iter().chain(&split.test).copied().collect();
        assert_eq!(all.len(), y.len());
        assert_eq!(split.train.len() + split.test.len(), y.len());
        assert_eq!(split.test.len(), 8); // ceil(0.2 * 37)
    }

    #[test]
    fn test_remainder_goes_to_largest_fraction() {
        // n=37, n_test=8: exact shares 1.51 (pos) and 6.49 (neg)
        let y = labels(7, 30);
        let split = stratified_split(&y, 0.2, 42).unwrap();
        assert_eq!(split.test.iter().filter(|&&i| y[i] == 1).count(), 2);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let y = labels(10, 90);
        assert_eq!(
            stratified_split(&y, 0.2, 42).unwrap(),
            stratified_split(&y, 0.2, 42).unwrap()
        );
        assert_ne!(
            stratified_split(&y, 0.2, 42).unwrap(),
            stratified_split(&y, 0.2, 7).unwrap()
        );
    }

    #[test]
    fn test_single_class_is_allowed() {
        let y = labels(0, 10);
        let split = stratified_split(&y, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 8);
    }

    #[test]
    fn test_tiny_class_rejected() {
        let err = stratified_split(&labels(1, 50), 0.2, 42).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidData(_)));
    }

    #[test]
    fn test_partition_too_small_rejected() {
        // n=4, n_test=1 < 2 classes
        let err = stratified_split(&labels(2, 2), 0.2, 42).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidData(_)));
    }

    #[test]
    fn test_apply() {
        let split = SplitIndices {
            train: vec![2, 0],
            test: vec![1],
        };
        let (train, test) = split.apply(&["a", "b", "c"]);
        assert_eq!(train, vec!["c", "a"]);
        assert_eq!(test, vec!["b"]);
    }
}
