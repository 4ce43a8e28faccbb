//! Sparse feature matrix.
//!
//! TF-IDF rows are overwhelmingly zero, so [`FeatureMatrix`] stores them in
//! compressed sparse row form. Column indices inside a row are strictly
//! increasing, which lets [`SparseRow::get`] binary-search.

/// Row-major sparse matrix of `f32` term weights.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl FeatureMatrix {
    /// An empty matrix with `n_cols` columns and no rows.
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            indptr: vec![0],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Append a row. Entries must be sorted by column and in range.
    pub fn push_row(&mut self, entries: &[(u32, f32)]) {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        debug_assert!(entries.iter().all(|&(c, _)| (c as usize) < self.n_cols));

        for &(col, value) in entries {
            self.indices.push(col);
            self.values.push(value);
        }
        self.indptr.push(self.indices.len());
    }

    /// Build from dense rows; zeros are dropped. Mostly useful in tests.
    pub fn from_dense(n_cols: usize, rows: &[Vec<f32>]) -> Self {
        let mut matrix = Self::new(n_cols);
        for row in rows {
            let entries: Vec<(u32, f32)> = row
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0.0)
                .map(|(c, v)| (c as u32, *v))
                .collect();
            matrix.push_row(&entries);
        }
        matrix
    }

    pub fn n_rows(&self) -> usize {
        self.indptr.len() - 1
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols)
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, i: usize) -> SparseRow<'_> {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        SparseRow {
            indices: &self.indices[start..end],
            values: &self.values[start..end],
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = SparseRow<'_>> {
        (0..self.n_rows()).map(move |i| self.row(i))
    }

    /// A dense copy of one row.
    pub fn dense_row(&self, i: usize) -> Vec<f32> {
        let mut dense = vec![0.0; self.n_cols];
        for (col, value) in self.row(i).iter() {
            dense[col as usize] = value;
        }
        dense
    }

    /// A new matrix holding the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut out = Self::new(self.n_cols);
        for &i in rows {
            let row = self.row(i);
            out.indices.extend_from_slice(row.indices);
            out.values.extend_from_slice(row.values);
            out.indptr.push(out.indices.len());
        }
        out
    }
}

/// Borrowed view of one matrix row.
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    indices: &'a [u32],
    values: &'a [f32],
}

impl<'a> SparseRow<'a> {
    /// Value at `col`; absent entries are zero.
    pub fn get(&self, col: u32) -> f32 {
        match self.indices.binary_search(&col) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + 'a {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_read_rows() {
        let mut m = FeatureMatrix::new(4);
        m.push_row(&[(0, 1.0), (3, 0.5)]);
        m.push_row(&[]);
        m.push_row(&[(2, 0.25)]);

        assert_eq!(m.shape(), (3, 4));
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.row(0).get(3), 0.5);
        assert_eq!(m.row(0).get(1), 0.0);
        assert_eq!(m.row(1).nnz(), 0);
        assert_eq!(m.dense_row(2), vec![0.0, 0.0, 0.25, 0.0]);
    }

    #[test]
    fn test_from_dense_drops_zeros() {
        let m = FeatureMatrix::from_dense(3, &[vec![0.0, 2.0, 0.0], vec![1.0, 0.0, 3.0]]);
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.row(1).iter().collect::<Vec<_>>(), vec![(0, 1.0), (2, 3.0)]);
    }

    #[test]
    fn test_select_rows() {
        let m = FeatureMatrix::from_dense(2, &[vec![1.0, 0.0], vec![0.0, 2.0], vec![3.0, 3.0]]);
        let picked = m.select_rows(&[2, 0]);
        assert_eq!(picked.shape(), (2, 2));
        assert_eq!(picked.dense_row(0), vec![3.0, 3.0]);
        assert_eq!(picked.dense_row(1), vec![1.0, 0.0]);
    }

    #[test]
    fn test_empty_matrix() {
        let m = FeatureMatrix::new(5);
        assert_eq!(m.shape(), (0, 5));
        assert_eq!(m.rows().count(), 0);
    }
}
