//! Sparse matrix utilities for the constraint Jacobian and `A_R`.
//!
//! Row-compressed storage with per-row column chains, explicit transpose,
//! supernode detection (runs of consecutive rows sharing one column
//! pattern), and the sparse vector combine used by joint/tendon couplings.
//! Column indices within a row are strictly increasing; rows are stored
//! contiguously (`rowadr[i+1] == rowadr[i] + rownnz[i]`).

use nalgebra::DMatrix;

/// CSR matrix with supernode metadata.
#[derive(Debug, Clone, Default)]
pub struct CsrMatrix {
    /// Number of rows.
    pub nrows: usize,
    /// Number of columns.
    pub ncols: usize,
    /// Non-zeros per row.
    pub rownnz: Vec<usize>,
    /// Start of each row in `colind`/`data`.
    pub rowadr: Vec<usize>,
    /// Column indices, strictly increasing within each row.
    pub colind: Vec<usize>,
    /// For each row, the number of *following* rows sharing its column
    /// pattern (zero when the next row differs).
    pub rowsuper: Vec<usize>,
    /// Non-zero values.
    pub data: Vec<f64>,
}

impl CsrMatrix {
    /// Empty matrix with `ncols` columns and reserved capacity.
    #[must_use]
    pub fn with_capacity(ncols: usize, rows: usize, nnz: usize) -> Self {
        Self {
            nrows: 0,
            ncols,
            rownnz: Vec::with_capacity(rows),
            rowadr: Vec::with_capacity(rows),
            colind: Vec::with_capacity(nnz),
            rowsuper: Vec::new(),
            data: Vec::with_capacity(nnz),
        }
    }

    /// Total non-zeros.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.colind.len()
    }

    /// Append one row given its column pattern and values.
    pub fn push_row(&mut self, cols: &[usize], vals: &[f64]) {
        debug_assert_eq!(cols.len(), vals.len());
        debug_assert!(cols.windows(2).all(|w| w[0] < w[1]));
        self.rowadr.push(self.colind.len());
        self.rownnz.push(cols.len());
        self.colind.extend_from_slice(cols);
        self.data.extend_from_slice(vals);
        self.nrows += 1;
    }

    /// Column indices of row `r`.
    #[must_use]
    pub fn row_cols(&self, r: usize) -> &[usize] {
        let adr = self.rowadr[r];
        &self.colind[adr..adr + self.rownnz[r]]
    }

    /// Values of row `r`.
    #[must_use]
    pub fn row_vals(&self, r: usize) -> &[f64] {
        let adr = self.rowadr[r];
        &self.data[adr..adr + self.rownnz[r]]
    }

    /// Dot product of row `r` with a dense vector.
    #[must_use]
    pub fn row_dot(&self, r: usize, vec: &[f64]) -> f64 {
        let adr = self.rowadr[r];
        let mut acc = 0.0;
        for k in 0..self.rownnz[r] {
            acc += self.data[adr + k] * vec[self.colind[adr + k]];
        }
        acc
    }

    /// Recompute the supernode run lengths.
    pub fn compute_rowsuper(&mut self) {
        let n = self.nrows;
        self.rowsuper = vec![0; n];
        if n == 0 {
            return;
        }
        for r in (0..n - 1).rev() {
            let same = self.rownnz[r] == self.rownnz[r + 1]
                && self.row_cols(r) == self.row_cols(r + 1);
            if same {
                self.rowsuper[r] = self.rowsuper[r + 1] + 1;
            }
        }
    }

    /// Explicit transpose (column patterns stay strictly increasing).
    #[must_use]
    pub fn transpose(&self) -> CsrMatrix {
        let mut t = CsrMatrix {
            nrows: self.ncols,
            ncols: self.nrows,
            rownnz: vec![0; self.ncols],
            rowadr: vec![0; self.ncols],
            colind: vec![0; self.nnz()],
            rowsuper: Vec::new(),
            data: vec![0.0; self.nnz()],
        };

        // Count entries per transposed row.
        for &c in &self.colind {
            t.rownnz[c] += 1;
        }
        let mut offset = 0;
        for c in 0..self.ncols {
            t.rowadr[c] = offset;
            offset += t.rownnz[c];
        }

        // Scatter; scanning rows ascending keeps transposed columns sorted.
        let mut fill = vec![0usize; self.ncols];
        for r in 0..self.nrows {
            let adr = self.rowadr[r];
            for k in 0..self.rownnz[r] {
                let c = self.colind[adr + k];
                let dst = t.rowadr[c] + fill[c];
                t.colind[dst] = r;
                t.data[dst] = self.data[adr + k];
                fill[c] += 1;
            }
        }
        t
    }

    /// `res := self · vec`, exploiting supernodes: the column gather is done
    /// once per run of rows sharing a pattern.
    pub fn mul_vec(&self, vec: &[f64], res: &mut [f64]) {
        debug_assert_eq!(res.len(), self.nrows);
        let mut gathered: Vec<f64> = Vec::new();
        let mut r = 0;
        while r < self.nrows {
            let run = if self.rowsuper.is_empty() {
                0
            } else {
                self.rowsuper[r]
            };
            let cols = self.row_cols(r);
            gathered.clear();
            gathered.extend(cols.iter().map(|&c| vec[c]));
            for row in r..=r + run {
                let vals = self.row_vals(row);
                let mut acc = 0.0;
                for (v, g) in vals.iter().zip(&gathered) {
                    acc += v * g;
                }
                res[row] = acc;
            }
            r += run + 1;
        }
    }

    /// Dense copy, for tests and the dense `A_R` path.
    #[must_use]
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(self.nrows, self.ncols);
        for r in 0..self.nrows {
            let adr = self.rowadr[r];
            for k in 0..self.rownnz[r] {
                m[(r, self.colind[adr + k])] = self.data[adr + k];
            }
        }
        m
    }
}

/// Count the non-zeros of `a + b` from the two sorted index sets.
#[must_use]
pub fn combine_sparse_count(a_ind: &[usize], b_ind: &[usize]) -> usize {
    let mut a = 0;
    let mut b = 0;
    let mut nnz = 0;
    while a < a_ind.len() && b < b_ind.len() {
        nnz += 1;
        let (aa, bb) = (a_ind[a], b_ind[b]);
        if aa <= bb {
            a += 1;
        }
        if aa >= bb {
            b += 1;
        }
    }
    nnz + (a_ind.len() - a) + (b_ind.len() - b)
}

/// Merge `a + scl·b` over sorted index sets, returning the combined
/// `(values, indices)`.
#[must_use]
pub fn combine_sparse(
    a_vals: &[f64],
    a_ind: &[usize],
    b_vals: &[f64],
    b_ind: &[usize],
    scl: f64,
) -> (Vec<f64>, Vec<usize>) {
    let mut vals = Vec::with_capacity(a_vals.len() + b_vals.len());
    let mut ind = Vec::with_capacity(a_ind.len() + b_ind.len());
    let mut a = 0;
    let mut b = 0;
    while a < a_ind.len() || b < b_ind.len() {
        let ai = a_ind.get(a).copied();
        let bi = b_ind.get(b).copied();
        match (ai, bi) {
            (Some(x), Some(y)) if x == y => {
                ind.push(x);
                vals.push(a_vals[a] + scl * b_vals[b]);
                a += 1;
                b += 1;
            }
            (Some(x), Some(y)) if x < y => {
                ind.push(x);
                vals.push(a_vals[a]);
                a += 1;
            }
            (Some(_), Some(y)) => {
                ind.push(y);
                vals.push(scl * b_vals[b]);
                b += 1;
            }
            (Some(x), None) => {
                ind.push(x);
                vals.push(a_vals[a]);
                a += 1;
            }
            (None, Some(y)) => {
                ind.push(y);
                vals.push(scl * b_vals[b]);
                b += 1;
            }
            (None, None) => break,
        }
    }
    (vals, ind)
}

/// Constraint Jacobian storage, selected once per step from the model's
/// Jacobian mode. The row builder is the only writer.
#[derive(Debug, Clone)]
pub enum EfcJacobian {
    /// Row-major `nefc × nv`.
    Dense {
        /// Number of columns (`nv`).
        ncols: usize,
        /// Number of appended rows.
        nrows: usize,
        /// Row-major values.
        data: Vec<f64>,
    },
    /// CSR rows plus the explicit transpose built after instantiation.
    Sparse {
        /// The row matrix `J`.
        j: CsrMatrix,
        /// `Jᵀ`, available after `finalize_sparse`.
        jt: Option<CsrMatrix>,
    },
}

impl EfcJacobian {
    /// Empty dense Jacobian with `ncols` columns.
    #[must_use]
    pub fn dense(ncols: usize, row_capacity: usize) -> Self {
        Self::Dense {
            ncols,
            nrows: 0,
            data: Vec::with_capacity(row_capacity * ncols),
        }
    }

    /// Empty sparse Jacobian with `ncols` columns.
    #[must_use]
    pub fn sparse(ncols: usize, row_capacity: usize, nnz_capacity: usize) -> Self {
        Self::Sparse {
            j: CsrMatrix::with_capacity(ncols, row_capacity, nnz_capacity),
            jt: None,
        }
    }

    /// Whether the sparse layout is active.
    #[must_use]
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse { .. })
    }

    /// Number of appended rows.
    #[must_use]
    pub fn nrows(&self) -> usize {
        match self {
            Self::Dense { nrows, .. } => *nrows,
            Self::Sparse { j, .. } => j.nrows,
        }
    }

    /// Realized non-zeros (dense rows count full width).
    #[must_use]
    pub fn nnz(&self) -> usize {
        match self {
            Self::Dense { ncols, nrows, .. } => ncols * nrows,
            Self::Sparse { j, .. } => j.nnz(),
        }
    }

    /// Append `size` dense rows of width `ncols` from `jac`.
    pub fn append_dense_rows(&mut self, jac: &[f64], size: usize) {
        match self {
            Self::Dense { ncols, nrows, data } => {
                debug_assert_eq!(jac.len(), size * *ncols);
                data.extend_from_slice(jac);
                *nrows += size;
            }
            Self::Sparse { .. } => unreachable!("dense append on sparse Jacobian"),
        }
    }

    /// Append `size` sparse rows sharing the column pattern `chain`; `jac`
    /// holds `size × chain.len()` values row-major.
    pub fn append_sparse_rows(&mut self, jac: &[f64], size: usize, chain: &[usize]) {
        match self {
            Self::Sparse { j, .. } => {
                let nv_chain = chain.len();
                debug_assert!(jac.len() >= size * nv_chain);
                for i in 0..size {
                    j.push_row(chain, &jac[i * nv_chain..(i + 1) * nv_chain]);
                }
            }
            Self::Dense { .. } => unreachable!("sparse append on dense Jacobian"),
        }
    }

    /// Build the transpose and supernodes once all rows are in.
    pub fn finalize_sparse(&mut self) {
        if let Self::Sparse { j, jt } = self {
            j.compute_rowsuper();
            let mut t = j.transpose();
            t.compute_rowsuper();
            *jt = Some(t);
        }
    }

    /// `res := J · vec` (length `nefc`).
    pub fn mul_vec(&self, vec: &[f64], res: &mut [f64]) {
        match self {
            Self::Dense { ncols, nrows, data } => {
                for r in 0..*nrows {
                    let row = &data[r * ncols..(r + 1) * ncols];
                    let mut acc = 0.0;
                    for (a, b) in row.iter().zip(vec) {
                        acc += a * b;
                    }
                    res[r] = acc;
                }
            }
            Self::Sparse { j, .. } => j.mul_vec(vec, res),
        }
    }

    /// `res := Jᵀ · vec` (length `nv`).
    pub fn mul_t_vec(&self, vec: &[f64], res: &mut [f64]) {
        match self {
            Self::Dense { ncols, nrows, data } => {
                res.fill(0.0);
                for r in 0..*nrows {
                    let v = vec[r];
                    if v == 0.0 {
                        continue;
                    }
                    let row = &data[r * ncols..(r + 1) * ncols];
                    for (out, a) in res.iter_mut().zip(row) {
                        *out += a * v;
                    }
                }
            }
            Self::Sparse { j, jt } => match jt {
                Some(t) => t.mul_vec(vec, res),
                None => {
                    // Transpose not built yet: scatter from J rows.
                    res.fill(0.0);
                    for r in 0..j.nrows {
                        let v = vec[r];
                        if v == 0.0 {
                            continue;
                        }
                        let adr = j.rowadr[r];
                        for k in 0..j.rownnz[r] {
                            res[j.colind[adr + k]] += j.data[adr + k] * v;
                        }
                    }
                }
            },
        }
    }

    /// Gather row `r` into a dense vector of width `ncols`.
    #[must_use]
    pub fn row_dense(&self, r: usize) -> Vec<f64> {
        match self {
            Self::Dense { ncols, data, .. } => data[r * ncols..(r + 1) * ncols].to_vec(),
            Self::Sparse { j, .. } => {
                let mut row = vec![0.0; j.ncols];
                let adr = j.rowadr[r];
                for k in 0..j.rownnz[r] {
                    row[j.colind[adr + k]] = j.data[adr + k];
                }
                row
            }
        }
    }

    /// Dot product of row `r` with a dense vector.
    #[must_use]
    pub fn row_dot(&self, r: usize, vec: &[f64]) -> f64 {
        match self {
            Self::Dense { ncols, data, .. } => {
                let row = &data[r * ncols..(r + 1) * ncols];
                row.iter().zip(vec).map(|(a, b)| a * b).sum()
            }
            Self::Sparse { j, .. } => j.row_dot(r, vec),
        }
    }

    /// Dense copy, for tests.
    #[must_use]
    pub fn to_dense(&self) -> DMatrix<f64> {
        match self {
            Self::Dense { ncols, nrows, data } => {
                DMatrix::from_row_slice(*nrows, *ncols, data)
            }
            Self::Sparse { j, .. } => j.to_dense(),
        }
    }
}
