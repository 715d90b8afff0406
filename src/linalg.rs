//! Mass-matrix factor plumbing: sparse `L^T·D·L` factorization and solves.
//!
//! The factor layout follows the model's `qLD` CSR metadata: row `i` holds
//! `L[i, j]` for each ancestor `j` of dof `i` (ascending), then the diagonal
//! `D_i`. The factorization itself belongs to the smooth-dynamics stage of
//! the pipeline; it is provided here as the canonical producer of the
//! `qLD_data` / `qLD_diag_inv` / `qLD_diag_sqrt_inv` inputs the constraint
//! core consumes.

use nalgebra::DMatrix;

use crate::types::{Data, Model};

/// Factor `qm` into `L^T·D·L` using the model's tree sparsity, filling
/// `data.qLD_data`, `data.qLD_diag_inv`, and `data.qLD_diag_sqrt_inv`.
///
/// Entries of `qm` outside the tree pattern are ignored. Diagonal pivots are
/// assumed positive (the mass matrix is SPD); non-positive pivots leave the
/// factor unusable and are the caller's responsibility.
pub fn mj_factor_sparse(model: &Model, qm: &DMatrix<f64>, data: &mut Data) {
    let nv = model.nv;
    let (rowadr, rownnz, colind) = model.qld_csr();

    // Copy M entries into the factor storage.
    for i in 0..nv {
        let start = rowadr[i];
        for k in 0..rownnz[i] {
            data.qLD_data[start + k] = qm[(i, colind[start + k])];
        }
    }

    // Outer-product elimination from the last dof to the first. Within a
    // row, ancestors sit at positions 0..rownnz-1 ascending and the
    // diagonal last; the parent chain is the reverse iteration.
    for k in (0..nv).rev() {
        let adr_k = rowadr[k];
        let nnz_k = rownnz[k];
        let dk = data.qLD_data[adr_k + nnz_k - 1];

        for a in (0..nnz_k - 1).rev() {
            let i = colind[adr_k + a];
            let l_ki = data.qLD_data[adr_k + a] / dk;

            // Row i's columns (ancestors of i, then i) are a suffix-closed
            // subset of row k's; match them with a descending two-pointer.
            let adr_i = rowadr[i];
            let nnz_i = rownnz[i];
            let mut p = a; // position in row k whose col >= current col of row i
            for b in (0..nnz_i).rev() {
                let j = colind[adr_i + b];
                while colind[adr_k + p] > j {
                    p -= 1;
                }
                data.qLD_data[adr_i + b] -= l_ki * data.qLD_data[adr_k + p];
            }

            data.qLD_data[adr_k + a] = l_ki;
        }
    }

    for i in 0..nv {
        let d = data.qLD_data[rowadr[i] + rownnz[i] - 1];
        data.qLD_diag_inv[i] = 1.0 / d;
        data.qLD_diag_sqrt_inv[i] = 1.0 / d.sqrt();
    }
}

/// Solve `L^T·D·L·x = b` in place.
///
/// Off-diagonal entries occupy positions `0..rownnz-1`; the diagonal phase
/// multiplies by the precomputed inverse. Zero entries are skipped in the
/// scatter phase.
pub fn mj_solve_sparse(
    rowadr: &[usize],
    rownnz: &[usize],
    colind: &[usize],
    qld_data: &[f64],
    qld_diag_inv: &[f64],
    x: &mut [f64],
) {
    let nv = x.len();

    // Solve L^T y = b (scatter: propagate each dof to its ancestors).
    for i in (0..nv).rev() {
        let nnz_offdiag = rownnz[i] - 1;
        if nnz_offdiag == 0 {
            continue;
        }
        let xi = x[i];
        if xi == 0.0 {
            continue;
        }
        let start = rowadr[i];
        for k in 0..nnz_offdiag {
            x[colind[start + k]] -= qld_data[start + k] * xi;
        }
    }

    // Solve D z = y.
    for i in 0..nv {
        x[i] *= qld_diag_inv[i];
    }

    // Solve L w = z (gather from ancestors).
    for i in 0..nv {
        let nnz_offdiag = rownnz[i] - 1;
        if nnz_offdiag == 0 {
            continue;
        }
        let start = rowadr[i];
        for k in 0..nnz_offdiag {
            x[i] -= qld_data[start + k] * x[colind[start + k]];
        }
    }
}

/// Half-solve `x := D^{−1/2}·L^{−T}·x` in place.
///
/// This is the back-substitution with the square-root factor used by the
/// projected-inertia builder: `(J·M⁻¹·Jᵀ)[r,s] = ⟨m2(J_r), m2(J_s)⟩` where
/// `m2` is this map. The ancestor updates use the entry value *before* the
/// diagonal scaling.
pub fn mj_solve_m2(
    rowadr: &[usize],
    rownnz: &[usize],
    colind: &[usize],
    qld_data: &[f64],
    qld_diag_sqrt_inv: &[f64],
    x: &mut [f64],
) {
    let nv = x.len();
    for i in (0..nv).rev() {
        let xi = x[i];
        if xi == 0.0 {
            continue;
        }
        x[i] = xi * qld_diag_sqrt_inv[i];
        let start = rowadr[i];
        for k in 0..rownnz[i] - 1 {
            x[colind[start + k]] -= qld_data[start + k] * xi;
        }
    }
}
