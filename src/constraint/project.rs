//! Projected constraint inertia `A_R = J·M⁻¹·Jᵀ + diag(R)`.
//!
//! Built only for dual solvers (PGS, or any no-slip post-pass). Each row of
//! `J` is half-solved against the mass-matrix factor
//! (`x := D^{−1/2}·L^{−T}·x`), giving `X` with `A_R = X·Xᵀ + diag(R)`. The
//! sparse path widens each row's pattern to the union of its columns and
//! all their `dof_parent` ancestors (the factor can only fill inside that
//! closure), then forms the sparse `X·Xᵀ` product row by row.

use nalgebra::DMatrix;

use crate::linalg::mj_solve_m2;
use crate::sparse::CsrMatrix;
use crate::types::{ArMatrix, Data, Model};

use super::mj_is_dual;

/// Build `efc_AR` for dual solvers; no-op otherwise.
pub fn mj_project_constraint(model: &Model, data: &mut Data) {
    let nefc = data.nefc;
    if nefc == 0 || !mj_is_dual(model) {
        return;
    }
    let nv = model.nv;
    let (rowadr, rownnz, colind) = model.qld_csr();

    if data.efc_J.is_sparse() {
        // Half-solve each row on the parent-closed pattern.
        let jm2 = {
            let crate::sparse::EfcJacobian::Sparse { j, .. } = &data.efc_J else {
                unreachable!("sparse path requires sparse J");
            };

            let mut jm2 = CsrMatrix::with_capacity(nv, nefc, j.nnz());
            let mut in_pattern = vec![false; nv];
            let mut pattern: Vec<usize> = Vec::with_capacity(nv);
            let mut x = vec![0.0; nv];

            for r in 0..nefc {
                // Union pattern: row columns plus all their ancestors.
                pattern.clear();
                for &c in j.row_cols(r) {
                    let mut d = Some(c);
                    while let Some(dd) = d {
                        if in_pattern[dd] {
                            break;
                        }
                        in_pattern[dd] = true;
                        pattern.push(dd);
                        d = model.dof_parent[dd];
                    }
                }
                pattern.sort_unstable();

                // Scatter, half-solve restricted to the pattern, gather.
                for (&c, &v) in j.row_cols(r).iter().zip(j.row_vals(r)) {
                    x[c] = v;
                }
                for &d in pattern.iter().rev() {
                    let xi = x[d];
                    if xi == 0.0 {
                        continue;
                    }
                    x[d] = xi * data.qLD_diag_sqrt_inv[d];
                    let start = rowadr[d];
                    for k in 0..rownnz[d] - 1 {
                        x[colind[start + k]] -= data.qLD_data[start + k] * xi;
                    }
                }

                let vals: Vec<f64> = pattern.iter().map(|&c| x[c]).collect();
                jm2.push_row(&pattern, &vals);

                for &c in &pattern {
                    x[c] = 0.0;
                    in_pattern[c] = false;
                }
            }
            jm2
        };

        let jm2t = jm2.transpose();
        let mut jm2 = jm2;
        jm2.compute_rowsuper();

        // AR = JM2 · JM2ᵀ, row by row over the interacting pairs.
        let mut ar = CsrMatrix::with_capacity(nefc, nefc, nefc);
        let mut w = vec![0.0; nv];
        let mut touched = vec![false; nefc];
        let mut mates: Vec<usize> = Vec::new();

        for r in 0..nefc {
            for (&c, &v) in jm2.row_cols(r).iter().zip(jm2.row_vals(r)) {
                w[c] = v;
            }

            // Rows sharing any column with row r.
            mates.clear();
            for &c in jm2.row_cols(r) {
                for &s in jm2t.row_cols(c) {
                    if !touched[s] {
                        touched[s] = true;
                        mates.push(s);
                    }
                }
            }
            mates.sort_unstable();

            let mut vals = Vec::with_capacity(mates.len());
            for &s in &mates {
                let mut dot = jm2.row_dot(s, &w);
                if s == r {
                    dot += data.efc_R[r];
                }
                vals.push(dot);
            }
            ar.push_row(&mates, &vals);

            for &c in jm2.row_cols(r) {
                w[c] = 0.0;
            }
            for &s in &mates {
                touched[s] = false;
            }
        }

        data.efc_AR = Some(ArMatrix::Sparse(ar));
    } else {
        // Dense: half-solve every row, then one symmetric product.
        let mut x_mat = DMatrix::<f64>::zeros(nefc, nv);
        for r in 0..nefc {
            let mut row = data.efc_J.row_dense(r);
            mj_solve_m2(
                rowadr,
                rownnz,
                colind,
                &data.qLD_data,
                &data.qLD_diag_sqrt_inv,
                &mut row,
            );
            for c in 0..nv {
                x_mat[(r, c)] = row[c];
            }
        }

        let mut ar = &x_mat * x_mat.transpose();
        for r in 0..nefc {
            ar[(r, r)] += data.efc_R[r];
        }
        data.efc_AR = Some(ArMatrix::Dense(ar));
    }
}
