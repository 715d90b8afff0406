//! Equality constraint instantiation.
//!
//! Connect (3 rows), weld (6 rows), and joint/tendon cubic couplings
//! (1 row). Residuals follow the convention `pos = value − target`; the
//! weld rotational block applies the quaternion chain-rule correction
//! `0.5 · neg(q1) · (jac0 − jac1) · q0 · relpose` and the `torquescale`
//! factor.

use nalgebra::{Quaternion, Vector3};

use crate::jacobian::mj_jac_dif_pair;
use crate::sparse::combine_sparse;
use crate::types::{disabled, ConstraintType, Data, EngineError, EqualityType, Model,
    DISABLE_EQUALITY};

use super::row::{add_constraint, AddResult};

/// Instantiate all active equality constraints. Returns `true` when the row
/// buffer filled up and instantiation stopped early.
pub(crate) fn instantiate_equality(model: &Model, data: &mut Data) -> Result<bool, EngineError> {
    if disabled(model, DISABLE_EQUALITY) || model.neq == 0 {
        return Ok(false);
    }
    let sparse = data.efc_J.is_sparse();
    let nv = model.nv;

    for i in 0..model.neq {
        if !model.eq_active[i] {
            continue;
        }
        let eq_data = model.eq_data[i];
        let id0 = model.eq_obj1id[i];
        let id1 = model.eq_obj2id[i];

        // Per-constraint row block: values are size × width row-major.
        let mut jac: Vec<f64>;
        let mut cpos: Vec<f64>;
        let size: usize;
        let mut nv_chain = 0usize;
        let mut chain: Vec<usize> = Vec::new();

        match model.eq_type[i] {
            EqualityType::Connect => {
                let b1 = id1.unwrap_or(0);
                // World anchors.
                let anchor = |j: usize, body: usize| -> Vector3<f64> {
                    let a = Vector3::new(eq_data[3 * j], eq_data[3 * j + 1], eq_data[3 * j + 2]);
                    data.xpos[body] + data.xquat[body] * a
                };
                let p0 = anchor(0, id0);
                let p1 = anchor(1, b1);

                cpos = (p0 - p1).iter().copied().collect();

                // Jacobian difference, opposite of contacts: body 0 minus
                // body 1.
                let pair = mj_jac_dif_pair(model, data, b1, id0, &p1, &p0, false, sparse);
                nv_chain = pair.nv_chain;
                chain = pair.chain;
                let w = pair.jacp.ncols();
                jac = vec![0.0; 3 * w];
                for r in 0..3 {
                    for c in 0..w {
                        jac[r * w + c] = pair.jacp[(r, c)];
                    }
                }
                size = 3;
            }

            EqualityType::Weld => {
                let b1 = id1.unwrap_or(0);
                // Anchor stored for the *other* body: body j uses
                // eq_data[3·(1−j)..].
                let anchor = |j: usize, body: usize| -> Vector3<f64> {
                    let a = Vector3::new(
                        eq_data[3 * (1 - j)],
                        eq_data[3 * (1 - j) + 1],
                        eq_data[3 * (1 - j) + 2],
                    );
                    data.xpos[body] + data.xquat[body] * a
                };
                let p0 = anchor(0, id0);
                let p1 = anchor(1, b1);

                let pair = mj_jac_dif_pair(model, data, b1, id0, &p1, &p0, true, sparse);
                nv_chain = pair.nv_chain;
                chain = pair.chain;
                let w = pair.jacp.ncols();

                // Orientation residual: axis part of neg(q1) · q0 · relpose.
                let relpose =
                    Quaternion::new(eq_data[6], eq_data[7], eq_data[8], eq_data[9]);
                let q0 = data.xquat[id0].quaternion().clone();
                let q1neg = data.xquat[b1].quaternion().conjugate();
                let quat = q0 * relpose; // q0 · relpose
                let quat2 = q1neg * quat; // neg(q1) · q0 · relpose

                cpos = vec![0.0; 6];
                let dp = p0 - p1;
                cpos[0..3].copy_from_slice(dp.as_slice());
                cpos[3] = quat2.i;
                cpos[4] = quat2.j;
                cpos[5] = quat2.k;

                // Translational rows, then corrected rotational rows:
                // 0.5 · neg(q1) · (jac0 − jac1) · q0 · relpose, scaled by
                // torquescale.
                let torquescale = eq_data[10];
                jac = vec![0.0; 6 * w];
                for r in 0..3 {
                    for c in 0..w {
                        jac[r * w + c] = pair.jacp[(r, c)];
                    }
                }
                if let Some(jacr) = &pair.jacr {
                    for c in 0..w {
                        let axis =
                            Quaternion::new(0.0, jacr[(0, c)], jacr[(1, c)], jacr[(2, c)]);
                        let quat3 = (q1neg * axis) * quat;
                        jac[3 * w + c] = 0.5 * quat3.i * torquescale;
                        jac[4 * w + c] = 0.5 * quat3.j * torquescale;
                        jac[5 * w + c] = 0.5 * quat3.k * torquescale;
                    }
                }
                size = 6;
            }

            EqualityType::Joint | EqualityType::Tendon => {
                let is_joint = model.eq_type[i] == EqualityType::Joint;

                // Scalar position, reference, and length Jacobian of one
                // object, in (values, dof chain) form.
                let object = |obj: usize| -> (f64, f64, Vec<f64>, Vec<usize>) {
                    if is_joint {
                        let qadr = model.jnt_qposadr[obj];
                        let dof = model.jnt_dofadr[obj];
                        (data.qpos[qadr], model.qpos0[qadr], vec![1.0], vec![dof])
                    } else {
                        let (cols, vals) = data.ten_j_row(obj);
                        (
                            data.ten_length[obj],
                            model.tendon_length0[obj],
                            vals.to_vec(),
                            cols.to_vec(),
                        )
                    }
                };

                let (p0, ref0, j0_vals, j0_chain) = object(id0);

                let (pos_err, vals, cols) = if let Some(id1) = id1 {
                    let (p1, ref1, j1_vals, j1_chain) = object(id1);
                    let dif = p1 - ref1;
                    let pos_err = p0
                        - ref0
                        - (eq_data[0]
                            + eq_data[1] * dif
                            + eq_data[2] * dif * dif
                            + eq_data[3] * dif * dif * dif
                            + eq_data[4] * dif * dif * dif * dif);
                    let deriv = eq_data[1]
                        + 2.0 * eq_data[2] * dif
                        + 3.0 * eq_data[3] * dif * dif
                        + 4.0 * eq_data[4] * dif * dif * dif;
                    let (vals, cols) =
                        combine_sparse(&j0_vals, &j0_chain, &j1_vals, &j1_chain, -deriv);
                    (pos_err, vals, cols)
                } else {
                    (p0 - ref0 - eq_data[0], j0_vals, j0_chain)
                };

                cpos = vec![pos_err];
                if sparse {
                    nv_chain = cols.len();
                    chain = cols;
                    jac = vals;
                } else {
                    jac = vec![0.0; nv];
                    for (&c, &v) in cols.iter().zip(&vals) {
                        jac[c] = v;
                    }
                }
                size = 1;
            }
        }

        let status = add_constraint(
            model,
            data,
            &jac,
            Some(&cpos),
            None,
            0.0,
            size,
            ConstraintType::Equality,
            i,
            if sparse { nv_chain } else { 0 },
            if sparse { Some(&chain) } else { None },
        )?;
        if status == AddResult::Full {
            return Ok(true);
        }
    }

    Ok(false)
}
