//! Reference acceleration and per-row constraint update.
//!
//! `mj_reference_constraint` fills `efc_vel = J·qvel` and
//! `aref = −B·vel − K·I·(pos − margin)`. `mj_constraint_update` classifies
//! every row for a candidate acceleration residual `jar = J·qacc − aref`,
//! computes forces and (optionally) the convex cost and the elliptic cone
//! Hessians, and maps the forces back to joint space.

use nalgebra::DMatrix;

use crate::types::{ConstraintState, ConstraintType, Data, Model};

/// Compute `efc_vel` and `efc_aref` for the current `qvel`.
pub fn mj_reference_constraint(_model: &Model, data: &mut Data) {
    let nefc = data.nefc;
    if nefc == 0 {
        return;
    }

    let qvel = data.qvel.as_slice().to_vec();
    data.efc_J.mul_vec(&qvel, &mut data.efc_vel);

    for i in 0..nefc {
        let [k, b, imp, _] = data.efc_KBIP[i];
        data.efc_aref[i] =
            -b * data.efc_vel[i] - k * imp * (data.efc_pos[i] - data.efc_margin[i]);
    }
}

/// Classify each row for the residual `jar = J·qacc − aref`, compute
/// `efc_force`, `efc_state`, and `qfrc_constraint`; return the scalar cost
/// when `flg_cost` is set, and write per-contact cone Hessians when
/// `flg_cone_hessian` is set.
pub fn mj_constraint_update(
    _model: &Model,
    data: &mut Data,
    jar: &[f64],
    flg_cost: bool,
    flg_cone_hessian: bool,
) -> Option<f64> {
    let ne = data.ne;
    let nf = data.nf;
    let nefc = data.nefc;

    // Stale Hessians from a previous classification must not survive.
    for con in &mut data.contacts {
        con.hessian = None;
    }

    if nefc == 0 {
        data.qfrc_constraint.fill(0.0);
        return flg_cost.then_some(0.0);
    }
    debug_assert_eq!(jar.len(), nefc);

    let mut cost = 0.0;

    // Unconstrained force, overwritten below where the state demands it.
    for i in 0..nefc {
        data.efc_force[i] = -data.efc_D[i] * jar[i];
    }

    // Equality rows: always quadratic.
    for i in 0..ne {
        if flg_cost {
            cost += 0.5 * data.efc_D[i] * jar[i] * jar[i];
        }
        data.efc_state[i] = ConstraintState::Quadratic;
    }

    // Friction rows: two-sided Huber zones at ±R·frictionloss.
    for i in ne..ne + nf {
        let floss = data.efc_frictionloss[i];
        let r = data.efc_R[i];
        if jar[i] <= -r * floss {
            if flg_cost {
                cost += -0.5 * r * floss * floss - floss * jar[i];
            }
            data.efc_force[i] = floss;
            data.efc_state[i] = ConstraintState::LinearNeg;
        } else if jar[i] >= r * floss {
            if flg_cost {
                cost += -0.5 * r * floss * floss + floss * jar[i];
            }
            data.efc_force[i] = -floss;
            data.efc_state[i] = ConstraintState::LinearPos;
        } else {
            if flg_cost {
                cost += 0.5 * data.efc_D[i] * jar[i] * jar[i];
            }
            data.efc_state[i] = ConstraintState::Quadratic;
        }
    }

    // Limits and contacts.
    let mut i = ne + nf;
    while i < nefc {
        if data.efc_type[i] != ConstraintType::ContactElliptic {
            // Unilateral rows: satisfied at non-negative residual.
            if jar[i] >= 0.0 {
                data.efc_force[i] = 0.0;
                data.efc_state[i] = ConstraintState::Satisfied;
            } else {
                if flg_cost {
                    cost += 0.5 * data.efc_D[i] * jar[i] * jar[i];
                }
                data.efc_state[i] = ConstraintState::Quadratic;
            }
            i += 1;
            continue;
        }

        // Elliptic cone block.
        let id = data.efc_id[i];
        let (mu, friction, dim) = {
            let con = &data.contacts[id];
            (con.mu, con.friction, con.dim)
        };

        // Map to the regular dual cone space: U = diag(μ, friction)·jar.
        let mut u = [0.0_f64; 6];
        u[0] = jar[i] * mu;
        for j in 1..dim {
            u[j] = jar[i + j] * friction[j - 1];
        }
        let n = u[0];
        let t = u[1..dim].iter().map(|x| x * x).sum::<f64>().sqrt();

        let state = if n >= mu * t || (t <= 0.0 && n >= 0.0) {
            // Top zone: separated.
            for j in 0..dim {
                data.efc_force[i + j] = 0.0;
            }
            ConstraintState::Satisfied
        } else if mu * n + t <= 0.0 || (t <= 0.0 && n < 0.0) {
            // Bottom zone: fully active, per-row quadratic.
            if flg_cost {
                for j in 0..dim {
                    cost += 0.5 * data.efc_D[i + j] * jar[i + j] * jar[i + j];
                }
            }
            ConstraintState::Quadratic
        } else {
            // Middle zone: on the cone surface.
            let dm = data.efc_D[i] / (mu * mu * (1.0 + mu * mu));
            let nmt = n - mu * t;
            if flg_cost {
                cost += 0.5 * dm * nmt * nmt;
            }

            // force = −dU/djar · ds/dU, with dU/djar = diag(μ, friction).
            data.efc_force[i] = -dm * nmt * mu;
            for j in 1..dim {
                data.efc_force[i + j] = dm * nmt * mu / t * u[j] * friction[j - 1];
            }

            if flg_cone_hessian {
                let mut h = DMatrix::<f64>::zeros(dim, dim);

                // First row: (1, −μ/T · U).
                h[(0, 0)] = 1.0;
                let scl = -mu / t;
                for j in 1..dim {
                    h[(0, j)] = scl * u[j];
                }

                // Upper block: μ·N/T³ · U·Uᵀ, plus (μ² − μ·N/T) on the
                // diagonal.
                let scl = mu * n / (t * t * t);
                for k in 1..dim {
                    for j in k..dim {
                        h[(k, j)] = scl * u[j] * u[k];
                    }
                    h[(k, k)] += mu * mu - mu * n / t;
                }

                // Pre- and post-multiply by diag(μ, friction), scale by Dm.
                for k in 0..dim {
                    let sk = dm * if k == 0 { mu } else { friction[k - 1] };
                    for j in k..dim {
                        h[(k, j)] *= sk * if j == 0 { mu } else { friction[j - 1] };
                    }
                }

                // Symmetrize: copy the upper triangle into the lower.
                for k in 0..dim {
                    for j in k + 1..dim {
                        h[(j, k)] = h[(k, j)];
                    }
                }

                data.contacts[id].hessian = Some(h);
            }

            ConstraintState::Cone
        };

        for j in 0..dim {
            data.efc_state[i + j] = state;
        }
        i += dim;
    }

    // qfrc_constraint = Jᵀ · force.
    let mut qfrc = vec![0.0; data.qfrc_constraint.len()];
    data.efc_J.mul_t_vec(&data.efc_force, &mut qfrc);
    data.qfrc_constraint.copy_from_slice(&qfrc);

    flg_cost.then_some(cost)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::sparse::EfcJacobian;
    use crate::types::Model;
    use approx::assert_relative_eq;

    /// Hand-assembled Data with `nefc` rows of unit D and the given types.
    fn update_fixture(types: &[ConstraintType], ne: usize, nf: usize) -> (Model, Data) {
        let mut model = Model::empty();
        model.nv = 1;
        model.dof_parent = vec![None];
        model.compute_qld_csr_metadata();
        let mut data = model.make_data();
        let nefc = types.len();
        data.nefc = nefc;
        data.ne = ne;
        data.nf = nf;
        data.efc_type = types.to_vec();
        data.efc_id = vec![0; nefc];
        data.efc_pos = vec![0.0; nefc];
        data.efc_margin = vec![0.0; nefc];
        data.efc_frictionloss = vec![0.0; nefc];
        data.efc_R = vec![1.0; nefc];
        data.efc_D = vec![1.0; nefc];
        data.efc_KBIP = vec![[0.0; 4]; nefc];
        data.efc_vel = vec![0.0; nefc];
        data.efc_aref = vec![0.0; nefc];
        data.efc_force = vec![0.0; nefc];
        data.efc_state = vec![ConstraintState::Quadratic; nefc];
        let mut j = EfcJacobian::dense(1, nefc);
        for _ in 0..nefc {
            j.append_dense_rows(&[1.0], 1);
        }
        data.efc_J = j;
        (model, data)
    }

    #[test]
    fn friction_huber_zones() {
        let (model, mut data) =
            update_fixture(&[ConstraintType::FrictionDof], 0, 1);
        data.efc_frictionloss[0] = 2.0;
        data.efc_R[0] = 0.5;
        data.efc_D[0] = 2.0;

        // Quadratic inside the threshold R·f = 1.
        let cost = mj_constraint_update(&model, &mut data, &[0.5], true, false).unwrap();
        assert_eq!(data.efc_state[0], ConstraintState::Quadratic);
        assert_relative_eq!(data.efc_force[0], -1.0);
        assert_relative_eq!(cost, 0.25);

        // Linear positive beyond it.
        let cost = mj_constraint_update(&model, &mut data, &[3.0], true, false).unwrap();
        assert_eq!(data.efc_state[0], ConstraintState::LinearPos);
        assert_relative_eq!(data.efc_force[0], -2.0);
        assert_relative_eq!(cost, -0.5 * 0.5 * 4.0 + 2.0 * 3.0);

        // Linear negative.
        let cost = mj_constraint_update(&model, &mut data, &[-3.0], true, false).unwrap();
        assert_eq!(data.efc_state[0], ConstraintState::LinearNeg);
        assert_relative_eq!(data.efc_force[0], 2.0);
        assert_relative_eq!(cost, -0.5 * 0.5 * 4.0 + 2.0 * 3.0);
    }

    #[test]
    fn unilateral_rows_satisfied_at_positive_jar() {
        let (model, mut data) = update_fixture(&[ConstraintType::LimitJoint], 0, 0);
        let cost = mj_constraint_update(&model, &mut data, &[0.5], true, false).unwrap();
        assert_eq!(data.efc_state[0], ConstraintState::Satisfied);
        assert_relative_eq!(data.efc_force[0], 0.0);
        assert_relative_eq!(cost, 0.0);

        let cost = mj_constraint_update(&model, &mut data, &[-0.5], true, false).unwrap();
        assert_eq!(data.efc_state[0], ConstraintState::Quadratic);
        assert_relative_eq!(data.efc_force[0], 0.5);
        assert_relative_eq!(cost, 0.125);
    }

    #[test]
    fn no_rows_clears_qfrc() {
        let (model, mut data) = update_fixture(&[], 0, 0);
        data.qfrc_constraint[0] = 7.0;
        let cost = mj_constraint_update(&model, &mut data, &[], true, false).unwrap();
        assert_relative_eq!(cost, 0.0);
        assert_relative_eq!(data.qfrc_constraint[0], 0.0);
    }
}
