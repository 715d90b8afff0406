//! Limit instantiation: slide/hinge sides, ball rotation limits, and tendon
//! length limits.
//!
//! Distances follow the convention "positive = satisfied": a row is emitted
//! when the signed distance drops below the element margin, with Jacobian
//! `−side · ∂value/∂q` so that positive force pushes away from the limit.

use crate::jacobian::quat_to_axis_angle;
use crate::types::{disabled, ConstraintType, Data, EngineError, MjJointType, Model,
    DISABLE_LIMIT};

use super::impedance::{ball_limit_quat, mj_assign_margin};
use super::row::{add_constraint, AddResult};

/// Instantiate limit rows. Returns `true` when the row buffer filled up.
pub(crate) fn instantiate_limit(model: &Model, data: &mut Data) -> Result<bool, EngineError> {
    if disabled(model, DISABLE_LIMIT) {
        return Ok(false);
    }
    let sparse = data.efc_J.is_sparse();
    let nv = model.nv;

    // Joint limits.
    for i in 0..model.njnt {
        if !model.jnt_limited[i] {
            continue;
        }
        let margin = mj_assign_margin(model, model.jnt_margin[i]);

        match model.jnt_type[i] {
            MjJointType::Slide | MjJointType::Hinge => {
                let dof = model.jnt_dofadr[i];
                let value = data.qpos[model.jnt_qposadr[i]];

                for side in [-1.0_f64, 1.0] {
                    let range = if side < 0.0 {
                        model.jnt_range[i].0
                    } else {
                        model.jnt_range[i].1
                    };
                    let dist = side * (range - value);
                    if dist >= margin {
                        continue;
                    }

                    let (jac, chain): (Vec<f64>, Vec<usize>) = if sparse {
                        (vec![-side], vec![dof])
                    } else {
                        let mut row = vec![0.0; nv];
                        row[dof] = -side;
                        (row, Vec::new())
                    };
                    let status = add_constraint(
                        model,
                        data,
                        &jac,
                        Some(&[dist]),
                        Some(&[margin]),
                        0.0,
                        1,
                        ConstraintType::LimitJoint,
                        i,
                        if sparse { 1 } else { 0 },
                        if sparse { Some(&chain) } else { None },
                    )?;
                    if status == AddResult::Full {
                        return Ok(true);
                    }
                }
            }

            MjJointType::Ball => {
                let q = ball_limit_quat(data, model.jnt_qposadr[i]);
                let (axis, angle) = quat_to_axis_angle(&q);
                let dist = model.jnt_range[i].0.max(model.jnt_range[i].1) - angle;
                if dist >= margin {
                    continue;
                }

                let dof = model.jnt_dofadr[i];
                let (jac, chain): (Vec<f64>, Vec<usize>) = if sparse {
                    (
                        vec![-axis.x, -axis.y, -axis.z],
                        vec![dof, dof + 1, dof + 2],
                    )
                } else {
                    let mut row = vec![0.0; nv];
                    row[dof] = -axis.x;
                    row[dof + 1] = -axis.y;
                    row[dof + 2] = -axis.z;
                    (row, Vec::new())
                };
                let status = add_constraint(
                    model,
                    data,
                    &jac,
                    Some(&[dist]),
                    Some(&[margin]),
                    0.0,
                    1,
                    ConstraintType::LimitJoint,
                    i,
                    if sparse { 3 } else { 0 },
                    if sparse { Some(&chain) } else { None },
                )?;
                if status == AddResult::Full {
                    return Ok(true);
                }
            }

            MjJointType::Free => {}
        }
    }

    // Tendon limits, both sides tested.
    for t in 0..model.ntendon {
        if !model.tendon_limited[t] {
            continue;
        }
        let value = data.ten_length[t];
        let margin = mj_assign_margin(model, model.tendon_margin[t]);

        for side in [-1.0_f64, 1.0] {
            let range = if side < 0.0 {
                model.tendon_range[t].0
            } else {
                model.tendon_range[t].1
            };
            let dist = side * (range - value);
            if dist >= margin {
                continue;
            }

            let (jac, chain): (Vec<f64>, Vec<usize>) = if sparse {
                let (cols, vals) = data.ten_j_row(t);
                (vals.iter().map(|v| -side * v).collect(), cols.to_vec())
            } else {
                (
                    data.ten_j_dense_row(t, nv)
                        .iter()
                        .map(|v| -side * v)
                        .collect(),
                    Vec::new(),
                )
            };
            let nv_chain = chain.len();
            let status = add_constraint(
                model,
                data,
                &jac,
                Some(&[dist]),
                Some(&[margin]),
                0.0,
                1,
                ConstraintType::LimitTendon,
                t,
                if sparse { nv_chain } else { 0 },
                if sparse { Some(&chain) } else { None },
            )?;
            if status == AddResult::Full {
                return Ok(true);
            }
        }
    }

    Ok(false)
}
