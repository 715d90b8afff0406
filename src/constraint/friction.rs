//! Friction-loss instantiation: one row per frictional dof, one per
//! frictional tendon.

use crate::types::{disabled, ConstraintType, Data, EngineError, Model, DISABLE_FRICTIONLOSS};

use super::row::{add_constraint, AddResult};

/// Instantiate friction-loss rows. Returns `true` when the row buffer
/// filled up.
pub(crate) fn instantiate_friction(model: &Model, data: &mut Data) -> Result<bool, EngineError> {
    if disabled(model, DISABLE_FRICTIONLOSS) {
        return Ok(false);
    }
    let sparse = data.efc_J.is_sparse();
    let nv = model.nv;

    // Frictional dofs: unit Jacobian at the dof.
    for i in 0..nv {
        let floss = model.dof_frictionloss[i];
        if floss <= 0.0 {
            continue;
        }
        let (jac, chain): (Vec<f64>, Vec<usize>) = if sparse {
            (vec![1.0], vec![i])
        } else {
            let mut row = vec![0.0; nv];
            row[i] = 1.0;
            (row, Vec::new())
        };
        let status = add_constraint(
            model,
            data,
            &jac,
            None,
            None,
            floss,
            1,
            ConstraintType::FrictionDof,
            i,
            if sparse { 1 } else { 0 },
            if sparse { Some(&chain) } else { None },
        )?;
        if status == AddResult::Full {
            return Ok(true);
        }
    }

    // Frictional tendons: the tendon's length Jacobian row.
    for t in 0..model.ntendon {
        let floss = model.tendon_frictionloss[t];
        if floss <= 0.0 {
            continue;
        }
        let (jac, chain): (Vec<f64>, Vec<usize>) = if sparse {
            let (cols, vals) = data.ten_j_row(t);
            (vals.to_vec(), cols.to_vec())
        } else {
            (data.ten_j_dense_row(t, nv), Vec::new())
        };
        let nv_chain = chain.len();
        let status = add_constraint(
            model,
            data,
            &jac,
            None,
            None,
            floss,
            1,
            ConstraintType::FrictionTendon,
            t,
            if sparse { nv_chain } else { 0 },
            if sparse { Some(&chain) } else { None },
        )?;
        if status == AddResult::Full {
            return Ok(true);
        }
    }

    Ok(false)
}
