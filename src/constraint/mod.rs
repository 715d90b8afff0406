//! Constraint construction driver and Jacobian products.
//!
//! `mj_make_constraint` runs the full build: pre-count section sizes,
//! reserve the arena slices, instantiate equality / friction / limit /
//! contact rows in that fixed order, finalize the sparse layout (transpose
//! plus supernodes), and assemble per-row parameters. The companion entry
//! points `mj_project_constraint`, `mj_reference_constraint`, and
//! `mj_constraint_update` are called by the outer stepper in that order.

pub mod contact;
pub mod count;
pub mod equality;
pub mod friction;
pub mod impedance;
pub mod limit;
pub mod project;
pub mod row;
pub mod update;

pub use project::mj_project_constraint;
pub use update::{mj_constraint_update, mj_reference_constraint};

use crate::types::{
    disabled, mj_warning, ConeType, ConstraintState, Data, EngineError, JacobianMode, Model,
    SolverType, Warning, DISABLE_CONSTRAINT, NV_SPARSE_AUTO,
};

use self::contact::instantiate_contact;
use self::count::mj_precount;
use self::equality::instantiate_equality;
use self::friction::instantiate_friction;
use self::impedance::{mj_diag_approx, mj_make_impedance};
use self::limit::instantiate_limit;

/// Whether the pyramidal friction-cone approximation is selected.
#[must_use]
pub fn mj_is_pyramidal(model: &Model) -> bool {
    model.cone == ConeType::Pyramidal
}

/// Whether the sparse constraint Jacobian layout is selected.
#[must_use]
pub fn mj_is_sparse(model: &Model) -> bool {
    match model.jacobian {
        JacobianMode::Sparse => true,
        JacobianMode::Dense => false,
        JacobianMode::Auto => model.nv >= NV_SPARSE_AUTO,
    }
}

/// Whether a dual solver consumes `A_R` this step.
#[must_use]
pub fn mj_is_dual(model: &Model) -> bool {
    model.solver == SolverType::PGS || model.noslip_iterations > 0
}

/// `res := J · vec` (`vec` of length `nv`, `res` of length `nefc`).
pub fn mj_mul_jac_vec(_model: &Model, data: &Data, res: &mut [f64], vec: &[f64]) {
    if data.nefc == 0 {
        return;
    }
    data.efc_J.mul_vec(vec, res);
}

/// `res := Jᵀ · vec` (`vec` of length `nefc`, `res` of length `nv`).
pub fn mj_mul_jac_t_vec(_model: &Model, data: &Data, res: &mut [f64], vec: &[f64]) {
    if data.nefc == 0 {
        return;
    }
    data.efc_J.mul_t_vec(vec, res);
}

/// Build the constraint rows and per-row parameters for this step.
///
/// On arena exhaustion the constraint set is truncated (warning recorded,
/// never an error); a realized count that disagrees with the pre-count is a
/// fatal [`EngineError`].
pub fn mj_make_constraint(model: &Model, data: &mut Data) -> Result<(), EngineError> {
    data.clear_efc();

    if disabled(model, DISABLE_CONSTRAINT) {
        return Ok(());
    }

    let sparse = mj_is_sparse(model);
    let dual = mj_is_dual(model);

    // Pre-count section sizes so the arena slices are allocated once.
    let pc = mj_precount(model, data);
    let nefc_alloc = pc.nefc();
    let nnz_alloc = if sparse {
        pc.nnz
    } else {
        nefc_alloc * model.nv
    };

    if data
        .alloc_efc(model.nv, nefc_alloc, nnz_alloc, sparse, dual)
        .is_err()
    {
        let info = nefc_alloc as i32;
        mj_warning(data, Warning::ConstraintFull, info);
        data.clear_efc();
        return Ok(());
    }

    // Instantiate in the fixed row order; a full buffer truncates at the
    // last complete block.
    let mut full = instantiate_equality(model, data)?;
    if !full {
        full = instantiate_friction(model, data)?;
    }
    if !full {
        full = instantiate_limit(model, data)?;
    }
    if !full {
        full = instantiate_contact(model, data)?;
    }
    if full {
        let info = data.nefc as i32;
        mj_warning(data, Warning::ConstraintFull, info);
    }

    // The realized rows must agree with the pre-count: exactly in sparse
    // mode (the empty guard is mirrored symbolically), as an upper bound in
    // dense mode (zero-Jacobian blocks are only detected during emission).
    if sparse && !full {
        if data.ne != pc.ne {
            return Err(EngineError::CountMismatch {
                what: "ne",
                found: data.ne,
                allocated: pc.ne,
            });
        }
        if data.nf != pc.nf {
            return Err(EngineError::CountMismatch {
                what: "nf",
                found: data.nf,
                allocated: pc.nf,
            });
        }
        if data.nefc != nefc_alloc {
            return Err(EngineError::CountMismatch {
                what: "nefc",
                found: data.nefc,
                allocated: nefc_alloc,
            });
        }
    } else if data.nefc > nefc_alloc {
        return Err(EngineError::CountMismatch {
            what: "nefc",
            found: data.nefc,
            allocated: nefc_alloc,
        });
    }
    if data.efc_J.nnz() > nnz_alloc {
        return Err(EngineError::NnzOverflow {
            found: data.efc_J.nnz(),
            allocated: nnz_alloc,
        });
    }
    data.nnz_J = data.efc_J.nnz();

    data.maxuse_con = data.maxuse_con.max(data.contacts.len());
    data.maxuse_efc = data.maxuse_efc.max(data.nefc);

    if data.nefc == 0 {
        return Ok(());
    }

    // Size the parameter and solver-facing arrays now that nefc is known.
    let nefc = data.nefc;
    data.efc_diagApprox = vec![0.0; nefc];
    data.efc_R = vec![0.0; nefc];
    data.efc_D = vec![0.0; nefc];
    data.efc_KBIP = vec![[0.0; 4]; nefc];
    data.efc_vel = vec![0.0; nefc];
    data.efc_aref = vec![0.0; nefc];
    data.efc_force = vec![0.0; nefc];
    data.efc_state = vec![ConstraintState::Quadratic; nefc];

    // Sparse layout: transpose and supernodes.
    if sparse {
        data.efc_J.finalize_sparse();
    }

    mj_diag_approx(model, data);
    mj_make_impedance(model, data);

    Ok(())
}
