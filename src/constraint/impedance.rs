//! Parameter assembly: diagonal approximation, solver-parameter fetch and
//! sanitization, the impedance profile, KBIP, and regularization.
//!
//! Runs once per build after all rows are instantiated. Impedance is
//! evaluated per constraint *block* (connect/weld equalities and contact
//! blocks share one profile evaluation); R/D and KBIP are per row.

use nalgebra::UnitQuaternion;

use crate::types::{
    disabled, enabled, mj_warning, ConstraintType, Data, EqualityType, Model, Warning,
    DISABLE_REFSAFE, ENABLE_OVERRIDE, MJ_MAXIMP, MJ_MINIMP, MJ_MINVAL, NIMP, NREF,
};
use crate::types::enums::DEFAULT_SOLREF;

/// Solver reference parameters, subject to global override.
#[must_use]
pub fn mj_assign_ref(model: &Model, source: &[f64; NREF]) -> [f64; NREF] {
    if enabled(model, ENABLE_OVERRIDE) {
        model.o_solref
    } else {
        *source
    }
}

/// Solver impedance parameters, subject to global override.
#[must_use]
pub fn mj_assign_imp(model: &Model, source: &[f64; NIMP]) -> [f64; NIMP] {
    if enabled(model, ENABLE_OVERRIDE) {
        model.o_solimp
    } else {
        *source
    }
}

/// Margin, subject to global override.
#[must_use]
pub fn mj_assign_margin(model: &Model, source: f64) -> f64 {
    if enabled(model, ENABLE_OVERRIDE) {
        model.o_margin
    } else {
        source
    }
}

/// Normalized ball-joint quaternion read from `qpos[adr..adr+4]` (w, x, y, z).
#[must_use]
pub fn ball_limit_quat(data: &Data, adr: usize) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
        data.qpos[adr],
        data.qpos[adr + 1],
        data.qpos[adr + 2],
        data.qpos[adr + 3],
    ))
}

/// Compute `efc_diagApprox`: a per-row inverse-inertia upper bound derived
/// from the participating bodies, dofs, or tendons.
pub fn mj_diag_approx(model: &Model, data: &mut Data) {
    let nefc = data.nefc;
    let mut weldcnt = 0usize;

    let mut i = 0;
    while i < nefc {
        let id = data.efc_id[i];

        // The weld counter tracks the row position inside a 6-row weld
        // block; any other row resets it.
        let in_weld = data.efc_type[i] == ConstraintType::Equality
            && model.eq_type[id] == EqualityType::Weld;
        if !in_weld {
            weldcnt = 0;
        }

        match data.efc_type[i] {
            ConstraintType::Equality => match model.eq_type[id] {
                EqualityType::Connect => {
                    let b1 = model.eq_obj1id[id];
                    let b2 = model.eq_obj2id[id].unwrap_or(0);
                    data.efc_diagApprox[i] =
                        model.body_invweight0[b1][0] + model.body_invweight0[b2][0];
                }
                EqualityType::Weld => {
                    let b1 = model.eq_obj1id[id];
                    let b2 = model.eq_obj2id[id].unwrap_or(0);
                    let c = usize::from(weldcnt > 2);
                    data.efc_diagApprox[i] =
                        model.body_invweight0[b1][c] + model.body_invweight0[b2][c];
                    weldcnt += 1;
                }
                EqualityType::Joint | EqualityType::Tendon => {
                    let is_joint = model.eq_type[id] == EqualityType::Joint;
                    let weight = |obj: usize| {
                        if is_joint {
                            model.dof_invweight0[model.jnt_dofadr[obj]]
                        } else {
                            model.tendon_invweight0[obj]
                        }
                    };
                    let mut da = weight(model.eq_obj1id[id]);
                    if let Some(obj2) = model.eq_obj2id[id] {
                        da += weight(obj2);
                    }
                    data.efc_diagApprox[i] = da;
                }
            },

            ConstraintType::FrictionDof => {
                data.efc_diagApprox[i] = model.dof_invweight0[id];
            }

            ConstraintType::LimitJoint => {
                data.efc_diagApprox[i] = model.dof_invweight0[model.jnt_dofadr[id]];
            }

            ConstraintType::FrictionTendon | ConstraintType::LimitTendon => {
                data.efc_diagApprox[i] = model.tendon_invweight0[id];
            }

            ConstraintType::ContactFrictionless
            | ConstraintType::ContactPyramidal
            | ConstraintType::ContactElliptic => {
                let con = &data.contacts[id];
                let b1 = model.geom_body[con.geom1];
                let b2 = model.geom_body[con.geom2];
                let dim = con.dim;
                let tran = model.body_invweight0[b1][0] + model.body_invweight0[b2][0];
                let rot = model.body_invweight0[b1][1] + model.body_invweight0[b2][1];

                match data.efc_type[i] {
                    ConstraintType::ContactFrictionless => {
                        data.efc_diagApprox[i] = tran;
                    }
                    ConstraintType::ContactElliptic => {
                        for j in 0..dim {
                            data.efc_diagApprox[i + j] = if j < 3 { tran } else { rot };
                        }
                        i += dim - 1;
                    }
                    _ => {
                        // Pyramidal: one facet pair per friction direction.
                        for j in 0..dim - 1 {
                            let fri = con.friction[j];
                            let da = tran + fri * fri * (if j < 2 { tran } else { rot });
                            data.efc_diagApprox[i + 2 * j] = da;
                            data.efc_diagApprox[i + 2 * j + 1] = da;
                        }
                        i += 2 * dim - 3;
                    }
                }
            }
        }

        i += 1;
    }
}

/// Fetch solref/solreffriction/solimp for row `i` from the originating
/// element, apply the global override, and sanitize.
pub(crate) fn get_sol_param(
    model: &Model,
    data: &mut Data,
    i: usize,
) -> ([f64; NREF], [f64; NREF], [f64; NIMP]) {
    let id = data.efc_id[i];

    let (solref_raw, solreffriction_raw, solimp_raw) = match data.efc_type[i] {
        ConstraintType::Equality => (model.eq_solref[id], [0.0; NREF], model.eq_solimp[id]),
        ConstraintType::LimitJoint => (model.jnt_solref[id], [0.0; NREF], model.jnt_solimp[id]),
        ConstraintType::FrictionDof => (model.dof_solref[id], [0.0; NREF], model.dof_solimp[id]),
        ConstraintType::LimitTendon => (
            model.tendon_solref_lim[id],
            [0.0; NREF],
            model.tendon_solimp_lim[id],
        ),
        ConstraintType::FrictionTendon => (
            model.tendon_solref_fri[id],
            [0.0; NREF],
            model.tendon_solimp_fri[id],
        ),
        ConstraintType::ContactFrictionless
        | ConstraintType::ContactPyramidal
        | ConstraintType::ContactElliptic => {
            let con = &data.contacts[id];
            (con.solref, con.solreffriction, con.solimp)
        }
    };

    let mut solref = mj_assign_ref(model, &solref_raw);
    let mut solreffriction = solreffriction_raw;
    let mut solimp = mj_assign_imp(model, &solimp_raw);

    // Reference format is standard (both positive) or direct (both
    // non-positive); a mix is replaced with the default.
    if (solref[0] > 0.0) != (solref[1] > 0.0) {
        mj_warning(data, Warning::BadSolref, id as i32);
        solref = DEFAULT_SOLREF;
    }
    if !disabled(model, DISABLE_REFSAFE) && solref[0] > 0.0 {
        solref[0] = solref[0].max(2.0 * model.timestep);
    }

    if (solreffriction[0] > 0.0) != (solreffriction[1] > 0.0) {
        mj_warning(data, Warning::BadSolreffriction, id as i32);
        solreffriction = [0.0; NREF];
    }
    if !disabled(model, DISABLE_REFSAFE) && solreffriction[0] > 0.0 {
        solreffriction[0] = solreffriction[0].max(2.0 * model.timestep);
    }

    solimp[0] = solimp[0].clamp(MJ_MINIMP, MJ_MAXIMP);
    solimp[1] = solimp[1].clamp(MJ_MINIMP, MJ_MAXIMP);
    solimp[2] = solimp[2].max(0.0);
    solimp[3] = solimp[3].clamp(MJ_MINIMP, MJ_MAXIMP);
    solimp[4] = solimp[4].max(1.0);

    (solref, solreffriction, solimp)
}

/// Impedance position and block extent for the constraint starting at row
/// `i`. Connect/weld equalities use the residual norm (weld rotation scaled
/// by torquescale); contact blocks span their full row group.
pub(crate) fn get_pos_dim(model: &Model, data: &Data, i: usize) -> (f64, usize) {
    let id = data.efc_id[i];
    match data.efc_type[i] {
        ConstraintType::ContactElliptic => (data.efc_pos[i], data.contacts[id].dim),
        ConstraintType::ContactPyramidal => (data.efc_pos[i], 2 * (data.contacts[id].dim - 1)),
        ConstraintType::Equality => match model.eq_type[id] {
            EqualityType::Connect => {
                let p = &data.efc_pos[i..i + 3];
                ((p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt(), 3)
            }
            EqualityType::Weld => {
                let ts = model.eq_data[id][10];
                let mut acc = 0.0;
                for j in 0..3 {
                    acc += data.efc_pos[i + j] * data.efc_pos[i + j];
                }
                for j in 3..6 {
                    let v = ts * data.efc_pos[i + j];
                    acc += v * v;
                }
                (acc.sqrt(), 6)
            }
            _ => (data.efc_pos[i], 1),
        },
        _ => (data.efc_pos[i], 1),
    }
}

/// Impedance profile `I(x)` and its derivative at `x = |pos − margin|/width`.
///
/// Returns `(imp, imp_p)` where `imp_p` carries the sign of `pos − margin`.
#[must_use]
pub fn get_impedance(solimp: &[f64; NIMP], pos: f64, margin: f64) -> (f64, f64) {
    let (dmin, dmax, width, midpoint, power) =
        (solimp[0], solimp[1], solimp[2], solimp[3], solimp[4]);

    // Flat profile.
    if dmin == dmax || width <= MJ_MINVAL {
        return (0.5 * (dmin + dmax), 0.0);
    }

    let mut x = (pos - margin) / width;
    let mut sgn = 1.0;
    if x < 0.0 {
        x = -x;
        sgn = -1.0;
    }

    // Fully saturated.
    if x >= 1.0 || x <= 0.0 {
        return (if x >= 1.0 { dmax } else { dmin }, 0.0);
    }

    let (y, y_p) = if power == 1.0 {
        (x, 1.0)
    } else if x <= midpoint {
        let a = 1.0 / midpoint.powf(power - 1.0);
        (a * x.powf(power), power * a * x.powf(power - 1.0))
    } else {
        let b = 1.0 / (1.0 - midpoint).powf(power - 1.0);
        (
            1.0 - b * (1.0 - x).powf(power),
            power * b * (1.0 - x).powf(power - 1.0),
        )
    };

    (dmin + y * (dmax - dmin), y_p * sgn * (dmax - dmin) / width)
}

/// Compute `efc_R`, `efc_D`, `efc_KBIP`, harmonize contact friction
/// regularization, and re-write `efc_diagApprox` so that
/// `R = (1−I)·diagApprox/I` holds exactly.
pub fn mj_make_impedance(model: &Model, data: &mut Data) {
    let nefc = data.nefc;

    let mut i = 0;
    while i < nefc {
        let (solref, solreffriction, solimp) = get_sol_param(model, data, i);
        let (pos, dim) = get_pos_dim(model, data, i);
        let (imp, imp_p) = get_impedance(&solimp, pos, data.efc_margin[i]);
        let dmax = solimp[1];

        for j in 0..dim {
            let row = i + j;
            data.efc_R[row] = MJ_MINVAL.max((1.0 - imp) * data.efc_diagApprox[row] / imp);

            let tp = data.efc_type[row];
            // Elliptic friction rows take solreffriction when it is set.
            let elliptic_friction = tp == ConstraintType::ContactElliptic && j > 0;
            let r = if elliptic_friction && (solreffriction[0] != 0.0 || solreffriction[1] != 0.0)
            {
                solreffriction
            } else {
                solref
            };

            let k = if tp.is_friction() || elliptic_friction {
                0.0
            } else if r[0] > 0.0 {
                // Standard reference: K = 1/(dmax² · timeconst² · dampratio²).
                1.0 / MJ_MINVAL.max(dmax * dmax * r[0] * r[0] * r[1] * r[1])
            } else {
                // Direct reference: K = −ref[0]/dmax².
                -r[0] / MJ_MINVAL.max(dmax * dmax)
            };

            let b = if r[1] > 0.0 {
                2.0 / MJ_MINVAL.max(dmax * r[0])
            } else {
                -r[1] / MJ_MINVAL.max(dmax)
            };

            data.efc_KBIP[row] = [k, b, imp, imp_p];
        }

        i += dim;
    }

    // Frictional contacts: couple friction-row regularization to the normal
    // row and record the regularized cone coefficient on the contact.
    let mut i = data.ne + data.nf;
    while i < nefc {
        match data.efc_type[i] {
            ConstraintType::ContactPyramidal | ConstraintType::ContactElliptic => {
                let id = data.efc_id[i];
                let dim = data.contacts[id].dim;
                let friction = data.contacts[id].friction;

                data.efc_R[i + 1] =
                    MJ_MINVAL.max(data.efc_R[i] / MJ_MINVAL.max(model.impratio));
                let mu = friction[0] * (data.efc_R[i + 1] / data.efc_R[i]).sqrt();
                data.contacts[id].mu = mu;

                if data.efc_type[i] == ConstraintType::ContactElliptic {
                    // R[j]·μ[j]² = R[1]·μ[1]² across the tangent directions.
                    for j in 1..dim - 1 {
                        data.efc_R[i + j + 1] = MJ_MINVAL.max(
                            data.efc_R[i + 1] * friction[0] * friction[0]
                                / (friction[j] * friction[j]),
                        );
                    }
                    i += dim;
                } else {
                    // Common facet R matching the friction impedance of the
                    // elliptic model: D0_el = 2·μ²·D_py.
                    let rpy = MJ_MINVAL.max(2.0 * mu * mu * data.efc_R[i]);
                    for j in 0..2 * (dim - 1) {
                        data.efc_R[i + j] = rpy;
                    }
                    i += 2 * (dim - 1);
                }
            }
            _ => i += 1,
        }
    }

    for i in 0..nefc {
        data.efc_D[i] = 1.0 / data.efc_R[i];
    }

    // Re-write diagApprox so R = (1−I)·diagApprox/I holds post-adjustment.
    for i in 0..nefc {
        let imp = data.efc_KBIP[i][2];
        data.efc_diagApprox[i] = data.efc_R[i] * imp / (1.0 - imp);
    }
}
