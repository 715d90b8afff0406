//! Pre-counters: size the constraint row arrays before allocation.
//!
//! Mirrors the instantiators symbolically, producing the per-section row
//! counts and (in sparse mode) the Jacobian non-zero total so the arena can
//! allocate every slice once. After the build, the realized section counts
//! must equal these; the non-zero total is an upper bound that must not be
//! exceeded.

use crate::jacobian::mj_jac_dif_pair_count;
use crate::sparse::combine_sparse_count;
use crate::types::{
    disabled, Data, EqualityType, MjJointType, Model, DISABLE_CONTACT, DISABLE_EQUALITY,
    DISABLE_FRICTIONLOSS, DISABLE_LIMIT,
};

use super::impedance::{ball_limit_quat, mj_assign_margin};
use super::mj_is_pyramidal;

/// Row and non-zero counts produced by the pre-counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreCount {
    /// Equality rows.
    pub ne: usize,
    /// Friction rows.
    pub nf: usize,
    /// Limit rows.
    pub nl: usize,
    /// Contact rows.
    pub nc: usize,
    /// Jacobian non-zeros (sparse mode only; dense mode leaves it zero and
    /// the driver uses `nefc · nv`).
    pub nnz: usize,
}

impl PreCount {
    /// Total row count.
    #[must_use]
    pub fn nefc(&self) -> usize {
        self.ne + self.nf + self.nl + self.nc
    }
}

/// Gate a candidate block: dense rows exist only when the model has dofs,
/// sparse rows only when the column chain is non-empty.
fn add_count(model: &Model, size: usize, nv_chain: usize, sparse: bool) -> usize {
    if !sparse {
        if model.nv > 0 {
            size
        } else {
            0
        }
    } else if nv_chain > 0 {
        size
    } else {
        0
    }
}

/// Count equality rows (and non-zeros in sparse mode).
fn count_equality(model: &Model, data: &Data, sparse: bool, nnz: &mut usize) -> usize {
    if disabled(model, DISABLE_EQUALITY) {
        return 0;
    }

    let mut ne = 0;
    for i in 0..model.neq {
        if !model.eq_active[i] {
            continue;
        }
        let id0 = model.eq_obj1id[i];
        let id1 = model.eq_obj2id[i];

        let (size, nv_chain) = match model.eq_type[i] {
            EqualityType::Connect | EqualityType::Weld => {
                let size = if model.eq_type[i] == EqualityType::Connect {
                    3
                } else {
                    6
                };
                let nv_chain = if sparse {
                    mj_jac_dif_pair_count(model, id1.unwrap_or(0), id0, true).0
                } else {
                    0
                };
                (size, nv_chain)
            }
            EqualityType::Joint | EqualityType::Tendon => {
                let mut nv_chain = 0;
                if sparse {
                    let is_joint = model.eq_type[i] == EqualityType::Joint;
                    if is_joint {
                        // One dof per joint; with a second object the block
                        // extent is taken as 2 (a conservative upper bound
                        // for the merged pattern).
                        nv_chain = if id1.is_some() { 2 } else { 1 };
                    } else {
                        nv_chain = data.ten_J_rownnz[id0];
                        if let Some(id1) = id1 {
                            let (c0, _) = data.ten_j_row(id0);
                            let (c1, _) = data.ten_j_row(id1);
                            nv_chain = combine_sparse_count(c0, c1);
                        }
                    }
                }
                (1, nv_chain)
            }
        };

        ne += add_count(model, size, nv_chain, sparse);
        if sparse {
            *nnz += size * nv_chain;
        }
    }
    ne
}

/// Count friction rows (and non-zeros in sparse mode).
fn count_friction(model: &Model, data: &Data, sparse: bool, nnz: &mut usize) -> usize {
    if disabled(model, DISABLE_FRICTIONLOSS) {
        return 0;
    }

    let mut nf = 0;
    for i in 0..model.nv {
        if model.dof_frictionloss[i] > 0.0 {
            nf += add_count(model, 1, 1, sparse);
            if sparse {
                *nnz += 1;
            }
        }
    }
    for t in 0..model.ntendon {
        if model.tendon_frictionloss[t] > 0.0 {
            let rownnz = data.ten_J_rownnz[t];
            nf += add_count(model, 1, rownnz, sparse);
            if sparse {
                *nnz += rownnz;
            }
        }
    }
    nf
}

/// Count limit rows (and non-zeros in sparse mode).
fn count_limit(model: &Model, data: &Data, sparse: bool, nnz: &mut usize) -> usize {
    if disabled(model, DISABLE_LIMIT) {
        return 0;
    }

    let mut nl = 0;
    for i in 0..model.njnt {
        if !model.jnt_limited[i] {
            continue;
        }
        let margin = mj_assign_margin(model, model.jnt_margin[i]);
        match model.jnt_type[i] {
            MjJointType::Slide | MjJointType::Hinge => {
                let value = data.qpos[model.jnt_qposadr[i]];
                for side in [-1.0, 1.0] {
                    let range = if side < 0.0 {
                        model.jnt_range[i].0
                    } else {
                        model.jnt_range[i].1
                    };
                    let dist = side * (range - value);
                    if dist < margin {
                        nl += add_count(model, 1, 1, sparse);
                        if sparse {
                            *nnz += 1;
                        }
                    }
                }
            }
            MjJointType::Ball => {
                let q = ball_limit_quat(data, model.jnt_qposadr[i]);
                let (_, angle) = crate::jacobian::quat_to_axis_angle(&q);
                let dist = model.jnt_range[i].0.max(model.jnt_range[i].1) - angle;
                if dist < margin {
                    nl += add_count(model, 1, 3, sparse);
                    if sparse {
                        *nnz += 3;
                    }
                }
            }
            MjJointType::Free => {}
        }
    }

    for t in 0..model.ntendon {
        if !model.tendon_limited[t] {
            continue;
        }
        let value = data.ten_length[t];
        let margin = mj_assign_margin(model, model.tendon_margin[t]);
        for side in [-1.0, 1.0] {
            let range = if side < 0.0 {
                model.tendon_range[t].0
            } else {
                model.tendon_range[t].1
            };
            let dist = side * (range - value);
            if dist < margin {
                let rownnz = data.ten_J_rownnz[t];
                nl += add_count(model, 1, rownnz, sparse);
                if sparse {
                    *nnz += rownnz;
                }
            }
        }
    }
    nl
}

/// Count contact rows (and non-zeros in sparse mode).
fn count_contact(model: &Model, data: &Data, sparse: bool, nnz: &mut usize) -> usize {
    if disabled(model, DISABLE_CONTACT) {
        return 0;
    }

    let pyramid = mj_is_pyramidal(model);
    let mut nc = 0;
    for con in &data.contacts {
        if con.exclude != 0 {
            continue;
        }
        let b1 = model.geom_body[con.geom1];
        let b2 = model.geom_body[con.geom2];
        // Dof-less pairs generate no rows in either layout; the instantiator
        // excludes them with the same chain test.
        let (nv_chain, chain) = mj_jac_dif_pair_count(model, b1, b2, sparse);
        if chain.is_empty() {
            continue;
        }
        let dim = con.dim;
        let rows = if dim == 1 {
            1
        } else if pyramid {
            2 * (dim - 1)
        } else {
            dim
        };
        nc += rows;
        if sparse {
            *nnz += rows * nv_chain;
        }
    }
    nc
}

/// Pre-count every constraint section. In dense mode `nnz` stays zero and
/// the driver derives it as `nefc · nv`.
#[must_use]
pub fn mj_precount(model: &Model, data: &Data) -> PreCount {
    let sparse = super::mj_is_sparse(model);
    let mut nnz = 0usize;
    let ne = count_equality(model, data, sparse, &mut nnz);
    let nf = count_friction(model, data, sparse, &mut nnz);
    let nl = count_limit(model, data, sparse, &mut nnz);
    let nc = count_contact(model, data, sparse, &mut nnz);
    PreCount {
        ne,
        nf,
        nl,
        nc,
        nnz,
    }
}
