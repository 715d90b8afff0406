//! Dof chains and point Jacobians.
//!
//! The dof-chain merger produces, for a body pair, the sorted set of dof
//! indices that influence their relative pose. The paired Jacobian
//! difference — "Jacobian of a point on body 2 minus Jacobian of a point on
//! body 1" — is the shared building block of connect/weld equalities and
//! contacts, and comes in dense (full `nv` width) and sparse (chain-width)
//! forms.

use nalgebra::{DMatrix, UnitQuaternion, Vector3};

use crate::types::{Data, MjJointType, Model};

/// Merge the dof-parent chains of two bodies into one ascending index set.
///
/// Fixed parents (`body_dofnum == 0`) are skipped upward first. The merge
/// walks both chains from the leaves, emitting the larger current dof and
/// advancing whichever chain (or both, on equality) matched, then reverses
/// the output.
#[must_use]
pub fn mj_merge_chain(model: &Model, mut b1: usize, mut b2: usize) -> Vec<usize> {
    while b1 != 0 && model.body_dofnum[b1] == 0 {
        b1 = model.body_parent[b1];
    }
    while b2 != 0 && model.body_dofnum[b2] == 0 {
        b2 = model.body_parent[b2];
    }

    if b1 == 0 && b2 == 0 {
        return Vec::new();
    }

    // Last dof of each body, or None for the (immovable) world.
    let leaf = |b: usize| -> Option<usize> {
        if b == 0 {
            None
        } else {
            Some(model.body_dofadr[b] + model.body_dofnum[b] - 1)
        }
    };
    let mut da1 = leaf(b1);
    let mut da2 = leaf(b2);

    let mut chain = Vec::new();
    while da1.is_some() || da2.is_some() {
        let top = match (da1, da2) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => break,
        };
        chain.push(top);
        if da1 == Some(top) {
            da1 = model.dof_parent[top];
        }
        if da2 == Some(top) {
            da2 = model.dof_parent[top];
        }
    }

    chain.reverse();
    chain
}

/// Fast path for two simple bodies: concatenate their dof ranges.
#[must_use]
pub fn mj_merge_chain_simple(model: &Model, b1: usize, b2: usize) -> Vec<usize> {
    let (b1, b2) = if b1 > b2 { (b2, b1) } else { (b1, b2) };
    let n1 = model.body_dofnum[b1];
    let n2 = model.body_dofnum[b2];
    let mut chain = Vec::with_capacity(n1 + n2);
    chain.extend(model.body_dofadr[b1]..model.body_dofadr[b1] + n1);
    chain.extend(model.body_dofadr[b2]..model.body_dofadr[b2] + n2);
    chain
}

/// Column width and merged dof chain of the paired Jacobian difference for
/// two bodies.
///
/// The chain is computed in both layouts: it is the movability signal for
/// the pair (empty when no dof affects their relative pose) and, in sparse
/// mode, the shared column pattern. The width is the chain length in sparse
/// mode and the full `nv` in dense mode, where rows always span every
/// column.
#[must_use]
pub fn mj_jac_dif_pair_count(
    model: &Model,
    b1: usize,
    b2: usize,
    sparse: bool,
) -> (usize, Vec<usize>) {
    if model.nv == 0 {
        return (0, Vec::new());
    }
    let chain = if model.body_simple[b1] && model.body_simple[b2] {
        mj_merge_chain_simple(model, b1, b2)
    } else {
        mj_merge_chain(model, b1, b2)
    };
    if sparse {
        (chain.len(), chain)
    } else {
        (model.nv, chain)
    }
}

/// Convert a quaternion to a rotation vector (axis · angle), wrapping the
/// angle into `(−π, π]`.
#[must_use]
pub fn quat_to_axis_angle(q: &UnitQuaternion<f64>) -> (Vector3<f64>, f64) {
    let axis = Vector3::new(q.i, q.j, q.k);
    let sin_half = axis.norm();
    let mut angle = 2.0 * sin_half.atan2(q.w);
    if angle > std::f64::consts::PI {
        angle -= 2.0 * std::f64::consts::PI;
    }
    if sin_half < 1e-12 {
        return (Vector3::zeros(), 0.0);
    }
    let unit = axis / sin_half;
    if angle < 0.0 {
        (-unit, -angle)
    } else {
        (unit, angle)
    }
}

/// Translational and rotational Jacobian columns of one dof at a world point.
fn dof_columns(
    model: &Model,
    data: &Data,
    dof: usize,
    point: &Vector3<f64>,
) -> (Vector3<f64>, Vector3<f64>) {
    let jnt = model.dof_jnt[dof];
    let jb = model.jnt_body[jnt];
    match model.jnt_type[jnt] {
        MjJointType::Hinge => {
            let axis = data.xquat[jb] * model.jnt_axis[jnt];
            let jpos = data.xpos[jb] + data.xquat[jb] * model.jnt_pos[jnt];
            (axis.cross(&(point - jpos)), axis)
        }
        MjJointType::Slide => {
            let axis = data.xquat[jb] * model.jnt_axis[jnt];
            (axis, Vector3::zeros())
        }
        MjJointType::Ball => {
            let k = dof - model.jnt_dofadr[jnt];
            let omega = data.xquat[jb] * Vector3::ith(k, 1.0);
            let jpos = data.xpos[jb] + data.xquat[jb] * model.jnt_pos[jnt];
            (omega.cross(&(point - jpos)), omega)
        }
        MjJointType::Free => {
            let k = dof - model.jnt_dofadr[jnt];
            if k < 3 {
                (Vector3::ith(k, 1.0), Vector3::zeros())
            } else {
                // Rotational dofs use body-frame axes with the lever arm
                // taken from the body frame origin.
                let omega = data.xquat[jb] * Vector3::ith(k - 3, 1.0);
                (omega.cross(&(point - data.xpos[jb])), omega)
            }
        }
    }
}

/// Paired Jacobian difference on a merged dof chain.
#[derive(Debug, Clone)]
pub struct JacDifPair {
    /// Number of columns (`nv` in dense mode, chain length in sparse mode).
    pub nv_chain: usize,
    /// Merged dof indices influencing the pair's relative pose, in both
    /// layouts; empty when neither body is movable. Dense columns are still
    /// addressed by dof id.
    pub chain: Vec<usize>,
    /// Translational difference, `3 × nv_chain`.
    pub jacp: DMatrix<f64>,
    /// Rotational difference, `3 × nv_chain`; present when requested.
    pub jacr: Option<DMatrix<f64>>,
}

/// Compute `jac(b2 at p2) − jac(b1 at p1)` over the merged dof chain.
///
/// Dense mode spans all `nv` columns; sparse mode restricts to the merged
/// chain. The chain is reported in both modes: an empty chain means no dof
/// affects the pair's relative pose.
#[must_use]
pub fn mj_jac_dif_pair(
    model: &Model,
    data: &Data,
    b1: usize,
    b2: usize,
    p1: &Vector3<f64>,
    p2: &Vector3<f64>,
    want_rot: bool,
    sparse: bool,
) -> JacDifPair {
    let (nv_chain, chain) = mj_jac_dif_pair_count(model, b1, b2, sparse);
    let mut jacp = DMatrix::zeros(3, nv_chain);
    let mut jacr = if want_rot {
        Some(DMatrix::zeros(3, nv_chain))
    } else {
        None
    };

    if nv_chain > 0 {
        // Column index for a dof: its position in the chain (sparse) or the
        // dof id itself (dense).
        let col_of = |dof: usize| -> usize {
            if sparse {
                match chain.binary_search(&dof) {
                    Ok(c) => c,
                    Err(_) => unreachable!("dof missing from merged chain"),
                }
            } else {
                dof
            }
        };

        let mut accumulate = |body: usize, point: &Vector3<f64>, sign: f64| {
            let mut b = body;
            while b != 0 && model.body_dofnum[b] == 0 {
                b = model.body_parent[b];
            }
            if b == 0 {
                return;
            }
            let mut dof = Some(model.body_dofadr[b] + model.body_dofnum[b] - 1);
            while let Some(d) = dof {
                let (cp, cr) = dof_columns(model, data, d, point);
                let c = col_of(d);
                for k in 0..3 {
                    jacp[(k, c)] += sign * cp[k];
                }
                if let Some(jr) = jacr.as_mut() {
                    for k in 0..3 {
                        jr[(k, c)] += sign * cr[k];
                    }
                }
                dof = model.dof_parent[d];
            }
        };

        accumulate(b2, p2, 1.0);
        accumulate(b1, p1, -1.0);
    }

    JacDifPair {
        nv_chain,
        chain,
        jacp,
        jacr,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::Model;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// World + two bodies on a serial chain: body 1 (hinge about z at
    /// origin), body 2 (slide along x), dofs 0 and 1.
    fn serial_model() -> (Model, Data) {
        let mut model = Model::empty();
        model.nv = 2;
        model.nq = 2;
        model.nbody = 3;
        model.njnt = 2;
        model.body_parent = vec![0, 0, 1];
        model.body_dofadr = vec![0, 0, 1];
        model.body_dofnum = vec![0, 1, 1];
        model.body_simple = vec![false; 3];
        model.body_invweight0 = vec![[0.0; 2]; 3];
        model.jnt_type = vec![MjJointType::Hinge, MjJointType::Slide];
        model.jnt_body = vec![1, 2];
        model.jnt_qposadr = vec![0, 1];
        model.jnt_dofadr = vec![0, 1];
        model.jnt_pos = vec![Vector3::zeros(); 2];
        model.jnt_axis = vec![Vector3::z(), Vector3::x()];
        model.jnt_limited = vec![false; 2];
        model.jnt_range = vec![(0.0, 0.0); 2];
        model.jnt_margin = vec![0.0; 2];
        model.jnt_solref = vec![crate::types::enums::DEFAULT_SOLREF; 2];
        model.jnt_solimp = vec![crate::types::enums::DEFAULT_SOLIMP; 2];
        model.dof_parent = vec![None, Some(0)];
        model.dof_jnt = vec![0, 1];
        model.dof_invweight0 = vec![1.0; 2];
        model.dof_frictionloss = vec![0.0; 2];
        model.dof_solref = vec![crate::types::enums::DEFAULT_SOLREF; 2];
        model.dof_solimp = vec![crate::types::enums::DEFAULT_SOLIMP; 2];
        model.qpos0 = nalgebra::DVector::zeros(2);
        model.compute_qld_csr_metadata();

        let data = model.make_data();
        (model, data)
    }

    #[test]
    fn merge_chain_serial() {
        let (model, _) = serial_model();
        assert_eq!(mj_merge_chain(&model, 1, 2), vec![0, 1]);
        assert_eq!(mj_merge_chain(&model, 0, 2), vec![0, 1]);
        assert_eq!(mj_merge_chain(&model, 0, 1), vec![0]);
        assert_eq!(mj_merge_chain(&model, 0, 0), Vec::<usize>::new());
    }

    #[test]
    fn merge_chain_skips_fixed_bodies() {
        let mut model = Model::empty();
        // world -> body1 (1 dof) -> body2 (fixed) -> body3 (1 dof)
        model.nv = 2;
        model.nbody = 4;
        model.body_parent = vec![0, 0, 1, 2];
        model.body_dofadr = vec![0, 0, 1, 1];
        model.body_dofnum = vec![0, 1, 0, 1];
        model.dof_parent = vec![None, Some(0)];
        // Chain for the fixed body resolves to its movable parent.
        assert_eq!(mj_merge_chain(&model, 0, 2), vec![0]);
        assert_eq!(mj_merge_chain(&model, 2, 3), vec![0, 1]);
    }

    #[test]
    fn merge_chain_simple_concatenates() {
        let mut model = Model::empty();
        model.nbody = 3;
        model.body_dofadr = vec![0, 0, 6];
        model.body_dofnum = vec![0, 6, 6];
        model.body_parent = vec![0, 0, 0];
        // Order-insensitive.
        assert_eq!(
            mj_merge_chain_simple(&model, 2, 1),
            (0..12).collect::<Vec<_>>()
        );
        assert_eq!(mj_merge_chain_simple(&model, 0, 0), Vec::<usize>::new());
    }

    #[test]
    fn quat_axis_angle_round_trip() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.7);
        let (axis, angle) = quat_to_axis_angle(&q);
        assert_relative_eq!(angle, 0.7, epsilon = 1e-12);
        assert_relative_eq!(axis.y, 1.0, epsilon = 1e-12);

        // Angles beyond pi wrap to the short way around.
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 5.0);
        let (axis, angle) = quat_to_axis_angle(&q);
        assert_relative_eq!(angle, 2.0 * std::f64::consts::PI - 5.0, epsilon = 1e-12);
        assert_relative_eq!(axis.z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn jac_dif_pair_dense_vs_sparse() {
        let (model, mut data) = serial_model();
        data.qpos[0] = 0.3;
        // Forward kinematics by hand: body 1 rotated about z, body 2 carried.
        let q1 = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3);
        data.xquat[1] = q1;
        data.xquat[2] = q1;
        data.xpos[1] = Vector3::zeros();
        data.xpos[2] = q1 * Vector3::new(0.5, 0.0, 0.0);

        let point = Vector3::new(0.4, 0.2, 0.0);
        let dense = mj_jac_dif_pair(&model, &data, 0, 2, &point, &point, true, false);
        let sparse = mj_jac_dif_pair(&model, &data, 0, 2, &point, &point, true, true);

        assert_eq!(dense.nv_chain, 2);
        assert_eq!(sparse.chain, vec![0, 1]);
        for c in 0..2 {
            for k in 0..3 {
                assert_relative_eq!(
                    dense.jacp[(k, c)],
                    sparse.jacp[(k, c)],
                    epsilon = 1e-14
                );
            }
        }

        // Hinge column: axis x r; slide column: rotated x axis.
        let expected_col0 = Vector3::z().cross(&point);
        let expected_col1 = q1 * Vector3::x();
        for k in 0..3 {
            assert_relative_eq!(dense.jacp[(k, 0)], expected_col0[k], epsilon = 1e-12);
            assert_relative_eq!(dense.jacp[(k, 1)], expected_col1[k], epsilon = 1e-12);
        }
        let jacr = dense.jacr.unwrap();
        for k in 0..3 {
            assert_relative_eq!(jacr[(k, 0)], Vector3::z()[k], epsilon = 1e-12);
            assert_relative_eq!(jacr[(k, 1)], 0.0, epsilon = 1e-12);
        }
    }
}
