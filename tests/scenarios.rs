//! End-to-end scenarios: build constraint rows for hand-assembled models and
//! check row layout, parameters, and update behavior.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector, Vector3};

use sim_constraint_core::linalg::mj_factor_sparse;
use sim_constraint_core::types::{
    ArMatrix, ConeType, ConstraintState, ConstraintType, Contact, Data, EqualityType,
    JacobianMode, MjJointType, Model, SolverType, DEFAULT_SOLIMP, DEFAULT_SOLREF,
    ENABLE_OVERRIDE,
};
use sim_constraint_core::{
    mj_constraint_update, mj_make_constraint, mj_mul_jac_t_vec, mj_mul_jac_vec, mj_precount,
    mj_project_constraint, mj_reference_constraint, EfcJacobian,
};

// =========================================================================
// Fixtures
// =========================================================================

fn fill_joint_defaults(model: &mut Model) {
    let njnt = model.njnt;
    model.jnt_pos = vec![Vector3::zeros(); njnt];
    model.jnt_limited = vec![false; njnt];
    model.jnt_range = vec![(0.0, 0.0); njnt];
    model.jnt_margin = vec![0.0; njnt];
    model.jnt_solref = vec![DEFAULT_SOLREF; njnt];
    model.jnt_solimp = vec![DEFAULT_SOLIMP; njnt];
    let nv = model.nv;
    model.dof_invweight0 = vec![1.0; nv];
    model.dof_frictionloss = vec![0.0; nv];
    model.dof_solref = vec![DEFAULT_SOLREF; nv];
    model.dof_solimp = vec![DEFAULT_SOLIMP; nv];
}

/// World + one free body carrying geom 1; geom 0 is on the world.
fn free_body_model() -> Model {
    let mut model = Model::empty();
    model.nv = 6;
    model.nq = 7;
    model.nbody = 2;
    model.njnt = 1;
    model.ngeom = 2;
    model.body_parent = vec![0, 0];
    model.body_dofadr = vec![0, 0];
    model.body_dofnum = vec![0, 6];
    model.body_simple = vec![false, false];
    model.body_invweight0 = vec![[0.0, 0.0], [1.0, 4.0]];
    model.jnt_type = vec![MjJointType::Free];
    model.jnt_body = vec![1];
    model.jnt_qposadr = vec![0];
    model.jnt_dofadr = vec![0];
    model.jnt_axis = vec![Vector3::z()];
    fill_joint_defaults(&mut model);
    model.dof_parent = vec![None, Some(0), Some(1), Some(2), Some(3), Some(4)];
    model.dof_jnt = vec![0; 6];
    model.geom_body = vec![0, 1];
    model.qpos0 = DVector::from_row_slice(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    model.compute_qld_csr_metadata();
    model
}

/// World + one body on a limited hinge about z.
fn hinge_model() -> Model {
    let mut model = Model::empty();
    model.nv = 1;
    model.nq = 1;
    model.nbody = 2;
    model.njnt = 1;
    model.body_parent = vec![0, 0];
    model.body_dofadr = vec![0, 0];
    model.body_dofnum = vec![0, 1];
    model.body_simple = vec![false, false];
    model.body_invweight0 = vec![[0.0, 0.0], [1.0, 1.0]];
    model.jnt_type = vec![MjJointType::Hinge];
    model.jnt_body = vec![1];
    model.jnt_qposadr = vec![0];
    model.jnt_dofadr = vec![0];
    model.jnt_axis = vec![Vector3::z()];
    fill_joint_defaults(&mut model);
    model.jnt_limited = vec![true];
    model.jnt_range = vec![(-1.0, 1.0)];
    model.dof_parent = vec![None];
    model.dof_jnt = vec![0];
    model.qpos0 = DVector::zeros(1);
    model.compute_qld_csr_metadata();
    model
}

/// Data with identity mass matrix factored into the qLD arrays.
fn factored_data(model: &Model) -> Data {
    let mut data = model.make_data();
    let qm = DMatrix::identity(model.nv, model.nv);
    mj_factor_sparse(model, &qm, &mut data);
    data
}

fn ground_contact(dim: usize, friction: f64) -> Contact {
    let mut con = Contact::new(
        Vector3::zeros(),
        Vector3::z(),
        -0.01,
        0,
        1,
        friction,
        dim,
    );
    con.includemargin = 0.0;
    con
}

// =========================================================================
// Scenario 1: free mass point, no constraints
// =========================================================================

#[test]
fn free_mass_point_no_constraints() {
    let model = free_body_model();
    let mut data = factored_data(&model);

    mj_make_constraint(&model, &mut data).unwrap();
    assert_eq!(data.nefc, 0);
    assert_eq!((data.ne, data.nf), (0, 0));

    mj_reference_constraint(&model, &mut data);
    let cost = mj_constraint_update(&model, &mut data, &[], true, false).unwrap();
    assert_relative_eq!(cost, 0.0);
    for k in 0..model.nv {
        assert_relative_eq!(data.qfrc_constraint[k], 0.0);
    }
}

// =========================================================================
// Scenario 2: hinge joint at its upper limit
// =========================================================================

#[test]
fn hinge_at_upper_limit() {
    let model = hinge_model();
    let mut data = factored_data(&model);
    data.qpos[0] = 1.01;

    mj_make_constraint(&model, &mut data).unwrap();
    assert_eq!(data.nefc, 1);
    assert_eq!(data.efc_type[0], ConstraintType::LimitJoint);
    assert_relative_eq!(data.efc_pos[0], -0.01, epsilon = 1e-12);
    assert_relative_eq!(data.efc_J.to_dense()[(0, 0)], -1.0);

    // Slightly negative residual: quadratic zone with positive force.
    mj_reference_constraint(&model, &mut data);
    let jar = [-1e-3];
    let cost = mj_constraint_update(&model, &mut data, &jar, true, false).unwrap();
    assert_eq!(data.efc_state[0], ConstraintState::Quadratic);
    assert!(data.efc_force[0] > 0.0);
    assert_relative_eq!(data.efc_force[0], -data.efc_D[0] * jar[0], epsilon = 1e-12);
    assert!(cost > 0.0);
}

// =========================================================================
// Scenario 3: two-body connect equality, aligned
// =========================================================================

#[test]
fn connect_equality_aligned() {
    let mut model = free_body_model();
    model.neq = 1;
    model.eq_type = vec![EqualityType::Connect];
    model.eq_obj1id = vec![1];
    model.eq_obj2id = vec![Some(0)];
    model.eq_active = vec![true];
    model.eq_data = vec![[0.0; 11]];
    model.eq_solref = vec![DEFAULT_SOLREF];
    model.eq_solimp = vec![DEFAULT_SOLIMP];
    let mut data = factored_data(&model);

    mj_make_constraint(&model, &mut data).unwrap();
    assert_eq!(data.nefc, 3);
    assert_eq!(data.ne, 3);
    for i in 0..3 {
        assert_eq!(data.efc_type[i], ConstraintType::Equality);
        assert_relative_eq!(data.efc_pos[i], 0.0);
    }

    // Translation block of the free joint is the identity.
    let j = data.efc_J.to_dense();
    for r in 0..3 {
        for c in 0..6 {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert_relative_eq!(j[(r, c)], expected, epsilon = 1e-12);
        }
    }

    mj_reference_constraint(&model, &mut data);
    for i in 0..3 {
        assert_relative_eq!(data.efc_aref[i], 0.0, epsilon = 1e-12);
    }
}

// =========================================================================
// Scenario 4: elliptic contact, normal-only motion
// =========================================================================

#[test]
fn elliptic_contact_top_zone() {
    let mut model = free_body_model();
    model.cone = ConeType::Elliptic;
    let mut data = factored_data(&model);
    data.contacts.push(ground_contact(3, 1.0));

    mj_make_constraint(&model, &mut data).unwrap();
    assert_eq!(data.nefc, 3);
    for i in 0..3 {
        assert_eq!(data.efc_type[i], ConstraintType::ContactElliptic);
    }
    assert_eq!(data.contacts[0].efc_address, Some(0));
    assert_relative_eq!(data.contacts[0].mu, 1.0, epsilon = 1e-12);

    // Separating normal residual: the whole block is satisfied.
    mj_reference_constraint(&model, &mut data);
    let cost = mj_constraint_update(&model, &mut data, &[1.0, 0.0, 0.0], true, true).unwrap();
    assert_relative_eq!(cost, 0.0);
    for i in 0..3 {
        assert_eq!(data.efc_state[i], ConstraintState::Satisfied);
        assert_relative_eq!(data.efc_force[i], 0.0);
    }
    assert!(data.contacts[0].hessian.is_none());
}

#[test]
fn elliptic_contact_middle_zone_cone_hessian() {
    let mut model = free_body_model();
    model.cone = ConeType::Elliptic;
    let mut data = factored_data(&model);
    data.contacts.push(ground_contact(3, 1.0));

    mj_make_constraint(&model, &mut data).unwrap();
    mj_reference_constraint(&model, &mut data);

    // Strong tangential sliding with mild separation: middle zone.
    let jar = [0.1, 1.0, 0.0];
    let cost = mj_constraint_update(&model, &mut data, &jar, true, true).unwrap();
    for i in 0..3 {
        assert_eq!(data.efc_state[i], ConstraintState::Cone);
    }
    assert!(cost > 0.0);
    // Normal force pushes outward, tangent force opposes the slide.
    assert!(data.efc_force[0] > 0.0);
    assert!(data.efc_force[1] < 0.0);
    assert_relative_eq!(data.efc_force[2], 0.0, epsilon = 1e-12);

    let h = data.contacts[0].hessian.as_ref().expect("cone Hessian");
    assert_eq!(h.nrows(), 3);
    // Symmetric positive on the diagonal.
    for k in 0..3 {
        for j in 0..3 {
            assert_relative_eq!(h[(k, j)], h[(j, k)], epsilon = 1e-12);
        }
    }
}

// =========================================================================
// Scenario 5: pyramidal version of the same contact
// =========================================================================

#[test]
fn pyramidal_contact_rows_and_regularization() {
    let mut model = free_body_model();
    model.cone = ConeType::Pyramidal;
    let mut data = factored_data(&model);
    data.contacts.push(ground_contact(3, 1.0));

    mj_make_constraint(&model, &mut data).unwrap();
    assert_eq!(data.nefc, 4); // 2·(dim−1)
    for i in 0..4 {
        assert_eq!(data.efc_type[i], ConstraintType::ContactPyramidal);
        assert_relative_eq!(data.efc_pos[i], -0.01, epsilon = 1e-12);
        assert_relative_eq!(data.efc_margin[i], 0.0);
    }

    // All facet rows share R_py = 2·μ²·R_first, with μ the regularized
    // coefficient (impratio = 1 keeps μ = friction[0] = 1).
    assert_relative_eq!(data.contacts[0].mu, 1.0, epsilon = 1e-12);
    let imp = 0.95; // saturated at dmax for a 0.01 violation of width 0.001
    let diag_first = 1.0 + 1.0; // tran + μ²·tran
    let r_first = (1.0 - imp) * diag_first / imp;
    let r_py = 2.0 * r_first;
    for i in 0..4 {
        assert_relative_eq!(data.efc_R[i], r_py, epsilon = 1e-9);
        assert_relative_eq!(data.efc_D[i] * data.efc_R[i], 1.0, epsilon = 1e-12);
    }
}

// =========================================================================
// Scenario 6: solref safety clamp
// =========================================================================

#[test]
fn solref_safety_clamps_timeconst() {
    let mut model = hinge_model();
    model.jnt_solref = vec![[0.0001, 1.0]];
    model.timestep = 0.002;
    let mut data = factored_data(&model);
    data.qpos[0] = 1.01;

    mj_make_constraint(&model, &mut data).unwrap();
    assert_eq!(data.nefc, 1);

    // K must be computed with ref[0] clamped to 2·timestep = 0.004.
    let dmax = DEFAULT_SOLIMP[1];
    let expected_k = 1.0 / (dmax * dmax * 0.004 * 0.004 * 1.0 * 1.0);
    assert_relative_eq!(data.efc_KBIP[0][0], expected_k, epsilon = 1e-9);
}

// =========================================================================
// Override semantics
// =========================================================================

#[test]
fn override_replaces_solref_solimp_margin() {
    let mut model = hinge_model();
    model.enableflags = ENABLE_OVERRIDE;
    model.o_margin = 0.5;
    model.o_solref = [0.05, 0.9];
    model.o_solimp = [0.5, 0.6, 0.002, 0.4, 2.0];
    let mut data = factored_data(&model);
    // Within range, but within the override margin of the upper limit.
    data.qpos[0] = 0.8;

    mj_make_constraint(&model, &mut data).unwrap();
    assert_eq!(data.nefc, 1);
    assert_relative_eq!(data.efc_margin[0], 0.5);
    assert_relative_eq!(data.efc_pos[0], 0.2, epsilon = 1e-12);

    let dmax = 0.6;
    let expected_k = 1.0 / (dmax * dmax * 0.05 * 0.05 * 0.9 * 0.9);
    assert_relative_eq!(data.efc_KBIP[0][0], expected_k, epsilon = 1e-9);
    let expected_b = 2.0 / (dmax * 0.05);
    assert_relative_eq!(data.efc_KBIP[0][1], expected_b, epsilon = 1e-9);
}

// =========================================================================
// Universal properties
// =========================================================================

/// Hinge world + dof friction + limited joint + one contact: one row of
/// each section.
fn mixed_model(jacobian: JacobianMode) -> (Model, Data) {
    let mut model = hinge_model();
    model.jacobian = jacobian;
    model.dof_frictionloss = vec![0.3];
    model.neq = 1;
    model.eq_type = vec![EqualityType::Joint];
    model.eq_obj1id = vec![0];
    model.eq_obj2id = vec![None];
    model.eq_active = vec![true];
    let mut eq_data = [0.0; 11];
    eq_data[0] = 0.1; // target offset
    model.eq_data = vec![eq_data];
    model.eq_solref = vec![DEFAULT_SOLREF];
    model.eq_solimp = vec![DEFAULT_SOLIMP];
    model.ngeom = 2;
    model.geom_body = vec![0, 1];

    let mut data = factored_data(&model);
    data.qpos[0] = 1.01;
    data.qvel[0] = -0.2;
    data.contacts.push(ground_contact(1, 0.0));
    (model, data)
}

#[test]
fn row_order_and_sections() {
    let (model, mut data) = mixed_model(JacobianMode::Dense);
    mj_make_constraint(&model, &mut data).unwrap();

    // equality, friction, limit, contact
    assert_eq!(data.nefc, 4);
    assert_eq!(data.ne, 1);
    assert_eq!(data.nf, 1);
    assert_eq!(
        data.efc_type,
        vec![
            ConstraintType::Equality,
            ConstraintType::FrictionDof,
            ConstraintType::LimitJoint,
            ConstraintType::ContactFrictionless,
        ]
    );

    // Pre-count agrees with the realized section sizes.
    let pc = mj_precount(&model, &data);
    assert_eq!(pc.nefc(), data.nefc);
    assert_eq!((pc.ne, pc.nf, pc.nl, pc.nc), (1, 1, 1, 1));
}

#[test]
fn parameter_consistency() {
    let (model, mut data) = mixed_model(JacobianMode::Dense);
    mj_make_constraint(&model, &mut data).unwrap();

    for i in 0..data.nefc {
        let imp = data.efc_KBIP[i][2];
        assert!(imp >= 1e-4 && imp <= 1.0 - 1e-4);
        assert_relative_eq!(data.efc_D[i] * data.efc_R[i], 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            data.efc_diagApprox[i],
            data.efc_R[i] * imp / (1.0 - imp),
            epsilon = 1e-12
        );
    }
}

#[test]
fn sparse_layout_invariants_and_product_agreement() {
    let (model, mut data) = mixed_model(JacobianMode::Dense);
    mj_make_constraint(&model, &mut data).unwrap();
    let dense_j = data.efc_J.to_dense();
    mj_reference_constraint(&model, &mut data);
    let dense_vel = data.efc_vel.clone();

    let (model_s, mut data_s) = mixed_model(JacobianMode::Sparse);
    mj_make_constraint(&model_s, &mut data_s).unwrap();
    mj_reference_constraint(&model_s, &mut data_s);

    // Same rows, same values.
    assert_eq!(data_s.nefc, data.nefc);
    let sparse_j = data_s.efc_J.to_dense();
    assert_relative_eq!((&dense_j - &sparse_j).norm(), 0.0, epsilon = 1e-12);
    for i in 0..data.nefc {
        assert_relative_eq!(data_s.efc_vel[i], dense_vel[i], epsilon = 1e-12);
        assert_relative_eq!(data_s.efc_R[i], data.efc_R[i], epsilon = 1e-12);
        assert_relative_eq!(data_s.efc_aref[i], data.efc_aref[i], epsilon = 1e-12);
    }

    // CSR invariants: strictly increasing columns, contiguous rows,
    // realized non-zeros.
    match &data_s.efc_J {
        EfcJacobian::Sparse { j, jt } => {
            let mut total = 0;
            for r in 0..j.nrows {
                assert_eq!(j.rowadr[r], total);
                let cols = j.row_cols(r);
                assert!(cols.windows(2).all(|w| w[0] < w[1]));
                total += j.rownnz[r];
            }
            assert_eq!(data_s.nnz_J, total);
            assert!(jt.is_some());
        }
        EfcJacobian::Dense { .. } => panic!("expected sparse layout"),
    }

    // J·v and Jᵀ·v agree with the dense reference on both layouts.
    let v = DVector::from_row_slice(&[0.37]);
    let mut jv_dense = vec![0.0; data.nefc];
    let mut jv_sparse = vec![0.0; data.nefc];
    mj_mul_jac_vec(&model, &data, &mut jv_dense, v.as_slice());
    mj_mul_jac_vec(&model_s, &data_s, &mut jv_sparse, v.as_slice());
    let reference = &dense_j * &v;
    for i in 0..data.nefc {
        assert_relative_eq!(jv_dense[i], reference[i], epsilon = 1e-12);
        assert_relative_eq!(jv_sparse[i], reference[i], epsilon = 1e-12);
    }

    let w: Vec<f64> = (0..data.nefc).map(|i| 0.1 * (i as f64 + 1.0)).collect();
    let mut jtw_dense = vec![0.0; model.nv];
    let mut jtw_sparse = vec![0.0; model.nv];
    mj_mul_jac_t_vec(&model, &data, &mut jtw_dense, &w);
    mj_mul_jac_t_vec(&model_s, &data_s, &mut jtw_sparse, &w);
    let reference = dense_j.transpose() * DVector::from_row_slice(&w);
    for k in 0..model.nv {
        assert_relative_eq!(jtw_dense[k], reference[k], epsilon = 1e-12);
        assert_relative_eq!(jtw_sparse[k], reference[k], epsilon = 1e-12);
    }
}

#[test]
fn empty_equality_dropped_zero_jacobian_contact_retained() {
    // Equality between two fixed (world) anchors has a zero Jacobian and is
    // dropped. A contact on a *movable* pair whose Jacobian numerically
    // vanishes (the point sits on the hinge axis, normal along the axis)
    // keeps its rows.
    for jacobian in [JacobianMode::Dense, JacobianMode::Sparse] {
        let mut model = hinge_model();
        model.jacobian = jacobian;
        model.ngeom = 2;
        model.geom_body = vec![0, 1];
        model.neq = 1;
        model.eq_type = vec![EqualityType::Connect];
        model.eq_obj1id = vec![0];
        model.eq_obj2id = vec![Some(0)];
        model.eq_active = vec![true];
        model.eq_data = vec![[0.0; 11]];
        model.eq_solref = vec![DEFAULT_SOLREF];
        model.eq_solimp = vec![DEFAULT_SOLIMP];

        let mut data = factored_data(&model);
        data.contacts.push(ground_contact(1, 0.0));

        mj_make_constraint(&model, &mut data).unwrap();
        assert_eq!(data.ne, 0);
        assert_eq!(data.nefc, 1);
        assert_eq!(data.efc_type[0], ConstraintType::ContactFrictionless);
        assert_eq!(data.contacts[0].exclude, 0);
        assert_eq!(data.contacts[0].efc_address, Some(0));
        assert_relative_eq!(data.efc_J.to_dense().norm(), 0.0);
    }
}

#[test]
fn dofless_contact_pair_excluded() {
    // Both geoms sit on the world body: the merged dof chain of the pair is
    // empty even though the model has dofs elsewhere. The contact is
    // excluded in both Jacobian layouts, matching the pre-counter.
    for jacobian in [JacobianMode::Dense, JacobianMode::Sparse] {
        let mut model = hinge_model();
        model.jacobian = jacobian;
        model.ngeom = 2;
        model.geom_body = vec![0, 0];

        let mut data = factored_data(&model);
        data.contacts.push(ground_contact(1, 0.0));

        assert_eq!(mj_precount(&model, &data).nc, 0);
        mj_make_constraint(&model, &mut data).unwrap();
        assert_eq!(data.nefc, 0);
        assert_eq!(data.contacts[0].exclude, 3);
        assert_eq!(data.contacts[0].efc_address, None);
    }
}

// =========================================================================
// Projected inertia A_R
// =========================================================================

#[test]
fn projected_inertia_dense_matches_reference() {
    let (mut model, mut data) = mixed_model(JacobianMode::Dense);
    model.solver = SolverType::PGS;
    mj_make_constraint(&model, &mut data).unwrap();
    mj_project_constraint(&model, &mut data);

    // With M = I: A_R = J·Jᵀ + diag(R).
    let j = data.efc_J.to_dense();
    let mut expected = &j * j.transpose();
    for i in 0..data.nefc {
        expected[(i, i)] += data.efc_R[i];
    }
    match data.efc_AR.as_ref().expect("A_R built for PGS") {
        ArMatrix::Dense(ar) => {
            assert_relative_eq!((ar - &expected).norm(), 0.0, epsilon = 1e-10);
        }
        ArMatrix::Sparse(_) => panic!("dense layout expected"),
    }
}

#[test]
fn projected_inertia_sparse_matches_dense() {
    let (mut model, mut data) = mixed_model(JacobianMode::Sparse);
    model.noslip_iterations = 3; // dual via the no-slip post-pass
    mj_make_constraint(&model, &mut data).unwrap();
    mj_project_constraint(&model, &mut data);

    let j = data.efc_J.to_dense();
    let mut expected = &j * j.transpose();
    for i in 0..data.nefc {
        expected[(i, i)] += data.efc_R[i];
    }
    match data.efc_AR.as_ref().expect("A_R built for no-slip") {
        ArMatrix::Sparse(ar) => {
            assert_relative_eq!((&ar.to_dense() - &expected).norm(), 0.0, epsilon = 1e-10);
        }
        ArMatrix::Dense(_) => panic!("sparse layout expected"),
    }
}

// =========================================================================
// Non-identity mass matrix: A_R against an explicit inverse
// =========================================================================

#[test]
fn projected_inertia_with_coupled_mass() {
    let mut model = hinge_model();
    // Second hinge body chained to the first.
    model.nv = 2;
    model.nq = 2;
    model.nbody = 3;
    model.njnt = 2;
    model.body_parent = vec![0, 0, 1];
    model.body_dofadr = vec![0, 0, 1];
    model.body_dofnum = vec![0, 1, 1];
    model.body_simple = vec![false; 3];
    model.body_invweight0 = vec![[0.0; 2], [1.0, 1.0], [1.0, 1.0]];
    model.jnt_type = vec![MjJointType::Hinge; 2];
    model.jnt_body = vec![1, 2];
    model.jnt_qposadr = vec![0, 1];
    model.jnt_dofadr = vec![0, 1];
    model.jnt_axis = vec![Vector3::z(); 2];
    fill_joint_defaults(&mut model);
    model.jnt_limited = vec![true, true];
    model.jnt_range = vec![(-1.0, 1.0), (-0.5, 0.5)];
    model.dof_parent = vec![None, Some(0)];
    model.dof_jnt = vec![0, 1];
    model.qpos0 = DVector::zeros(2);
    model.solver = SolverType::PGS;
    model.compute_qld_csr_metadata();

    let qm = DMatrix::from_row_slice(2, 2, &[2.0, 0.4, 0.4, 1.5]);
    let mut data = model.make_data();
    mj_factor_sparse(&model, &qm, &mut data);
    data.qpos[0] = 1.2;
    data.qpos[1] = -0.7;

    mj_make_constraint(&model, &mut data).unwrap();
    assert_eq!(data.nefc, 2);
    mj_project_constraint(&model, &mut data);

    let j = data.efc_J.to_dense();
    let minv = qm.try_inverse().unwrap();
    let mut expected = &j * minv * j.transpose();
    for i in 0..data.nefc {
        expected[(i, i)] += data.efc_R[i];
    }
    match data.efc_AR.as_ref().unwrap() {
        ArMatrix::Dense(ar) => {
            assert_relative_eq!((ar - &expected).norm(), 0.0, epsilon = 1e-10);
        }
        ArMatrix::Sparse(_) => panic!("dense layout expected"),
    }
}

// =========================================================================
// Arena exhaustion: warning + truncation, never an error
// =========================================================================

#[test]
fn arena_exhaustion_truncates_with_warning() {
    let mut model = hinge_model();
    model.narena = 64; // far too small for any row allocation
    let mut data = factored_data(&model);
    data.qpos[0] = 1.01;

    mj_make_constraint(&model, &mut data).unwrap();
    assert_eq!(data.nefc, 0);
    assert_eq!(
        data.warnings[sim_constraint_core::Warning::ConstraintFull as usize].count,
        1
    );
}
