//! Constraint assembly and update core for a MuJoCo-aligned physics pipeline.
//!
//! Given a multibody configuration (bodies, joints, tendons, contacts), this
//! crate enumerates the active scalar constraint rows for one time step,
//! builds the stacked constraint Jacobian (dense or sparse), computes per-row
//! solver parameters (impedance, KBIP, regularization, diagonal
//! preconditioner), optionally forms the regularized dual matrix
//! `A_R = J·M⁻¹·Jᵀ + diag(R)`, and evaluates per-row states, forces, and cost
//! for a candidate acceleration. It follows Todorov's Model/Data design:
//!
//! - [`Model`] is static (immutable after construction)
//! - [`Data`] owns all per-step state, including the `efc_*` row arrays
//!
//! Collision detection, tendon/body kinematics, mass-matrix factorization,
//! and the convex solver inner loop are external collaborators: the caller
//! fills `Data` with contacts, world poses, tendon Jacobians, and the
//! `L^T·D·L` factor of the mass matrix, then drives the step as
//!
//! ```text
//! mj_make_constraint      enumerate rows, build J, assemble parameters
//! mj_project_constraint   A_R (dual solvers only)
//! mj_reference_constraint efc_vel, efc_aref
//! mj_constraint_update    per-row state, force, cost, qfrc_constraint
//! ```
//!
//! Row order is deterministic: equalities, then dof/tendon friction, then
//! joint/tendon limits, then contacts, each section in definition order.

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,      // Many methods can't be const due to nalgebra
    clippy::neg_cmp_op_on_partial_ord, // !(x >= 0.0) is intentional for NaN rejection
    clippy::too_many_lines,            // Constraint instantiation naturally has many steps
    clippy::doc_markdown,              // Not all technical terms need backticks
    clippy::suboptimal_flops           // mul_add style changes aren't always clearer
)]

pub mod arena;
pub mod constraint;
pub mod jacobian;
pub mod linalg;
pub mod sparse;
pub mod types;

pub use arena::{Arena, ArenaFull};
pub use constraint::{
    mj_constraint_update, mj_is_dual, mj_is_pyramidal, mj_is_sparse, mj_make_constraint,
    mj_mul_jac_t_vec, mj_mul_jac_vec, mj_project_constraint, mj_reference_constraint,
};
pub use constraint::count::{mj_precount, PreCount};
pub use constraint::row::{mj_add_contact, AddResult};
pub use sparse::{CsrMatrix, EfcJacobian};
pub use types::{
    ConeType, ConstraintState, ConstraintType, Contact, Data, EngineError, EqualityType,
    JacobianMode, MjJointType, Model, SolverType, Warning, WarningStat,
};
