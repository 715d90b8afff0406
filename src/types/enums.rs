//! Enums, flag bits, numerical constants, and error types.
//!
//! This module defines the type-level vocabulary of the constraint core:
//! constraint row types and states, joint and equality kinds, the friction
//! cone / Jacobian / solver selectors, and the fatal [`EngineError`] raised
//! on post-build invariant violations.

/// Minimum value threshold for numerical stability.
pub const MJ_MINVAL: f64 = 1e-15;

/// Lower clamp for impedance values.
pub const MJ_MINIMP: f64 = 1e-4;

/// Upper clamp for impedance values.
pub const MJ_MAXIMP: f64 = 1.0 - 1e-4;

/// Number of solver reference parameters per element.
pub const NREF: usize = 2;

/// Number of solver impedance parameters per element.
pub const NIMP: usize = 5;

/// Number of data scalars per equality constraint.
pub const NEQDATA: usize = 11;

/// DOF count at which `JacobianMode::Auto` switches to the sparse layout.
pub const NV_SPARSE_AUTO: usize = 60;

/// Default solver reference parameters (timeconst, dampratio).
pub const DEFAULT_SOLREF: [f64; NREF] = [0.02, 1.0];

/// Default solver impedance parameters (dmin, dmax, width, midpoint, power).
pub const DEFAULT_SOLIMP: [f64; NIMP] = [0.9, 0.95, 0.001, 0.5, 2.0];

// Disable bits recognized by the constraint core.

/// Disable the entire constraint pipeline.
pub const DISABLE_CONSTRAINT: u32 = 1 << 0;
/// Disable equality constraints.
pub const DISABLE_EQUALITY: u32 = 1 << 1;
/// Disable dof/tendon friction loss.
pub const DISABLE_FRICTIONLOSS: u32 = 1 << 2;
/// Disable joint/tendon limits.
pub const DISABLE_LIMIT: u32 = 1 << 3;
/// Disable contact constraints.
pub const DISABLE_CONTACT: u32 = 1 << 4;
/// Disable the `solref[0] >= 2·timestep` integrator safety clamp.
pub const DISABLE_REFSAFE: u32 = 1 << 12;

/// Enable global override of solref/solimp/margin via `opt.o_*`.
pub const ENABLE_OVERRIDE: u32 = 1 << 0;

/// Scalar constraint row type.
///
/// Row order within a step is strict: all `Equality` rows first, then
/// `FrictionDof`/`FrictionTendon`, then limits and contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintType {
    /// Equality constraint row (connect, weld, joint or tendon coupling).
    Equality,
    /// Dof friction-loss row.
    FrictionDof,
    /// Tendon friction-loss row.
    FrictionTendon,
    /// Joint limit row (slide/hinge side, or ball axis).
    LimitJoint,
    /// Tendon limit row.
    LimitTendon,
    /// Frictionless contact row (dim = 1).
    ContactFrictionless,
    /// Pyramidal contact facet row (2·(dim−1) rows per contact).
    ContactPyramidal,
    /// Elliptic contact row (dim rows per contact).
    ContactElliptic,
}

impl ConstraintType {
    /// Whether this row belongs to a contact block. Contact rows are exempt
    /// from the empty-Jacobian guard in the row builder.
    #[must_use]
    pub const fn is_contact(self) -> bool {
        matches!(
            self,
            Self::ContactFrictionless | Self::ContactPyramidal | Self::ContactElliptic
        )
    }

    /// Whether this row is a friction-loss row.
    #[must_use]
    pub const fn is_friction(self) -> bool {
        matches!(self, Self::FrictionDof | Self::FrictionTendon)
    }
}

/// Per-row state assigned by `mj_constraint_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConstraintState {
    /// Inactive: zero force, zero cost.
    Satisfied,
    /// Quadratic zone: force `−D·jar`, cost `½·D·jar²`.
    #[default]
    Quadratic,
    /// Friction row clamped at `+frictionloss`.
    LinearNeg,
    /// Friction row clamped at `−frictionloss`.
    LinearPos,
    /// Elliptic contact block on the cone surface (middle zone).
    Cone,
}

/// Equality constraint subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EqualityType {
    /// Connect two body points with a ball joint (3 rows).
    #[default]
    Connect,
    /// Fix relative position and orientation of two bodies (6 rows).
    Weld,
    /// Couple two joint positions with a quartic polynomial (1 row).
    Joint,
    /// Couple two tendon lengths with a quartic polynomial (1 row).
    Tendon,
}

/// Joint type, MuJoCo conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MjJointType {
    /// Hinge joint (1 dof): rotation about an axis.
    #[default]
    Hinge,
    /// Slide joint (1 dof): translation along an axis.
    Slide,
    /// Ball joint (3 dofs): free rotation, quaternion position.
    Ball,
    /// Free joint (6 dofs): floating body, position + quaternion.
    Free,
}

impl MjJointType {
    /// Number of position coordinates.
    #[must_use]
    pub const fn nq(self) -> usize {
        match self {
            Self::Hinge | Self::Slide => 1,
            Self::Ball => 4,
            Self::Free => 7,
        }
    }

    /// Number of velocity coordinates (dofs).
    #[must_use]
    pub const fn nv(self) -> usize {
        match self {
            Self::Hinge | Self::Slide => 1,
            Self::Ball => 3,
            Self::Free => 6,
        }
    }
}

/// Friction cone approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConeType {
    /// Pyramidal cone: bilateral facet row pairs.
    #[default]
    Pyramidal,
    /// Elliptic cone: quadratic form handled analytically in the update.
    Elliptic,
}

/// Constraint Jacobian layout selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JacobianMode {
    /// Row-major `nefc × nv` storage.
    Dense,
    /// CSR storage with per-row column chains and supernodes.
    Sparse,
    /// Dense below [`NV_SPARSE_AUTO`] dofs, sparse at or above it.
    #[default]
    Auto,
}

/// Constraint solver algorithm selected on the model.
///
/// The solver itself is an external collaborator; the core only needs to
/// know whether a dual solver is active (PGS, or a no-slip post-pass), which
/// gates the `A_R` projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SolverType {
    /// Projected Gauss-Seidel (dual space).
    PGS,
    /// Primal conjugate gradient.
    CG,
    /// Primal Newton.
    #[default]
    Newton,
}

/// Fatal constraint-core errors.
///
/// Capacity exhaustion is *not* an error (it is a warning plus truncation);
/// these variants indicate invariant violations detectable only after the
/// build, or misuse of the sparse row builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    /// A realized row count differs from the pre-count.
    CountMismatch {
        /// Which counter mismatched ("ne", "nf", "nefc").
        what: &'static str,
        /// Count realized by the instantiators.
        found: usize,
        /// Count produced by the pre-counter (and allocated).
        allocated: usize,
    },
    /// Realized Jacobian non-zeros exceed the pre-counted allocation.
    NnzOverflow {
        /// Non-zeros realized by the instantiators.
        found: usize,
        /// Non-zeros allocated from the pre-count.
        allocated: usize,
    },
    /// Sparse row emission with a non-empty pattern but no column chain.
    MissingChain,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CountMismatch {
                what,
                found,
                allocated,
            } => {
                write!(
                    f,
                    "{what} mis-allocation: found {found} but allocated {allocated}"
                )
            }
            Self::NnzOverflow { found, allocated } => {
                write!(
                    f,
                    "constraint Jacobian mis-allocation: found nnzJ={found} but allocated {allocated}"
                )
            }
            Self::MissingChain => write!(f, "sparse constraint row added with dense arguments"),
        }
    }
}

impl std::error::Error for EngineError {}
