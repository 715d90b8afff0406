//! Core types: model arrays, per-step data, contacts, enums, warnings.

pub mod contact;
pub mod data;
pub mod enums;
pub mod model;
pub mod warning;

pub use contact::Contact;
pub use data::{ArMatrix, Data};
pub use enums::{
    ConeType, ConstraintState, ConstraintType, EngineError, EqualityType, JacobianMode,
    MjJointType, SolverType, DEFAULT_SOLIMP, DEFAULT_SOLREF, DISABLE_CONSTRAINT,
    DISABLE_CONTACT, DISABLE_EQUALITY, DISABLE_FRICTIONLOSS, DISABLE_LIMIT, DISABLE_REFSAFE,
    ENABLE_OVERRIDE, MJ_MAXIMP, MJ_MINIMP, MJ_MINVAL, NEQDATA, NIMP, NREF, NV_SPARSE_AUTO,
};
pub use model::Model;
pub use warning::{mj_warning, Warning, WarningStat, NUM_WARNINGS};

/// Returns true if the given disable flag is set on the model.
#[inline]
#[must_use]
pub fn disabled(model: &Model, flag: u32) -> bool {
    model.disableflags & flag != 0
}

/// Returns true if the given enable flag is set on the model.
#[inline]
#[must_use]
pub fn enabled(model: &Model, flag: u32) -> bool {
    model.enableflags & flag != 0
}
