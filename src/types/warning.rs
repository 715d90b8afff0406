//! Warning tracking for constraint construction diagnostics.
//!
//! Warnings are accumulated per-kind in `Data.warnings` and can be queried
//! after each step; each kind logs through `tracing` on its first occurrence
//! only.

use super::data::Data;

/// Warning kinds raised by the constraint core.
/// `repr(u8)` for compact storage; cast to `usize` for array indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Warning {
    /// Contact buffer full (arena or `nconmax`).
    ContactFull = 0,
    /// Constraint row buffer full (arena exhausted).
    ConstraintFull = 1,
    /// Mixed-sign solref on an element; default substituted.
    BadSolref = 2,
    /// Mixed-sign solreffriction on a contact; zeros substituted.
    BadSolreffriction = 3,
}

/// Number of warning kinds.
pub const NUM_WARNINGS: usize = 4;

/// Per-warning statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarningStat {
    /// Context for the last occurrence (e.g. `ncon` for `ContactFull`).
    pub last_info: i32,
    /// Cumulative count since the data was created or reset.
    pub count: i32,
}

fn warning_text(warning: Warning, info: i32) -> String {
    match warning {
        Warning::ContactFull => format!("Warning: contact buffer full (ncon={info})."),
        Warning::ConstraintFull => format!("Warning: constraint buffer full (nefc={info})."),
        Warning::BadSolref => {
            format!("Warning: mixed solref format on element {info}, replacing with default.")
        }
        Warning::BadSolreffriction => format!(
            "Warning: solreffriction values should have the same sign on contact {info}, \
             replacing with default."
        ),
    }
}

/// Record a warning and log it (first occurrence only).
pub fn mj_warning(data: &mut Data, warning: Warning, info: i32) {
    let w = &mut data.warnings[warning as usize];
    if w.count == 0 {
        tracing::warn!("{} Time = {:.4}.", warning_text(warning, info), data.time);
    }
    w.last_info = info;
    w.count += 1;
}
