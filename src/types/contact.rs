//! Contact record consumed by the constraint core.
//!
//! Contacts are produced by the collision subsystem; the core only mutates
//! the scratch fields `exclude`, `efc_address`, `mu`, and `hessian`.

use nalgebra::{DMatrix, Vector3};

use super::enums::{DEFAULT_SOLIMP, DEFAULT_SOLREF, NIMP, NREF};

/// One detected contact point.
#[derive(Debug, Clone)]
pub struct Contact {
    /// Contact position in world coordinates.
    pub pos: Vector3<f64>,
    /// Contact frame rows: `frame[0]` is the normal (from geom1 toward
    /// geom2), `frame[1..3]` the tangents.
    pub frame: [Vector3<f64>; 3],
    /// Signed distance between the surfaces (negative = penetration).
    pub dist: f64,
    /// Inclusion threshold: the contact generates rows while
    /// `dist < includemargin` (`includemargin = margin − gap`).
    pub includemargin: f64,
    /// First geom id.
    pub geom1: usize,
    /// Second geom id.
    pub geom2: usize,
    /// Contact dimensionality: 1, 3, 4, or 6.
    pub dim: usize,
    /// Friction coefficients `[tangent1, tangent2, torsional, roll1, roll2]`;
    /// the first `dim − 1` entries are used.
    pub friction: [f64; 5],
    /// Solver reference parameters (normal direction).
    pub solref: [f64; NREF],
    /// Solver reference for elliptic friction rows; `[0, 0]` means
    /// "use `solref`".
    pub solreffriction: [f64; NREF],
    /// Solver impedance parameters.
    pub solimp: [f64; NIMP],
    /// Exclusion scratch: 0 = include, 1 = in gap, 3 = no dofs affected.
    pub exclude: u8,
    /// First row of this contact's block in the `efc_*` arrays, or `None`
    /// when the contact is excluded.
    pub efc_address: Option<usize>,
    /// Friction coefficient of the regularized cone, written by parameter
    /// assembly and consumed by the solver.
    pub mu: f64,
    /// Cone Hessian of the elliptic middle zone (`dim × dim`), written by
    /// `mj_constraint_update` when requested.
    pub hessian: Option<DMatrix<f64>>,
}

impl Contact {
    /// Create a contact with default solver parameters.
    ///
    /// The tangent frame is completed from the normal; `friction` fills the
    /// two sliding coefficients (torsional and rolling default to the MuJoCo
    /// values `0.005` / `0.0001`).
    #[must_use]
    pub fn new(
        pos: Vector3<f64>,
        normal: Vector3<f64>,
        dist: f64,
        geom1: usize,
        geom2: usize,
        friction: f64,
        dim: usize,
    ) -> Self {
        let (t1, t2) = tangent_frame(&normal);
        Self {
            pos,
            frame: [normal, t1, t2],
            dist,
            includemargin: 0.0,
            geom1,
            geom2,
            dim,
            friction: [friction, friction, 0.005, 0.0001, 0.0001],
            solref: DEFAULT_SOLREF,
            solreffriction: [0.0; NREF],
            solimp: DEFAULT_SOLIMP,
            exclude: 0,
            efc_address: None,
            mu: 0.0,
            hessian: None,
        }
    }

    /// The contact normal (first frame row).
    #[must_use]
    pub fn normal(&self) -> Vector3<f64> {
        self.frame[0]
    }
}

/// Complete an orthonormal tangent frame for a (unit) normal.
#[must_use]
pub fn tangent_frame(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    // Pick the axis least aligned with the normal to seed the first tangent.
    let seed = if normal.x.abs() < 0.5 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let t1 = normal.cross(&seed).normalize();
    let t2 = normal.cross(&t1);
    (t1, t2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tangent_frame_is_orthonormal() {
        for normal in [
            Vector3::z(),
            Vector3::x(),
            Vector3::new(1.0, 2.0, -0.5).normalize(),
        ] {
            let (t1, t2) = tangent_frame(&normal);
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&normal), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t2.dot(&normal), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t1.dot(&t2), 0.0, epsilon = 1e-12);
        }
    }
}
