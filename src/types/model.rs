//! Static model description consumed by the constraint core.
//!
//! `Model` is immutable during stepping. Arrays follow the flat MuJoCo
//! layout: element arrays indexed by id, dof arrays indexed by dof address,
//! with the kinematic tree encoded in `body_parent`/`dof_parent`.

use nalgebra::{DVector, Vector3};

use super::enums::{
    ConeType, JacobianMode, MjJointType, SolverType, DEFAULT_SOLIMP, DEFAULT_SOLREF, NEQDATA,
    NIMP, NREF,
};
use super::EqualityType;

/// Static multibody model: geometry, joints, tendons, equalities, solver
/// options, and the mass-matrix sparsity pattern.
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct Model {
    // ---------------------------------------------------------------- sizes
    /// Number of generalized velocities (dofs).
    pub nv: usize,
    /// Number of generalized position coordinates.
    pub nq: usize,
    /// Number of bodies, including the world body at index 0.
    pub nbody: usize,
    /// Number of joints.
    pub njnt: usize,
    /// Number of geoms.
    pub ngeom: usize,
    /// Number of tendons.
    pub ntendon: usize,
    /// Number of equality constraints.
    pub neq: usize,

    // --------------------------------------------------------------- bodies
    /// Parent body id (world is its own parent).
    pub body_parent: Vec<usize>,
    /// First dof address of each body.
    pub body_dofadr: Vec<usize>,
    /// Number of dofs directly on each body.
    pub body_dofnum: Vec<usize>,
    /// Whether the body has only direct dofs and no shared ancestors
    /// (enables the concatenation fast path in the dof-chain merger).
    pub body_simple: Vec<bool>,
    /// Inverse weight per body: `[translational, rotational]`.
    pub body_invweight0: Vec<[f64; 2]>,

    // --------------------------------------------------------------- joints
    /// Joint type.
    pub jnt_type: Vec<MjJointType>,
    /// Body carrying the joint.
    pub jnt_body: Vec<usize>,
    /// Address of the joint in `qpos`.
    pub jnt_qposadr: Vec<usize>,
    /// Address of the joint's first dof.
    pub jnt_dofadr: Vec<usize>,
    /// Joint anchor, in the joint body's frame.
    pub jnt_pos: Vec<Vector3<f64>>,
    /// Joint axis, in the joint body's frame.
    pub jnt_axis: Vec<Vector3<f64>>,
    /// Whether the joint has position limits.
    pub jnt_limited: Vec<bool>,
    /// Joint range `(lower, upper)`; ball joints use `max(lower, upper)`.
    pub jnt_range: Vec<(f64, f64)>,
    /// Limit activation margin.
    pub jnt_margin: Vec<f64>,
    /// Limit solver reference.
    pub jnt_solref: Vec<[f64; NREF]>,
    /// Limit solver impedance.
    pub jnt_solimp: Vec<[f64; NIMP]>,

    // ----------------------------------------------------------------- dofs
    /// Parent dof in the kinematic tree, `None` at tree roots.
    pub dof_parent: Vec<Option<usize>>,
    /// Joint owning each dof.
    pub dof_jnt: Vec<usize>,
    /// Inverse weight per dof.
    pub dof_invweight0: Vec<f64>,
    /// Dry friction loss per dof; a positive value generates a friction row.
    pub dof_frictionloss: Vec<f64>,
    /// Friction solver reference per dof.
    pub dof_solref: Vec<[f64; NREF]>,
    /// Friction solver impedance per dof.
    pub dof_solimp: Vec<[f64; NIMP]>,

    // -------------------------------------------------------------- tendons
    /// Whether the tendon has length limits.
    pub tendon_limited: Vec<bool>,
    /// Tendon length range `(lower, upper)`.
    pub tendon_range: Vec<(f64, f64)>,
    /// Limit activation margin.
    pub tendon_margin: Vec<f64>,
    /// Dry friction loss per tendon.
    pub tendon_frictionloss: Vec<f64>,
    /// Inverse weight per tendon.
    pub tendon_invweight0: Vec<f64>,
    /// Tendon length at the reference configuration.
    pub tendon_length0: Vec<f64>,
    /// Limit solver reference.
    pub tendon_solref_lim: Vec<[f64; NREF]>,
    /// Limit solver impedance.
    pub tendon_solimp_lim: Vec<[f64; NIMP]>,
    /// Friction solver reference.
    pub tendon_solref_fri: Vec<[f64; NREF]>,
    /// Friction solver impedance.
    pub tendon_solimp_fri: Vec<[f64; NIMP]>,

    // ----------------------------------------------------------- equalities
    /// Equality subtype.
    pub eq_type: Vec<EqualityType>,
    /// First object id (body, joint, or tendon depending on subtype).
    pub eq_obj1id: Vec<usize>,
    /// Second object id; `None` for single-object joint/tendon couplings.
    pub eq_obj2id: Vec<Option<usize>>,
    /// Whether the equality is active this step.
    pub eq_active: Vec<bool>,
    /// Constraint data: anchors / polynomial coefficients / relpose +
    /// torquescale, depending on subtype.
    pub eq_data: Vec<[f64; NEQDATA]>,
    /// Solver reference.
    pub eq_solref: Vec<[f64; NREF]>,
    /// Solver impedance.
    pub eq_solimp: Vec<[f64; NIMP]>,

    // ---------------------------------------------------------------- geoms
    /// Body owning each geom.
    pub geom_body: Vec<usize>,

    // ------------------------------------------------------------ reference
    /// Reference configuration (spring/coupling neutral pose).
    pub qpos0: DVector<f64>,

    // -------------------------------------------- mass-matrix sparsity (qLD)
    /// Non-zeros per factor row (ancestors + diagonal).
    pub qLD_rownnz: Vec<usize>,
    /// Start of each factor row in `qLD_colind` / `Data::qLD_data`.
    pub qLD_rowadr: Vec<usize>,
    /// Column indices per factor row: ancestor dofs ascending, then the
    /// diagonal.
    pub qLD_colind: Vec<usize>,
    /// Total factor non-zeros.
    pub qLD_nnz: usize,

    // -------------------------------------------------------------- options
    /// Integration timestep, used by the solref safety clamp.
    pub timestep: f64,
    /// Ratio of frictional-to-normal constraint impedance.
    pub impratio: f64,
    /// Friction cone approximation.
    pub cone: ConeType,
    /// Constraint Jacobian layout.
    pub jacobian: JacobianMode,
    /// Constraint solver algorithm (gates the `A_R` projection).
    pub solver: SolverType,
    /// No-slip post-pass iterations; a positive value makes the solver dual.
    pub noslip_iterations: usize,
    /// Disable bitmask (`DISABLE_*`).
    pub disableflags: u32,
    /// Enable bitmask (`ENABLE_*`).
    pub enableflags: u32,
    /// Override margin, applied when `ENABLE_OVERRIDE` is set.
    pub o_margin: f64,
    /// Override solver reference.
    pub o_solref: [f64; NREF],
    /// Override solver impedance.
    pub o_solimp: [f64; NIMP],
    /// Maximum number of contacts; `None` leaves the arena as the only bound.
    pub nconmax: Option<usize>,
    /// Per-step arena capacity in bytes.
    pub narena: usize,
}

impl Model {
    /// Empty model: world body only, default options.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            nv: 0,
            nq: 0,
            nbody: 1,
            njnt: 0,
            ngeom: 0,
            ntendon: 0,
            neq: 0,
            body_parent: vec![0],
            body_dofadr: vec![0],
            body_dofnum: vec![0],
            body_simple: vec![false],
            body_invweight0: vec![[0.0, 0.0]],
            jnt_type: Vec::new(),
            jnt_body: Vec::new(),
            jnt_qposadr: Vec::new(),
            jnt_dofadr: Vec::new(),
            jnt_pos: Vec::new(),
            jnt_axis: Vec::new(),
            jnt_limited: Vec::new(),
            jnt_range: Vec::new(),
            jnt_margin: Vec::new(),
            jnt_solref: Vec::new(),
            jnt_solimp: Vec::new(),
            dof_parent: Vec::new(),
            dof_jnt: Vec::new(),
            dof_invweight0: Vec::new(),
            dof_frictionloss: Vec::new(),
            dof_solref: Vec::new(),
            dof_solimp: Vec::new(),
            tendon_limited: Vec::new(),
            tendon_range: Vec::new(),
            tendon_margin: Vec::new(),
            tendon_frictionloss: Vec::new(),
            tendon_invweight0: Vec::new(),
            tendon_length0: Vec::new(),
            tendon_solref_lim: Vec::new(),
            tendon_solimp_lim: Vec::new(),
            tendon_solref_fri: Vec::new(),
            tendon_solimp_fri: Vec::new(),
            eq_type: Vec::new(),
            eq_obj1id: Vec::new(),
            eq_obj2id: Vec::new(),
            eq_active: Vec::new(),
            eq_data: Vec::new(),
            eq_solref: Vec::new(),
            eq_solimp: Vec::new(),
            geom_body: Vec::new(),
            qpos0: DVector::zeros(0),
            qLD_rownnz: Vec::new(),
            qLD_rowadr: Vec::new(),
            qLD_colind: Vec::new(),
            qLD_nnz: 0,
            timestep: 0.002,
            impratio: 1.0,
            cone: ConeType::Pyramidal,
            jacobian: JacobianMode::Auto,
            solver: SolverType::Newton,
            noslip_iterations: 0,
            disableflags: 0,
            enableflags: 0,
            o_margin: 0.0,
            o_solref: DEFAULT_SOLREF,
            o_solimp: DEFAULT_SOLIMP,
            nconmax: None,
            narena: 1 << 24,
        }
    }

    /// Compute the `qLD` CSR metadata from `dof_parent`.
    ///
    /// Row `i` lists the ancestors of dof `i` ascending, then `i` itself
    /// (the diagonal). Must be called after the dof tree is final and before
    /// `make_data`.
    pub fn compute_qld_csr_metadata(&mut self) {
        let nv = self.nv;
        self.qLD_rownnz = vec![0; nv];
        self.qLD_rowadr = vec![0; nv];

        let mut ancestors: Vec<usize> = Vec::new();
        let mut colind: Vec<usize> = Vec::new();
        let mut offset = 0usize;
        for i in 0..nv {
            ancestors.clear();
            let mut p = self.dof_parent[i];
            while let Some(j) = p {
                ancestors.push(j);
                p = self.dof_parent[j];
            }
            ancestors.reverse();

            self.qLD_rowadr[i] = offset;
            self.qLD_rownnz[i] = ancestors.len() + 1;
            colind.extend_from_slice(&ancestors);
            colind.push(i);
            offset += ancestors.len() + 1;
        }
        self.qLD_colind = colind;
        self.qLD_nnz = offset;
    }

    /// Borrow the `qLD` CSR metadata as `(rowadr, rownnz, colind)`.
    #[must_use]
    pub fn qld_csr(&self) -> (&[usize], &[usize], &[usize]) {
        (&self.qLD_rowadr, &self.qLD_rownnz, &self.qLD_colind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qld_metadata_chain() {
        // 3-dof serial chain: 0 -> 1 -> 2.
        let mut model = Model::empty();
        model.nv = 3;
        model.dof_parent = vec![None, Some(0), Some(1)];
        model.compute_qld_csr_metadata();

        assert_eq!(model.qLD_rownnz, vec![1, 2, 3]);
        assert_eq!(model.qLD_rowadr, vec![0, 1, 3]);
        assert_eq!(model.qLD_colind, vec![0, 0, 1, 0, 1, 2]);
        assert_eq!(model.qLD_nnz, 6);
    }

    #[test]
    fn qld_metadata_two_roots() {
        let mut model = Model::empty();
        model.nv = 2;
        model.dof_parent = vec![None, None];
        model.compute_qld_csr_metadata();

        assert_eq!(model.qLD_rownnz, vec![1, 1]);
        assert_eq!(model.qLD_colind, vec![0, 1]);
    }
}
