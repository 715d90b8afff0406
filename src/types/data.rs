//! Per-step state owned by the constraint core.
//!
//! `Data` holds the inputs filled by external collaborators (kinematics,
//! collision, tendon geometry, the mass-matrix factor) and every `efc_*`
//! output array. Row arrays live in the per-step arena after the contact
//! prefix and are invalidated whenever a contact is added.

use nalgebra::{DMatrix, DVector, UnitQuaternion, Vector3};

use crate::arena::{Arena, ArenaFull};
use crate::sparse::{CsrMatrix, EfcJacobian};

use super::contact::Contact;
use super::enums::{ConstraintState, ConstraintType};
use super::model::Model;
use super::warning::{WarningStat, NUM_WARNINGS};

/// Regularized dual matrix `A_R = J·M⁻¹·Jᵀ + diag(R)`.
#[derive(Debug, Clone)]
pub enum ArMatrix {
    /// Dense `nefc × nefc`.
    Dense(DMatrix<f64>),
    /// Sparse rows (symmetric pattern).
    Sparse(CsrMatrix),
}

/// Per-step simulation state for the constraint core.
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct Data {
    /// Simulation time, used only for warning messages.
    pub time: f64,

    // ------------------------------------------------------------ state in
    /// Generalized positions.
    pub qpos: DVector<f64>,
    /// Generalized velocities.
    pub qvel: DVector<f64>,

    // -------------------------------------------------------- kinematics in
    /// Body positions in world coordinates.
    pub xpos: Vec<Vector3<f64>>,
    /// Body orientations in world coordinates.
    pub xquat: Vec<UnitQuaternion<f64>>,

    // ------------------------------------------------------------ tendons in
    /// Tendon lengths.
    pub ten_length: Vec<f64>,
    /// Tendon Jacobian: non-zeros per row.
    pub ten_J_rownnz: Vec<usize>,
    /// Tendon Jacobian: row starts.
    pub ten_J_rowadr: Vec<usize>,
    /// Tendon Jacobian: column (dof) indices, ascending per row.
    pub ten_J_colind: Vec<usize>,
    /// Tendon Jacobian: values.
    pub ten_J_data: Vec<f64>,

    // --------------------------------------------------- mass-matrix factor
    /// `L^T·D·L` factor values in the model's `qLD` CSR layout
    /// (ancestors then diagonal per row).
    pub qLD_data: Vec<f64>,
    /// Precomputed `1/D_i`.
    pub qLD_diag_inv: Vec<f64>,
    /// Precomputed `1/sqrt(D_i)` for the `M^{−1/2}` back-substitution.
    pub qLD_diag_sqrt_inv: Vec<f64>,

    // -------------------------------------------------------------- contacts
    /// Contact list (arena prefix), owned by collision; the core mutates
    /// only `exclude`, `efc_address`, `mu`, `hessian`.
    pub contacts: Vec<Contact>,

    // ----------------------------------------------------------------- arena
    /// Per-step bump arena; capacity authority for contacts and row arrays.
    pub arena: Arena,

    // ---------------------------------------------------------------- counts
    /// Number of equality rows.
    pub ne: usize,
    /// Number of friction rows.
    pub nf: usize,
    /// Total number of constraint rows.
    pub nefc: usize,
    /// Realized Jacobian non-zeros (`nefc·nv` in dense mode).
    pub nnz_J: usize,
    /// Allocated row capacity from the pre-count.
    pub(crate) nefc_allocated: usize,
    /// Allocated Jacobian non-zero capacity from the pre-count.
    pub(crate) nnz_allocated: usize,

    // ------------------------------------------------------------- efc rows
    /// Stacked constraint Jacobian.
    pub efc_J: EfcJacobian,
    /// Constraint position (residual or signed distance).
    pub efc_pos: Vec<f64>,
    /// Activation margin per row.
    pub efc_margin: Vec<f64>,
    /// Friction loss per row (friction rows only).
    pub efc_frictionloss: Vec<f64>,
    /// Row type.
    pub efc_type: Vec<ConstraintType>,
    /// Id of the originating element (equality/dof/tendon/joint/contact).
    pub efc_id: Vec<usize>,
    /// Diagonal approximation of `J·M⁻¹·Jᵀ` per row.
    pub efc_diagApprox: Vec<f64>,
    /// Regularization per row.
    pub efc_R: Vec<f64>,
    /// Inverse regularization per row (`D = 1/R`).
    pub efc_D: Vec<f64>,
    /// Per-row `[K, B, I, P]`: stiffness, damping, impedance, impedance
    /// derivative.
    pub efc_KBIP: Vec<[f64; 4]>,
    /// Constraint-space velocity `J·qvel`.
    pub efc_vel: Vec<f64>,
    /// Reference acceleration.
    pub efc_aref: Vec<f64>,
    /// Constraint force, written by `mj_constraint_update`.
    pub efc_force: Vec<f64>,
    /// Per-row state, written by `mj_constraint_update`.
    pub efc_state: Vec<ConstraintState>,
    /// Regularized dual matrix, built by `mj_project_constraint` for dual
    /// solvers.
    pub efc_AR: Option<ArMatrix>,

    // -------------------------------------------------------------- outputs
    /// Joint-space constraint force `Jᵀ·efc_force`.
    pub qfrc_constraint: DVector<f64>,

    // ---------------------------------------------------------- diagnostics
    /// Per-kind warning statistics.
    pub warnings: [WarningStat; NUM_WARNINGS],
    /// High-water mark of the contact count.
    pub maxuse_con: usize,
    /// High-water mark of the row count.
    pub maxuse_efc: usize,
}

impl Model {
    /// Create an empty `Data` sized for this model.
    ///
    /// Kinematic inputs start at the reference configuration with identity
    /// body poses; the mass-matrix factor is zeroed and must be filled (see
    /// `linalg::mj_factor_sparse`) before constraint construction.
    #[must_use]
    pub fn make_data(&self) -> Data {
        Data {
            time: 0.0,
            qpos: self.qpos0.clone(),
            qvel: DVector::zeros(self.nv),
            xpos: vec![Vector3::zeros(); self.nbody],
            xquat: vec![UnitQuaternion::identity(); self.nbody],
            ten_length: vec![0.0; self.ntendon],
            ten_J_rownnz: vec![0; self.ntendon],
            ten_J_rowadr: vec![0; self.ntendon],
            ten_J_colind: Vec::new(),
            ten_J_data: Vec::new(),
            qLD_data: vec![0.0; self.qLD_nnz],
            qLD_diag_inv: vec![0.0; self.nv],
            qLD_diag_sqrt_inv: vec![0.0; self.nv],
            contacts: Vec::new(),
            arena: Arena::new(self.narena),
            ne: 0,
            nf: 0,
            nefc: 0,
            nnz_J: 0,
            nefc_allocated: 0,
            nnz_allocated: 0,
            efc_J: EfcJacobian::dense(self.nv, 0),
            efc_pos: Vec::new(),
            efc_margin: Vec::new(),
            efc_frictionloss: Vec::new(),
            efc_type: Vec::new(),
            efc_id: Vec::new(),
            efc_diagApprox: Vec::new(),
            efc_R: Vec::new(),
            efc_D: Vec::new(),
            efc_KBIP: Vec::new(),
            efc_vel: Vec::new(),
            efc_aref: Vec::new(),
            efc_force: Vec::new(),
            efc_state: Vec::new(),
            efc_AR: None,
            qfrc_constraint: DVector::zeros(self.nv),
            warnings: [WarningStat::default(); NUM_WARNINGS],
            maxuse_con: 0,
            maxuse_efc: 0,
        }
    }
}

impl Data {
    /// Drop all constraint rows and rewind the arena to the contact prefix.
    ///
    /// Called at the start of every build and whenever a contact mutation
    /// invalidates the row arrays.
    pub fn clear_efc(&mut self) {
        self.arena.rewind_to_contacts();
        self.ne = 0;
        self.nf = 0;
        self.nefc = 0;
        self.nnz_J = 0;
        self.nefc_allocated = 0;
        self.nnz_allocated = 0;
        self.efc_J = EfcJacobian::dense(self.qfrc_constraint.len(), 0);
        self.efc_pos.clear();
        self.efc_margin.clear();
        self.efc_frictionloss.clear();
        self.efc_type.clear();
        self.efc_id.clear();
        self.efc_diagApprox.clear();
        self.efc_R.clear();
        self.efc_D.clear();
        self.efc_KBIP.clear();
        self.efc_vel.clear();
        self.efc_aref.clear();
        self.efc_force.clear();
        self.efc_state.clear();
        self.efc_AR = None;
    }

    /// Reserve the row arrays in the arena and size the containers.
    ///
    /// `nefc` and `nnz` come from the pre-counter; `dual` additionally
    /// charges the `A_R` storage. Fails (leaving the rows empty) when the
    /// arena cannot hold the request.
    pub(crate) fn alloc_efc(
        &mut self,
        nv: usize,
        nefc: usize,
        nnz: usize,
        sparse: bool,
        dual: bool,
    ) -> Result<(), ArenaFull> {
        // Scalar row arrays: pos, margin, frictionloss, diagApprox, R, D,
        // vel, aref, force.
        self.arena.reserve::<f64>(9 * nefc)?;
        self.arena.reserve::<[f64; 4]>(nefc)?; // KBIP
        self.arena.reserve::<ConstraintType>(nefc)?;
        self.arena.reserve::<ConstraintState>(nefc)?;
        self.arena.reserve::<usize>(nefc)?; // id

        // Jacobian values, plus CSR metadata and the transpose in sparse mode.
        self.arena.reserve::<f64>(nnz)?;
        if sparse {
            self.arena.reserve::<f64>(nnz)?; // JT values
            self.arena.reserve::<usize>(2 * nnz)?; // colind + JT colind
            self.arena.reserve::<usize>(3 * nefc)?; // rownnz, rowadr, rowsuper
            self.arena.reserve::<usize>(3 * nv)?; // JT rownnz, rowadr, rowsuper
        }

        // Dual solvers: A_R (allocated at dense extent, as an upper bound).
        if dual {
            self.arena.reserve::<f64>(nefc * nefc)?;
            if sparse {
                self.arena.reserve::<usize>(nefc * nefc)?;
                self.arena.reserve::<usize>(2 * nefc)?;
            }
        }

        self.nefc_allocated = nefc;
        self.nnz_allocated = nnz;
        self.efc_J = if sparse {
            EfcJacobian::sparse(nv, nefc, nnz)
        } else {
            EfcJacobian::dense(nv, nefc)
        };
        self.efc_pos.reserve(nefc);
        self.efc_margin.reserve(nefc);
        self.efc_frictionloss.reserve(nefc);
        self.efc_type.reserve(nefc);
        self.efc_id.reserve(nefc);
        Ok(())
    }

    /// Number of contacts.
    #[must_use]
    pub fn ncon(&self) -> usize {
        self.contacts.len()
    }

    /// Column indices and values of tendon `t`'s length Jacobian row.
    #[must_use]
    pub fn ten_j_row(&self, t: usize) -> (&[usize], &[f64]) {
        let adr = self.ten_J_rowadr[t];
        let nnz = self.ten_J_rownnz[t];
        (
            &self.ten_J_colind[adr..adr + nnz],
            &self.ten_J_data[adr..adr + nnz],
        )
    }

    /// Dense copy of tendon `t`'s length Jacobian row.
    #[must_use]
    pub fn ten_j_dense_row(&self, t: usize, nv: usize) -> Vec<f64> {
        let (cols, vals) = self.ten_j_row(t);
        let mut row = vec![0.0; nv];
        for (&c, &v) in cols.iter().zip(vals) {
            row[c] = v;
        }
        row
    }

    /// Set tendon `t`'s length Jacobian row from a sparse pattern.
    ///
    /// Convenience for collaborators and tests; rows must be written in
    /// ascending tendon order.
    pub fn set_ten_j_row(&mut self, t: usize, cols: &[usize], vals: &[f64]) {
        debug_assert_eq!(cols.len(), vals.len());
        debug_assert!(cols.windows(2).all(|w| w[0] < w[1]));
        self.ten_J_rowadr[t] = self.ten_J_colind.len();
        self.ten_J_rownnz[t] = cols.len();
        self.ten_J_colind.extend_from_slice(cols);
        self.ten_J_data.extend_from_slice(vals);
    }
}
