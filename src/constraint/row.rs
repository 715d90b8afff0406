//! Row builder: contact admission and constraint-row emission.
//!
//! `add_constraint` appends a block of `size` rows to the stacked Jacobian
//! and fills the per-row metadata, dispatching on the dense/sparse layout.
//! Non-contact blocks whose Jacobian is identically zero are dropped;
//! contact blocks always keep their rows. Emission never leaves a block
//! half-written: capacity is checked up front and the whole block is either
//! added or refused.

use crate::types::{
    mj_warning, ConstraintType, Contact, Data, EngineError, Model, Warning,
};

/// Outcome of a row-block emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// The block was appended.
    Added,
    /// The block was dropped by the empty-Jacobian guard.
    Skipped,
    /// The allocated row or non-zero capacity cannot hold the block.
    Full,
}

/// Add a contact to the contact list. Returns `true` when the buffer is
/// full (warning recorded), `false` on success.
///
/// Adding a contact rewinds the arena to the end of the contact prefix and
/// invalidates all `efc_*` arrays — any previously built rows are stale.
pub fn mj_add_contact(model: &Model, data: &mut Data, con: Contact) -> bool {
    if let Some(nconmax) = model.nconmax {
        if data.contacts.len() >= nconmax {
            let ncon = data.contacts.len() as i32;
            mj_warning(data, Warning::ContactFull, ncon);
            return true;
        }
    }

    // Invalidate row arrays before growing the prefix.
    data.clear_efc();

    if data.arena.reserve::<Contact>(1).is_err() {
        let ncon = data.contacts.len() as i32;
        mj_warning(data, Warning::ContactFull, ncon);
        return true;
    }
    data.contacts.push(con);
    data.arena.seal_contact_prefix();
    false
}

/// Append `size` rows to the constraint Jacobian and fill their metadata.
///
/// `jac` is `size × nv` row-major in dense mode and `size × nv_chain` in
/// sparse mode, where every row shares the column pattern `chain`. `pos` and
/// `margin` default to zero when absent.
#[allow(clippy::too_many_arguments)]
pub(crate) fn add_constraint(
    _model: &Model,
    data: &mut Data,
    jac: &[f64],
    pos: Option<&[f64]>,
    margin: Option<&[f64]>,
    frictionloss: f64,
    size: usize,
    ctype: ConstraintType,
    id: usize,
    nv_chain: usize,
    chain: Option<&[usize]>,
) -> Result<AddResult, EngineError> {
    // Empty guard applies to everything but contact rows.
    let mut empty = !ctype.is_contact();

    if data.nefc + size > data.nefc_allocated {
        return Ok(AddResult::Full);
    }

    if data.efc_J.is_sparse() {
        if nv_chain > 0 {
            empty = false;
        } else if empty {
            // All rows are empty: drop the block.
            return Ok(AddResult::Skipped);
        }

        let chain = match (nv_chain, chain) {
            (0, _) => &[][..],
            (_, Some(c)) => c,
            (_, None) => return Err(EngineError::MissingChain),
        };
        debug_assert_eq!(chain.len(), nv_chain);

        if data.efc_J.nnz() + size * nv_chain > data.nnz_allocated {
            return Ok(AddResult::Full);
        }
        data.efc_J.append_sparse_rows(jac, size, chain);
    } else {
        if empty && jac.iter().any(|&v| v != 0.0) {
            empty = false;
        }
        if empty {
            return Ok(AddResult::Skipped);
        }
        data.efc_J.append_dense_rows(jac, size);
    }

    for i in 0..size {
        data.efc_pos.push(pos.map_or(0.0, |p| p[i]));
        data.efc_margin.push(margin.map_or(0.0, |m| m[i]));
        data.efc_frictionloss.push(frictionloss);
        data.efc_type.push(ctype);
        data.efc_id.push(id);
    }

    data.nefc += size;
    match ctype {
        ConstraintType::Equality => data.ne += size,
        ConstraintType::FrictionDof | ConstraintType::FrictionTendon => data.nf += size,
        _ => {}
    }

    Ok(AddResult::Added)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::sparse::EfcJacobian;
    use crate::types::Model;
    use nalgebra::Vector3;

    fn setup(sparse: bool) -> (Model, Data) {
        let mut model = Model::empty();
        model.nv = 3;
        model.dof_parent = vec![None; 3];
        model.compute_qld_csr_metadata();
        let mut data = model.make_data();
        data.nefc_allocated = 8;
        data.nnz_allocated = 24;
        data.efc_J = if sparse {
            EfcJacobian::sparse(3, 8, 24)
        } else {
            EfcJacobian::dense(3, 8)
        };
        (model, data)
    }

    #[test]
    fn dense_empty_equality_dropped_contact_kept() {
        let (model, mut data) = setup(false);
        let zero = [0.0; 3];
        let r = add_constraint(
            &model, &mut data, &zero, None, None, 0.0, 1,
            ConstraintType::Equality, 0, 0, None,
        )
        .unwrap();
        assert_eq!(r, AddResult::Skipped);
        assert_eq!(data.nefc, 0);

        let r = add_constraint(
            &model, &mut data, &zero, None, None, 0.0, 1,
            ConstraintType::ContactFrictionless, 0, 0, None,
        )
        .unwrap();
        assert_eq!(r, AddResult::Added);
        assert_eq!(data.nefc, 1);
        assert_eq!(data.ne, 0);
    }

    #[test]
    fn sparse_requires_chain() {
        let (model, mut data) = setup(true);
        let jac = [1.0, 2.0];
        let err = add_constraint(
            &model, &mut data, &jac, None, None, 0.0, 1,
            ConstraintType::Equality, 0, 2, None,
        );
        assert_eq!(err, Err(EngineError::MissingChain));
    }

    #[test]
    fn sparse_rows_share_chain_and_stack_contiguously() {
        let (model, mut data) = setup(true);
        let jac = [1.0, 2.0, 3.0, 4.0];
        let pos = [0.5, -0.5];
        add_constraint(
            &model, &mut data, &jac, Some(&pos), None, 0.0, 2,
            ConstraintType::Equality, 7, 2, Some(&[0, 2]),
        )
        .unwrap();
        assert_eq!(data.nefc, 2);
        assert_eq!(data.ne, 2);
        assert_eq!(data.efc_id, vec![7, 7]);
        match &data.efc_J {
            EfcJacobian::Sparse { j, .. } => {
                assert_eq!(j.rowadr, vec![0, 2]);
                assert_eq!(j.rownnz, vec![2, 2]);
                assert_eq!(j.row_cols(1), &[0, 2]);
                assert_eq!(j.row_vals(1), &[3.0, 4.0]);
            }
            EfcJacobian::Dense { .. } => panic!("expected sparse"),
        }
    }

    #[test]
    fn capacity_full_is_clean() {
        let (model, mut data) = setup(false);
        data.nefc_allocated = 1;
        let jac = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let r = add_constraint(
            &model, &mut data, &jac, None, None, 0.0, 2,
            ConstraintType::Equality, 0, 0, None,
        )
        .unwrap();
        assert_eq!(r, AddResult::Full);
        assert_eq!(data.nefc, 0);
        assert_eq!(data.efc_pos.len(), 0);
    }

    #[test]
    fn add_contact_invalidates_rows() {
        let (model, mut data) = setup(false);
        let jac = [1.0, 0.0, 0.0];
        add_constraint(
            &model, &mut data, &jac, None, None, 0.0, 1,
            ConstraintType::Equality, 0, 0, None,
        )
        .unwrap();
        assert_eq!(data.nefc, 1);

        let full = mj_add_contact(
            &model,
            &mut data,
            Contact::new(Vector3::zeros(), Vector3::z(), -0.01, 0, 0, 1.0, 3),
        );
        assert!(!full);
        assert_eq!(data.nefc, 0);
        assert_eq!(data.contacts.len(), 1);
    }

    #[test]
    fn nconmax_full_warns() {
        let (mut model, mut data) = setup(false);
        model.nconmax = Some(0);
        let full = mj_add_contact(
            &model,
            &mut data,
            Contact::new(Vector3::zeros(), Vector3::z(), -0.01, 0, 0, 1.0, 3),
        );
        assert!(full);
        assert_eq!(data.warnings[Warning::ContactFull as usize].count, 1);
    }
}
