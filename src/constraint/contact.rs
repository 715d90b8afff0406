//! Contact instantiation: frictionless rows, pyramidal facet pairs, and
//! elliptic cone blocks.
//!
//! The paired Jacobian difference of the two contact bodies is rotated into
//! the contact frame; contacts whose merged dof chain is empty are excluded
//! (`exclude = 3`). Each contact produces one contiguous, atomic row block
//! and records its first row in `efc_address`.

use crate::jacobian::mj_jac_dif_pair;
use crate::types::{disabled, ConstraintType, Data, EngineError, Model, DISABLE_CONTACT};

use super::impedance::mj_assign_margin;
use super::row::{add_constraint, AddResult};
use super::mj_is_pyramidal;

/// Instantiate contact rows. Returns `true` when the row buffer filled up.
pub(crate) fn instantiate_contact(model: &Model, data: &mut Data) -> Result<bool, EngineError> {
    if disabled(model, DISABLE_CONTACT) || data.contacts.is_empty() {
        return Ok(false);
    }
    let sparse = data.efc_J.is_sparse();
    let pyramid = mj_is_pyramidal(model);

    for ci in 0..data.contacts.len() {
        if data.contacts[ci].exclude != 0 {
            continue;
        }
        let (pos, frame, dim, dist, friction, includemargin) = {
            let con = &data.contacts[ci];
            (
                con.pos,
                con.frame,
                con.dim,
                con.dist,
                con.friction,
                con.includemargin,
            )
        };
        let b1 = model.geom_body[data.contacts[ci].geom1];
        let b2 = model.geom_body[data.contacts[ci].geom2];
        let margin = mj_assign_margin(model, includemargin);

        data.contacts[ci].efc_address = Some(data.nefc);

        let pair = mj_jac_dif_pair(model, data, b1, b2, &pos, &pos, dim > 3, sparse);
        let w = pair.nv_chain;

        // No dofs affect the relative motion: exclude the contact. The
        // chain carries this signal in both layouts (dense rows keep their
        // full width).
        if pair.chain.is_empty() {
            data.contacts[ci].efc_address = None;
            data.contacts[ci].exclude = 3;
            continue;
        }

        // The block is atomic: make sure the whole row group fits before
        // emitting anything.
        let rows_total = if dim == 1 {
            1
        } else if pyramid {
            2 * (dim - 1)
        } else {
            dim
        };
        let nnz_needed = if sparse { rows_total * w } else { 0 };
        if data.nefc + rows_total > data.nefc_allocated
            || data.efc_J.nnz() + nnz_needed > data.nnz_allocated
        {
            data.contacts[ci].efc_address = None;
            return Ok(true);
        }

        // Rotate the Jacobian difference into the contact frame. Row r of
        // the block is frame[r] · jacdif; only the normal row exists for
        // frictionless contacts.
        let nrows_tran = if dim > 1 { 3 } else { 1 };
        let mut jac = vec![0.0; dim * w];
        for r in 0..nrows_tran {
            for c in 0..w {
                jac[r * w + c] = frame[r].x * pair.jacp[(0, c)]
                    + frame[r].y * pair.jacp[(1, c)]
                    + frame[r].z * pair.jacp[(2, c)];
            }
        }
        if dim > 3 {
            if let Some(jacr) = &pair.jacr {
                for r in 0..dim - 3 {
                    for c in 0..w {
                        jac[(3 + r) * w + c] = frame[r].x * jacr[(0, c)]
                            + frame[r].y * jacr[(1, c)]
                            + frame[r].z * jacr[(2, c)];
                    }
                }
            }
        }

        let nv_chain = if sparse { w } else { 0 };
        let chain = if sparse { Some(&pair.chain[..]) } else { None };

        let status = if dim == 1 {
            // Frictionless: a single normal row.
            add_constraint(
                model,
                data,
                &jac,
                Some(&[dist]),
                Some(&[margin]),
                0.0,
                1,
                ConstraintType::ContactFrictionless,
                ci,
                nv_chain,
                chain,
            )?
        } else if pyramid {
            // One pair of opposing facets per friction direction:
            // J_normal ± μ_k · J_tangent_k, all sharing pos = dist.
            let cpos = [dist, dist];
            let cmargin = [margin, margin];
            let mut pair_jac = vec![0.0; 2 * w];
            let mut status = AddResult::Added;
            for k in 1..dim {
                let mu_k = friction[k - 1];
                for c in 0..w {
                    let jn = jac[c];
                    let jt = jac[k * w + c];
                    pair_jac[c] = jn + mu_k * jt;
                    pair_jac[w + c] = jn - mu_k * jt;
                }
                status = add_constraint(
                    model,
                    data,
                    &pair_jac,
                    Some(&cpos),
                    Some(&cmargin),
                    0.0,
                    2,
                    ConstraintType::ContactPyramidal,
                    ci,
                    nv_chain,
                    chain,
                )?;
                if status == AddResult::Full {
                    break;
                }
            }
            status
        } else {
            // Elliptic: dim rows, normal first; only the normal row carries
            // pos and margin.
            let mut cpos = vec![0.0; dim];
            let mut cmargin = vec![0.0; dim];
            cpos[0] = dist;
            cmargin[0] = margin;
            add_constraint(
                model,
                data,
                &jac,
                Some(&cpos),
                Some(&cmargin),
                0.0,
                dim,
                ConstraintType::ContactElliptic,
                ci,
                nv_chain,
                chain,
            )?
        };

        if status == AddResult::Full {
            // Roll back the block address: the contact produced no rows.
            data.contacts[ci].efc_address = None;
            return Ok(true);
        }
    }

    Ok(false)
}
