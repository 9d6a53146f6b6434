//! Deletion planner: removes a step, promotes its children and rewires the
//! edges around it so that no connection or parent reference dangles.
//!
//! Promotion and bridging are mutually exclusive for a main step and are
//! evaluated in that order. The promoted child is the one the deleted step's
//! sequence enters first, so the former children stay a single path.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use flowde_core::error::{FlowError, Result};
use flowde_core::traits::GraphTx;
use flowde_core::types::{AssignmentId, Connection, Endpoint, Step, StepId};

/// What a deletion did besides removing the step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub deleted: Step,
    /// Former child that became a main step.
    pub promoted: Option<StepId>,
    /// Edge added between the deleted step's predecessor and successor.
    pub bridged: Option<(StepId, StepId)>,
}

/// Delete `id` and repair both structures around it.
pub fn delete_step(tx: &mut dyn GraphTx, id: StepId) -> Result<DeleteOutcome> {
    let step = tx.step(id)?.ok_or(FlowError::StepNotFound(id))?;

    let (promoted, bridged) = match step.parent_id() {
        Some(parent) => delete_sub_step(tx, &step, parent)?,
        None => delete_main_step(tx, &step)?,
    };

    let mut doomed = BTreeSet::new();
    for conn in tx.connections_from(id)?.into_iter().chain(tx.connections_to(id)?) {
        doomed.insert(conn.id);
    }
    for conn_id in &doomed {
        tx.delete_connection(*conn_id)?;
    }
    tx.delete_step(id)?;

    debug!(
        assignment_id = %step.assignment_id,
        step_id = %id,
        promoted = ?promoted,
        bridged = ?bridged,
        removed_connections = doomed.len(),
        "Deleted step"
    );
    Ok(DeleteOutcome {
        deleted: step,
        promoted,
        bridged,
    })
}

type Repair = (Option<StepId>, Option<(StepId, StepId)>);

fn delete_sub_step(tx: &mut dyn GraphTx, step: &Step, parent: StepId) -> Result<Repair> {
    let incoming = tx.find_incoming(step.id, Endpoint::MainOrChildOf(parent))?;
    let to_sibling = tx.find_outgoing(step.id, Endpoint::ChildOf(parent))?;
    let to_child = tx.find_outgoing(step.id, Endpoint::ChildOf(step.id))?;
    let children = tx.children(step.id)?;

    let bridged = match (&incoming, &to_sibling) {
        (Some(inc), Some(out)) => bridge(tx, step.assignment_id, inc.from_step, out.to_step)?,
        _ => None,
    };

    // Only reachable when the hierarchy is deeper than two levels. Without a
    // connection to follow, the topmost child takes over.
    let promoted = to_child
        .map(|c| c.to_step)
        .or_else(|| children.first().map(|c| c.id));
    if let Some(promoted) = promoted {
        tx.set_parent(promoted, None)?;
        for child in children.iter().filter(|c| c.id != promoted) {
            tx.set_parent(child.id, Some(promoted))?;
        }
    }

    Ok((promoted, bridged))
}

fn delete_main_step(tx: &mut dyn GraphTx, step: &Step) -> Result<Repair> {
    let children = tx.children(step.id)?;

    if children.is_empty() {
        let incoming = tx.find_incoming(step.id, Endpoint::Any)?;
        let outgoing = tx.find_outgoing(step.id, Endpoint::Any)?;
        let bridged = match (incoming, outgoing) {
            (Some(inc), Some(out)) => bridge(tx, step.assignment_id, inc.from_step, out.to_step)?,
            _ => None,
        };
        return Ok((None, bridged));
    }

    // The head of the child sequence takes over; position order only decides
    // when no edge leads into the children.
    let promoted = match tx.find_outgoing(step.id, Endpoint::ChildOf(step.id))? {
        Some(entry) => entry.to_step,
        None => children[0].id,
    };
    tx.set_parent(promoted, None)?;

    for conn in tx.connections_to(step.id)? {
        if conn.from_step != promoted {
            redirect(tx, &conn, conn.from_step, promoted)?;
        }
    }
    for conn in tx.connections_from(step.id)? {
        if conn.to_step != promoted {
            redirect(tx, &conn, promoted, conn.to_step)?;
        }
    }
    for child in children.iter().filter(|c| c.id != promoted) {
        tx.set_parent(child.id, Some(promoted))?;
    }

    Ok((Some(promoted), None))
}

/// Connect `from -> to` unless that would be a self-loop.
fn bridge(
    tx: &mut dyn GraphTx,
    assignment: AssignmentId,
    from: StepId,
    to: StepId,
) -> Result<Option<(StepId, StepId)>> {
    if from == to {
        return Ok(None);
    }
    tx.create_connection(assignment, from, to)?;
    Ok(Some((from, to)))
}

/// Move `conn` to `from -> to`; drops it instead when the target edge
/// already exists or would be a self-loop.
fn redirect(tx: &mut dyn GraphTx, conn: &Connection, from: StepId, to: StepId) -> Result<()> {
    if from == to || tx.connection_between(from, to)?.is_some() {
        return tx.delete_connection(conn.id);
    }
    tx.redirect_connection(conn.id, from, to)
}
