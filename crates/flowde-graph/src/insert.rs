//! Insertion planner: splices a new step into both the hierarchy and the
//! connection sequence.
//!
//! Every anchored mode looks for the one outgoing edge the new step takes
//! over. If it exists it is replaced by `reference -> new -> old target`,
//! otherwise a single `reference -> new` edge is added. All lookups and
//! validation happen before the first write.

use tracing::debug;

use flowde_core::error::{FlowError, Result};
use flowde_core::traits::GraphTx;
use flowde_core::types::{
    AssignmentId, Connection, Endpoint, NewStep, Placement, Step, StepId, StepRole,
};

use crate::layout::PositionAllocator;

/// Resolve `reference` inside `assignment`; steps of other assignments are
/// reported as missing.
pub(crate) fn resolve_reference(
    tx: &dyn GraphTx,
    assignment: AssignmentId,
    reference: StepId,
) -> Result<Step> {
    match tx.step(reference)? {
        Some(step) if step.assignment_id == assignment => Ok(step),
        _ => Err(FlowError::ReferenceNotFound(reference)),
    }
}

/// Decided shape of one insertion, computed without touching the store.
struct Plan {
    new_step: NewStep,
    reference: Option<StepId>,
    /// Existing edge out of the reference that the new step takes over.
    displaced: Option<Connection>,
}

fn plan(
    tx: &dyn GraphTx,
    layout: &PositionAllocator,
    assignment: AssignmentId,
    content: &str,
    placement: Placement,
) -> Result<Plan> {
    let reference = placement
        .reference()
        .map(|id| resolve_reference(tx, assignment, id))
        .transpose()?;
    let mode = placement.mode();
    let position = match placement {
        Placement::Unanchored { position: Some(hint) } => hint,
        _ => layout.allocate(reference.as_ref(), mode)?,
    };

    let (role, displaced) = match (placement, reference.as_ref()) {
        (Placement::NewMainStep { .. }, Some(r)) => {
            (StepRole::Main, tx.find_outgoing(r.id, Endpoint::Main)?)
        }
        (Placement::After { .. }, Some(r)) => match r.parent_id() {
            // After a main step: becomes its first child.
            None => (
                StepRole::Sub { parent_id: r.id },
                tx.find_outgoing(r.id, Endpoint::ChildOf(r.id))?,
            ),
            // After a sub-step: becomes its next sibling.
            Some(parent_id) => (
                StepRole::Sub { parent_id },
                tx.find_outgoing(r.id, Endpoint::ChildOf(parent_id))?,
            ),
        },
        (Placement::Child { .. }, Some(r)) => (StepRole::Sub { parent_id: r.id }, None),
        _ => (StepRole::Main, None),
    };

    Ok(Plan {
        new_step: NewStep {
            assignment_id: assignment,
            content: content.to_string(),
            role,
            position,
        },
        reference: reference.map(|r| r.id),
        displaced,
    })
}

/// Insert one step described by `placement` and rewire connections around it.
///
/// Creates exactly one step, deletes at most one connection and creates at
/// most two.
pub fn insert_step(
    tx: &mut dyn GraphTx,
    layout: &PositionAllocator,
    assignment: AssignmentId,
    content: &str,
    placement: Placement,
) -> Result<Step> {
    if content.trim().is_empty() {
        return Err(FlowError::InvalidInput("step content must not be empty".into()));
    }
    if tx.assignment(assignment)?.is_none() {
        return Err(FlowError::AssignmentNotFound(assignment));
    }

    let Plan {
        new_step,
        reference,
        displaced,
    } = plan(&*tx, layout, assignment, content, placement)?;

    let step = tx.create_step(&new_step)?;

    if let Some(reference) = reference {
        match displaced {
            Some(old) => {
                tx.delete_connection(old.id)?;
                tx.create_connection(assignment, reference, step.id)?;
                tx.create_connection(assignment, step.id, old.to_step)?;
                debug!(
                    step_id = %step.id,
                    reference = %reference,
                    displaced_target = %old.to_step,
                    "Spliced step into sequence"
                );
            }
            None => {
                tx.create_connection(assignment, reference, step.id)?;
            }
        }
    }

    debug!(
        assignment_id = %assignment,
        step_id = %step.id,
        mode = %placement.mode(),
        main = step.is_main(),
        "Inserted step"
    );
    Ok(step)
}
