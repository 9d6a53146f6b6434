use tracing::debug;

use flowde_core::error::{FlowError, Result};
use flowde_core::traits::GraphTx;
use flowde_core::types::{AssignmentId, ChainAnchor, Placement, Step, StepId};

use crate::insert::{insert_step, resolve_reference};
use crate::layout::PositionAllocator;

/// Append `items` as a connected chain starting at `reference`.
///
/// The first item attaches according to `anchor` (defaulting to
/// [`ChainAnchor::for_step`]); each later item is inserted after the one
/// before it. Produces the path `reference -> items[0] -> ... -> items[n-1]`.
pub fn insert_chain(
    tx: &mut dyn GraphTx,
    layout: &PositionAllocator,
    assignment: AssignmentId,
    reference: StepId,
    anchor: Option<ChainAnchor>,
    items: &[String],
) -> Result<Vec<Step>> {
    if items.is_empty() {
        return Err(FlowError::InvalidInput("chain must contain at least one step".into()));
    }
    if let Some(pos) = items.iter().position(|item| item.trim().is_empty()) {
        return Err(FlowError::InvalidInput(format!("chain item {} is empty", pos)));
    }

    let anchor_step = resolve_reference(&*tx, assignment, reference)?;
    let anchor = anchor.unwrap_or_else(|| ChainAnchor::for_step(&anchor_step));
    let first = match anchor {
        ChainAnchor::Children => {
            // A child edge is only added blindly when there is no first child
            // to take over; otherwise splice in front of it.
            if anchor_step.is_main() && !tx.children(reference)?.is_empty() {
                Placement::After { reference }
            } else {
                Placement::Child { reference }
            }
        }
        ChainAnchor::Siblings => Placement::After { reference },
        ChainAnchor::MainSequence => Placement::NewMainStep { reference },
    };

    let mut created = Vec::with_capacity(items.len());
    let mut placement = first;
    for item in items {
        let step = insert_step(tx, layout, assignment, item, placement)?;
        placement = Placement::After { reference: step.id };
        created.push(step);
    }

    debug!(
        assignment_id = %assignment,
        reference = %reference,
        anchor = ?anchor,
        steps = created.len(),
        "Inserted chain"
    );
    Ok(created)
}
