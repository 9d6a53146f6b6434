use std::sync::Arc;

use tracing::{info, warn};

use flowde_core::config::AppConfig;
use flowde_core::error::{FlowError, Result};
use flowde_core::event::{EventBus, GraphEvent};
use flowde_core::traits::{BreakdownRequest, BreakdownSource, GraphStore, GraphTx};
use flowde_core::types::{
    ActorId, Assignment, AssignmentGraph, AssignmentId, ChainAnchor, Connection, Placement,
    Position, Step, StepId,
};

use crate::breakdown::parse_breakdown;
use crate::chain::insert_chain;
use crate::delete::{delete_step, DeleteOutcome};
use crate::insert::{insert_step, resolve_reference};
use crate::invariants::{check, Violation};
use crate::layout::PositionAllocator;
use crate::locks::AssignmentLocks;
use crate::seed::{seed_outline, Outline};

/// Entry point for every graph operation.
///
/// Each mutation takes the assignment's lock, runs in one store transaction,
/// checks ownership inside that transaction, and publishes a [`GraphEvent`]
/// once the transaction has committed.
pub struct WorkflowEngine<S: GraphStore> {
    store: Arc<S>,
    layout: PositionAllocator,
    locks: AssignmentLocks,
    events: Arc<EventBus>,
    seed_origin: Position,
    verify_invariants: bool,
    deep_dive_max_steps: usize,
}

impl<S: GraphStore> WorkflowEngine<S> {
    pub fn new(store: Arc<S>, config: &AppConfig) -> Self {
        Self {
            store,
            layout: PositionAllocator::new(&config.layout),
            locks: AssignmentLocks::new(),
            events: Arc::new(EventBus::default()),
            seed_origin: config.layout.seed_origin,
            verify_invariants: config.engine.verify_invariants,
            deep_dive_max_steps: config.deep_dive.max_steps,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // -- Assignments --------------------------------------------------------

    /// Persist a new assignment owned by `actor` and seed its flowchart.
    pub async fn create_assignment(
        &self,
        actor: &ActorId,
        outline: &Outline,
    ) -> Result<AssignmentGraph> {
        let new = outline.to_new_assignment(actor.clone())?;
        let graph = self.store.with_transaction(|tx| {
            let assignment = tx.create_assignment(&new)?;
            seed_outline(tx, &self.layout, self.seed_origin, assignment.id, outline)?;
            tx.snapshot(assignment.id)?
                .ok_or(FlowError::AssignmentNotFound(assignment.id))
        })?;

        info!(
            assignment_id = %graph.assignment.id,
            owner = %actor,
            steps = graph.steps.len(),
            "Assignment created"
        );
        self.verify(graph.assignment.id);
        self.events.publish(GraphEvent::AssignmentCreated {
            assignment_id: graph.assignment.id,
            steps: graph.steps.len(),
        });
        Ok(graph)
    }

    pub async fn assignment_graph(
        &self,
        actor: &ActorId,
        assignment: AssignmentId,
    ) -> Result<AssignmentGraph> {
        self.store.with_transaction(|tx| {
            authorize(&*tx, actor, assignment)?;
            tx.snapshot(assignment)?
                .ok_or(FlowError::AssignmentNotFound(assignment))
        })
    }

    /// The actor's assignments, newest first.
    pub async fn list_assignments(&self, actor: &ActorId) -> Result<Vec<Assignment>> {
        self.store
            .with_transaction(|tx| tx.assignments_owned_by(actor))
    }

    pub async fn delete_assignment(&self, actor: &ActorId, assignment: AssignmentId) -> Result<()> {
        self.with_assignment(actor, assignment, |tx, _| tx.delete_assignment(assignment))
            .await?;
        self.locks.forget(assignment);

        info!(
            assignment_id = %assignment,
            tracked_locks = self.locks.len(),
            "Assignment deleted"
        );
        self.events
            .publish(GraphEvent::AssignmentDeleted { assignment_id: assignment });
        Ok(())
    }

    pub async fn set_assignment_completed(
        &self,
        actor: &ActorId,
        assignment: AssignmentId,
        completed: bool,
    ) -> Result<Assignment> {
        self.with_assignment(actor, assignment, |tx, _| {
            tx.set_assignment_completed(assignment, completed)?;
            tx.assignment(assignment)?
                .ok_or(FlowError::AssignmentNotFound(assignment))
        })
        .await
    }

    // -- Graph mutations ----------------------------------------------------

    /// Insert one step according to `placement`.
    pub async fn insert(
        &self,
        actor: &ActorId,
        assignment: AssignmentId,
        content: &str,
        placement: Placement,
    ) -> Result<Step> {
        let step = self
            .with_assignment(actor, assignment, |tx, _| {
                insert_step(tx, &self.layout, assignment, content, placement)
            })
            .await?;

        self.events.publish(GraphEvent::StepInserted {
            assignment_id: assignment,
            step_id: step.id,
            mode: placement.mode(),
        });
        Ok(step)
    }

    /// Delete a step, promoting a child or bridging its neighbours.
    pub async fn delete(&self, actor: &ActorId, step: StepId) -> Result<DeleteOutcome> {
        let (assignment, outcome) = self
            .with_step(actor, step, |tx, current| delete_step(tx, current.id))
            .await?;

        self.events.publish(GraphEvent::StepDeleted {
            assignment_id: assignment,
            step_id: step,
            promoted: outcome.promoted,
        });
        Ok(outcome)
    }

    /// Insert `items` as a chain hanging off `reference`. All or nothing.
    pub async fn insert_chain(
        &self,
        actor: &ActorId,
        assignment: AssignmentId,
        reference: StepId,
        anchor: Option<ChainAnchor>,
        items: &[String],
    ) -> Result<Vec<Step>> {
        let steps = self
            .with_assignment(actor, assignment, |tx, _| {
                insert_chain(tx, &self.layout, assignment, reference, anchor, items)
            })
            .await?;

        self.events.publish(GraphEvent::ChainInserted {
            assignment_id: assignment,
            reference,
            steps: steps.iter().map(|s| s.id).collect(),
        });
        Ok(steps)
    }

    /// Ask `source` to break `step` down and attach the result as a chain.
    ///
    /// The source is awaited without holding the assignment lock; the step is
    /// re-validated once the lock is taken.
    pub async fn deep_dive(
        &self,
        actor: &ActorId,
        step: StepId,
        question: &str,
        source: &dyn BreakdownSource,
    ) -> Result<Vec<Step>> {
        let request = self.store.with_transaction(|tx| {
            let current = tx.step(step)?.ok_or(FlowError::StepNotFound(step))?;
            let assignment = authorize(&*tx, actor, current.assignment_id)?;
            Ok(BreakdownRequest {
                assignment_title: assignment.title,
                assignment_description: assignment.description,
                step_content: current.content,
                question: question.to_string(),
            })
        })?;

        let reply = source.breakdown(request).await?;
        let mut items = parse_breakdown(&reply)?;
        if items.len() > self.deep_dive_max_steps {
            warn!(
                step_id = %step,
                proposed = items.len(),
                max_steps = self.deep_dive_max_steps,
                "Truncating breakdown"
            );
            items.truncate(self.deep_dive_max_steps);
        }

        let (assignment, steps) = self
            .with_step(actor, step, |tx, current| {
                insert_chain(tx, &self.layout, current.assignment_id, current.id, None, &items)
            })
            .await?;

        info!(
            assignment_id = %assignment,
            step_id = %step,
            steps = steps.len(),
            "Deep dive applied"
        );
        self.events.publish(GraphEvent::ChainInserted {
            assignment_id: assignment,
            reference: step,
            steps: steps.iter().map(|s| s.id).collect(),
        });
        Ok(steps)
    }

    /// Add a manual connection. Connecting an already connected pair returns
    /// the existing connection.
    pub async fn connect(
        &self,
        actor: &ActorId,
        assignment: AssignmentId,
        from: StepId,
        to: StepId,
    ) -> Result<Connection> {
        let (conn, created) = self
            .with_assignment(actor, assignment, |tx, _| {
                resolve_reference(&*tx, assignment, from)?;
                resolve_reference(&*tx, assignment, to)?;
                if from == to {
                    return Err(FlowError::invalid_reference(
                        from,
                        "a step cannot connect to itself",
                    ));
                }
                if let Some(existing) = tx.connection_between(from, to)? {
                    return Ok((existing, false));
                }
                Ok((tx.create_connection(assignment, from, to)?, true))
            })
            .await?;

        if created {
            self.events.publish(GraphEvent::Connected {
                assignment_id: assignment,
                from_step: from,
                to_step: to,
            });
        }
        Ok(conn)
    }

    pub async fn move_step(
        &self,
        actor: &ActorId,
        step: StepId,
        position: Position,
    ) -> Result<Step> {
        self.update_step(actor, step, |tx| tx.set_position(step, position))
            .await
    }

    pub async fn edit_step(&self, actor: &ActorId, step: StepId, content: &str) -> Result<Step> {
        let content = content.trim();
        if content.is_empty() {
            return Err(FlowError::InvalidInput("step content must not be empty".into()));
        }
        self.update_step(actor, step, |tx| tx.set_content(step, content))
            .await
    }

    pub async fn set_step_completed(
        &self,
        actor: &ActorId,
        step: StepId,
        completed: bool,
    ) -> Result<Step> {
        self.update_step(actor, step, |tx| tx.set_completed(step, completed))
            .await
    }

    /// Run the invariant checker on demand.
    pub async fn check(&self, actor: &ActorId, assignment: AssignmentId) -> Result<Vec<Violation>> {
        let graph = self.assignment_graph(actor, assignment).await?;
        Ok(check(&graph))
    }

    // -- Plumbing -----------------------------------------------------------

    async fn with_assignment<T, F>(
        &self,
        actor: &ActorId,
        assignment: AssignmentId,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut dyn GraphTx, &Assignment) -> Result<T>,
    {
        let _guard = self.locks.acquire(assignment).await;
        let out = self.store.with_transaction(|tx| {
            let record = authorize(&*tx, actor, assignment)?;
            f(tx, &record)
        })?;
        self.verify(assignment);
        Ok(out)
    }

    /// Like [`Self::with_assignment`] for operations addressed by step id.
    /// The step is looked up once to find its assignment, then again under
    /// the lock.
    async fn with_step<T, F>(
        &self,
        actor: &ActorId,
        step: StepId,
        f: F,
    ) -> Result<(AssignmentId, T)>
    where
        F: FnOnce(&mut dyn GraphTx, &Step) -> Result<T>,
    {
        let assignment = self.store.with_transaction(|tx| {
            tx.step(step)?
                .map(|s| s.assignment_id)
                .ok_or(FlowError::StepNotFound(step))
        })?;

        let _guard = self.locks.acquire(assignment).await;
        let out = self.store.with_transaction(|tx| {
            authorize(&*tx, actor, assignment)?;
            let current = tx.step(step)?.ok_or(FlowError::StepNotFound(step))?;
            f(tx, &current)
        })?;
        self.verify(assignment);
        Ok((assignment, out))
    }

    async fn update_step<F>(&self, actor: &ActorId, step: StepId, f: F) -> Result<Step>
    where
        F: FnOnce(&mut dyn GraphTx) -> Result<()>,
    {
        let (assignment, updated) = self
            .with_step(actor, step, |tx, _| {
                f(&mut *tx)?;
                tx.step(step)?.ok_or(FlowError::StepNotFound(step))
            })
            .await?;
        self.events.publish(GraphEvent::StepUpdated {
            assignment_id: assignment,
            step_id: step,
        });
        Ok(updated)
    }

    fn verify(&self, assignment: AssignmentId) {
        if !self.verify_invariants {
            return;
        }
        match self.store.with_transaction(|tx| tx.snapshot(assignment)) {
            Ok(Some(graph)) => {
                for violation in check(&graph) {
                    warn!(assignment_id = %assignment, %violation, "Graph invariant violated");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(assignment_id = %assignment, error = %e, "Invariant check failed"),
        }
    }
}

/// Load `assignment` and make sure `actor` owns it.
fn authorize(tx: &dyn GraphTx, actor: &ActorId, assignment: AssignmentId) -> Result<Assignment> {
    let record = tx
        .assignment(assignment)?
        .ok_or(FlowError::AssignmentNotFound(assignment))?;
    if !record.is_owned_by(actor) {
        warn!(actor = %actor, assignment_id = %assignment, "Rejected operation by non-owner");
        return Err(FlowError::NotAuthorized {
            actor: actor.to_string(),
            assignment,
        });
    }
    Ok(record)
}
