use std::sync::atomic::{AtomicUsize, Ordering};

use flowde_core::error::{FlowError, Result};
use flowde_core::traits::{GraphStore, GraphTx};
use flowde_core::types::*;
use flowde_store::SqliteGraphStore;

/// A SQLite store that starts failing writes after a configurable number of
/// successful ones. Reads always pass through.
pub struct FaultyStore {
    inner: SqliteGraphStore,
    remaining: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: SqliteGraphStore) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(usize::MAX),
        }
    }

    /// Allow `writes` more writes, then fail every following one.
    pub fn fail_after(&self, writes: usize) {
        self.remaining.store(writes, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.remaining.store(usize::MAX, Ordering::SeqCst);
    }
}

impl GraphStore for FaultyStore {
    fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn GraphTx) -> Result<T>,
    {
        self.inner.with_transaction(|tx| {
            let mut faulty = FaultyTx {
                inner: tx,
                remaining: &self.remaining,
            };
            f(&mut faulty)
        })
    }
}

struct FaultyTx<'a> {
    inner: &'a mut dyn GraphTx,
    remaining: &'a AtomicUsize,
}

impl FaultyTx<'_> {
    fn spend(&self, op: &str) -> Result<()> {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| FlowError::Persistence(format!("injected failure in {}", op)))
    }
}

impl GraphTx for FaultyTx<'_> {
    fn create_assignment(&mut self, new: &NewAssignment) -> Result<Assignment> {
        self.spend("create_assignment")?;
        self.inner.create_assignment(new)
    }

    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>> {
        self.inner.assignment(id)
    }

    fn assignments_owned_by(&self, owner: &ActorId) -> Result<Vec<Assignment>> {
        self.inner.assignments_owned_by(owner)
    }

    fn set_assignment_completed(&mut self, id: AssignmentId, completed: bool) -> Result<()> {
        self.spend("set_assignment_completed")?;
        self.inner.set_assignment_completed(id, completed)
    }

    fn delete_assignment(&mut self, id: AssignmentId) -> Result<()> {
        self.spend("delete_assignment")?;
        self.inner.delete_assignment(id)
    }

    fn step(&self, id: StepId) -> Result<Option<Step>> {
        self.inner.step(id)
    }

    fn steps(&self, assignment: AssignmentId) -> Result<Vec<Step>> {
        self.inner.steps(assignment)
    }

    fn children(&self, parent: StepId) -> Result<Vec<Step>> {
        self.inner.children(parent)
    }

    fn create_step(&mut self, new: &NewStep) -> Result<Step> {
        self.spend("create_step")?;
        self.inner.create_step(new)
    }

    fn set_parent(&mut self, id: StepId, parent: Option<StepId>) -> Result<()> {
        self.spend("set_parent")?;
        self.inner.set_parent(id, parent)
    }

    fn set_position(&mut self, id: StepId, position: Position) -> Result<()> {
        self.spend("set_position")?;
        self.inner.set_position(id, position)
    }

    fn set_content(&mut self, id: StepId, content: &str) -> Result<()> {
        self.spend("set_content")?;
        self.inner.set_content(id, content)
    }

    fn set_completed(&mut self, id: StepId, completed: bool) -> Result<()> {
        self.spend("set_completed")?;
        self.inner.set_completed(id, completed)
    }

    fn delete_step(&mut self, id: StepId) -> Result<()> {
        self.spend("delete_step")?;
        self.inner.delete_step(id)
    }

    fn connections(&self, assignment: AssignmentId) -> Result<Vec<Connection>> {
        self.inner.connections(assignment)
    }

    fn connections_from(&self, step: StepId) -> Result<Vec<Connection>> {
        self.inner.connections_from(step)
    }

    fn connections_to(&self, step: StepId) -> Result<Vec<Connection>> {
        self.inner.connections_to(step)
    }

    fn find_outgoing(&self, from: StepId, target: Endpoint) -> Result<Option<Connection>> {
        self.inner.find_outgoing(from, target)
    }

    fn find_incoming(&self, to: StepId, source: Endpoint) -> Result<Option<Connection>> {
        self.inner.find_incoming(to, source)
    }

    fn connection_between(&self, from: StepId, to: StepId) -> Result<Option<Connection>> {
        self.inner.connection_between(from, to)
    }

    fn create_connection(
        &mut self,
        assignment: AssignmentId,
        from: StepId,
        to: StepId,
    ) -> Result<Connection> {
        self.spend("create_connection")?;
        self.inner.create_connection(assignment, from, to)
    }

    fn redirect_connection(&mut self, id: ConnectionId, from: StepId, to: StepId) -> Result<()> {
        self.spend("redirect_connection")?;
        self.inner.redirect_connection(id, from, to)
    }

    fn delete_connection(&mut self, id: ConnectionId) -> Result<()> {
        self.spend("delete_connection")?;
        self.inner.delete_connection(id)
    }
}
