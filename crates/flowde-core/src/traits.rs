use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// One unit of work against the graph store.
///
/// Every read and write issued through a `GraphTx` belongs to the same
/// transaction; nothing becomes visible to other callers until the enclosing
/// [`GraphStore::with_transaction`] commits.
pub trait GraphTx {
    fn create_assignment(&mut self, new: &NewAssignment) -> Result<Assignment>;

    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>>;

    /// Assignments owned by `owner`, newest first.
    fn assignments_owned_by(&self, owner: &ActorId) -> Result<Vec<Assignment>>;

    fn set_assignment_completed(&mut self, id: AssignmentId, completed: bool) -> Result<()>;

    /// Deletes the assignment together with all of its steps and connections.
    fn delete_assignment(&mut self, id: AssignmentId) -> Result<()>;

    fn step(&self, id: StepId) -> Result<Option<Step>>;

    fn steps(&self, assignment: AssignmentId) -> Result<Vec<Step>>;

    /// Direct children of `parent`, ordered by `position_y`.
    fn children(&self, parent: StepId) -> Result<Vec<Step>>;

    fn create_step(&mut self, new: &NewStep) -> Result<Step>;

    fn set_parent(&mut self, id: StepId, parent: Option<StepId>) -> Result<()>;

    fn set_position(&mut self, id: StepId, position: Position) -> Result<()>;

    fn set_content(&mut self, id: StepId, content: &str) -> Result<()>;

    fn set_completed(&mut self, id: StepId, completed: bool) -> Result<()>;

    fn delete_step(&mut self, id: StepId) -> Result<()>;

    fn connections(&self, assignment: AssignmentId) -> Result<Vec<Connection>>;

    fn connections_from(&self, step: StepId) -> Result<Vec<Connection>>;

    fn connections_to(&self, step: StepId) -> Result<Vec<Connection>>;

    /// First connection leaving `from` whose target matches `target`.
    fn find_outgoing(&self, from: StepId, target: Endpoint) -> Result<Option<Connection>>;

    /// First connection arriving at `to` whose source matches `source`.
    fn find_incoming(&self, to: StepId, source: Endpoint) -> Result<Option<Connection>>;

    fn connection_between(&self, from: StepId, to: StepId) -> Result<Option<Connection>>;

    /// Creates `from -> to`, or returns the existing connection when the pair
    /// is already connected.
    fn create_connection(
        &mut self,
        assignment: AssignmentId,
        from: StepId,
        to: StepId,
    ) -> Result<Connection>;

    /// Moves both endpoints of an existing connection.
    fn redirect_connection(&mut self, id: ConnectionId, from: StepId, to: StepId) -> Result<()>;

    fn delete_connection(&mut self, id: ConnectionId) -> Result<()>;

    /// Full snapshot of one assignment, or `None` if it does not exist.
    fn snapshot(&self, assignment: AssignmentId) -> Result<Option<AssignmentGraph>> {
        let Some(record) = self.assignment(assignment)? else {
            return Ok(None);
        };
        Ok(Some(AssignmentGraph {
            steps: self.steps(assignment)?,
            connections: self.connections(assignment)?,
            assignment: record,
        }))
    }
}

/// Graph persistence backend.
pub trait GraphStore: Send + Sync + 'static {
    /// Runs `f` atomically: commits when it returns `Ok`, rolls back every
    /// write when it returns `Err`.
    fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn GraphTx) -> Result<T>;
}

/// Context handed to a breakdown source when a step is expanded.
#[derive(Debug, Clone)]
pub struct BreakdownRequest {
    pub assignment_title: String,
    pub assignment_description: Option<String>,
    pub step_content: String,
    pub question: String,
}

impl BreakdownRequest {
    /// Render the request as the prompt context sent to the model.
    pub fn prompt(&self) -> String {
        let mut prompt = format!(
            "Assignment: {}\nDescription: {}\nNode Content: {}\n",
            self.assignment_title,
            self.assignment_description.as_deref().unwrap_or(""),
            self.step_content
        );
        if !self.question.trim().is_empty() {
            prompt.push_str(&format!("\nUser Deep Dive Question: {}\n", self.question));
        }
        prompt.push_str(
            "Based on the above context, provide a structured JSON breakdown of this node into \
             actionable substeps. The JSON output must have a key 'new_steps' whose value is a \
             list of substep objects. Each substep object must include a 'content' field.",
        );
        prompt
    }
}

/// Source of step breakdowns (an LLM in production). Returns the raw
/// structured text reply; parsing is the caller's job.
pub trait BreakdownSource: Send + Sync + 'static {
    fn breakdown(&self, request: BreakdownRequest) -> BoxFuture<'_, Result<String>>;
}
