use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Identifier of an assignment (one flowchart).
    AssignmentId
);
row_id!(
    /// Identifier of a step (graph node).
    StepId
);
row_id!(
    /// Identifier of a connection (graph edge).
    ConnectionId
);

/// The caller on whose behalf an operation runs. Authentication happens
/// upstream; the engine only compares this against the assignment owner.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Layout coordinates. Cosmetic only; no invariant is derived from them
/// except the top-to-bottom ordering of children.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub owner: ActorId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn is_owned_by(&self, actor: &ActorId) -> bool {
        &self.owner == actor
    }
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub owner: ActorId,
    pub title: String,
    pub description: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Where a step sits in the two-level hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum StepRole {
    /// Anchors the primary left-to-right sequence.
    Main,
    /// Belongs to a main step.
    Sub { parent_id: StepId },
}

impl StepRole {
    pub fn from_parent(parent: Option<StepId>) -> Self {
        match parent {
            Some(parent_id) => Self::Sub { parent_id },
            None => Self::Main,
        }
    }

    pub fn parent_id(&self) -> Option<StepId> {
        match self {
            Self::Main => None,
            Self::Sub { parent_id } => Some(*parent_id),
        }
    }
}

/// A node of the flowchart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub assignment_id: AssignmentId,
    #[serde(flatten)]
    pub role: StepRole,
    pub content: String,
    pub position_x: f64,
    pub position_y: f64,
    pub completed: bool,
}

impl Step {
    pub fn parent_id(&self) -> Option<StepId> {
        self.role.parent_id()
    }

    pub fn is_main(&self) -> bool {
        matches!(self.role, StepRole::Main)
    }

    pub fn is_child_of(&self, parent: StepId) -> bool {
        self.parent_id() == Some(parent)
    }

    pub fn position(&self) -> Position {
        Position::new(self.position_x, self.position_y)
    }
}

/// Fields for a step that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewStep {
    pub assignment_id: AssignmentId,
    pub content: String,
    pub role: StepRole,
    pub position: Position,
}

/// A directed rendering-order edge. Unrelated to the parent/child relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub assignment_id: AssignmentId,
    pub from_step: StepId,
    pub to_step: StepId,
}

impl Connection {
    pub fn touches(&self, step: StepId) -> bool {
        self.from_step == step || self.to_step == step
    }
}

/// Constrains the far endpoint of a connection lookup by its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Any,
    /// The other end is a main step.
    Main,
    /// The other end is a sub-step of the given parent.
    ChildOf(StepId),
    /// The other end is a main step or a sub-step of the given parent.
    MainOrChildOf(StepId),
}

/// Insertion modes as named by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionMode {
    NewMainStep,
    InsertAfter,
    InsertAsChild,
    Unanchored,
}

impl InsertionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMainStep => "new_main_step",
            Self::InsertAfter => "insert_after",
            Self::InsertAsChild => "insert_as_child",
            Self::Unanchored => "unanchored",
        }
    }
}

impl fmt::Display for InsertionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsertionMode {
    type Err = FlowError;

    /// Accepts the canonical names plus the short names used by the web client
    /// (`new_step`, `after`, `substep`).
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new_main_step" | "new_step" => Ok(Self::NewMainStep),
            "insert_after" | "after" => Ok(Self::InsertAfter),
            "insert_as_child" | "substep" | "child" => Ok(Self::InsertAsChild),
            "unanchored" | "random" => Ok(Self::Unanchored),
            other => Err(FlowError::InvalidInput(format!(
                "unknown insertion mode: {}",
                other
            ))),
        }
    }
}

/// A fully specified insertion target. Anchored modes always carry their
/// reference step, so "reference missing" is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    NewMainStep { reference: StepId },
    After { reference: StepId },
    Child { reference: StepId },
    Unanchored { position: Option<Position> },
}

impl Placement {
    pub fn new(
        mode: InsertionMode,
        reference: Option<StepId>,
        position: Option<Position>,
    ) -> Result<Self> {
        let anchored = |build: fn(StepId) -> Placement| {
            reference.map(build).ok_or_else(|| {
                FlowError::InvalidInput(format!("reference step required for '{}' insertion", mode))
            })
        };
        match mode {
            InsertionMode::NewMainStep => {
                anchored(|reference| Placement::NewMainStep { reference })
            }
            InsertionMode::InsertAfter => anchored(|reference| Placement::After { reference }),
            InsertionMode::InsertAsChild => anchored(|reference| Placement::Child { reference }),
            InsertionMode::Unanchored => Ok(Placement::Unanchored { position }),
        }
    }

    pub fn mode(&self) -> InsertionMode {
        match self {
            Self::NewMainStep { .. } => InsertionMode::NewMainStep,
            Self::After { .. } => InsertionMode::InsertAfter,
            Self::Child { .. } => InsertionMode::InsertAsChild,
            Self::Unanchored { .. } => InsertionMode::Unanchored,
        }
    }

    pub fn reference(&self) -> Option<StepId> {
        match self {
            Self::NewMainStep { reference }
            | Self::After { reference }
            | Self::Child { reference } => Some(*reference),
            Self::Unanchored { .. } => None,
        }
    }
}

/// How the first element of a chain attaches to the chain's reference step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainAnchor {
    /// Break the reference down into sub-steps.
    Children,
    /// Continue the reference's sibling sequence.
    Siblings,
    /// Continue the main sequence after the reference.
    MainSequence,
}

impl ChainAnchor {
    /// Default classification: main steps get sub-steps, sub-steps get
    /// siblings. Keeps every chain within two levels.
    pub fn for_step(step: &Step) -> Self {
        if step.is_main() {
            Self::Children
        } else {
            Self::Siblings
        }
    }
}

impl FromStr for ChainAnchor {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "children" => Ok(Self::Children),
            "siblings" => Ok(Self::Siblings),
            "main_sequence" | "main" => Ok(Self::MainSequence),
            other => Err(FlowError::InvalidInput(format!(
                "unknown chain anchor: {}",
                other
            ))),
        }
    }
}

/// Full snapshot of one assignment's flowchart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentGraph {
    pub assignment: Assignment,
    pub steps: Vec<Step>,
    pub connections: Vec<Connection>,
}

impl AssignmentGraph {
    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_by_content(&self, content: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.content == content)
    }

    pub fn main_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_main())
    }

    pub fn outgoing(&self, id: StepId) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(move |c| c.from_step == id)
    }

    pub fn has_edge(&self, from: StepId, to: StepId) -> bool {
        self.connections
            .iter()
            .any(|c| c.from_step == from && c.to_step == to)
    }
}
