use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use flowde_core::error::{FlowError, Result};
use flowde_core::traits::GraphTx;
use flowde_core::types::{ActorId, AssignmentId, NewAssignment, NewStep, Position, Step, StepRole};

use crate::breakdown::extract_json;
use crate::layout::PositionAllocator;

/// A generated assignment plan: main steps, each with optional sub-steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `YYYY-MM-DD` or RFC 3339.
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub steps: Vec<OutlineStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineStep {
    pub content: String,
    #[serde(default)]
    pub substeps: Vec<OutlineSubstep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineSubstep {
    pub content: String,
}

impl Outline {
    /// Parse an outline from model output, tolerating surrounding prose.
    pub fn parse(text: &str) -> Result<Self> {
        extract_json(text)
    }

    pub fn deadline(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.due_date.as_deref().map(str::trim).filter(|d| !d.is_empty()) else {
            return Ok(None);
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Some(naive.and_utc()))
            .ok_or_else(|| FlowError::InvalidInput(format!("unrecognized due date: {}", raw)))
    }

    pub fn to_new_assignment(&self, owner: ActorId) -> Result<NewAssignment> {
        if self.title.trim().is_empty() {
            return Err(FlowError::InvalidInput("assignment title must not be empty".into()));
        }
        Ok(NewAssignment {
            owner,
            title: self.title.trim().to_string(),
            description: self.description.clone(),
            deadline: self.deadline()?,
        })
    }
}

/// Lay out `outline` as the initial flowchart of `assignment`.
///
/// Main steps run left to right and are chained in order; each main step
/// points at its first sub-step, and sub-steps are chained top to bottom.
pub fn seed_outline(
    tx: &mut dyn GraphTx,
    layout: &PositionAllocator,
    origin: Position,
    assignment: AssignmentId,
    outline: &Outline,
) -> Result<Vec<Step>> {
    let mut created = Vec::new();
    let mut previous_main: Option<Step> = None;

    let main_steps = outline
        .steps
        .iter()
        .filter(|s| !s.content.trim().is_empty());
    for (index, outline_step) in main_steps.enumerate() {
        let main = tx.create_step(&NewStep {
            assignment_id: assignment,
            content: outline_step.content.trim().to_string(),
            role: StepRole::Main,
            position: layout.seeded_main(origin, index),
        })?;
        if let Some(prev) = &previous_main {
            tx.create_connection(assignment, prev.id, main.id)?;
        }

        let mut previous_sub = main.id;
        let substeps = outline_step
            .substeps
            .iter()
            .filter(|s| !s.content.trim().is_empty());
        for (sub_index, substep) in substeps.enumerate() {
            let sub = tx.create_step(&NewStep {
                assignment_id: assignment,
                content: substep.content.trim().to_string(),
                role: StepRole::Sub { parent_id: main.id },
                position: layout.seeded_sub(main.position(), sub_index),
            })?;
            tx.create_connection(assignment, previous_sub, sub.id)?;
            previous_sub = sub.id;
            created.push(sub);
        }

        previous_main = Some(main.clone());
        created.push(main);
    }

    debug!(assignment_id = %assignment, steps = created.len(), "Seeded outline");
    Ok(created)
}
