//! Structural checks over an assignment snapshot.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use flowde_core::types::{AssignmentGraph, ConnectionId, Step, StepId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DanglingEdge {
        connection: ConnectionId,
        missing: StepId,
    },
    SelfLoop {
        connection: ConnectionId,
        step: StepId,
    },
    DuplicateEdge {
        from: StepId,
        to: StepId,
    },
    MissingParent {
        step: StepId,
        parent: StepId,
    },
    SelfParent {
        step: StepId,
    },
    ForeignParent {
        step: StepId,
        parent: StepId,
    },
    /// A main step with more than one outgoing edge to main steps.
    MainSuccessors {
        step: StepId,
        count: usize,
    },
    /// A main step with more than one outgoing edge into its own children.
    ChildEntries {
        step: StepId,
        count: usize,
    },
    /// A sub-step with more than one outgoing edge to its siblings.
    SiblingSuccessors {
        step: StepId,
        count: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingEdge {
                connection,
                missing,
            } => write!(f, "connection {} references missing step {}", connection, missing),
            Self::SelfLoop { connection, step } => {
                write!(f, "connection {} loops on step {}", connection, step)
            }
            Self::DuplicateEdge { from, to } => write!(f, "duplicate edge {} -> {}", from, to),
            Self::MissingParent { step, parent } => {
                write!(f, "step {} has missing parent {}", step, parent)
            }
            Self::SelfParent { step } => write!(f, "step {} is its own parent", step),
            Self::ForeignParent { step, parent } => {
                write!(f, "step {} has parent {} from another assignment", step, parent)
            }
            Self::MainSuccessors { step, count } => {
                write!(f, "main step {} has {} main-sequence successors", step, count)
            }
            Self::ChildEntries { step, count } => {
                write!(f, "main step {} has {} edges into its children", step, count)
            }
            Self::SiblingSuccessors { step, count } => {
                write!(f, "sub-step {} has {} sibling successors", step, count)
            }
        }
    }
}

/// Every violation found in `graph`, in a stable order. Empty when consistent.
pub fn check(graph: &AssignmentGraph) -> Vec<Violation> {
    let steps: HashMap<StepId, &Step> = graph.steps.iter().map(|s| (s.id, s)).collect();
    let mut violations = Vec::new();

    for step in &graph.steps {
        let Some(parent) = step.parent_id() else { continue };
        if parent == step.id {
            violations.push(Violation::SelfParent { step: step.id });
            continue;
        }
        match steps.get(&parent) {
            None => violations.push(Violation::MissingParent {
                step: step.id,
                parent,
            }),
            Some(p) if p.assignment_id != step.assignment_id => {
                violations.push(Violation::ForeignParent {
                    step: step.id,
                    parent,
                })
            }
            Some(_) => {}
        }
    }

    let mut seen = HashSet::new();
    // (from step, rule) -> matching edge count
    let mut fan_out: BTreeMap<(StepId, u8), usize> = BTreeMap::new();
    for conn in &graph.connections {
        let from = steps.get(&conn.from_step);
        let to = steps.get(&conn.to_step);
        for (end, id) in [(from, conn.from_step), (to, conn.to_step)] {
            if end.is_none() {
                violations.push(Violation::DanglingEdge {
                    connection: conn.id,
                    missing: id,
                });
            }
        }
        if conn.from_step == conn.to_step {
            violations.push(Violation::SelfLoop {
                connection: conn.id,
                step: conn.from_step,
            });
        }
        if !seen.insert((conn.from_step, conn.to_step)) {
            violations.push(Violation::DuplicateEdge {
                from: conn.from_step,
                to: conn.to_step,
            });
        }

        let (Some(from), Some(to)) = (from, to) else { continue };
        let rule = match from.parent_id() {
            None if to.is_main() => Some(0),
            None if to.is_child_of(from.id) => Some(1),
            Some(parent) if to.is_child_of(parent) => Some(2),
            _ => None,
        };
        if let Some(rule) = rule {
            *fan_out.entry((from.id, rule)).or_default() += 1;
        }
    }

    for ((step, rule), count) in fan_out {
        if count < 2 {
            continue;
        }
        violations.push(match rule {
            0 => Violation::MainSuccessors { step, count },
            1 => Violation::ChildEntries { step, count },
            _ => Violation::SiblingSuccessors { step, count },
        });
    }

    violations
}
