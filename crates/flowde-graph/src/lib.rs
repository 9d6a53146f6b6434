pub mod breakdown;
pub mod chain;
pub mod delete;
pub mod engine;
pub mod insert;
pub mod invariants;
pub mod layout;
pub mod locks;
pub mod seed;

pub use breakdown::{extract_json, parse_breakdown};
pub use chain::insert_chain;
pub use delete::{delete_step, DeleteOutcome};
pub use engine::WorkflowEngine;
pub use insert::insert_step;
pub use invariants::{check, Violation};
pub use layout::PositionAllocator;
pub use locks::AssignmentLocks;
pub use seed::{seed_outline, Outline, OutlineStep, OutlineSubstep};
