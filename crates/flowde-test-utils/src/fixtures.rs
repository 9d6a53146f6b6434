use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tempfile::TempDir;

use flowde_core::config::AppConfig;
use flowde_core::error::Result;
use flowde_core::traits::GraphStore;
use flowde_core::types::*;
use flowde_store::SqliteGraphStore;

pub fn owner() -> ActorId {
    ActorId::new("student-1")
}

pub fn stranger() -> ActorId {
    ActorId::new("student-2")
}

/// Default configuration with invariant verification switched on.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.engine.verify_invariants = true;
    config
}

pub fn config_from_toml(text: &str) -> AppConfig {
    let config: AppConfig = toml::from_str(text).expect("test config must parse");
    config.validate().expect("test config must be valid");
    config
}

pub fn memory_store() -> Arc<SqliteGraphStore> {
    Arc::new(SqliteGraphStore::in_memory().expect("in-memory store"))
}

/// An on-disk store inside a fresh temp directory. Keep the directory alive
/// for as long as the store is used.
pub fn temp_store() -> (TempDir, SqliteGraphStore) {
    let dir = TempDir::new().expect("temp dir");
    let store = SqliteGraphStore::open(&dir.path().join("flowde.db")).expect("open store");
    (dir, store)
}

/// A graph written straight into a store, with steps addressed by content.
///
/// Main steps are laid out left to right and children top to bottom in the
/// order they are listed.
pub struct GraphFixture {
    pub assignment: AssignmentId,
    ids: HashMap<String, StepId>,
}

impl GraphFixture {
    /// `steps` are `(content, parent content)` pairs; parents must be listed
    /// before their children. `edges` are `(from, to)` content pairs.
    pub fn build<S: GraphStore>(
        store: &S,
        owner: &ActorId,
        steps: &[(&str, Option<&str>)],
        edges: &[(&str, &str)],
    ) -> Result<Self> {
        store.with_transaction(|tx| {
            let assignment = tx.create_assignment(&NewAssignment {
                owner: owner.clone(),
                title: "Research essay".into(),
                description: Some("Fixture assignment".into()),
                deadline: None,
            })?;

            let mut ids: HashMap<String, StepId> = HashMap::new();
            let mut positions: HashMap<StepId, Position> = HashMap::new();
            let mut child_counts: HashMap<StepId, usize> = HashMap::new();
            let mut mains = 0usize;
            for (content, parent) in steps {
                let parent = parent.map(|p| ids[p]);
                let position = match parent {
                    None => {
                        mains += 1;
                        Position::new(100.0 + 250.0 * (mains - 1) as f64, 100.0)
                    }
                    Some(p) => {
                        let n = child_counts.entry(p).or_default();
                        *n += 1;
                        positions[&p].offset(0.0, 80.0 * *n as f64)
                    }
                };
                let step = tx.create_step(&NewStep {
                    assignment_id: assignment.id,
                    content: content.to_string(),
                    role: StepRole::from_parent(parent),
                    position,
                })?;
                positions.insert(step.id, position);
                ids.insert(content.to_string(), step.id);
            }
            for (from, to) in edges {
                tx.create_connection(assignment.id, ids[*from], ids[*to])?;
            }

            Ok(Self {
                assignment: assignment.id,
                ids,
            })
        })
    }

    pub fn id(&self, content: &str) -> StepId {
        *self
            .ids
            .get(content)
            .unwrap_or_else(|| panic!("no fixture step named {:?}", content))
    }
}

/// Connections of `graph` as `(from content, to content)` pairs.
pub fn edge_names(graph: &AssignmentGraph) -> BTreeSet<(String, String)> {
    let name = |id: StepId| {
        graph
            .step(id)
            .map(|s| s.content.clone())
            .unwrap_or_else(|| format!("<missing {}>", id))
    };
    graph
        .connections
        .iter()
        .map(|c| (name(c.from_step), name(c.to_step)))
        .collect()
}

/// Content of the parent of the step named `content`, if it has one.
pub fn parent_name(graph: &AssignmentGraph, content: &str) -> Option<String> {
    let step = graph.step_by_content(content)?;
    let parent = step.parent_id()?;
    graph.step(parent).map(|p| p.content.clone())
}
