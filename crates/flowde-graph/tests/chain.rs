use std::collections::BTreeSet;
use std::sync::Arc;

use flowde_core::error::{ErrorKind, FlowError};
use flowde_core::event::GraphEvent;
use flowde_core::types::{ChainAnchor, Position};
use flowde_graph::{check, WorkflowEngine};
use flowde_store::SqliteGraphStore;
use flowde_test_utils::{
    edge_names, memory_store, owner, parent_name, test_config, FaultyStore, GraphFixture,
};

fn setup(
    steps: &[(&str, Option<&str>)],
    edges: &[(&str, &str)],
) -> (WorkflowEngine<SqliteGraphStore>, GraphFixture) {
    let store = memory_store();
    let fx = GraphFixture::build(&*store, &owner(), steps, edges).unwrap();
    (WorkflowEngine::new(Arc::clone(&store), &test_config()), fx)
}

fn edges(pairs: &[(&str, &str)]) -> BTreeSet<(String, String)> {
    pairs
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

fn items(contents: &[&str]) -> Vec<String> {
    contents.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_chain_under_childless_main_step() {
    let (engine, fx) = setup(&[("A", None)], &[]);

    let steps = engine
        .insert_chain(&owner(), fx.assignment, fx.id("A"), None, &items(&["c1", "c2", "c3"]))
        .await
        .unwrap();

    assert_eq!(steps.len(), 3);
    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(
        edge_names(&graph),
        edges(&[("A", "c1"), ("c1", "c2"), ("c2", "c3")])
    );
    for name in ["c1", "c2", "c3"] {
        assert_eq!(parent_name(&graph, name).as_deref(), Some("A"));
    }
    assert_eq!(steps[0].position(), Position::new(250.0, 100.0));
    assert_eq!(steps[1].position(), Position::new(250.0, 180.0));
    assert_eq!(steps[2].position(), Position::new(250.0, 260.0));
    assert!(check(&graph).is_empty());
}

#[tokio::test]
async fn test_chain_under_main_step_with_children_goes_first() {
    let (engine, fx) = setup(&[("A", None), ("A1", Some("A"))], &[("A", "A1")]);

    engine
        .insert_chain(&owner(), fx.assignment, fx.id("A"), None, &items(&["X", "Y"]))
        .await
        .unwrap();

    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(
        edge_names(&graph),
        edges(&[("A", "X"), ("X", "Y"), ("Y", "A1")])
    );
    assert_eq!(parent_name(&graph, "Y").as_deref(), Some("A"));
    assert!(check(&graph).is_empty());
}

#[tokio::test]
async fn test_chain_after_sub_step_continues_siblings() {
    let (engine, fx) = setup(
        &[("A", None), ("A1", Some("A")), ("A2", Some("A"))],
        &[("A", "A1"), ("A1", "A2")],
    );

    engine
        .insert_chain(&owner(), fx.assignment, fx.id("A1"), None, &items(&["X", "Y"]))
        .await
        .unwrap();

    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(
        edge_names(&graph),
        edges(&[("A", "A1"), ("A1", "X"), ("X", "Y"), ("Y", "A2")])
    );
    assert_eq!(parent_name(&graph, "X").as_deref(), Some("A"));
    assert!(check(&graph).is_empty());
}

#[tokio::test]
async fn test_chain_on_main_sequence() {
    let (engine, fx) = setup(&[("A", None), ("B", None)], &[("A", "B")]);

    let steps = engine
        .insert_chain(
            &owner(),
            fx.assignment,
            fx.id("A"),
            Some(ChainAnchor::MainSequence),
            &items(&["X", "Y"]),
        )
        .await
        .unwrap();

    assert!(steps[0].is_main());
    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(
        edge_names(&graph),
        edges(&[("A", "X"), ("X", "B"), ("X", "Y")])
    );
    assert_eq!(parent_name(&graph, "Y").as_deref(), Some("X"));
    assert!(check(&graph).is_empty());
}

#[tokio::test]
async fn test_empty_or_blank_chain_rejected_before_writes() {
    let (engine, fx) = setup(&[("A", None)], &[]);

    let err = engine
        .insert_chain(&owner(), fx.assignment, fx.id("A"), None, &[])
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidInput(_)));

    let err = engine
        .insert_chain(&owner(), fx.assignment, fx.id("A"), None, &items(&["ok", " "]))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidInput(_)));

    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(graph.steps.len(), 1);
}

#[tokio::test]
async fn test_failing_write_mid_chain_rolls_back_everything() {
    let store = Arc::new(FaultyStore::new(SqliteGraphStore::in_memory().unwrap()));
    let fx = GraphFixture::build(&*store, &owner(), &[("A", None), ("B", None)], &[("A", "B")])
        .unwrap();
    let engine = WorkflowEngine::new(Arc::clone(&store), &test_config());

    // Two writes per item: the second item's connection fails.
    store.fail_after(3);
    let err = engine
        .insert_chain(&owner(), fx.assignment, fx.id("A"), None, &items(&["c1", "c2", "c3"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    store.heal();

    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(graph.steps.len(), 2);
    assert_eq!(edge_names(&graph), edges(&[("A", "B")]));
}

#[tokio::test]
async fn test_chain_event_lists_new_steps_in_order() {
    let (engine, fx) = setup(&[("A", None)], &[]);
    let mut rx = engine.events().subscribe();

    let steps = engine
        .insert_chain(&owner(), fx.assignment, fx.id("A"), None, &items(&["one", "two"]))
        .await
        .unwrap();

    assert_eq!(
        rx.recv().await.unwrap(),
        GraphEvent::ChainInserted {
            assignment_id: fx.assignment,
            reference: fx.id("A"),
            steps: steps.iter().map(|s| s.id).collect(),
        }
    );
}
