use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use flowde_core::error::FlowError;
use flowde_core::types::Placement;
use flowde_graph::{check, WorkflowEngine};
use flowde_store::SqliteGraphStore;
use flowde_test_utils::{
    config_from_toml, edge_names, memory_store, owner, parent_name, stranger, test_config,
    FailingBreakdown, GatedBreakdown, GraphFixture, StaticBreakdown,
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

#[tokio::test]
async fn test_deep_dive_on_main_step_adds_children() {
    let (engine, fx) = setup(&[("A", None)], &[]);
    let source = StaticBreakdown::steps(&["Find sources", "Take notes"]);

    let steps = engine
        .deep_dive(&owner(), fx.id("A"), "Where do I start?", &source)
        .await
        .unwrap();
    assert_eq!(steps.len(), 2);

    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(
        edge_names(&graph),
        edges(&[("A", "Find sources"), ("Find sources", "Take notes")])
    );
    assert_eq!(parent_name(&graph, "Take notes").as_deref(), Some("A"));

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].assignment_title, "Research essay");
    assert_eq!(requests[0].step_content, "A");
    assert_eq!(requests[0].question, "Where do I start?");
}

#[tokio::test]
async fn test_deep_dive_on_sub_step_adds_siblings_from_wrapped_reply() {
    let (engine, fx) = setup(
        &[("A", None), ("A1", Some("A")), ("A2", Some("A"))],
        &[("A", "A1"), ("A1", "A2")],
    );
    let source = StaticBreakdown::new(
        "Here is your plan:\n{\"new_steps\": [{\"content\": \"X\"}, {\"content\": \"\"}, {\"content\": \"Y\"}]}\nThanks!",
    );

    engine.deep_dive(&owner(), fx.id("A1"), "", &source).await.unwrap();

    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(
        edge_names(&graph),
        edges(&[("A", "A1"), ("A1", "X"), ("X", "Y"), ("Y", "A2")])
    );
    assert!(check(&graph).is_empty());
}

#[tokio::test]
async fn test_deep_dive_respects_step_cap() {
    let store = memory_store();
    let fx = GraphFixture::build(&*store, &owner(), &[("A", None)], &[]).unwrap();
    let config = config_from_toml("[deep_dive]\nmax_steps = 2\n");
    let engine = WorkflowEngine::new(Arc::clone(&store), &config);
    let source = StaticBreakdown::steps(&["one", "two", "three", "four"]);

    let steps = engine.deep_dive(&owner(), fx.id("A"), "", &source).await.unwrap();
    let contents: Vec<_> = steps.iter().map(|s| s.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two"]);
}

#[tokio::test]
async fn test_unusable_reply_changes_nothing() {
    let (engine, fx) = setup(&[("A", None)], &[]);

    let err = engine
        .deep_dive(&owner(), fx.id("A"), "", &StaticBreakdown::new("Sorry, I can't."))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Breakdown(_)));

    let err = engine
        .deep_dive(&owner(), fx.id("A"), "", &StaticBreakdown::new(r#"{"new_steps": []}"#))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Breakdown(_)));

    let err = engine
        .deep_dive(&owner(), fx.id("A"), "", &FailingBreakdown)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Breakdown(_)));

    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(graph.steps.len(), 1);
}

#[tokio::test]
async fn test_non_owner_never_reaches_the_source() {
    let (engine, fx) = setup(&[("A", None)], &[]);
    let source = StaticBreakdown::steps(&["X"]);

    let err = engine
        .deep_dive(&stranger(), fx.id("A"), "", &source)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::NotAuthorized { .. }));
    assert!(source.requests().is_empty());
}

#[tokio::test]
async fn test_assignment_stays_writable_while_breakdown_pending() {
    let (engine, fx) = setup(&[("A", None), ("B", None)], &[("A", "B")]);
    let engine = Arc::new(engine);
    let source = Arc::new(GatedBreakdown::new(&["X"]));

    let task = {
        let engine = Arc::clone(&engine);
        let source = Arc::clone(&source);
        let step = fx.id("A");
        tokio::spawn(async move { engine.deep_dive(&owner(), step, "", &*source).await })
    };
    source.wait_entered().await;

    let placement = Placement::NewMainStep {
        reference: fx.id("A"),
    };
    let inserted = tokio::time::timeout(
        Duration::from_secs(2),
        engine.insert(&owner(), fx.assignment, "C", placement),
    )
    .await
    .expect("insert must not wait for the breakdown");
    assert!(inserted.is_ok());

    source.release();
    let steps = task.await.unwrap().unwrap();
    assert_eq!(steps.len(), 1);

    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(
        edge_names(&graph),
        edges(&[("A", "C"), ("C", "B"), ("A", "X")])
    );
    assert!(check(&graph).is_empty());
}

#[tokio::test]
async fn test_step_deleted_during_breakdown() {
    let (engine, fx) = setup(&[("A", None), ("B", None)], &[("A", "B")]);
    let engine = Arc::new(engine);
    let source = Arc::new(GatedBreakdown::new(&["X"]));

    let task = {
        let engine = Arc::clone(&engine);
        let source = Arc::clone(&source);
        let step = fx.id("B");
        tokio::spawn(async move { engine.deep_dive(&owner(), step, "", &*source).await })
    };
    source.wait_entered().await;

    engine.delete(&owner(), fx.id("B")).await.unwrap();
    source.release();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, FlowError::StepNotFound(_)));
    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(graph.steps.len(), 1);
}
