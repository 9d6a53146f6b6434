//! Concurrent callers against one engine. These check the end state only;
//! lock ordering itself is covered by the unit tests in `locks.rs`.

use std::sync::Arc;

use futures::future::join_all;

use flowde_core::types::{Placement, StepId};
use flowde_graph::{check, Outline, WorkflowEngine};
use flowde_test_utils::{memory_store, owner, temp_store, test_config, GraphFixture};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_after_same_reference_form_one_path() {
    let store = memory_store();
    let fx = GraphFixture::build(
        &*store,
        &owner(),
        &[("A", None), ("A1", Some("A")), ("B", None)],
        &[("A", "A1"), ("A", "B")],
    )
    .unwrap();
    let engine = Arc::new(WorkflowEngine::new(Arc::clone(&store), &test_config()));
    let reference = fx.id("A");

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let assignment = fx.assignment;
            let placement = Placement::After { reference };
            tokio::spawn(async move {
                engine
                    .insert(&owner(), assignment, &format!("t{}", i), placement)
                    .await
            })
        })
        .collect();
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
    assert_eq!(graph.steps.len(), 3 + 16);
    assert!(check(&graph).is_empty(), "{:?}", check(&graph));

    // One edge from A into its children, one into the main sequence.
    let into_children = graph
        .outgoing(reference)
        .filter(|c| graph.step(c.to_step).is_some_and(|s| s.is_child_of(reference)))
        .count();
    assert_eq!(into_children, 1);

    // The children form one path from A ending at the original first child.
    let mut cursor = reference;
    let mut visited = 0;
    loop {
        let next: Vec<StepId> = graph
            .outgoing(cursor)
            .map(|c| c.to_step)
            .filter(|to| graph.step(*to).is_some_and(|s| s.is_child_of(reference)))
            .collect();
        match next.as_slice() {
            [] => break,
            [only] => {
                cursor = *only;
                visited += 1;
            }
            many => panic!("step {} branches into {:?}", cursor, many),
        }
    }
    assert_eq!(visited, 17);
    assert_eq!(cursor, fx.id("A1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deletes_and_inserts_stay_consistent() {
    let (_dir, store) = temp_store();
    let engine = Arc::new(WorkflowEngine::new(Arc::new(store), &test_config()));
    let outline = Outline::parse(
        r#"{"title": "Thesis", "steps": [
            {"content": "Read", "substeps": [{"content": "r1"}, {"content": "r2"}, {"content": "r3"}]},
            {"content": "Write", "substeps": [{"content": "w1"}, {"content": "w2"}]}
        ]}"#,
    )
    .unwrap();
    let graph = engine.create_assignment(&owner(), &outline).await.unwrap();
    let id = graph.assignment.id;
    let step = |name: &str| graph.step_by_content(name).unwrap().id;

    let deletes = ["r2", "w1"].map(|name| {
        let engine = Arc::clone(&engine);
        let target = step(name);
        tokio::spawn(async move { engine.delete(&owner(), target).await.map(|_| ()) })
    });
    let inserts = ["r1", "r3", "w2"].map(|name| {
        let engine = Arc::clone(&engine);
        let reference = step(name);
        tokio::spawn(async move {
            engine
                .insert_chain(&owner(), id, reference, None, &["x".to_string(), "y".to_string()])
                .await
                .map(|_| ())
        })
    });
    for handle in deletes.into_iter().chain(inserts) {
        handle.await.unwrap().unwrap();
    }

    let after = engine.assignment_graph(&owner(), id).await.unwrap();
    assert_eq!(after.steps.len(), 7 - 2 + 6);
    assert!(check(&after).is_empty(), "{:?}", check(&after));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_across_assignments_stay_separate() {
    let store = memory_store();
    let engine = Arc::new(WorkflowEngine::new(Arc::clone(&store), &test_config()));

    let mut fixtures = Vec::new();
    for _ in 0..4 {
        fixtures.push(GraphFixture::build(&*store, &owner(), &[("A", None)], &[]).unwrap());
    }

    let tasks: Vec<_> = fixtures
        .iter()
        .flat_map(|fx| {
            let assignment = fx.assignment;
            let reference = fx.id("A");
            let engine = Arc::clone(&engine);
            (0..5).map(move |i| {
                let engine = Arc::clone(&engine);
                let placement = Placement::After { reference };
                tokio::spawn(async move {
                    engine
                        .insert(&owner(), assignment, &format!("n{}", i), placement)
                        .await
                })
            })
        })
        .collect();
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    for fx in &fixtures {
        let graph = engine.assignment_graph(&owner(), fx.assignment).await.unwrap();
        assert_eq!(graph.steps.len(), 6);
        assert!(check(&graph).is_empty());
    }
}
