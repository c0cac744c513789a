//! Scheduler integration tests.
//!
//! Drives a real [`FetchQueue`] against a recording store and checks the
//! store calls and events each policy produces, priority ordering,
//! backpressure, and the shutdown paths.

use std::sync::Arc;
use std::time::Duration;

use seqfetch::*;
use seqfetch_testkit::{
    RecordingDataStore, StoreCall, annotated, component_id, scaffold, store_with_leaves,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn build_queue(store: &RecordingDataStore, config: FetchQueueConfig) -> FetchQueue {
    FetchQueueBuilder::new()
        .with_config(config)
        .with_store(Arc::new(store.clone()))
        .build()
        .expect("fetch queue should build")
}

/// Collect events up to and including the first one matching `pred`.
async fn collect_until<F>(rx: &mut broadcast::Receiver<FetchEvent>, mut pred: F) -> Vec<FetchEvent>
where
    F: FnMut(&FetchEventPayload) -> bool,
{
    let mut seen = Vec::new();
    timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let done = pred(&event.payload);
                    seen.push(event);
                    if done {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => panic!("subscriber lagged by {skipped}"),
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event");
    seen
}

fn is_completed(payload: &FetchEventPayload, id: &str) -> bool {
    matches!(payload, FetchEventPayload::Completed { seq_id, .. } if seq_id.as_str() == id)
}

fn is_started(payload: &FetchEventPayload, id: &str) -> bool {
    matches!(payload, FetchEventPayload::Started { seq_id, .. } if seq_id.as_str() == id)
}

fn enqueued_children(events: &[FetchEvent], parent: &str) -> Vec<(SeqId, RetrievalPolicy, FetchPriority)> {
    events
        .iter()
        .filter_map(|event| match &event.payload {
            FetchEventPayload::Enqueued {
                seq_id,
                policy,
                priority,
            } if seq_id.as_str() != parent => Some((seq_id.clone(), *policy, *priority)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn features_and_recursive_walk_enqueue_each_component() {
    let record = SeqRecord::new("seqA", 300)
        .with_feature(Feature::new(FeatureKind::Gene, 10, 50))
        .with_feature(Feature::new(FeatureKind::Mrna, 60, 90))
        .with_segment(MapSegment::reference(0, 100, "contig1"))
        .with_segment(MapSegment::reference(100, 200, "contig2"))
        .with_segment(MapSegment::reference(200, 300, "contig3"));
    let store = RecordingDataStore::new(InMemoryDataStore::new().with_record(record));
    let queue = build_queue(&store, FetchQueueConfig::default());
    let mut events = queue.subscribe();

    let policy = RetrievalPolicy::FEATURES | RetrievalPolicy::RECURSIVE;
    queue.add_with_priority("seqA", policy, FetchPriority(10)).await;

    let seen = collect_until(&mut events, |p| is_completed(p, "seqA")).await;
    let children = enqueued_children(&seen, "seqA");
    assert_eq!(children.len(), 3);
    for (n, (id, child_policy, priority)) in children.iter().enumerate() {
        assert_eq!(id.as_str(), format!("contig{}", n + 1));
        assert_eq!(*child_policy, policy);
        assert_eq!(*priority, FetchPriority(9));
    }

    let calls = store.calls_for("seqA");
    let count = |f: fn(&StoreCall) -> bool| calls.iter().filter(|c| f(c)).count();
    assert_eq!(count(|c| matches!(c, StoreCall::ResolveHandle { .. })), 1);
    assert_eq!(count(|c| matches!(c, StoreCall::Features { .. })), 1);
    assert_eq!(count(|c| matches!(c, StoreCall::ReferenceMap { start: None, .. })), 1);
    assert_eq!(count(|c| matches!(c, StoreCall::LoadWholeRecord { .. })), 0);

    queue.finish().await;
}

#[tokio::test]
async fn whole_record_policy_ignores_range() {
    let store = RecordingDataStore::new(store_with_leaves(vec![scaffold("S", 3, 100)]));
    let queue = build_queue(&store, FetchQueueConfig::default());
    let mut events = queue.subscribe();

    queue
        .add_range("S", SeqRange::interval(10, 20), RetrievalPolicy::ALL, FetchPriority(7))
        .await;
    collect_until(&mut events, |p| is_completed(p, "S")).await;

    assert_eq!(
        store.calls_for("S"),
        vec![
            StoreCall::ResolveHandle { id: SeqId::new("S") },
            StoreCall::ResolveAllIds { id: SeqId::new("S") },
            StoreCall::LoadWholeRecord { id: SeqId::new("S") },
        ]
    );
    assert!(store.inner().is_loaded(&SeqId::new("S")));

    queue.finish().await;
}

#[tokio::test]
async fn products_fan_out_one_child_per_product() {
    let store = RecordingDataStore::new(store_with_leaves(vec![annotated("NM", 4)]));
    let queue = build_queue(&store, FetchQueueConfig::default());
    let mut events = queue.subscribe();

    let policy = RetrievalPolicy::CORE_FEATURES | RetrievalPolicy::PRODUCTS;
    queue.add_with_priority("NM", policy, FetchPriority(5)).await;

    let mut completed = 0;
    let seen = collect_until(&mut events, |p| {
        if matches!(p, FetchEventPayload::Completed { .. }) {
            completed += 1;
        }
        completed == 5
    })
    .await;

    let children = enqueued_children(&seen, "NM");
    assert_eq!(children.len(), 4);
    assert!(children.iter().all(|(_, _, priority)| *priority == FetchPriority(4)));

    let product_queries = store.count(|c| {
        matches!(
            c,
            StoreCall::Features {
                depth: ResolveDepth::None,
                ..
            }
        )
    });
    // the parent and each product task run the products query once
    assert_eq!(product_queries, 5);

    queue.finish().await;
}

#[tokio::test]
async fn ranged_walk_stops_past_range_end() {
    let store = RecordingDataStore::new(store_with_leaves(vec![scaffold("S", 4, 100)]));
    let queue = build_queue(&store, FetchQueueConfig::default());
    let mut events = queue.subscribe();

    queue
        .add_range(
            "S",
            SeqRange::interval(150, 250),
            RetrievalPolicy::RECURSIVE,
            FetchPriority(20),
        )
        .await;

    let seen = collect_until(&mut events, |p| is_completed(p, "S")).await;
    let children = enqueued_children(&seen, "S");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].0.as_str(), component_id("S", 1));

    assert!(store.calls_for("S").contains(&StoreCall::ReferenceMap {
        id: SeqId::new("S"),
        start: Some(150),
    }));

    queue.finish().await;
}

#[tokio::test]
async fn child_priority_floors_at_zero() {
    let store = RecordingDataStore::new(store_with_leaves(vec![scaffold("S", 2, 50)]));
    let queue = build_queue(&store, FetchQueueConfig::default());
    let mut events = queue.subscribe();

    queue
        .add_with_priority("S", RetrievalPolicy::RECURSIVE, FetchPriority::MIN)
        .await;

    let seen = collect_until(&mut events, |p| is_completed(p, "S")).await;
    let children = enqueued_children(&seen, "S");
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|(_, _, priority)| *priority == FetchPriority::MIN));

    queue.finish().await;
}

#[tokio::test]
async fn higher_priority_runs_first() {
    let store = RecordingDataStore::new(InMemoryDataStore::new());
    let queue = build_queue(&store, FetchQueueConfig::default().with_workers(1));
    let mut events = queue.subscribe();

    store.hold();
    queue.add("blocker", RetrievalPolicy::ALL).await;
    collect_until(&mut events, |p| is_started(p, "blocker")).await;

    queue.add_with_priority("low", RetrievalPolicy::ALL, FetchPriority(1)).await;
    queue.add_with_priority("high-a", RetrievalPolicy::ALL, FetchPriority(200)).await;
    queue.add_with_priority("mid", RetrievalPolicy::ALL, FetchPriority(50)).await;
    queue.add_with_priority("high-b", RetrievalPolicy::ALL, FetchPriority(200)).await;
    assert_eq!(queue.pending(), 4);
    store.release();

    let mut started = Vec::new();
    collect_until(&mut events, |p| {
        if let FetchEventPayload::Started { seq_id, .. } = p {
            started.push(seq_id.to_string());
        }
        started.len() == 4
    })
    .await;
    assert_eq!(started, vec!["high-a", "high-b", "mid", "low"]);

    queue.finish().await;
}

#[tokio::test]
async fn add_waits_while_queue_is_full() {
    let store = RecordingDataStore::new(InMemoryDataStore::new());
    let queue = Arc::new(build_queue(
        &store,
        FetchQueueConfig::default().with_workers(1).with_capacity(2),
    ));
    let mut events = queue.subscribe();

    store.hold();
    queue.add("running", RetrievalPolicy::ALL).await;
    collect_until(&mut events, |p| is_started(p, "running")).await;

    queue.add("a", RetrievalPolicy::ALL).await;
    queue.add("b", RetrievalPolicy::ALL).await;
    assert!(queue.is_full());

    let blocked = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.add("c", RetrievalPolicy::ALL).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!blocked.is_finished(), "add should wait for a free slot");

    // a waiting add has not been announced yet
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(&event.payload, FetchEventPayload::Enqueued { seq_id, .. } if seq_id.as_str() == "c"),
            "c announced before it was queued"
        );
    }

    store.release();
    timeout(WAIT, blocked)
        .await
        .expect("add did not complete after release")
        .expect("add task panicked");
    collect_until(&mut events, |p| {
        matches!(p, FetchEventPayload::Enqueued { seq_id, .. } if seq_id.as_str() == "c")
    })
    .await;

    queue.finish().await;
}

#[tokio::test]
async fn store_failure_is_absorbed() {
    let store = RecordingDataStore::new(store_with_leaves(vec![annotated("good", 0)]));
    store.fail_on("bad");
    let queue = build_queue(&store, FetchQueueConfig::default().with_workers(1));
    let mut events = queue.subscribe();

    queue.add("bad", RetrievalPolicy::FEATURES).await;
    queue.add("good", RetrievalPolicy::FEATURES).await;

    let seen = collect_until(&mut events, |p| is_completed(p, "good")).await;
    let failure = seen.iter().find_map(|event| match &event.payload {
        FetchEventPayload::Failed { seq_id, error, .. } if seq_id.as_str() == "bad" => {
            Some(error.clone())
        }
        _ => None,
    });
    let error = failure.expect("bad task should report a failure");
    assert!(error.contains("injected failure"));

    // no further store calls once resolution failed
    assert_eq!(store.calls_for("bad").len(), 1);
    assert_eq!(queue.state(), FetchQueueState::Running);

    queue.finish().await;
}

#[tokio::test]
async fn finish_stops_every_worker() {
    let store = RecordingDataStore::new(store_with_leaves(vec![scaffold("S", 5, 10)]));
    let queue = build_queue(&store, FetchQueueConfig::default().with_workers(4));
    let mut events = queue.subscribe();

    queue.add("S", RetrievalPolicy::RECURSIVE).await;
    timeout(WAIT, queue.finish())
        .await
        .expect("finish did not complete");

    assert_eq!(queue.state(), FetchQueueState::Terminated);
    assert_eq!(queue.live_workers(), 0);
    assert!(queue.is_empty());

    collect_until(&mut events, |p| matches!(p, FetchEventPayload::Terminated)).await;
}

#[tokio::test]
async fn adds_after_finish_are_dropped() {
    let store = RecordingDataStore::new(InMemoryDataStore::new());
    let queue = build_queue(&store, FetchQueueConfig::default());
    queue.finish().await;
    let mut events = queue.subscribe();

    queue.add("late", RetrievalPolicy::ALL).await;

    assert_eq!(queue.pending(), 0);
    assert!(queue.is_shutting_down());
    assert_eq!(store.resolve_count(), 0);

    let seen = collect_until(&mut events, |p| matches!(p, FetchEventPayload::Dropped { .. })).await;
    assert!(matches!(
        seen.last().map(|e| &e.payload),
        Some(FetchEventPayload::Dropped {
            reason: DropReason::ShuttingDown,
            ..
        })
    ));
}

#[tokio::test]
async fn clear_discards_pending_work() {
    let store = RecordingDataStore::new(InMemoryDataStore::new());
    let queue = Arc::new(build_queue(&store, FetchQueueConfig::default().with_workers(1)));
    let mut events = queue.subscribe();

    store.hold();
    queue.add("running", RetrievalPolicy::ALL).await;
    collect_until(&mut events, |p| is_started(p, "running")).await;
    queue
        .add_many(["p1", "p2", "p3"], RetrievalPolicy::ALL, FetchPriority(3))
        .await;
    assert_eq!(queue.pending(), 3);

    let clearing = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.clear().await }
    });

    let seen = collect_until(&mut events, |p| matches!(p, FetchEventPayload::Cleared { .. })).await;
    assert!(matches!(
        seen.last().map(|e| &e.payload),
        Some(FetchEventPayload::Cleared { discarded: 3 })
    ));
    assert!(queue.is_shutting_down());

    store.release();
    timeout(WAIT, clearing)
        .await
        .expect("clear did not complete")
        .expect("clear task panicked");

    assert_eq!(queue.live_workers(), 0);
    assert_eq!(store.resolve_count(), 1, "discarded tasks must never run");
}

#[tokio::test]
async fn dedupe_skips_repeated_components() {
    // two scaffolds sharing the same components
    let shared = scaffold("S", 3, 100);
    let twin = shared
        .segments
        .iter()
        .cloned()
        .fold(SeqRecord::new("T", 300), SeqRecord::with_segment);
    let store = RecordingDataStore::new(store_with_leaves(vec![shared, twin]));
    let queue = build_queue(
        &store,
        FetchQueueConfig::default().with_workers(1).with_dedupe(true),
    );
    let mut events = queue.subscribe();

    queue.add("S", RetrievalPolicy::RECURSIVE).await;
    queue.add("T", RetrievalPolicy::RECURSIVE).await;

    // S, T and the three shared components
    let mut completed = 0;
    let seen = collect_until(&mut events, |p| {
        if matches!(p, FetchEventPayload::Completed { .. }) {
            completed += 1;
        }
        completed == 5
    })
    .await;
    queue.finish().await;

    let duplicates = seen
        .iter()
        .filter(|event| {
            matches!(
                event.payload,
                FetchEventPayload::Dropped {
                    reason: DropReason::Duplicate,
                    ..
                }
            )
        })
        .count();
    assert_eq!(duplicates, 3);

    for n in 0..3 {
        let id = component_id("S", n);
        assert_eq!(
            store.count(|c| matches!(c, StoreCall::ResolveHandle { id: call_id } if call_id.as_str() == id)),
            1,
            "{id} should be fetched once"
        );
    }
}

fn feature_calls(store: &RecordingDataStore, id: &str) -> Vec<StoreCall> {
    store
        .calls_for(id)
        .into_iter()
        .filter(|call| matches!(call, StoreCall::Features { .. }))
        .collect()
}

#[tokio::test]
async fn core_features_queries_core_kinds_only() {
    let store = RecordingDataStore::new(store_with_leaves(vec![scaffold("S", 2, 100)]));
    let queue = build_queue(&store, FetchQueueConfig::default());
    let mut events = queue.subscribe();

    queue.add("S", RetrievalPolicy::CORE_FEATURES).await;
    collect_until(&mut events, |p| is_completed(p, "S")).await;

    assert_eq!(
        feature_calls(&store, "S"),
        vec![StoreCall::Features {
            id: SeqId::new("S"),
            range: SeqRange::Whole,
            kinds: Some(FeatureKind::CORE.to_vec()),
            depth: ResolveDepth::Adaptive,
            exclude_external: true,
        }]
    );

    queue.finish().await;
}

#[tokio::test]
async fn features_wins_over_core_features() {
    let store = RecordingDataStore::new(store_with_leaves(vec![scaffold("S", 2, 100)]));
    let queue = build_queue(&store, FetchQueueConfig::default());
    let mut events = queue.subscribe();

    queue
        .add("S", RetrievalPolicy::FEATURES | RetrievalPolicy::CORE_FEATURES)
        .await;
    collect_until(&mut events, |p| is_completed(p, "S")).await;

    assert_eq!(
        feature_calls(&store, "S"),
        vec![StoreCall::Features {
            id: SeqId::new("S"),
            range: SeqRange::Whole,
            kinds: None,
            depth: ResolveDepth::Adaptive,
            exclude_external: true,
        }]
    );

    queue.finish().await;
}

#[tokio::test]
async fn ranged_features_query_keeps_sub_range() {
    let store = RecordingDataStore::new(store_with_leaves(vec![scaffold("S", 4, 100)]));
    let queue = build_queue(&store, FetchQueueConfig::default());
    let mut events = queue.subscribe();

    queue
        .add_range(
            "S",
            SeqRange::interval(100, 200),
            RetrievalPolicy::FEATURES,
            FetchPriority(30),
        )
        .await;
    collect_until(&mut events, |p| is_completed(p, "S")).await;

    let calls = feature_calls(&store, "S");
    assert_eq!(calls.len(), 1);
    assert!(matches!(
        &calls[0],
        StoreCall::Features {
            range: SeqRange::Interval { from: 100, to: 200 },
            kinds: None,
            ..
        }
    ));

    queue.finish().await;
}
