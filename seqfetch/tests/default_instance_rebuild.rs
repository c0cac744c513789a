//! The shared queue outlives the runtime that built it; its own binary keeps
//! the static away from `default_instance.rs`.

use std::sync::Arc;
use std::time::Duration;

use seqfetch::*;
use tokio::time::timeout;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build")
}

#[test]
fn instance_is_rebuilt_after_its_runtime_is_gone() {
    let first_rt = runtime();
    let first = first_rt.block_on(async { instance().expect("instance") });
    assert_eq!(first.live_workers(), first.worker_count());
    drop(first_rt);

    // workers died with the runtime
    assert_eq!(first.live_workers(), 0);
    assert_eq!(first.state(), FetchQueueState::Running);

    let second_rt = runtime();
    second_rt.block_on(async {
        let second = instance().expect("instance on the new runtime");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.live_workers(), second.worker_count());
        assert!(Arc::ptr_eq(&second, &instance().expect("instance")));

        let mut events = second.subscribe();
        second.add("leaf", RetrievalPolicy::FEATURES).await;
        // the empty default store fails the lookup, which still proves a worker ran it
        timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.expect("event bus closed");
                if matches!(
                    event.payload,
                    FetchEventPayload::Failed { .. } | FetchEventPayload::Completed { .. }
                ) {
                    break;
                }
            }
        })
        .await
        .expect("no worker picked up the task");

        reset_instance().await;
        assert_eq!(second.state(), FetchQueueState::Terminated);
    });
}
