use std::sync::Arc;

use crate::events::FetchEventPayload;
use crate::task::{FetchTask, WorkItem};
use crate::telemetry;

use super::supervisor::Shared;

/// Counts a worker as live from creation until dropped.
///
/// Created before the task is spawned and moved into the worker future, so
/// the count is released even when the task is aborted before its first
/// poll.
pub(crate) struct LiveWorker(Arc<Shared>);

impl LiveWorker {
    pub(crate) fn enter(shared: Arc<Shared>) -> Self {
        shared.worker_started();
        Self(shared)
    }
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.worker_exited();
    }
}

/// Body of one pool worker: dequeue, run, enqueue children, repeat until a
/// poison pill arrives.
pub(crate) async fn worker_loop(worker_id: String, live: LiveWorker) {
    let shared = &live.0;
    tracing::debug!(worker_id = %worker_id, "fetch worker started");

    loop {
        let item = shared.queue.dequeue().await;
        telemetry::set_queue_depth(shared.queue.len());

        match item {
            WorkItem::PoisonPill => {
                tracing::debug!(worker_id = %worker_id, "poison pill received; worker exiting");
                shared
                    .events
                    .publish(FetchEventPayload::WorkerStopped { worker_id });
                break;
            }
            WorkItem::Fetch(task) => run_one(&worker_id, shared, task).await,
        }
    }
}

async fn run_one(worker_id: &str, shared: &Shared, task: FetchTask) {
    shared.events.publish(FetchEventPayload::Started {
        seq_id: task.id.clone(),
        priority: task.priority,
        worker_id: worker_id.to_string(),
    });

    let timing = telemetry::record_task_start(task.id.as_str());
    let mut children = Vec::new();
    let outcome = telemetry::instrument_task(
        worker_id,
        task.id.as_str(),
        task.priority.0,
        task.run(shared.store.as_ref(), &mut children),
    )
    .await;

    // children found before a failure are still worth fetching
    let child_count = children.len();
    telemetry::record_children(child_count);
    for child in children {
        shared.submit_child(child);
    }

    let status = match outcome {
        Ok(()) => {
            tracing::debug!(
                worker_id,
                seq_id = %task.id,
                children = child_count,
                "fetch task completed"
            );
            shared.events.publish(FetchEventPayload::Completed {
                seq_id: task.id.clone(),
                children: child_count,
                worker_id: worker_id.to_string(),
            });
            "completed"
        }
        Err(err) => {
            tracing::warn!(
                worker_id,
                seq_id = %task.id,
                error = %format!("{err:#}"),
                "fetch task failed"
            );
            shared.events.publish(FetchEventPayload::Failed {
                seq_id: task.id.clone(),
                error: format!("{err:#}"),
                worker_id: worker_id.to_string(),
            });
            "failed"
        }
    };

    telemetry::record_task_finished(task.policy.to_string(), status);
    telemetry::record_task_end(timing, status);
}
