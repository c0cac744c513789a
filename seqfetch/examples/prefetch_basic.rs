//! Basic prefetch example with the in-memory store.
//!
//! Builds a small assembly, queues it recursively, prints the events the
//! workers publish, and shuts the pool down.

use std::sync::Arc;

use seqfetch::*;

fn assembly() -> InMemoryDataStore {
    let store = InMemoryDataStore::new();
    let mut scaffold = SeqRecord::new("NT_000001", 3_000).with_synonym("scaffold-1");
    for n in 0..3 {
        let start = n * 1_000;
        let contig = format!("AC_00000{n}");
        scaffold = scaffold
            .with_feature(
                Feature::new(FeatureKind::CodingRegion, start + 10, start + 900)
                    .with_product(format!("NP_00000{n}")),
            )
            .with_segment(MapSegment::reference(start, start + 1_000, contig.as_str()));
        store.insert(SeqRecord::new(contig, 1_000));
        store.insert(SeqRecord::new(format!("NP_00000{n}"), 300));
    }
    store.insert(scaffold);
    store
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(assembly());
    let queue = FetchQueueBuilder::new()
        .with_workers(2)
        .with_store(store.clone())
        .build()?;

    let mut events = queue.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[EVENT] {:?}", event.payload);
            if matches!(event.payload, FetchEventPayload::Terminated) {
                break;
            }
        }
    });

    queue
        .add_with_priority(
            "scaffold-1",
            RetrievalPolicy::CORE_FEATURES | RetrievalPolicy::PRODUCTS | RetrievalPolicy::RECURSIVE,
            FetchPriority(10),
        )
        .await;
    println!("[MAIN] pending after add: {}", queue.pending());

    queue.finish().await;
    printer.await?;

    for id in ["NT_000001", "AC_000000", "NP_000002"] {
        println!("[MAIN] {id} resolved: {}", store.is_resolved(&SeqId::new(id)));
    }
    Ok(())
}
