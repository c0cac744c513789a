use seqfetch::*;

/// Assembled sequence of `components` adjacent pieces, each a reference to
/// `{id}.{n}`, with one gene per component.
pub fn scaffold(id: &str, components: usize, component_len: u64) -> SeqRecord {
    let mut record = SeqRecord::new(id, components as u64 * component_len);
    for n in 0..components {
        let start = n as u64 * component_len;
        let end = start + component_len;
        record = record
            .with_feature(Feature::new(FeatureKind::Gene, start, end))
            .with_segment(MapSegment::reference(start, end, component_id(id, n)));
    }
    record
}

/// Identifier of the `n`th component of a [`scaffold`].
pub fn component_id(id: &str, n: usize) -> String {
    format!("{id}.{n}")
}

/// Plain record with `products` coding regions, each carrying a product
/// named `{id}.p{n}`.
pub fn annotated(id: &str, products: usize) -> SeqRecord {
    let mut record = SeqRecord::new(id, 1000);
    for n in 0..products {
        let start = n as u64 * 10;
        record = record.with_feature(
            Feature::new(FeatureKind::CodingRegion, start, start + 9)
                .with_product(format!("{id}.p{n}")),
        );
    }
    record
}

/// Store holding `records` plus a leaf record for every component and
/// product they reference, so child tasks resolve.
pub fn store_with_leaves(records: Vec<SeqRecord>) -> InMemoryDataStore {
    let store = InMemoryDataStore::new();
    for record in records {
        let leaves: Vec<SeqId> = record
            .segments
            .iter()
            .filter_map(|segment| segment.reference.clone())
            .chain(
                record
                    .features
                    .iter()
                    .filter_map(|feature| feature.product.clone()),
            )
            .collect();
        for leaf in leaves {
            store.insert(SeqRecord::new(leaf, 100));
        }
        store.insert(record);
    }
    store
}
