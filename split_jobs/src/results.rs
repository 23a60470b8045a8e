use std::sync::Arc;

use tokio::task::JoinSet;
use types::{
    SegmentResult,
    naming::{parse_segment_index, segment_result_from_metadata},
};

use crate::{
    error::StorageError,
    storage::{ObjectStore, StoredObject},
};

/// Keeps only the objects that follow the segment naming convention.
pub(crate) fn segment_objects(objects: Vec<StoredObject>) -> Vec<StoredObject> {
    objects
        .into_iter()
        .filter(|object| {
            let filename = object.key.rsplit('/').next().unwrap_or(&object.key);
            parse_segment_index(filename).is_some()
        })
        .collect()
}

/// Reads the metadata of every listed segment and rebuilds its result.
///
/// Segments that vanished or carry no boundary metadata are left out, so
/// the returned list can be shorter than `objects`. Results are ordered by
/// segment index.
///
/// # Errors
/// Returns the first storage error hit while reading metadata.
pub async fn describe_segments(
    store: &Arc<dyn ObjectStore>,
    objects: &[StoredObject],
) -> Result<Vec<SegmentResult>, StorageError> {
    let mut tasks = JoinSet::new();

    for object in objects {
        let store = Arc::clone(store);
        let key = object.key.clone();
        tasks.spawn(async move { store.describe(&key).await });
    }

    let mut results = Vec::with_capacity(objects.len());

    while let Some(joined) = tasks.join_next().await {
        let details = joined
            .map_err(|e| StorageError::Transient(format!("describe task failed: {e}")))??;

        let Some(details) = details else {
            continue;
        };

        match segment_result_from_metadata(
            &details.key,
            &details.metadata,
            details.size_bytes,
        ) {
            Some(result) => results.push(result),
            None => {
                tracing::warn!(key = %details.key, "segment has no boundary metadata");
            }
        }
    }

    results.sort_by_key(|result| result.index);

    Ok(results)
}
