use split_jobs::JobError;
use tracing::instrument;
use types::WorkerResponse;

use crate::AppContext;

/// Probes a source video in place through a presigned URL, so only the
/// bytes ffprobe asks for are transferred.
#[instrument(skip(context))]
pub async fn extract_metadata(
    context: &AppContext,
    source_reference: &str,
) -> WorkerResponse {
    match probe_source(context, source_reference).await {
        Ok(metadata) => WorkerResponse::Metadata { metadata },
        Err(e) => {
            tracing::warn!("could not extract metadata: {e}");
            WorkerResponse::Error {
                error: e.kind().to_string(),
                message: e.to_string(),
            }
        }
    }
}

async fn probe_source(
    context: &AppContext,
    source_reference: &str,
) -> Result<types::MediaMetadata, JobError> {
    if context.sources.describe(source_reference).await?.is_none() {
        return Err(JobError::NotFound(format!("source {source_reference}")));
    }

    let url = context
        .sources
        .presign_download(source_reference, context.probe_url_ttl)
        .await?;

    context
        .media
        .probe(&url)
        .await
        .map_err(|e| JobError::WorkerProcessingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::media::FakeMedia;
    use pretty_assertions::assert_eq;
    use split_jobs::memory::{InMemoryJobStore, InMemoryObjectStore};

    fn context(sources: Arc<InMemoryObjectStore>) -> AppContext {
        AppContext {
            jobs: Arc::new(InMemoryJobStore::new()),
            sources,
            outputs: Arc::new(InMemoryObjectStore::new()),
            media: Arc::new(FakeMedia {
                duration: 1204.181,
                failing: Vec::new(),
            }),
            output_prefix: "jobs".to_string(),
            probe_url_ttl: Duration::from_secs(600),
        }
    }

    #[tokio::test]
    async fn test_existing_source_metadata_is_extracted() {
        let sources = Arc::new(InMemoryObjectStore::new());
        sources.put("uploads/stream.mkv", 4096, Default::default());

        let response = extract_metadata(&context(sources), "uploads/stream.mkv").await;

        let WorkerResponse::Metadata { metadata } = response else {
            panic!("expected metadata, got {response:?}");
        };
        assert_eq!(metadata.duration, 1204.181);
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let response = extract_metadata(
            &context(Arc::new(InMemoryObjectStore::new())),
            "uploads/missing.mkv",
        )
        .await;

        assert_eq!(
            response,
            WorkerResponse::Error {
                error: "NotFound".to_string(),
                message: "source uploads/missing.mkv not found".to_string(),
            }
        );
    }
}
