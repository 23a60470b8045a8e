use std::{collections::HashMap, path::Path, time::Duration};

use async_trait::async_trait;
use aws_sdk_s3::{
    error::DisplayErrorContext,
    operation::head_object::HeadObjectError,
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{Delete, ObjectIdentifier},
};
use tracing::instrument;

use crate::{
    error::StorageError,
    storage::{ObjectDetails, ObjectStore, StoredObject},
};

/// Largest batch a single `DeleteObjects` call accepts.
const DELETE_BATCH: usize = 1000;

/// Upper bound on keys removed by one prefix cleanup.
const MAX_DELETED_OBJECTS: usize = 100_000;

/// One S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Bucket {
    client: aws_sdk_s3::Client,
    bucket: String,
}

fn transient(error: impl std::error::Error) -> StorageError {
    StorageError::Transient(DisplayErrorContext(error).to_string())
}

impl S3Bucket {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Bucket {
    async fn list(
        &self,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<StoredObject>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(ref token) = continuation_token {
                request = request.continuation_token(token);
            }

            let list_output = request.send().await.map_err(transient)?;

            for object in list_output.contents() {
                if let Some(key) = object.key() {
                    objects.push(StoredObject {
                        key: key.to_string(),
                        size_bytes: object.size(),
                    });
                }
            }

            continuation_token = list_output.next_continuation_token;
            if continuation_token.is_none() || objects.len() >= max_keys {
                break;
            }
        }

        objects.truncate(max_keys);

        Ok(objects)
    }

    async fn describe(
        &self,
        key: &str,
    ) -> Result<Option<ObjectDetails>, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectDetails {
                key: key.to_string(),
                size_bytes: output.content_length(),
                metadata: output.metadata().cloned().unwrap_or_default(),
            })),
            Err(e)
                if e.as_service_error()
                    .is_some_and(HeadObjectError::is_not_found) =>
            {
                Ok(None)
            }
            Err(e) => Err(transient(e)),
        }
    }

    async fn presign_download(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presign_config =
            PresigningConfig::expires_in(expires_in).map_err(transient)?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(transient)?;

        Ok(presigned.uri().to_string())
    }

    async fn presign_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presign_config =
            PresigningConfig::expires_in(expires_in).map_err(transient)?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(ToString::to_string))
            .presigned(presign_config)
            .await
            .map_err(transient)?;

        Ok(presigned.uri().to_string())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let keys: Vec<String> = self
            .list(prefix, MAX_DELETED_OBJECTS)
            .await?
            .into_iter()
            .map(|object| object.key)
            .collect();

        for batch in keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(transient)?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(transient)?;

            self.client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
                .map_err(transient)?;
        }

        tracing::info!(prefix, deleted = keys.len(), "deleted objects");

        Ok(keys.len())
    }

    /// Creates the parent directories of `path` as needed.
    #[instrument(skip(self, path), fields(bucket = %self.bucket))]
    async fn download_to_file(
        &self,
        key: &str,
        path: &Path,
    ) -> Result<u64, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(
                    aws_sdk_s3::operation::get_object::GetObjectError::is_no_such_key,
                ) {
                    StorageError::NotFound(format!("object {key}"))
                } else {
                    transient(e)
                }
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::Transient(format!("creating {}: {e}", parent.display()))
            })?;
        }

        let mut reader = output.body.into_async_read();
        let mut file = tokio::fs::File::create(path).await.map_err(|e| {
            StorageError::Transient(format!("creating {}: {e}", path.display()))
        })?;

        let bytes = tokio::io::copy(&mut reader, &mut file).await.map_err(|e| {
            StorageError::Transient(format!("writing {}: {e}", path.display()))
        })?;

        tracing::info!(bytes, "downloaded {key}");

        Ok(bytes)
    }

    #[instrument(skip(self, path, metadata), fields(bucket = %self.bucket))]
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(path).await.map_err(|e| {
            StorageError::Transient(format!("reading {}: {e}", path.display()))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .body(body)
            .send()
            .await
            .map_err(transient)?;

        tracing::info!("uploaded {key}");

        Ok(())
    }
}
