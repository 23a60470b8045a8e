//! Job descriptors kept in a DynamoDB table keyed by `job_id`.
//!
//! The table needs a global secondary index named [`STATUS_INDEX`] with
//! `status` as its partition key and `created_at` as its sort key, which the
//! dispatcher uses to find queued jobs oldest first.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::{DisplayErrorContext, SdkError},
    operation::{put_item::PutItemError, update_item::UpdateItemError},
    types::AttributeValue,
};
use serde::Serialize;
use tracing::warn;
use types::{Job, JobStatus};

use crate::{
    error::StorageError,
    storage::{JobStore, Transition},
};

pub const STATUS_INDEX: &str = "status-index";

const KEY: &str = "job_id";

pub struct DynamoJobStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoJobStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    fn key(job_id: &str) -> AttributeValue {
        AttributeValue::S(job_id.to_string())
    }
}

fn status_value(status: JobStatus) -> AttributeValue {
    AttributeValue::S(status.as_str().to_string())
}

fn to_attribute<T: Serialize>(value: &T) -> Result<AttributeValue, StorageError> {
    serde_dynamo::to_attribute_value(value)
        .map_err(|e| StorageError::Transient(format!("could not serialize attribute: {e}")))
}

fn transient<E>(error: &SdkError<E>) -> StorageError
where
    E: std::error::Error + 'static,
{
    StorageError::Transient(DisplayErrorContext(error).to_string())
}

fn map_put_error(job_id: &str, error: &SdkError<PutItemError>) -> StorageError {
    if error
        .as_service_error()
        .is_some_and(PutItemError::is_conditional_check_failed_exception)
    {
        StorageError::ConditionFailed(format!("job {job_id} already exists"))
    } else {
        transient(error)
    }
}

fn map_update_error(job_id: &str, error: &SdkError<UpdateItemError>) -> StorageError {
    if error
        .as_service_error()
        .is_some_and(UpdateItemError::is_conditional_check_failed_exception)
    {
        StorageError::ConditionFailed(format!("job {job_id} changed concurrently"))
    } else {
        transient(error)
    }
}

#[async_trait]
impl JobStore for DynamoJobStore {
    async fn create(&self, job: &Job) -> Result<(), StorageError> {
        let item: HashMap<String, AttributeValue> = serde_dynamo::to_item(job)
            .map_err(|e| StorageError::Transient(format!("could not serialize job: {e}")))?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(#key)")
            .expression_attribute_names("#key", KEY)
            .send()
            .await
            .map_err(|e| map_put_error(&job.job_id, &e))?;

        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StorageError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(KEY, Self::key(job_id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| transient(&e))?;

        let Some(item) = response.item else {
            return Ok(None);
        };

        let job: Job = serde_dynamo::from_item(item)
            .map_err(|e| StorageError::Transient(format!("unreadable job {job_id}: {e}")))?;

        Ok(Some(job))
    }

    async fn list_by_status(
        &self,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<Job>, StorageError> {
        let mut jobs = Vec::new();
        if limit == 0 {
            return Ok(jobs);
        }

        let mut exclusive_start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let mut query = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(STATUS_INDEX)
                .key_condition_expression("#status = :status")
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":status", status_value(status))
                .scan_index_forward(true)
                .limit(i32::try_from(limit).unwrap_or(i32::MAX));

            if let Some(start_key) = exclusive_start_key {
                query = query.set_exclusive_start_key(Some(start_key));
            }

            let response = query.send().await.map_err(|e| transient(&e))?;

            for item in response.items.unwrap_or_default() {
                let job: Result<Job, _> = serde_dynamo::from_item(item);
                match job {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!("skipping unreadable job: {e}"),
                }
            }

            if jobs.len() >= limit || response.last_evaluated_key.is_none() {
                break;
            }
            exclusive_start_key = response.last_evaluated_key;
        }

        jobs.truncate(limit);

        Ok(jobs)
    }

    async fn advance(
        &self,
        job_id: &str,
        from: JobStatus,
        transition: Transition,
    ) -> Result<(), StorageError> {
        let to = transition.target();
        if !from.can_advance_to(to) {
            return Err(StorageError::InvalidTransition { from, to });
        }

        let update = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(KEY, Self::key(job_id))
            .condition_expression("#status = :from")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":from", status_value(from))
            .expression_attribute_values(":to", status_value(to));

        let update = match transition {
            Transition::Processing { at } => update
                .update_expression("SET #status = :to, processing_started_at = :at")
                .expression_attribute_values(":at", to_attribute(&at)?),
            Transition::Completed { results, at } => update
                .update_expression(
                    "SET #status = :to, completed_at = :at, results = :results, progress = :progress",
                )
                .expression_attribute_values(":at", to_attribute(&at)?)
                .expression_attribute_values(":results", to_attribute(&results)?)
                .expression_attribute_values(":progress", AttributeValue::N("100".to_string())),
            Transition::Failed { error, at } => update
                .update_expression("SET #status = :to, failed_at = :at, #error = :error")
                .expression_attribute_names("#error", "error")
                .expression_attribute_values(":at", to_attribute(&at)?)
                .expression_attribute_values(":error", AttributeValue::S(error)),
        };

        update
            .send()
            .await
            .map_err(|e| map_update_error(job_id, &e))?;

        Ok(())
    }

    async fn record_dispatch(
        &self,
        job_id: &str,
        confirmation: &str,
    ) -> Result<(), StorageError> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(KEY, Self::key(job_id))
            .condition_expression("attribute_exists(#key)")
            .update_expression("SET dispatch_confirmation = :confirmation")
            .expression_attribute_names("#key", KEY)
            .expression_attribute_values(
                ":confirmation",
                AttributeValue::S(confirmation.to_string()),
            )
            .send()
            .await
            .map_err(|e| map_update_error(job_id, &e))?;

        Ok(())
    }

    async fn record_plan(
        &self,
        job_id: &str,
        source_duration: f64,
        expected_segments: u32,
    ) -> Result<(), StorageError> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(KEY, Self::key(job_id))
            .condition_expression("#status = :processing")
            .update_expression(
                "SET source_duration = :duration, expected_segments = :expected",
            )
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":processing", status_value(JobStatus::Processing))
            .expression_attribute_values(
                ":duration",
                AttributeValue::N(source_duration.to_string()),
            )
            .expression_attribute_values(
                ":expected",
                AttributeValue::N(expected_segments.to_string()),
            )
            .send()
            .await
            .map_err(|e| map_update_error(job_id, &e))?;

        Ok(())
    }

    async fn record_progress(
        &self,
        job_id: &str,
        progress: u8,
    ) -> Result<(), StorageError> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(KEY, Self::key(job_id))
            .condition_expression(
                "#status = :processing AND (attribute_not_exists(progress) OR progress < :progress)",
            )
            .update_expression("SET progress = :progress")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":processing", status_value(JobStatus::Processing))
            .expression_attribute_values(":progress", AttributeValue::N(progress.to_string()))
            .send()
            .await
            .map_err(|e| map_update_error(job_id, &e))?;

        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<(), StorageError> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(KEY, Self::key(job_id))
            .send()
            .await
            .map_err(|e| transient(&e))?;

        Ok(())
    }
}
