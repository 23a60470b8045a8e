use std::{sync::Arc, time::Duration};

use lambda_runtime::{Error, LambdaEvent, run, service_fn};
use serde::Deserialize;
use split_jobs::{
    DEFAULT_OUTPUT_PREFIX, JobStore, ObjectStore, dynamodb::DynamoJobStore,
    s3::S3Bucket,
};
use types::{WorkerRequest, WorkerResponse};
use vs_app::ContextProvider;

mod media;
mod metadata;
mod split;

use media::{Ffmpeg, MediaTools};

#[derive(Debug, Clone, Deserialize)]
struct Config {
    jobs_table: String,
    source_bucket: String,
    output_bucket: String,
    #[serde(default = "default_output_prefix")]
    output_prefix: String,
    #[serde(default = "default_probe_url_ttl_secs")]
    probe_url_ttl_secs: u64,
}

fn default_output_prefix() -> String {
    DEFAULT_OUTPUT_PREFIX.to_string()
}

const fn default_probe_url_ttl_secs() -> u64 {
    600
}

pub struct AppContext {
    pub jobs: Arc<dyn JobStore>,
    pub sources: Arc<dyn ObjectStore>,
    pub outputs: Arc<dyn ObjectStore>,
    pub media: Arc<dyn MediaTools>,
    pub output_prefix: String,
    pub probe_url_ttl: Duration,
}

impl ContextProvider<Config> for AppContext {
    async fn new(config: Config, aws_config: aws_config::SdkConfig) -> Self {
        let s3 = aws_sdk_s3::Client::new(&aws_config);

        Self {
            jobs: Arc::new(DynamoJobStore::new(
                aws_sdk_dynamodb::Client::new(&aws_config),
                &config.jobs_table,
            )),
            sources: Arc::new(S3Bucket::new(s3.clone(), &config.source_bucket)),
            outputs: Arc::new(S3Bucket::new(s3, &config.output_bucket)),
            media: Arc::new(Ffmpeg),
            output_prefix: config.output_prefix,
            probe_url_ttl: Duration::from_secs(config.probe_url_ttl_secs),
        }
    }
}

/// Failures are reported in the response rather than as a lambda error, so
/// asynchronous invocations are not retried against a job that has already
/// been marked failed.
async fn function_handler(
    context: &AppContext,
    event: LambdaEvent<WorkerRequest>,
) -> Result<WorkerResponse, Error> {
    let request = event.payload;
    tracing::info!(operation = request.operation(), "worker invoked");

    let response = match request {
        WorkerRequest::ExtractMetadata { source_reference } => {
            metadata::extract_metadata(context, &source_reference).await
        }
        WorkerRequest::SplitVideo {
            source_reference,
            job_id,
            split_config,
        } => {
            split::split_video(context, &job_id, &source_reference, &split_config)
                .await
        }
    };

    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let context = vs_app::create_app_context::<AppContext, Config>().await?;

    run(service_fn(|event| async {
        function_handler(&context, event).await
    }))
    .await
}
