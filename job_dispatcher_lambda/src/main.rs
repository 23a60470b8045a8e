use std::{sync::Arc, time::Duration};

use lambda_runtime::{Error, LambdaEvent, run, service_fn};
use serde::Deserialize;
use split_jobs::{
    DEFAULT_OUTPUT_PREFIX, DispatchSummary, JobService,
    JobSettings, JobStore, dynamodb::DynamoJobStore, lambda::LambdaWorker,
    s3::S3Bucket,
};
use tracing::{info, warn};
use vs_app::ContextProvider;

/// Either an EventBridge schedule tick or a direct invocation naming one job.
#[derive(Debug, Default, Deserialize)]
struct DispatchEvent {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    batch_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct Config {
    jobs_table: String,
    output_bucket: String,
    worker_function_name: String,
    #[serde(default = "default_output_prefix")]
    output_prefix: String,
    #[serde(default = "default_dispatch_batch_size")]
    dispatch_batch_size: usize,
    #[serde(default = "default_processing_deadline_secs")]
    processing_deadline_secs: u64,
}

fn default_output_prefix() -> String {
    DEFAULT_OUTPUT_PREFIX.to_string()
}

const fn default_dispatch_batch_size() -> usize {
    25
}

const fn default_processing_deadline_secs() -> u64 {
    1200
}

struct AppContext {
    jobs: JobService,
    batch_size: usize,
}

impl ContextProvider<Config> for AppContext {
    async fn new(config: Config, aws_config: aws_config::SdkConfig) -> Self {
        let jobs = JobService::new(
            Arc::new(DynamoJobStore::new(
                aws_sdk_dynamodb::Client::new(&aws_config),
                &config.jobs_table,
            )),
            Arc::new(S3Bucket::new(
                aws_sdk_s3::Client::new(&aws_config),
                &config.output_bucket,
            )),
            Arc::new(LambdaWorker::new(
                aws_sdk_lambda::Client::new(&aws_config),
                &config.worker_function_name,
            )),
            JobSettings {
                output_prefix: config.output_prefix,
                processing_deadline: Duration::from_secs(
                    config.processing_deadline_secs,
                ),
                ..JobSettings::default()
            },
        );

        Self {
            jobs,
            batch_size: config.dispatch_batch_size,
        }
    }
}

async fn function_handler(
    context: &AppContext,
    event: LambdaEvent<DispatchEvent>,
) -> Result<DispatchSummary, Error> {
    let event = event.payload;

    let Some(job_id) = event.job_id else {
        let batch_size = event.batch_size.unwrap_or(context.batch_size);
        info!(batch_size, "dispatching queued jobs");
        return Ok(context.jobs.dispatch_pending(batch_size).await?);
    };

    info!(%job_id, "dispatching a single job");

    let mut summary = DispatchSummary::default();
    let Some(job) = context.jobs.jobs.get(&job_id).await? else {
        warn!(%job_id, "job does not exist");
        return Ok(summary);
    };

    summary.examined = 1;
    summary.record(&context.jobs.dispatch_job(&job).await?);

    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let context = vs_app::create_app_context::<AppContext, Config>().await?;

    run(service_fn(|event| async {
        function_handler(&context, event).await
    }))
    .await
}
