use std::{sync::Arc, time::Duration};

use split_jobs::{
    JobService, ObjectStore, dynamodb::DynamoJobStore, lambda::LambdaWorker,
    s3::S3Bucket,
};

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub prefix: String,
    pub url_ttl: Duration,
}

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
    /// Bucket clients upload source videos into.
    pub sources: Arc<dyn ObjectStore>,
    pub uploads: UploadSettings,
    pub dispatch_on_submit: bool,
}

impl vs_app::ContextProvider<Config> for AppState {
    async fn new(config: Config, aws_config: aws_config::SdkConfig) -> Self {
        let s3 = aws_sdk_s3::Client::new(&aws_config);

        let jobs = JobService::new(
            Arc::new(DynamoJobStore::new(
                aws_sdk_dynamodb::Client::new(&aws_config),
                &config.jobs_table,
            )),
            Arc::new(S3Bucket::new(s3.clone(), &config.output_bucket)),
            Arc::new(LambdaWorker::new(
                aws_sdk_lambda::Client::new(&aws_config),
                &config.worker_function_name,
            )),
            config.job_settings(),
        );

        Self {
            jobs,
            sources: Arc::new(S3Bucket::new(s3, &config.source_bucket)),
            uploads: UploadSettings {
                prefix: config.upload_prefix.clone(),
                url_ttl: Duration::from_secs(config.upload_url_ttl_secs),
            },
            dispatch_on_submit: config.dispatch_on_submit,
        }
    }
}
