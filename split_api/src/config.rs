use std::time::Duration;

use serde::Deserialize;
use split_jobs::{DEFAULT_OUTPUT_PREFIX, JobSettings};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub jobs_table: String,
    pub source_bucket: String,
    pub output_bucket: String,
    pub worker_function_name: String,
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    #[serde(default = "default_upload_prefix")]
    pub upload_prefix: String,
    #[serde(default = "default_download_url_ttl_secs")]
    pub download_url_ttl_secs: u64,
    #[serde(default = "default_upload_url_ttl_secs")]
    pub upload_url_ttl_secs: u64,
    #[serde(default = "default_poll_budget_ms")]
    pub poll_budget_ms: u64,
    /// Processing jobs older than this are failed as abandoned.
    #[serde(default = "default_processing_deadline_secs")]
    pub processing_deadline_secs: u64,
    /// Dispatch a job as soon as it is submitted instead of waiting for the
    /// scheduled dispatcher.
    #[serde(default = "default_dispatch_on_submit")]
    pub dispatch_on_submit: bool,
}

fn default_output_prefix() -> String {
    DEFAULT_OUTPUT_PREFIX.to_string()
}

fn default_upload_prefix() -> String {
    "uploads".to_string()
}

const fn default_download_url_ttl_secs() -> u64 {
    3600
}

const fn default_upload_url_ttl_secs() -> u64 {
    900
}

const fn default_poll_budget_ms() -> u64 {
    3000
}

const fn default_processing_deadline_secs() -> u64 {
    1200
}

const fn default_dispatch_on_submit() -> bool {
    true
}

impl Config {
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            output_prefix: self.output_prefix.clone(),
            poll_budget: Duration::from_millis(self.poll_budget_ms),
            download_url_ttl: Duration::from_secs(self.download_url_ttl_secs),
            processing_deadline: Duration::from_secs(
                self.processing_deadline_secs,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("JOBS_TABLE", "split-jobs");
            jail.set_env("SOURCE_BUCKET", "sources");
            jail.set_env("OUTPUT_BUCKET", "outputs");
            jail.set_env("WORKER_FUNCTION_NAME", "ffmpeg-worker");

            let config: Config = vs_app::load_config()?;
            assert_eq!(config.output_prefix, "jobs");
            assert_eq!(config.upload_prefix, "uploads");
            assert!(config.dispatch_on_submit);

            let settings = config.job_settings();
            assert_eq!(settings.poll_budget, Duration::from_secs(3));
            assert_eq!(settings.download_url_ttl, Duration::from_secs(3600));
            assert_eq!(settings.processing_deadline, Duration::from_secs(1200));

            jail.set_env("DISPATCH_ON_SUBMIT", "false");
            jail.set_env("POLL_BUDGET_MS", "500");
            let config: Config = vs_app::load_config()?;
            assert!(!config.dispatch_on_submit);
            assert_eq!(config.job_settings().poll_budget, Duration::from_millis(500));

            Ok(())
        });
    }
}
