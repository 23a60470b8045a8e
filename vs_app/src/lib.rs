use aws_config::{BehaviorVersion, meta::region::RegionProviderChain};
use figment::{Figment, providers::Env};
use serde::de::DeserializeOwned;

const FALLBACK_REGION: &str = "us-east-1";

pub trait ContextProvider<Config> {
    fn new(
        config: Config,
        aws_config: aws_config::SdkConfig,
    ) -> impl Future<Output = Self>;
}

/// Installs the JSON log subscriber used by every lambda.
///
/// The log level comes from `RUST_LOG`.
pub fn init_tracing() {
    // https://docs.aws.amazon.com/lambda/latest/dg/rust-logging.html
    let result = tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        // this needs to be set to remove duplicated information in the log.
        .with_current_span(false)
        // this needs to be set to false, otherwise ANSI color codes will
        // show up in a confusing manner in CloudWatch logs.
        .with_ansi(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time()
        // remove the name of the function from every log entry
        .with_target(false)
        .try_init();

    if result.is_err() {
        tracing::debug!("tracing subscriber was already installed");
    }
}

/// Extracts the configuration from raw environment variables.
///
/// # Errors
/// If a required variable is missing or cannot be parsed.
pub fn load_config<Config: DeserializeOwned>() -> Result<Config, figment::Error>
{
    Figment::new().merge(Env::raw()).extract()
}

/// Initialize the application context with configuration from environment variables.
/// The configuration is extracted using figment.
/// The AWS configuration is loaded using the default provider chain.
///
/// # Returns
/// The application context with the configuration and AWS configuration as
/// specified by the trait.
///
/// # Errors
/// If the configuration cannot be extracted from the environment variables.
pub async fn create_app_context<A, Config: DeserializeOwned>()
-> Result<A, figment::Error>
where
    A: ContextProvider<Config>,
{
    init_tracing();

    let config: Config = load_config()?;

    let region_provider =
        RegionProviderChain::default_provider().or_else(FALLBACK_REGION);
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;

    let context = A::new(config, aws_config).await;

    Ok(context)
}
