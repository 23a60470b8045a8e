use async_trait::async_trait;
use aws_sdk_lambda::{
    error::DisplayErrorContext, operation::RequestId, primitives::Blob,
    types::InvocationType,
};
use tracing::instrument;
use types::{WorkerRequest, WorkerResponse};

use crate::{
    error::InvokeError,
    storage::{DispatchReceipt, WorkerInvoker},
};

/// Status Lambda returns when it has queued an `Event` invocation.
const ACCEPTED: i32 = 202;

/// The ffmpeg worker deployed as a Lambda function.
#[derive(Debug, Clone)]
pub struct LambdaWorker {
    client: aws_sdk_lambda::Client,
    function_name: String,
}

impl LambdaWorker {
    pub fn new(
        client: aws_sdk_lambda::Client,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            function_name: function_name.into(),
        }
    }
}

#[async_trait]
impl WorkerInvoker for LambdaWorker {
    #[instrument(skip(self, request), fields(operation = request.operation()))]
    async fn invoke_async(
        &self,
        request: &WorkerRequest,
    ) -> Result<DispatchReceipt, InvokeError> {
        let payload = serde_json::to_vec(request)?;

        let output = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| InvokeError::Unreachable(DisplayErrorContext(e).to_string()))?;

        if output.status_code() != ACCEPTED {
            return Err(InvokeError::Rejected(output.status_code()));
        }

        Ok(DispatchReceipt {
            status_code: output.status_code(),
            request_id: output.request_id().map(ToString::to_string),
        })
    }

    #[instrument(skip(self, request), fields(operation = request.operation()))]
    async fn invoke_sync(
        &self,
        request: &WorkerRequest,
    ) -> Result<WorkerResponse, InvokeError> {
        let payload = serde_json::to_vec(request)?;

        let output = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| InvokeError::Unreachable(DisplayErrorContext(e).to_string()))?;

        let body = output
            .payload()
            .map(|blob| String::from_utf8_lossy(blob.as_ref()).into_owned())
            .unwrap_or_default();

        if let Some(function_error) = output.function_error() {
            tracing::error!(function_error, "worker reported an error: {body}");
            return Err(InvokeError::FunctionError(format!("{function_error}: {body}")));
        }

        Ok(serde_json::from_str(&body)?)
    }
}
