use std::sync::Arc;

use gcp_auth::TokenProvider;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use super::resources::{ErrorEnvelope, ErrorProto};
use crate::error::QueryEngineError;
use crate::gateway::GatewayError;

pub(crate) const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

const NOT_FOUND_REASON: &str = "notFound";
const BYTES_BILLED_REASON: &str = "bytesBilledLimitExceeded";

/// Authenticated JSON client rooted at `{endpoint}/projects/{project}`.
pub(crate) struct RestClient {
    http: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
    base_url: Url,
}

impl RestClient {
    pub fn new(
        endpoint: &str,
        project_id: &str,
        auth: Arc<dyn TokenProvider>,
    ) -> Result<Self, QueryEngineError> {
        let mut base_url = Url::parse(endpoint).map_err(|e| {
            QueryEngineError::configuration(format!("Invalid BigQuery endpoint '{}': {}", endpoint, e))
        })?;

        base_url
            .path_segments_mut()
            .map_err(|_| {
                QueryEngineError::configuration(format!(
                    "BigQuery endpoint '{}' cannot be used as a base URL",
                    endpoint
                ))
            })?
            .pop_if_empty()
            .extend(["projects", project_id]);

        let http = reqwest::Client::builder()
            .user_agent(concat!("bigquery-query-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                QueryEngineError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            auth,
            base_url,
        })
    }

    pub fn url<I>(&self, segments: I) -> Url
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        // The base was checked to accept path segments in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    async fn request(
        &self,
        method: reqwest::Method,
        url: Url,
    ) -> Result<reqwest::RequestBuilder, GatewayError> {
        let token = self.auth.token(&[BIGQUERY_SCOPE]).await?;
        Ok(self.http.request(method, url).bearer_auth(token.as_str()))
    }

    pub async fn get<T>(&self, url: Url) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
    {
        let response = self.request(reqwest::Method::GET, url).await?.send().await?;
        handle_json_response(response).await
    }

    pub async fn post<B, T>(&self, url: Url, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .request(reqwest::Method::POST, url)
            .await?
            .json(body)
            .send()
            .await?;
        handle_json_response(response).await
    }
}

async fn handle_json_response<T>(response: reqwest::Response) -> Result<T, GatewayError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        return Err(error_from_body(status.as_u16(), &bytes));
    }

    serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode {
        message: e.to_string(),
    })
}

pub(crate) fn error_from_body(status: u16, body: &[u8]) -> GatewayError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => {
            let message = error
                .message
                .or_else(|| error.errors.iter().find_map(|e| e.message.clone()))
                .unwrap_or_else(|| format!("HTTP {}", status));
            let reason = error.errors.iter().find_map(|e| e.reason.clone());
            classify(status, reason, message)
        }
        Err(e) => {
            warn!("Failed to decode BigQuery error body, falling back to raw text: {}", e);
            let text = String::from_utf8_lossy(body).trim().to_string();
            let message = if text.is_empty() {
                format!("HTTP {}", status)
            } else {
                text
            };
            classify(status, None, message)
        }
    }
}

/// Classifies the `errorResult` of a job resource that finished unsuccessfully.
pub(crate) fn error_from_job(job_id: &str, error: &ErrorProto) -> GatewayError {
    let message = error
        .message
        .clone()
        .unwrap_or_else(|| "job finished with an error".to_string());

    match error.reason.as_deref() {
        Some(NOT_FOUND_REASON) => GatewayError::NotFound { message },
        Some(BYTES_BILLED_REASON) => GatewayError::BytesBilledLimitExceeded { message },
        _ => GatewayError::JobFailed {
            job_id: job_id.to_string(),
            message,
        },
    }
}

fn classify(status: u16, reason: Option<String>, message: String) -> GatewayError {
    match reason.as_deref() {
        Some(BYTES_BILLED_REASON) => GatewayError::BytesBilledLimitExceeded { message },
        Some(NOT_FOUND_REASON) => GatewayError::NotFound { message },
        None if status == 404 => GatewayError::NotFound { message },
        _ => GatewayError::Api {
            status,
            reason: reason.unwrap_or_else(|| "unknown".to_string()),
            message,
        },
    }
}
