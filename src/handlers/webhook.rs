use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use crate::config::WebhookConfig;
use crate::models::QueueRecord;
use crate::queue::{HandlerError, HookError, QueueHandler};

const MAX_BODY_CHARS: usize = 1024;

/// Forwards each record to an HTTP endpoint.
///
/// 2xx succeeds, 429/503 with `Retry-After` skips, other 4xx fails
/// immediately, anything else is retried.
pub struct WebhookHandler {
    client: reqwest::Client,
    url: String,
    failure_url: Option<String>,
}

impl WebhookHandler {
    pub fn new(config: &WebhookConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            failure_url: config.failure_url.clone(),
        })
    }
}

#[async_trait]
impl QueueHandler for WebhookHandler {
    async fn process(
        &self,
        record: &QueueRecord,
    ) -> Result<Option<serde_json::Value>, HandlerError> {
        let body = json!({
            "id": record.id,
            "data": &record.data,
            "receivedDate": record.received_date,
            "retryCount": record.retry_count,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| HandlerError::transient(format!("Webhook request failed: {e}")))?;

        let status = resp.status();
        let retry_after = retry_after_ms(resp.headers());
        let resp_body = truncate(resp.text().await.unwrap_or_default());

        classify(status, retry_after, resp_body)
    }

    async fn on_failure(&self, record: &QueueRecord) -> Result<(), HookError> {
        let Some(url) = &self.failure_url else {
            tracing::warn!(
                "Record {} gave up after {} retries: {}",
                record.id,
                record.retry_count,
                record
                    .failure_reason
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default()
            );
            return Ok(());
        };

        let resp = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .map_err(|e| HookError::from(format!("Failure webhook request failed: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(HookError::from(format!(
                "Failure webhook returned {}",
                resp.status().as_u16()
            )))
        }
    }
}

fn classify(
    status: StatusCode,
    retry_after: Option<i64>,
    body: String,
) -> Result<Option<serde_json::Value>, HandlerError> {
    let code = status.as_u16();
    let response = json!({ "status_code": code, "body": body });

    if status.is_success() {
        return Ok(Some(response));
    }

    let throttled =
        status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE;

    match retry_after {
        Some(delay_ms) if throttled => Err(HandlerError::skip_for(delay_ms)),
        _ if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT => {
            Err(HandlerError::Transient(response))
        }
        _ if status.is_client_error() => Err(HandlerError::fail(response)),
        _ => Err(HandlerError::Transient(response)),
    }
}

fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .map(|secs| secs.max(0).saturating_mul(1000))
}

fn truncate(body: String) -> String {
    body.chars().take(MAX_BODY_CHARS).collect()
}
