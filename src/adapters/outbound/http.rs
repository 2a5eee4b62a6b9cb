//! HTTP plumbing shared by the provider adapters.

use crate::domain::errors::ProviderError;
use crate::domain::value_objects::ProviderKind;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// Longest upstream error body echoed into an error message.
const MAX_ERROR_BODY: usize = 200;

/// Build a client with the adapter's user agent and timeout.
pub(crate) fn build_client(user_agent: &str, timeout: Duration) -> anyhow::Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Map a send failure, dropping the URL so credentials in the query string
/// never reach logs or callers.
pub(crate) fn send_error(provider: ProviderKind, err: reqwest::Error) -> ProviderError {
    ProviderError::from_reqwest(provider, err.without_url())
}

/// Turn a non-success response into the matching `ProviderError`.
pub(crate) async fn ensure_success(
    provider: ProviderKind,
    response: Response,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            provider,
            retry_after: retry_after(response.headers()),
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Http {
        provider,
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

/// Read a JSON body into `T`.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    provider: ProviderKind,
    response: Response,
) -> Result<T, ProviderError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| send_error(provider, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode {
        provider,
        message: e.to_string(),
    })
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Pull a human-readable message out of an upstream error body.
///
/// Understands `{"message": ..}`, `{"error": ".."}` and
/// `{"error": {"message": ..}}`; anything else is truncated verbatim.
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .or_else(|| v.get("error").and_then(|e| e.as_str()))
                .or_else(|| {
                    v.get("error")
                        .and_then(|e| e.get("message"))
                        .and_then(|m| m.as_str())
                })
                .map(str::to_string)
        });

    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
        None => body.trim().chars().take(MAX_ERROR_BODY).collect(),
    }
}
