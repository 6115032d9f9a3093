//! Server-sent event plumbing shared by the adapters

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::{header, Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::{trace, warn};

use crate::error::{Error, Result};

/// One decoded SSE payload
#[derive(Debug, Clone)]
pub(crate) enum SseEvent {
    Message(Value),
    Done,
}

pub(crate) fn build_client(timeout_secs: u64, headers: header::HeaderMap) -> Result<Client> {
    Ok(Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Decode a streaming response body into JSON payloads.
///
/// Unparseable payloads are skipped; transport errors end the stream.
pub(crate) fn json_events(response: Response) -> impl Stream<Item = Result<SseEvent>> + Send {
    response
        .bytes_stream()
        .eventsource()
        .filter_map(|event| async move {
            match event {
                Ok(event) => {
                    let data = event.data.trim();
                    trace!("SSE event: {}", data);
                    if data.is_empty() {
                        None
                    } else if data == "[DONE]" {
                        Some(Ok(SseEvent::Done))
                    } else {
                        match serde_json::from_str::<Value>(data) {
                            Ok(json) => Some(Ok(SseEvent::Message(json))),
                            Err(e) => {
                                warn!("Failed to parse SSE JSON: {}, data: {}", e, data);
                                None
                            }
                        }
                    }
                }
                Err(e) => Some(Err(Error::ProviderTransport(format!("SSE stream error: {}", e)))),
            }
        })
}

/// Map a non-success response onto the error taxonomy
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let header_delay = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_delay);
    let body = response.text().await.unwrap_or_default();

    Err(match status.as_u16() {
        429 => {
            let retry_after = header_delay.or_else(|| retry_delay_from_body(&body));
            warn!("Rate limit exceeded (retry after {:?}): {}", retry_after, body);
            Error::RateLimited {
                message: error_message(&body).unwrap_or(body),
                retry_after,
            }
        }
        401 | 403 => Error::Unauthorized(error_message(&body).unwrap_or_else(|| "Invalid API key".to_string())),
        _ => Error::ProviderTransport(format!(
            "API error ({}): {}",
            status,
            error_message(&body).unwrap_or(body)
        )),
    })
}

/// Error object embedded in a streamed payload
pub(crate) fn stream_error(payload: &Value) -> Option<Error> {
    let error = payload.get("error")?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .unwrap_or("An error occurred during streaming")
        .to_string();

    let code = error.get("code").and_then(Value::as_u64);
    if code == Some(429) || error.get("status").and_then(Value::as_str) == Some("RESOURCE_EXHAUSTED") {
        return Some(Error::RateLimited {
            retry_after: retry_delay_from_value(payload),
            message,
        });
    }
    Some(Error::ProviderTransport(message))
}

fn error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// Google's `RetryInfo.retryDelay` detail, e.g. `"5s"`
fn retry_delay_from_body(body: &str) -> Option<Duration> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| retry_delay_from_value(&json))
}

fn retry_delay_from_value(json: &Value) -> Option<Duration> {
    json.get("error")?
        .get("details")?
        .as_array()?
        .iter()
        .find_map(|detail| detail.get("retryDelay").and_then(Value::as_str))
        .and_then(parse_delay)
}

/// Parse `"7"`, `"5s"` or `"1.5s"`
pub(crate) fn parse_delay(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let secs = raw.strip_suffix('s').unwrap_or(raw);
    secs.parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}
