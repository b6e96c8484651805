use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};
use crate::provider::retry::parse_proto_duration;

use super::PROVIDER_NAME;

/// Google RPC error envelope: `{"error": {"code", "message", "status", "details"}}`.
#[derive(Debug, Deserialize)]
struct GoogleRpcEnvelope {
    error: GoogleRpcStatus,
}

#[derive(Debug, Deserialize)]
struct GoogleRpcStatus {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

impl GoogleRpcStatus {
    /// `retryDelay` of a `google.rpc.RetryInfo` detail, e.g. `"37s"` or `"1.5s"`.
    fn retry_delay(&self) -> Option<Duration> {
        self.details
            .iter()
            .filter(|detail| {
                detail
                    .get("@type")
                    .and_then(Value::as_str)
                    .is_some_and(|kind| kind.ends_with("google.rpc.RetryInfo"))
            })
            .find_map(|detail| parse_proto_duration(detail.get("retryDelay")?.as_str()?))
    }
}

/// Classifies a non-success Gemini response body.
///
/// `retry_after` comes from the `Retry-After` header; a `RetryInfo` detail in the body
/// takes precedence over it.
pub(crate) fn parse_gemini_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    let Ok(GoogleRpcEnvelope { error }) = serde_json::from_str::<GoogleRpcEnvelope>(body) else {
        return LLMError::provider(PROVIDER_NAME, format!("status {status}: {body}"));
    };

    let status_hint = error.status.as_deref().filter(|text| !text.is_empty());
    let base = error
        .message
        .clone()
        .unwrap_or_else(|| "unknown error".to_string());
    let message = match status_hint {
        Some(status_text) => format!("{base} ({status_text})"),
        None => base,
    };

    if looks_like_token_limit_error(status_hint, &message) {
        return LLMError::TokenLimitExceeded {
            message,
            estimated: None,
            limit: None,
        };
    }

    match (status, status_hint) {
        (404, _) | (_, Some("NOT_FOUND")) => LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        },
        (401 | 403, _) | (_, Some("UNAUTHENTICATED" | "PERMISSION_DENIED")) => {
            LLMError::Auth { message }
        }
        (429, _) | (_, Some("RESOURCE_EXHAUSTED")) => LLMError::RateLimit {
            retry_after: error.retry_delay().or(retry_after),
            message,
        },
        (400, _) | (_, Some("INVALID_ARGUMENT" | "FAILED_PRECONDITION")) => {
            LLMError::Validation { message }
        }
        _ => LLMError::provider(PROVIDER_NAME, message),
    }
}
