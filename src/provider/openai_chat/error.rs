use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, extract_model_identifier, looks_like_token_limit_error};

use super::PROVIDER_NAME;

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<InnerError>,
}

#[derive(Deserialize)]
struct InnerError {
    message: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

pub(crate) fn parse_openai_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    let Some(error) = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
    else {
        return LLMError::provider(PROVIDER_NAME, format!("status {status}: {body}"));
    };

    let code = error.code.as_ref().and_then(Value::as_str).map(str::to_string);
    let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
    if let Some(code) = &error.code {
        message = format!("{message} ({code})");
    }

    if looks_like_token_limit_error(code.as_deref(), &message) {
        return LLMError::TokenLimitExceeded {
            message,
            estimated: None,
            limit: None,
        };
    }

    match status {
        401 | 403 => LLMError::Auth { message },
        429 => LLMError::RateLimit {
            message,
            retry_after,
        },
        400 => LLMError::Validation { message },
        404 if code.as_deref() == Some("model_not_found") => LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        },
        _ => LLMError::provider(PROVIDER_NAME, message),
    }
}
