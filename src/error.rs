use std::time::Duration;

use thiserror::Error;

/// Aggregates every failure mode exposed by the relay.
///
/// Only [`LLMError::Configuration`], [`LLMError::UnknownModel`] and
/// [`LLMError::InvalidCredentials`] ever reach the caller of
/// [`crate::client::RelayClient::streaming_chat_generate`]; everything that happens once a
/// stream has been dispatched is reported through the update callback instead.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Required intake fields are missing from the model options bag.
    #[error("invalid configuration for model {model}: {options}")]
    Configuration {
        /// Logical model identifier whose options were rejected.
        model: String,
        /// JSON dump of the offending options bag.
        options: String,
    },
    /// No registered vendor claims the logical model identifier.
    #[error("unknown model: {model}")]
    UnknownModel { model: String },
    /// The source setup handed to a vendor does not carry usable credentials.
    #[error("invalid credentials for {vendor}: {message}")]
    InvalidCredentials {
        /// Vendor identifier, such as `gemini`.
        vendor: &'static str,
        /// Why the credential was refused.
        message: String,
    },
    /// The caller cancelled the request during the rate-limit delay or the stream.
    #[error("request cancelled: {message}")]
    Cancelled {
        /// Where the cancellation was observed.
        message: String,
    },
    /// Represents transport-layer or networking failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Reports credentials rejected by the vendor.
    #[error("auth failure: {message}")]
    Auth { message: String },
    /// Indicates that the vendor throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        /// Raw message returned by the upstream vendor.
        message: String,
        /// Optional wait duration suggested by the vendor before retrying.
        retry_after: Option<Duration>,
    },
    /// Indicates that the prompt or expected completion exceeds the allowed token budget.
    #[error("token limit exceeded: {message}")]
    TokenLimitExceeded {
        /// Raw message returned by the vendor, kept verbatim for debugging.
        message: String,
        /// Estimated tokens in the request or prompt, if known.
        estimated: Option<usize>,
        /// Reported limit communicated by the vendor, if available.
        limit: Option<usize>,
    },
    /// Signals validation failures in a request or wire payload.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Indicates that the vendor could not resolve the requested model.
    #[error("model not found: {message}")]
    ModelNotFound {
        /// Model identifier extracted from the error payload when available.
        model: Option<String>,
        /// Full error message returned by the vendor for debugging.
        message: String,
    },
    /// Wraps vendor-defined errors that cannot be normalized.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Name of the dialect, such as `google_gemini`.
        provider: &'static str,
        /// Human-readable error message returned by the vendor.
        message: String,
    },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use kotoba_relay::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] with the given dialect name and message.
    ///
    /// # Examples
    ///
    /// ```
    /// use kotoba_relay::error::LLMError;
    ///
    /// let err = LLMError::provider("google_gemini", "bad JSON payload");
    /// assert!(matches!(err, LLMError::Provider { provider: "google_gemini", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Cancelled`].
    pub fn cancelled<T: Into<String>>(message: T) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::InvalidCredentials`] for the given vendor.
    pub fn invalid_credentials<T: Into<String>>(vendor: &'static str, message: T) -> Self {
        Self::InvalidCredentials {
            vendor,
            message: message.into(),
        }
    }

    /// Returns `true` for caller-initiated cancellations.
    ///
    /// The stream accumulator uses this to keep cancellations out of the error log.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<validator::ValidationErrors> for LLMError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation {
            message: errors.to_string(),
        }
    }
}

/// Returns `true` when an error code or message suggests a context/window overflow.
pub(crate) fn looks_like_token_limit_error(code_hint: Option<&str>, message: &str) -> bool {
    if let Some(code) = code_hint {
        let lower = code.to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "context_length_exceeded"
                | "max_context_length_exceeded"
                | "prompt_tokens_exceeded"
                | "context_window_exceeded"
        ) || lower.contains("token")
        {
            return true;
        }
    }

    let lower_message = message.to_ascii_lowercase();
    const HINTS: [&str; 6] = [
        "context length",
        "context window",
        "token limit",
        "maximum output tokens",
        "max output tokens",
        "prompt is too long",
    ];
    HINTS.iter().any(|needle| lower_message.contains(needle))
}

/// Attempts to extract a model identifier from an error payload.
pub(crate) fn extract_model_identifier(message: &str) -> Option<String> {
    ['`', '"', '\'']
        .into_iter()
        .filter_map(|delimiter| between_delimiters(message, delimiter))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn between_delimiters(message: &str, delimiter: char) -> Option<String> {
    let start = message.find(delimiter)? + delimiter.len_utf8();
    let rest = message.get(start..)?;
    let end = rest.find(delimiter)?;
    Some(rest[..end].to_string())
}
