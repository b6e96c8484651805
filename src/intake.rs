//! Intake records handed to the dispatcher: how to reach the vendor, which concrete
//! model to run, and what caller feature the request belongs to.
//!
//! [`map_options_to_intake_model`] turns a descriptor's loose options bag into a typed
//! [`IntakeModel`]; it is pure and never touches the network.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LLMError;
use crate::provider::google_gemini::wiretypes::HarmBlockThreshold;

const OPTION_REF: &str = "llmRef";
const OPTION_TEMPERATURE: &str = "llmTemperature";
const OPTION_RESPONSE_TOKENS: &str = "llmResponseTokens";

/// Wire dialect spoken by a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Gemini => "gemini",
            Dialect::OpenAi => "openai",
        }
    }
}

/// Everything the dispatcher needs to reach a vendor, tagged by dialect.
///
/// Produced once per request by [`crate::provider::Vendor::transport_access`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dialect")]
pub enum IntakeAccess {
    #[serde(rename = "gemini")]
    Gemini(GeminiAccess),
    #[serde(rename = "openai")]
    OpenAi(OpenAiAccess),
}

impl IntakeAccess {
    pub fn dialect(&self) -> Dialect {
        match self {
            IntakeAccess::Gemini(_) => Dialect::Gemini,
            IntakeAccess::OpenAi(_) => Dialect::OpenAi,
        }
    }
}

impl fmt::Debug for IntakeAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntakeAccess::Gemini(access) => f
                .debug_struct("Gemini")
                .field("host", &access.host)
                .field("min_safety_level", &access.min_safety_level)
                .finish_non_exhaustive(),
            IntakeAccess::OpenAi(access) => f
                .debug_struct("OpenAi")
                .field("host", &access.host)
                .field("organization", &access.organization)
                .field("project", &access.project)
                .finish_non_exhaustive(),
        }
    }
}

/// Access for the Gemini Generative Language API.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiAccess {
    pub api_key: String,
    /// Base URL, without the `/v1beta` suffix.
    pub host: String,
    /// Threshold applied to every harm category when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_safety_level: Option<HarmBlockThreshold>,
}

/// Access for OpenAI-compatible Chat Completions endpoints.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiAccess {
    pub api_key: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// Concrete model parameters resolved from a descriptor's options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeModel {
    /// Vendor-side model name, e.g. `models/gemini-1.5-flash`.
    pub id: String,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Transport method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntakeMethod {
    ChatStream,
    ChatGenerate,
}

impl IntakeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            IntakeMethod::ChatStream => "chat-stream",
            IntakeMethod::ChatGenerate => "chat-generate",
        }
    }
}

/// Caller feature that originated a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntakeContextName {
    Conversation,
    BeamScatter,
    BeamGather,
    Call,
    PersonaExtract,
    AiDiagram,
    AiFlattener,
    DrawExpandPrompt,
}

impl IntakeContextName {
    pub fn as_str(self) -> &'static str {
        match self {
            IntakeContextName::Conversation => "conversation",
            IntakeContextName::BeamScatter => "beam-scatter",
            IntakeContextName::BeamGather => "beam-gather",
            IntakeContextName::Call => "call",
            IntakeContextName::PersonaExtract => "persona-extract",
            IntakeContextName::AiDiagram => "ai-diagram",
            IntakeContextName::AiFlattener => "ai-flattener",
            IntakeContextName::DrawExpandPrompt => "draw-expand-prompt",
        }
    }
}

/// Correlation record attached to logs for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeContext {
    pub method: IntakeMethod,
    pub name: IntakeContextName,
    /// Caller-chosen correlation id, such as a conversation id.
    #[serde(rename = "ref")]
    pub reference: String,
}

/// Builds the correlation record for one request.
pub fn intake_context(
    method: IntakeMethod,
    name: IntakeContextName,
    reference: impl Into<String>,
) -> IntakeContext {
    IntakeContext {
        method,
        name,
        reference: reference.into(),
    }
}

/// Reads the intake model out of a descriptor options bag.
///
/// `llmRef` must be a non-empty string and `llmTemperature` a number.
/// `llmResponseTokens` is only forwarded when truthy (not null, zero, `false` or an
/// empty string), and must then be a positive integer.
///
/// # Examples
///
/// ```
/// # use kotoba_relay::intake::map_options_to_intake_model;
/// # use serde_json::json;
/// let options = json!({ "llmRef": "models/gemini-pro", "llmTemperature": 0.5 });
/// let model = map_options_to_intake_model(options.as_object().unwrap(), "gemini-pro").unwrap();
/// assert_eq!(model.id, "models/gemini-pro");
/// assert_eq!(model.max_tokens, None);
/// ```
///
/// # Errors
///
/// Returns [`LLMError::Configuration`] carrying `debug_id` and a JSON dump of the
/// options when a mandatory field is missing or malformed.
pub fn map_options_to_intake_model(
    options: &Map<String, Value>,
    debug_id: &str,
) -> Result<IntakeModel, LLMError> {
    let rejected = || LLMError::Configuration {
        model: debug_id.to_string(),
        options: Value::Object(options.clone()).to_string(),
    };

    let id = match options.get(OPTION_REF) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        _ => return Err(rejected()),
    };
    let temperature = options
        .get(OPTION_TEMPERATURE)
        .and_then(Value::as_f64)
        .ok_or_else(rejected)?;

    let max_tokens = match options.get(OPTION_RESPONSE_TOKENS) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::Number(number)) if number.as_f64() == Some(0.0) => None,
        Some(value) => Some(
            value
                .as_u64()
                .and_then(|tokens| u32::try_from(tokens).ok())
                .ok_or_else(rejected)?,
        ),
    };

    Ok(IntakeModel {
        id,
        temperature,
        max_tokens,
    })
}
