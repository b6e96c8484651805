//! Wire schema of the Gemini Generative Language API (`v1beta`).
//!
//! Request types validate what the relay sends; response types validate what the
//! vendor streams back. Fields not modeled here are preserved in `extra` maps so a
//! newer API revision does not break parsing.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

/// `GET` path listing every model visible to the key.
pub const GEMINI_MODELS_LIST_PATH: &str = "/v1beta/models?pageSize=1000";

/// `POST /v1beta/{model}:generateContent`.
pub fn generate_content_path(model: &str) -> String {
    format!("/v1beta/{}:generateContent", normalize_model_name(model))
}

/// `POST /v1beta/{model}:streamGenerateContent?alt=sse`.
pub fn stream_generate_content_path(model: &str) -> String {
    format!(
        "/v1beta/{}:streamGenerateContent?alt=sse",
        normalize_model_name(model)
    )
}

/// Ensures the `models/` resource prefix.
pub fn normalize_model_name(model: &str) -> Cow<'_, str> {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        Cow::Borrowed(model)
    } else {
        Cow::Owned(format!("models/{model}"))
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Body of `generateContent` / `streamGenerateContent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_content_roles"))]
pub struct GeminiGenerateContentRequest {
    #[validate(length(min = 1, message = "at least one content is required"))]
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<GeminiToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Vec<GeminiSafetySetting>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub generation_config: Option<GeminiGenerationConfig>,
}

fn validate_content_roles(request: &GeminiGenerateContentRequest) -> Result<(), ValidationError> {
    if request.contents.len() > 1 && request.contents.iter().any(|c| c.role.is_none()) {
        let mut err = ValidationError::new("content_role");
        err.message = Some(Cow::Borrowed(
            "every content needs a role when more than one is present",
        ));
        return Err(err);
    }
    Ok(())
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<GeminiRole>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeminiRole {
    User,
    Model,
}

/// Content part. Exactly one payload key is present on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiBlob,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: GeminiFileData,
    },
    /// Code produced by the code execution tool.
    ExecutableCode {
        #[serde(rename = "executableCode")]
        executable_code: GeminiExecutableCode,
    },
    /// Output of running [`GeminiPart::ExecutableCode`].
    CodeExecutionResult {
        #[serde(rename = "codeExecutionResult")]
        code_execution_result: GeminiCodeExecutionResult,
    },
}

impl GeminiPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Raw media bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiBlob {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: Map<String, Value>,
}

/// URI based data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub file_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiExecutableCode {
    #[serde(default)]
    pub language: Option<String>,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiCodeExecutionResult {
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiTool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_execution: Option<GeminiCodeExecution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_declarations: Option<Vec<GeminiFunctionDeclaration>>,
}

/// Enables the hosted code sandbox. Serialized as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeminiCodeExecution {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionDeclaration {
    pub name: String,
    pub description: String,
    /// OpenAPI schema subset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiToolConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_calling_config: Option<GeminiFunctionCallingConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiFunctionCallingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<GeminiFunctionCallingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GeminiFunctionCallingMode {
    /// The model picks between a function call and a text answer.
    Auto,
    /// The model must call one of the allowed functions.
    Any,
    /// Behaves as if no functions were declared.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "HARM_CATEGORY_DEROGATORY")]
    Derogatory,
    #[serde(rename = "HARM_CATEGORY_TOXICITY")]
    Toxicity,
    #[serde(rename = "HARM_CATEGORY_VIOLENCE")]
    Violence,
    #[serde(rename = "HARM_CATEGORY_SEXUAL")]
    Sexual,
    #[serde(rename = "HARM_CATEGORY_MEDICAL")]
    Medical,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS")]
    Dangerous,
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

impl HarmCategory {
    /// Categories accepted by `safetySettings` on Gemini models.
    pub const GEMINI: [HarmCategory; 4] = [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HarmCategory::Unspecified => "HARM_CATEGORY_UNSPECIFIED",
            HarmCategory::Derogatory => "HARM_CATEGORY_DEROGATORY",
            HarmCategory::Toxicity => "HARM_CATEGORY_TOXICITY",
            HarmCategory::Violence => "HARM_CATEGORY_VIOLENCE",
            HarmCategory::Sexual => "HARM_CATEGORY_SEXUAL",
            HarmCategory::Medical => "HARM_CATEGORY_MEDICAL",
            HarmCategory::Dangerous => "HARM_CATEGORY_DANGEROUS",
            HarmCategory::Harassment => "HARM_CATEGORY_HARASSMENT",
            HarmCategory::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            HarmCategory::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            HarmCategory::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
        }
    }
}

/// Minimum probability at which content gets blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    HarmBlockThresholdUnspecified,
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiSafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// System prompt, text parts only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiSystemInstruction {
    pub parts: Vec<GeminiTextPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiTextPart {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeminiResponseMimeType {
    #[serde(rename = "text/plain")]
    TextPlain,
    #[serde(rename = "application/json")]
    ApplicationJson,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Defaults to `text/plain` server-side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<GeminiResponseMimeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// One `generateContent` response, or one chunk of a streamed one.
///
/// Either every requested candidate is present or none is; an empty candidate list is
/// only valid when the prompt itself was blocked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_blocked_prompt"))]
pub struct GeminiGenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    /// Only sent on the first chunk of a stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<GeminiPromptFeedback>,
    /// Usually only on the last chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn validate_blocked_prompt(
    response: &GeminiGenerateContentResponse,
) -> Result<(), ValidationError> {
    let blocked = response
        .prompt_feedback
        .as_ref()
        .is_some_and(|feedback| feedback.block_reason.is_some());
    if response.candidates.is_empty() && !blocked {
        let mut err = ValidationError::new("candidates");
        err.message = Some(Cow::Borrowed(
            "response has no candidates and no prompt block reason",
        ));
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub index: u32,
    /// Can be missing when generation stopped early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<GeminiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<GeminiFinishReason>,
    /// Absent when `finishReason` is `RECITATION`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_ratings: Option<Vec<GeminiSafetyRating>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_metadata: Option<GeminiCitationMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeminiFinishReason {
    FinishReasonUnspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
    /// Reasons added by the API later, e.g. `PROHIBITED_CONTENT` or `SPII`.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeminiBlockReason {
    BlockReasonUnspecified,
    Safety,
    Other,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmProbability {
    HarmProbabilityUnspecified,
    Negligible,
    Low,
    Medium,
    High,
}

impl HarmProbability {
    /// Severity rank; unspecified sorts below `NEGLIGIBLE`.
    pub fn rank(self) -> i8 {
        match self {
            HarmProbability::HarmProbabilityUnspecified => -1,
            HarmProbability::Negligible => 0,
            HarmProbability::Low => 1,
            HarmProbability::Medium => 2,
            HarmProbability::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HarmProbability::HarmProbabilityUnspecified => "HARM_PROBABILITY_UNSPECIFIED",
            HarmProbability::Negligible => "NEGLIGIBLE",
            HarmProbability::Low => "LOW",
            HarmProbability::Medium => "MEDIUM",
            HarmProbability::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiSafetyRating {
    pub category: HarmCategory,
    pub probability: HarmProbability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
}

/// Orders ratings by probability: `NEGLIGIBLE < LOW < MEDIUM < HIGH`.
pub fn harm_probability_order(a: &GeminiSafetyRating, b: &GeminiSafetyRating) -> Ordering {
    a.probability.rank().cmp(&b.probability.rank())
}

/// Sorts ascending by probability; equal probabilities keep their input order.
pub fn sort_safety_ratings(ratings: &mut [GeminiSafetyRating]) {
    ratings.sort_by(harm_probability_order);
}

/// First rating carrying the highest probability.
pub fn most_severe_rating(ratings: &[GeminiSafetyRating]) -> Option<&GeminiSafetyRating> {
    ratings
        .iter()
        .rev()
        .max_by(|a, b| harm_probability_order(a, b))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCitationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citation_sources: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<GeminiBlockReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_ratings: Option<Vec<GeminiSafetyRating>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsageMetadata {
    pub prompt_token_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<u64>,
    /// Omitted by the API on chunks that produced no candidate tokens.
    #[serde(default)]
    pub candidates_token_count: u64,
    pub total_token_count: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// models.list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GeminiModel {
    /// Resource name, e.g. `models/gemini-1.5-pro-001`.
    pub name: String,
    pub version: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 1))]
    pub input_token_limit: u32,
    #[validate(range(min = 1))]
    pub output_token_limit: u32,
    pub supported_generation_methods: Vec<GeminiGenerationMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl GeminiModel {
    pub fn supports(&self, method: GeminiGenerationMethod) -> bool {
        self.supported_generation_methods.contains(&method)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GeminiGenerationMethod {
    CreateCachedContent,
    CountMessageTokens,
    CountTextTokens,
    CountTokens,
    CreateTunedModel,
    CreateTunedTextModel,
    EmbedContent,
    EmbedText,
    GenerateAnswer,
    GenerateContent,
    GenerateMessage,
    GenerateText,
    /// Methods introduced after this list was written.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeminiModelsList {
    #[serde(default)]
    #[validate(nested)]
    pub models: Vec<GeminiModel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rating(probability: HarmProbability, category: HarmCategory) -> GeminiSafetyRating {
        GeminiSafetyRating {
            category,
            probability,
            blocked: None,
        }
    }

    #[test]
    fn paths_prefix_models_resource() {
        assert_eq!(
            stream_generate_content_path("gemini-1.5-flash"),
            "/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            generate_content_path("models/gemini-1.5-pro"),
            "/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn harm_ordering_is_stable_and_ranks_unspecified_lowest() {
        let mut ratings = vec![
            rating(HarmProbability::High, HarmCategory::Harassment),
            rating(HarmProbability::Low, HarmCategory::HateSpeech),
            rating(HarmProbability::HarmProbabilityUnspecified, HarmCategory::Sexual),
            rating(HarmProbability::Low, HarmCategory::DangerousContent),
            rating(HarmProbability::Negligible, HarmCategory::Violence),
        ];
        sort_safety_ratings(&mut ratings);

        let order: Vec<_> = ratings.iter().map(|r| r.category).collect();
        assert_eq!(
            order,
            vec![
                HarmCategory::Sexual,
                HarmCategory::Violence,
                HarmCategory::HateSpeech,
                HarmCategory::DangerousContent,
                HarmCategory::Harassment,
            ]
        );
    }

    #[test]
    fn most_severe_prefers_the_first_of_equal_ratings() {
        let ratings = [
            rating(HarmProbability::Medium, HarmCategory::Harassment),
            rating(HarmProbability::Medium, HarmCategory::HateSpeech),
            rating(HarmProbability::Low, HarmCategory::Sexual),
        ];
        let worst = most_severe_rating(&ratings).expect("non-empty");
        assert_eq!(worst.category, HarmCategory::Harassment);
        assert!(most_severe_rating(&[]).is_none());
    }

    #[test]
    fn request_requires_contents_and_roles_for_multi_turn() {
        let empty = GeminiGenerateContentRequest::default();
        assert!(empty.validate().is_err());

        let single = GeminiGenerateContentRequest {
            contents: vec![GeminiContent {
                role: None,
                parts: vec![GeminiPart::text("hi")],
            }],
            ..Default::default()
        };
        assert!(single.validate().is_ok());

        let ambiguous = GeminiGenerateContentRequest {
            contents: vec![
                GeminiContent {
                    role: Some(GeminiRole::User),
                    parts: vec![GeminiPart::text("hi")],
                },
                GeminiContent {
                    role: None,
                    parts: vec![GeminiPart::text("hello")],
                },
            ],
            ..Default::default()
        };
        assert!(ambiguous.validate().is_err());
    }

    #[test]
    fn generation_config_ranges_are_enforced() {
        let mut request = GeminiGenerateContentRequest {
            contents: vec![GeminiContent {
                role: Some(GeminiRole::User),
                parts: vec![GeminiPart::text("hi")],
            }],
            generation_config: Some(GeminiGenerationConfig {
                temperature: Some(2.5),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(request.validate().is_err());

        request.generation_config = Some(GeminiGenerationConfig {
            temperature: Some(2.0),
            top_p: Some(1.0),
            max_output_tokens: Some(0),
            ..Default::default()
        });
        assert!(request.validate().is_err());

        request.generation_config = Some(GeminiGenerationConfig {
            candidate_count: Some(1),
            max_output_tokens: Some(1),
            top_k: Some(40),
            ..Default::default()
        });
        assert!(request.validate().is_ok());
    }

    #[test]
    fn request_serializes_with_camel_case_keys() {
        let request = GeminiGenerateContentRequest {
            contents: vec![GeminiContent {
                role: Some(GeminiRole::User),
                parts: vec![GeminiPart::InlineData {
                    inline_data: GeminiBlob {
                        mime_type: "image/png".to_string(),
                        data: "AAAA".to_string(),
                    },
                }],
            }],
            tools: Some(vec![GeminiTool {
                code_execution: Some(GeminiCodeExecution {}),
                function_declarations: None,
            }]),
            safety_settings: Some(vec![GeminiSafetySetting {
                category: HarmCategory::HateSpeech,
                threshold: HarmBlockThreshold::BlockOnlyHigh,
            }]),
            generation_config: Some(GeminiGenerationConfig {
                response_mime_type: Some(GeminiResponseMimeType::ApplicationJson),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [{ "inlineData": { "mimeType": "image/png", "data": "AAAA" } }]
                }],
                "tools": [{ "codeExecution": {} }],
                "safetySettings": [{
                    "category": "HARM_CATEGORY_HATE_SPEECH",
                    "threshold": "BLOCK_ONLY_HIGH"
                }],
                "generationConfig": { "responseMimeType": "application/json" }
            })
        );
    }

    #[test]
    fn response_parts_deserialize_by_payload_key() {
        let response: GeminiGenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "index": 0,
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Hi" },
                        { "functionCall": { "name": "lookup", "args": { "q": "rust" } } },
                        { "executableCode": { "language": "PYTHON", "code": "print(1)" } },
                        { "codeExecutionResult": { "outcome": "OUTCOME_OK", "output": "1\n" } }
                    ]
                },
                "finishReason": "STOP",
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE" }
                ],
                "avgLogprobs": -0.1
            }],
            "usageMetadata": { "promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6 },
            "modelVersion": "gemini-1.5-flash-002"
        }))
        .expect("valid response");

        assert!(response.validate().is_ok());
        let candidate = &response.candidates[0];
        assert_eq!(candidate.finish_reason, Some(GeminiFinishReason::Stop));
        assert_eq!(candidate.extra.get("avgLogprobs"), Some(&json!(-0.1)));
        let parts = &candidate.content.as_ref().expect("content").parts;
        assert!(matches!(parts[0], GeminiPart::Text { .. }));
        assert!(matches!(parts[1], GeminiPart::FunctionCall { .. }));
        assert!(matches!(parts[2], GeminiPart::ExecutableCode { .. }));
        assert!(matches!(parts[3], GeminiPart::CodeExecutionResult { .. }));
    }

    #[test]
    fn zero_candidates_need_a_block_reason() {
        let unexplained: GeminiGenerateContentResponse =
            serde_json::from_value(json!({ "candidates": [] })).expect("parses");
        assert!(unexplained.validate().is_err());

        let blocked: GeminiGenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {
                "blockReason": "SAFETY",
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH", "blocked": true }
                ]
            }
        }))
        .expect("parses");
        assert!(blocked.validate().is_ok());
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let result = serde_json::from_value::<GeminiGenerateContentResponse>(json!({
            "candidates": [{ "index": 0, "finishReason": "SOMETHING_NEW" }]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn models_list_validates_token_limits() {
        let list: GeminiModelsList = serde_json::from_value(json!({
            "models": [{
                "name": "models/gemini-1.5-pro-001",
                "version": "001",
                "displayName": "Gemini 1.5 Pro",
                "description": "Mid-size multimodal model",
                "inputTokenLimit": 2097152,
                "outputTokenLimit": 8192,
                "supportedGenerationMethods": ["generateContent", "countTokens", "bidiGenerateContent"],
                "temperature": 1.0,
                "topP": 0.95,
                "topK": 64
            }]
        }))
        .expect("parses");
        assert!(list.validate().is_ok());
        let model = &list.models[0];
        assert!(model.supports(GeminiGenerationMethod::GenerateContent));
        assert_eq!(
            model.supported_generation_methods[2],
            GeminiGenerationMethod::Unknown
        );

        let mut broken = list.clone();
        broken.models[0].output_token_limit = 0;
        assert!(broken.validate().is_err());
    }

    fn reserialized(input: &Value) -> Value {
        let response: GeminiGenerateContentResponse =
            serde_json::from_value(input.clone()).expect("parses");
        assert!(response.validate().is_ok(), "{response:?}");
        serde_json::to_value(&response).expect("serializes")
    }

    #[test]
    fn conforming_responses_survive_validation_unchanged() {
        let full = json!({
            "candidates": [{
                "index": 0,
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Here you go." },
                        { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } },
                        { "functionCall": { "name": "lookup", "args": { "q": "rust", "limit": 3 } } },
                        { "functionResponse": { "name": "lookup", "response": { "hits": ["a", "b"] } } },
                        { "fileData": { "mimeType": "application/pdf", "fileUri": "https://generativelanguage.googleapis.com/v1beta/files/abc" } },
                        { "executableCode": { "language": "PYTHON", "code": "print(1)" } },
                        { "codeExecutionResult": { "outcome": "OUTCOME_OK", "output": "1\n" } }
                    ]
                },
                "finishReason": "STOP",
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE" },
                    { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "LOW", "blocked": false }
                ],
                "citationMetadata": {
                    "citationSources": [
                        { "startIndex": 0, "endIndex": 12, "uri": "https://example.com/a", "license": "MIT" }
                    ]
                },
                "tokenCount": 42
            }],
            "promptFeedback": {
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_HATE_SPEECH", "probability": "NEGLIGIBLE" }
                ]
            },
            "usageMetadata": {
                "promptTokenCount": 10,
                "cachedContentTokenCount": 4,
                "candidatesTokenCount": 42,
                "totalTokenCount": 52
            },
            "modelVersion": "gemini-1.5-flash-002",
            "responseId": "resp-1"
        });
        assert_eq!(reserialized(&full), full);

        let blocked = json!({
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "safetyRatings": [
                    { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH", "blocked": true }
                ]
            },
            "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 0, "totalTokenCount": 7 }
        });
        assert_eq!(reserialized(&blocked), blocked);
    }

    #[test]
    fn unlisted_finish_reasons_deserialize_as_unknown() {
        let candidate: GeminiCandidate = serde_json::from_value(json!({
            "index": 0,
            "finishReason": "MALFORMED_FUNCTION_CALL"
        }))
        .expect("parses");
        assert_eq!(candidate.finish_reason, Some(GeminiFinishReason::Unknown));
    }
}
