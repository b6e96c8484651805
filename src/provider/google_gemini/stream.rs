use tracing::debug;
use validator::Validate;

use crate::error::LLMError;
use crate::provider::ChunkParser;
use crate::types::{IssueKind, StreamUpdate, TokenUsage};

use super::PROVIDER_NAME;
use super::wiretypes::{
    GeminiBlockReason, GeminiCandidate, GeminiFinishReason, GeminiGenerateContentResponse,
    GeminiPart, GeminiSafetyRating, GeminiUsageMetadata, most_severe_rating,
};

/// Normalizes Gemini `GenerateContentResponse` payloads into uniform updates.
///
/// Works for both a streamed chunk and the whole non-streaming body. The first payload
/// announces the serving model. A blocked prompt terminates the parser.
pub(crate) struct GeminiChunkParser {
    requested_model: String,
    model_announced: bool,
    terminated: bool,
}

impl GeminiChunkParser {
    pub(crate) fn new(requested_model: impl Into<String>) -> Self {
        Self {
            requested_model: requested_model.into(),
            model_announced: false,
            terminated: false,
        }
    }

    fn normalize(&mut self, chunk: GeminiGenerateContentResponse) -> Vec<StreamUpdate> {
        let mut updates = Vec::new();

        if !self.model_announced {
            self.model_announced = true;
            let model = chunk
                .model_version
                .clone()
                .unwrap_or_else(|| self.requested_model.clone());
            updates.push(StreamUpdate::model(model));
        }

        if let Some(feedback) = &chunk.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                let detail = describe_ratings(feedback.safety_ratings.as_deref());
                updates.push(gemini_issue(format!(
                    "Prompt blocked ({}){detail}",
                    block_reason_name(reason)
                )));
                self.terminated = true;
                return updates;
            }
        }

        if chunk.candidates.len() > 1 {
            debug!(
                candidates = chunk.candidates.len(),
                "ignoring Gemini candidates beyond the first"
            );
        }
        if let Some(candidate) = chunk.candidates.into_iter().next() {
            normalize_candidate(candidate, &mut updates);
        }

        if let Some(usage) = chunk.usage_metadata {
            updates.push(StreamUpdate::usage(convert_usage(usage)));
        }

        updates
    }
}

impl ChunkParser for GeminiChunkParser {
    fn parse_chunk(&mut self, payload: &str) -> Result<Vec<StreamUpdate>, LLMError> {
        let chunk: GeminiGenerateContentResponse =
            serde_json::from_str(payload).map_err(|err| {
                LLMError::provider(PROVIDER_NAME, format!("failed to parse Gemini chunk: {err}"))
            })?;
        chunk.validate()?;
        Ok(self.normalize(chunk))
    }

    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

fn normalize_candidate(candidate: GeminiCandidate, updates: &mut Vec<StreamUpdate>) {
    let GeminiCandidate {
        content,
        finish_reason,
        safety_ratings,
        ..
    } = candidate;

    for part in content.map(|content| content.parts).unwrap_or_default() {
        match part {
            GeminiPart::Text { text } => {
                if !text.is_empty() {
                    updates.push(StreamUpdate::text(text));
                }
            }
            GeminiPart::FunctionCall { function_call } => {
                let args = serde_json::Value::Object(function_call.args);
                updates.push(StreamUpdate::text(format!(
                    "\n```function_call\n{}({args})\n```\n",
                    function_call.name
                )));
            }
            GeminiPart::ExecutableCode { executable_code } => {
                let language = executable_code
                    .language
                    .map(|language| language.to_ascii_lowercase())
                    .unwrap_or_default();
                updates.push(StreamUpdate::text(format!(
                    "\n```{language}\n{}\n```\n",
                    executable_code.code.trim_end()
                )));
            }
            GeminiPart::CodeExecutionResult {
                code_execution_result,
            } => {
                let output = code_execution_result.output.unwrap_or_default();
                updates.push(StreamUpdate::text(format!(
                    "\n```\n{}\n```\n",
                    output.trim_end()
                )));
                if let Some(outcome) = code_execution_result
                    .outcome
                    .filter(|outcome| outcome != "OUTCOME_OK")
                {
                    updates.push(gemini_issue(format!("Code execution finished with {outcome}")));
                }
            }
            GeminiPart::InlineData { inline_data } => {
                updates.push(gemini_issue(format!(
                    "Unsupported inline data in response ({})",
                    inline_data.mime_type
                )));
            }
            GeminiPart::FileData { file_data } => {
                updates.push(gemini_issue(format!(
                    "Unsupported file reference in response ({})",
                    file_data.file_uri
                )));
            }
            GeminiPart::FunctionResponse { function_response } => {
                updates.push(gemini_issue(format!(
                    "Unexpected function response for `{}` in model output",
                    function_response.name
                )));
            }
        }
    }

    match finish_reason {
        None
        | Some(GeminiFinishReason::Stop)
        | Some(GeminiFinishReason::FinishReasonUnspecified) => {}
        Some(GeminiFinishReason::MaxTokens) => {
            updates.push(gemini_issue("Response truncated at the output token limit"));
        }
        Some(GeminiFinishReason::Safety) => {
            let detail = describe_ratings(safety_ratings.as_deref());
            updates.push(gemini_issue(format!("Response stopped for safety{detail}")));
        }
        Some(GeminiFinishReason::Recitation) => {
            updates.push(gemini_issue("Response stopped for recitation"));
        }
        Some(GeminiFinishReason::Other) => {
            updates.push(gemini_issue("Response stopped for an unspecified reason"));
        }
        Some(GeminiFinishReason::Unknown) => {
            let detail = describe_ratings(safety_ratings.as_deref());
            updates.push(gemini_issue(format!(
                "Response stopped for an unrecognized reason{detail}"
            )));
        }
    }
}

fn gemini_issue(detail: impl AsRef<str>) -> StreamUpdate {
    StreamUpdate::issue(
        IssueKind::DialectIssue,
        format!(" [Gemini Issue] {}", detail.as_ref()),
    )
}

fn describe_ratings(ratings: Option<&[GeminiSafetyRating]>) -> String {
    ratings
        .and_then(most_severe_rating)
        .map(|rating| {
            format!(
                ": {} is {}",
                rating.category.as_str(),
                rating.probability.as_str()
            )
        })
        .unwrap_or_default()
}

fn block_reason_name(reason: GeminiBlockReason) -> &'static str {
    match reason {
        GeminiBlockReason::BlockReasonUnspecified => "BLOCK_REASON_UNSPECIFIED",
        GeminiBlockReason::Safety => "SAFETY",
        GeminiBlockReason::Other => "OTHER",
        GeminiBlockReason::Unknown => "UNRECOGNIZED",
    }
}

fn convert_usage(usage: GeminiUsageMetadata) -> TokenUsage {
    TokenUsage {
        prompt_tokens: Some(usage.prompt_token_count),
        completion_tokens: Some(usage.candidates_token_count),
        cached_tokens: usage.cached_content_token_count,
        total_tokens: Some(usage.total_token_count),
    }
}
