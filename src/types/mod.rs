//! Shared data structures: the vendor-independent chat request and the uniform
//! update protocol relayed back to callers.
//!
//! Vendor dialects translate [`ChatGenerateRequest`] into their own wire format and
//! normalize whatever they stream back into [`StreamUpdate`] frames, so nothing
//! downstream of the dispatcher needs to know which vendor answered.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Chat role string compatible with vendor-specific semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn user() -> Self {
        Self("user".to_string())
    }

    pub fn assistant() -> Self {
        Self("assistant".to_string())
    }

    pub fn tool() -> Self {
        Self("tool".to_string())
    }
}

/// One conversation turn.
///
/// # Examples
///
/// ```
/// # use kotoba_relay::types::{ContentPart, Message, Role};
/// let msg = Message::text(Role::user(), "Describe this image");
/// assert_eq!(msg.content.len(), 1);
/// assert!(matches!(msg.content[0], ContentPart::Text(_)));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role associated with this message.
    pub role: Role,
    /// Optional vendor-specific name attribute.
    #[serde(default)]
    pub name: Option<String>,
    /// Multimodal content parts provided in order.
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl Message {
    /// Builds a single-part text message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            name: None,
            content: vec![ContentPart::Text(TextContent { text: text.into() })],
        }
    }
}

/// Multimodal content part covering text, media, tools, and vendor data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text(TextContent),
    Image(ImageContent),
    Audio(AudioContent),
    Video(VideoContent),
    /// URI-based file reference.
    File(FileContent),
    /// Tool invocation previously emitted by the assistant.
    ToolCall(ToolCall),
    /// Tool execution result authored by the tool role.
    ToolResult(ToolResult),
    /// Vendor wire part passed through as-is.
    Data { data: Value },
}

/// Textual content payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

/// Image payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub source: ImageSource,
    /// Optional detail hint, honored by OpenAI only.
    #[serde(default)]
    pub detail: Option<ImageDetail>,
}

/// Source for an image input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Public URL accessible by the vendor.
    Url { url: String },
    /// Base64-encoded inline payload.
    Base64 {
        data: String,
        mime_type: Option<String>,
    },
    /// Vendor-managed file identifier.
    FileId { file_id: String },
}

/// Detail preset requested for image inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

/// Audio payload attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioContent {
    pub source: MediaSource,
    pub mime_type: Option<String>,
}

/// Video payload attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoContent {
    pub source: MediaSource,
    pub mime_type: Option<String>,
}

/// File reference resolved by the vendor (File API URI, GCS path, file id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    pub file_uri: String,
    pub mime_type: Option<String>,
}

/// Media source shared by audio and video parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    /// base64 inline
    Inline { data: String },
    FileId { file_id: String },
    Url { url: String },
}

/// Declarative definition of a tool available to the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique name exposed to the model.
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema describing the input payload.
    pub input_schema: Option<Value>,
    pub kind: ToolKind,
}

/// Enumerates supported tool kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolKind {
    /// Custom function definition.
    Function,
    /// Vendor-hosted code execution sandbox.
    CodeExecution,
    /// Vendor-specific tool object forwarded verbatim.
    Custom { config: Value },
}

/// Tool call previously emitted by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Vendor-supplied invocation identifier.
    pub id: Option<String>,
    pub name: String,
    /// Structured arguments serialized as JSON.
    pub arguments: Value,
}

/// Result returned by a tool execution step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Correlated call identifier (OpenAI).
    pub call_id: Option<String>,
    /// Name of the function that produced the result (Gemini).
    pub name: Option<String>,
    pub output: Value,
    #[serde(default)]
    pub is_error: bool,
}

/// Vendor-independent chat generation request.
///
/// Model id, temperature and the output token cap are deliberately absent: they come
/// from the [`crate::intake::IntakeModel`] resolved for the logical model.
///
/// # Examples
///
/// ```
/// # use kotoba_relay::types::{ChatGenerateRequest, Message, Role};
/// let request = ChatGenerateRequest::new(vec![
///     Message::text(Role::system(), "You are concise."),
///     Message::text(Role::user(), "Summarize Rust traits."),
/// ]);
/// assert_eq!(request.messages.len(), 2);
/// assert!(request.tools.is_empty());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatGenerateRequest {
    /// Ordered conversation turns.
    pub messages: Vec<Message>,
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
}

impl ChatGenerateRequest {
    /// Creates a request with default options and no tools.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

/// Generation knobs beyond the intake model.
///
/// Vendors ignore the knobs they do not understand.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatOptions {
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub parallel_tool_calls: Option<bool>,
    /// Additional vendor-specific top-level body fields.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Tool-choice strategies supported across vendors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Vendor decides when to call tools.
    Auto,
    /// Vendor must invoke at least one tool.
    Any,
    /// Tools are disabled for the request.
    None,
    /// Force a specific tool by name.
    Tool { name: String },
    /// Vendor-native configuration passed through.
    Custom(Value),
}

/// Response-formatting modes supported by vendors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { schema: Value },
}

/// Token usage reported by the vendor, relayed through a [`StreamUpdate::Set`] frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

/// Identifiers carried by [`StreamUpdate::Issue`] frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// The request could not be translated into the vendor wire format.
    DispatchPrepare,
    /// The vendor answered with a non-success HTTP status.
    DispatchFetch,
    /// A streamed vendor frame failed to parse or validate.
    DispatchParse,
    /// The vendor itself reported a problem (blocked prompt, safety stop, truncation).
    DialectIssue,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::DispatchPrepare => "dispatch-prepare",
            IssueKind::DispatchFetch => "dispatch-fetch",
            IssueKind::DispatchParse => "dispatch-parse",
            IssueKind::DialectIssue => "dialect-issue",
        }
    }
}

/// Out-of-band state assignment carried by a `set` frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSet {
    /// Name of the model that actually served the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// State keys not modeled yet.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Uniform update frame relayed from any vendor.
///
/// Frames are strictly ordered; `t` and `issueText` are append-only contributions to
/// a single running transcript. Shapes this version does not recognize deserialize
/// into [`StreamUpdate::Unrecognized`] and are ignored by consumers.
///
/// # Examples
///
/// ```
/// # use kotoba_relay::types::StreamUpdate;
/// let frame: StreamUpdate = serde_json::from_str(r#"{"t":"Hel"}"#).unwrap();
/// assert_eq!(frame, StreamUpdate::text("Hel"));
///
/// let frame: StreamUpdate = serde_json::from_str(r#"{"issueId":"x","issueText":"!"}"#).unwrap();
/// assert!(matches!(frame, StreamUpdate::Issue { .. }));
///
/// let frame: StreamUpdate = serde_json::from_str(r#"{"ping":1}"#).unwrap();
/// assert!(matches!(frame, StreamUpdate::Unrecognized(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamUpdate {
    /// Incremental text delta.
    Text { t: String },
    /// State assignment.
    Set { set: StateSet },
    /// Recoverable problem rendered inline as transcript text.
    Issue {
        #[serde(rename = "issueId")]
        issue_id: String,
        #[serde(rename = "issueText")]
        issue_text: String,
    },
    /// Any frame shape not listed above.
    Unrecognized(Value),
}

impl StreamUpdate {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { t: text.into() }
    }

    /// `set` frame announcing the originating model.
    pub fn model(model: impl Into<String>) -> Self {
        Self::Set {
            set: StateSet {
                model: Some(model.into()),
                ..StateSet::default()
            },
        }
    }

    /// `set` frame carrying token usage only.
    pub fn usage(usage: TokenUsage) -> Self {
        Self::Set {
            set: StateSet {
                usage: Some(usage),
                ..StateSet::default()
            },
        }
    }

    pub fn issue(kind: IssueKind, text: impl Into<String>) -> Self {
        Self::Issue {
            issue_id: kind.as_str().to_string(),
            issue_text: text.into(),
        }
    }
}

/// Caller-facing update folded from the [`StreamUpdate`] sequence.
///
/// Each field is only present when the update changes it; the `done` flag travels
/// next to the update in the callback.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingClientUpdate {
    /// Whole transcript accumulated so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_so_far: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing: Option<bool>,
    /// Model reported by the vendor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_llm: Option<String>,
}

impl StreamingClientUpdate {
    /// Transcript update while the vendor is still producing output.
    pub fn typing_text(text: impl Into<String>) -> Self {
        Self {
            text_so_far: Some(text.into()),
            typing: Some(true),
            origin_llm: None,
        }
    }

    pub fn origin(model: impl Into<String>) -> Self {
        Self {
            origin_llm: Some(model.into()),
            ..Self::default()
        }
    }

    /// The single terminal update of a request.
    pub fn terminal() -> Self {
        Self {
            typing: Some(false),
            ..Self::default()
        }
    }
}
