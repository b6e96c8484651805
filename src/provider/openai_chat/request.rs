use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::intake::IntakeModel;
use crate::types::{
    AudioContent, ChatGenerateRequest, ContentPart, FileContent, ImageContent, ImageDetail,
    ImageSource, MediaSource, Message, ResponseFormat, TextContent, ToolCall, ToolChoice,
    ToolDefinition, ToolKind, VideoContent,
};

/// 构建 Chat Completions 请求体
///
/// `options.extra` is merged later by the caller, so it can override anything here.
pub(crate) fn build_openai_body(
    request: &ChatGenerateRequest,
    model: &IntakeModel,
    stream: bool,
) -> Result<Value, LLMError> {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.id.clone()));
    body.insert(
        "messages".to_string(),
        Value::Array(convert_messages(&request.messages)?),
    );
    body.insert("temperature".to_string(), Value::from(model.temperature));
    if let Some(max_tokens) = model.max_tokens {
        body.insert("max_completion_tokens".to_string(), Value::from(max_tokens));
    }

    let options = &request.options;
    if let Some(top_p) = options.top_p {
        body.insert("top_p".to_string(), Value::from(top_p));
    }
    if !options.stop_sequences.is_empty() {
        body.insert("stop".to_string(), json!(options.stop_sequences));
    }
    if let Some(penalty) = options.presence_penalty {
        body.insert("presence_penalty".to_string(), Value::from(penalty));
    }
    if let Some(penalty) = options.frequency_penalty {
        body.insert("frequency_penalty".to_string(), Value::from(penalty));
    }
    if let Some(parallel) = options.parallel_tool_calls {
        body.insert("parallel_tool_calls".to_string(), Value::from(parallel));
    }

    if !request.tools.is_empty() {
        body.insert(
            "tools".to_string(),
            Value::Array(convert_tools(&request.tools)?),
        );
    }
    if let Some(choice) = &request.tool_choice {
        body.insert("tool_choice".to_string(), convert_tool_choice(choice));
    }
    if let Some(format) = &request.response_format {
        body.insert(
            "response_format".to_string(),
            convert_response_format(format),
        );
    }

    body.insert("stream".to_string(), Value::Bool(stream));
    if stream {
        body.insert(
            "stream_options".to_string(),
            json!({ "include_usage": true }),
        );
    }
    Ok(Value::Object(body))
}

fn convert_messages(messages: &[Message]) -> Result<Vec<Value>, LLMError> {
    messages.iter().map(convert_message).collect()
}

fn convert_message(message: &Message) -> Result<Value, LLMError> {
    let mut obj = Map::new();
    obj.insert("role".to_string(), Value::String(message.role.0.clone()));
    if let Some(name) = &message.name {
        obj.insert("name".to_string(), Value::String(name.clone()));
    }

    let mut content_parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut tool_results = Vec::new();

    for part in &message.content {
        match part {
            ContentPart::ToolCall(call) => tool_calls.push(convert_tool_call(call)?),
            ContentPart::ToolResult(result) => tool_results.push(result),
            _ => content_parts.push(convert_content_part(part)?),
        }
    }

    if message.role.0 == "tool" {
        if tool_results.len() > 1 {
            return Err(LLMError::Validation {
                message: "tool role expects a single ToolResult content".to_string(),
            });
        }
        if let Some(result) = tool_results.first() {
            let content = match &result.output {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            let call_id = result.call_id.clone().ok_or_else(|| LLMError::Validation {
                message: "tool message missing call_id".to_string(),
            })?;
            obj.insert("tool_call_id".to_string(), Value::String(call_id));
            obj.insert("content".to_string(), Value::String(content));
        } else {
            obj.insert("content".to_string(), Value::Null);
        }
    } else {
        obj.insert(
            "content".to_string(),
            if content_parts.is_empty() {
                Value::Null
            } else {
                Value::Array(content_parts)
            },
        );
        if !tool_calls.is_empty() {
            obj.insert("tool_calls".to_string(), Value::Array(tool_calls));
        }
    }

    Ok(Value::Object(obj))
}

fn convert_content_part(part: &ContentPart) -> Result<Value, LLMError> {
    match part {
        ContentPart::Text(TextContent { text }) => Ok(json!({"type": "text", "text": text})),
        ContentPart::Image(ImageContent { source, detail }) => {
            let detail = detail.as_ref().map(format_image_detail).unwrap_or("auto");
            match source {
                ImageSource::Url { url } => Ok(json!({
                    "type": "image_url",
                    "image_url": { "url": url, "detail": detail }
                })),
                ImageSource::Base64 { data, mime_type } => {
                    let mime = mime_type.as_deref().unwrap_or("application/octet-stream");
                    Ok(json!({
                        "type": "image_url",
                        "image_url": { "url": format!("data:{mime};base64,{data}"), "detail": detail }
                    }))
                }
                ImageSource::FileId { .. } => Err(LLMError::Validation {
                    message: "OpenAI Chat images must be URLs or inline data".to_string(),
                }),
            }
        }
        ContentPart::Audio(AudioContent { source, mime_type }) => match source {
            MediaSource::Inline { data } => Ok(json!({
                "type": "input_audio",
                "input_audio": {
                    "data": data,
                    "format": audio_format(mime_type.as_deref())
                }
            })),
            _ => Err(LLMError::Validation {
                message: "OpenAI Chat audio must be inline base64 data".to_string(),
            }),
        },
        // Chat Completions only references uploads by their `file-…` id.
        ContentPart::File(FileContent { file_uri, .. }) if file_uri.starts_with("file-") => {
            Ok(json!({
                "type": "file",
                "file": { "file_id": file_uri }
            }))
        }
        ContentPart::File(FileContent { file_uri, .. }) => Err(LLMError::Validation {
            message: format!("OpenAI Chat files must be uploaded file ids, got `{file_uri}`"),
        }),
        ContentPart::Video(VideoContent { .. }) => Err(LLMError::Validation {
            message: "OpenAI Chat does not accept video input".to_string(),
        }),
        ContentPart::Data { data } => Ok(data.clone()),
        ContentPart::ToolCall(_) | ContentPart::ToolResult(_) => Err(LLMError::Validation {
            message: "tool content must use dedicated structs".to_string(),
        }),
    }
}

fn convert_tool_call(call: &ToolCall) -> Result<Value, LLMError> {
    let arguments = serde_json::to_string(&call.arguments).map_err(|err| LLMError::Validation {
        message: format!("invalid tool arguments: {err}"),
    })?;
    let mut obj = Map::new();
    if let Some(id) = &call.id {
        obj.insert("id".to_string(), Value::String(id.clone()));
    }
    obj.insert("type".to_string(), Value::String("function".to_string()));
    obj.insert(
        "function".to_string(),
        json!({
            "name": call.name,
            "arguments": arguments
        }),
    );
    Ok(Value::Object(obj))
}

fn convert_tools(tools: &[ToolDefinition]) -> Result<Vec<Value>, LLMError> {
    tools
        .iter()
        .map(|tool| match &tool.kind {
            ToolKind::Function => Ok(json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema
                }
            })),
            ToolKind::Custom { config } => Ok(config.clone()),
            ToolKind::CodeExecution => Err(LLMError::Validation {
                message: "OpenAI Chat does not offer a code execution tool".to_string(),
            }),
        })
        .collect()
}

fn convert_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::String("auto".to_string()),
        ToolChoice::Any => Value::String("required".to_string()),
        ToolChoice::None => Value::String("none".to_string()),
        ToolChoice::Tool { name } => json!({
            "type": "function",
            "function": { "name": name }
        }),
        ToolChoice::Custom(value) => value.clone(),
    }
}

fn convert_response_format(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({ "type": "text" }),
        ResponseFormat::JsonObject => json!({ "type": "json_object" }),
        ResponseFormat::JsonSchema { schema } => {
            json!({ "type": "json_schema", "json_schema": schema })
        }
    }
}

fn format_image_detail(detail: &ImageDetail) -> &'static str {
    match detail {
        ImageDetail::Low => "low",
        ImageDetail::High => "high",
        ImageDetail::Auto => "auto",
    }
}

/// `audio/mpeg` → `mp3`, otherwise the MIME subtype; `wav` when absent.
fn audio_format(mime_type: Option<&str>) -> &str {
    match mime_type {
        None => "wav",
        Some("audio/mpeg" | "audio/mp3") => "mp3",
        Some(mime) => mime.rsplit('/').next().unwrap_or(mime),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, ToolResult};

    fn model() -> IntakeModel {
        IntakeModel {
            id: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: Some(512),
        }
    }

    #[test]
    fn body_takes_model_parameters_from_intake() {
        let mut request = ChatGenerateRequest::new(vec![
            Message::text(Role::system(), "be brief"),
            Message::text(Role::user(), "hello"),
        ]);
        request.options.stop_sequences = vec!["END".to_string()];

        let body = build_openai_body(&request, &model(), true).expect("body");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_completion_tokens"], 512);
        assert_eq!(body["stop"], json!(["END"]));
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"], json!({ "include_usage": true }));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"][0]["text"], "hello");

        let body = build_openai_body(&request, &model(), false).expect("body");
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn tool_turns_convert_to_tool_calls_and_tool_messages() {
        let request = ChatGenerateRequest::new(vec![
            Message {
                role: Role::assistant(),
                name: None,
                content: vec![ContentPart::ToolCall(ToolCall {
                    id: Some("call_1".to_string()),
                    name: "lookup".to_string(),
                    arguments: json!({ "q": "rust" }),
                })],
            },
            Message {
                role: Role::tool(),
                name: None,
                content: vec![ContentPart::ToolResult(ToolResult {
                    call_id: Some("call_1".to_string()),
                    name: None,
                    output: json!({ "hits": 3 }),
                    is_error: false,
                })],
            },
        ]);

        let body = build_openai_body(&request, &model(), false).expect("body");
        let call = &body["messages"][0]["tool_calls"][0];
        assert_eq!(call["id"], "call_1");
        assert_eq!(call["function"]["arguments"], "{\"q\":\"rust\"}");
        assert_eq!(body["messages"][1]["tool_call_id"], "call_1");
        assert_eq!(body["messages"][1]["content"], "{\"hits\":3}");
    }

    #[test]
    fn unsupported_parts_are_rejected() {
        let request = ChatGenerateRequest::new(vec![Message {
            role: Role::user(),
            name: None,
            content: vec![ContentPart::Video(VideoContent {
                source: MediaSource::Url {
                    url: "https://example.com/v.mp4".to_string(),
                },
                mime_type: Some("video/mp4".to_string()),
            })],
        }]);
        assert!(matches!(
            build_openai_body(&request, &model(), true),
            Err(LLMError::Validation { .. })
        ));
    }

    #[test]
    fn files_must_be_uploaded_ids() {
        let with_file = |file_uri: &str| {
            ChatGenerateRequest::new(vec![Message {
                role: Role::user(),
                name: None,
                content: vec![ContentPart::File(FileContent {
                    file_uri: file_uri.to_string(),
                    mime_type: Some("application/pdf".to_string()),
                })],
            }])
        };

        let body = build_openai_body(&with_file("file-abc123"), &model(), false).expect("body");
        assert_eq!(
            body["messages"][0]["content"][0],
            json!({ "type": "file", "file": { "file_id": "file-abc123" } })
        );

        match build_openai_body(
            &with_file("https://generativelanguage.googleapis.com/v1beta/files/x"),
            &model(),
            false,
        ) {
            Err(LLMError::Validation { message }) => assert!(message.contains("uploaded file ids")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn audio_format_derives_from_mime_type() {
        assert_eq!(audio_format(None), "wav");
        assert_eq!(audio_format(Some("audio/mpeg")), "mp3");
        assert_eq!(audio_format(Some("audio/flac")), "flac");
    }
}
