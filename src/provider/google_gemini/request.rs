use serde_json::{Map, Value};
use validator::Validate;

use crate::error::LLMError;
use crate::intake::{GeminiAccess, IntakeModel};
use crate::types::{
    AudioContent, ChatGenerateRequest, ContentPart, FileContent, ImageContent, ImageSource,
    MediaSource, Message, ResponseFormat, TextContent, ToolCall, ToolChoice, ToolDefinition,
    ToolKind, ToolResult, VideoContent,
};

use super::wiretypes::{
    GeminiBlob, GeminiCodeExecution, GeminiContent, GeminiFileData, GeminiFunctionCall,
    GeminiFunctionCallingConfig, GeminiFunctionCallingMode, GeminiFunctionDeclaration,
    GeminiFunctionResponse, GeminiGenerateContentRequest, GeminiGenerationConfig, GeminiPart,
    GeminiResponseMimeType, GeminiRole, GeminiSafetySetting, GeminiSystemInstruction,
    GeminiTextPart, GeminiTool, GeminiToolConfig, HarmCategory,
};

/// 构建 Gemini GenerateContent 请求体
///
/// The model name travels in the URL path, so it never appears in the body.
/// The result has already passed schema validation.
pub(crate) fn build_gemini_request(
    request: &ChatGenerateRequest,
    model: &IntakeModel,
    access: &GeminiAccess,
) -> Result<GeminiGenerateContentRequest, LLMError> {
    // system / developer 折叠为 systemInstruction，其余进入 contents
    let mut system_texts = Vec::new();
    let mut contents = Vec::new();
    for message in &request.messages {
        match message.role.0.as_str() {
            "system" | "developer" => {
                if let Some(text) = extract_text_from_message(message) {
                    system_texts.push(text);
                }
            }
            _ => contents.push(convert_message(message)?),
        }
    }

    let system_instruction = (!system_texts.is_empty()).then(|| GeminiSystemInstruction {
        parts: vec![GeminiTextPart {
            text: system_texts.join("\n\n"),
        }],
    });

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(convert_tools(&request.tools)?)
    };
    let tool_config = request
        .tool_choice
        .as_ref()
        .map(convert_tool_choice)
        .transpose()?;

    let safety_settings = access.min_safety_level.map(|threshold| {
        HarmCategory::GEMINI
            .into_iter()
            .map(|category| GeminiSafetySetting {
                category,
                threshold,
            })
            .collect()
    });

    let body = GeminiGenerateContentRequest {
        contents,
        tools,
        tool_config,
        safety_settings,
        system_instruction,
        generation_config: Some(build_generation_config(request, model)?),
    };
    body.validate()?;
    Ok(body)
}

/// 将 Message 转换为 Gemini Content
fn convert_message(message: &Message) -> Result<GeminiContent, LLMError> {
    // assistant 映射为 model；工具结果由 user 角色回传
    let role = match message.role.0.as_str() {
        "assistant" | "model" => GeminiRole::Model,
        "user" | "tool" => GeminiRole::User,
        other => {
            return Err(LLMError::Validation {
                message: format!("role `{other}` has no Gemini equivalent"),
            });
        }
    };

    let parts = message
        .content
        .iter()
        .map(convert_content_part)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(GeminiContent {
        role: Some(role),
        parts,
    })
}

fn extract_text_from_message(message: &Message) -> Option<String> {
    let texts: Vec<&str> = message
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text(TextContent { text }) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    (!texts.is_empty()).then(|| texts.join("\n"))
}

fn inline(mime_type: &str, data: &str) -> GeminiPart {
    GeminiPart::InlineData {
        inline_data: GeminiBlob {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        },
    }
}

fn file(mime_type: Option<&str>, uri: &str) -> GeminiPart {
    GeminiPart::FileData {
        file_data: GeminiFileData {
            mime_type: mime_type.map(str::to_string),
            file_uri: uri.to_string(),
        },
    }
}

fn media(source: &MediaSource, mime_type: &str) -> GeminiPart {
    match source {
        MediaSource::Inline { data } => inline(mime_type, data),
        MediaSource::Url { url } => file(Some(mime_type), url),
        MediaSource::FileId { file_id } => file(Some(mime_type), file_id),
    }
}

/// 将通用 ContentPart 映射为 Gemini Part
fn convert_content_part(part: &ContentPart) -> Result<GeminiPart, LLMError> {
    let converted = match part {
        ContentPart::Text(TextContent { text }) => GeminiPart::text(text.clone()),
        ContentPart::Image(ImageContent { source, .. }) => match source {
            ImageSource::Base64 { data, mime_type } => {
                inline(mime_type.as_deref().unwrap_or("image/jpeg"), data)
            }
            ImageSource::Url { url } => file(None, url),
            ImageSource::FileId { file_id } => file(None, file_id),
        },
        ContentPart::Audio(AudioContent { source, mime_type }) => {
            media(source, mime_type.as_deref().unwrap_or("audio/mpeg"))
        }
        ContentPart::Video(VideoContent { source, mime_type }) => {
            media(source, mime_type.as_deref().unwrap_or("video/mp4"))
        }
        ContentPart::File(FileContent {
            file_uri,
            mime_type,
        }) => file(mime_type.as_deref(), file_uri),
        ContentPart::ToolCall(ToolCall {
            name, arguments, ..
        }) => GeminiPart::FunctionCall {
            function_call: GeminiFunctionCall {
                name: name.clone(),
                args: match arguments {
                    Value::Object(map) => map.clone(),
                    Value::Null => Map::new(),
                    other => {
                        return Err(LLMError::Validation {
                            message: format!(
                                "function call `{name}` arguments must be a JSON object, got {other}"
                            ),
                        });
                    }
                },
            },
        },
        ContentPart::ToolResult(ToolResult {
            name,
            output,
            is_error,
            ..
        }) => {
            let name = name.clone().ok_or_else(|| LLMError::Validation {
                message: "Gemini function responses require the function name".to_string(),
            })?;
            let response = match (output, is_error) {
                (Value::Object(map), false) => map.clone(),
                (value, false) => Map::from_iter([("output".to_string(), value.clone())]),
                (value, true) => Map::from_iter([("error".to_string(), value.clone())]),
            };
            GeminiPart::FunctionResponse {
                function_response: GeminiFunctionResponse { name, response },
            }
        }
        ContentPart::Data { data } => {
            serde_json::from_value(data.clone()).map_err(|err| LLMError::Validation {
                message: format!("raw part is not a valid Gemini part: {err}"),
            })?
        }
    };
    Ok(converted)
}

/// 构造 generationConfig
fn build_generation_config(
    request: &ChatGenerateRequest,
    model: &IntakeModel,
) -> Result<GeminiGenerationConfig, LLMError> {
    let options = &request.options;
    let mut config = GeminiGenerationConfig {
        stop_sequences: (!options.stop_sequences.is_empty())
            .then(|| options.stop_sequences.clone()),
        candidate_count: Some(1),
        max_output_tokens: model.max_tokens,
        temperature: Some(model.temperature),
        top_p: options.top_p,
        top_k: options.top_k,
        presence_penalty: options.presence_penalty,
        frequency_penalty: options.frequency_penalty,
        ..GeminiGenerationConfig::default()
    };

    match &request.response_format {
        None | Some(ResponseFormat::Text) => {}
        Some(ResponseFormat::JsonObject) => {
            config.response_mime_type = Some(GeminiResponseMimeType::ApplicationJson);
        }
        Some(ResponseFormat::JsonSchema { schema }) => {
            let Value::Object(schema) = schema else {
                return Err(LLMError::Validation {
                    message: "response schema must be a JSON object".to_string(),
                });
            };
            config.response_mime_type = Some(GeminiResponseMimeType::ApplicationJson);
            config.response_schema = Some(schema.clone());
        }
    }

    Ok(config)
}

/// 将 ToolDefinition 映射为 Gemini tools 数组
///
/// All function declarations share one tool entry; code execution gets its own.
fn convert_tools(tools: &[ToolDefinition]) -> Result<Vec<GeminiTool>, LLMError> {
    let mut declarations = Vec::new();
    let mut result = Vec::new();
    for tool in tools {
        match &tool.kind {
            ToolKind::Function => {
                let parameters = match &tool.input_schema {
                    None => None,
                    Some(Value::Object(map)) => Some(map.clone()),
                    Some(_) => {
                        return Err(LLMError::Validation {
                            message: format!("tool `{}` schema must be a JSON object", tool.name),
                        });
                    }
                };
                declarations.push(GeminiFunctionDeclaration {
                    name: tool.name.clone(),
                    description: tool.description.clone().unwrap_or_default(),
                    parameters,
                });
            }
            ToolKind::CodeExecution => result.push(GeminiTool {
                code_execution: Some(GeminiCodeExecution {}),
                function_declarations: None,
            }),
            ToolKind::Custom { config } => {
                let tool = serde_json::from_value(config.clone()).map_err(|err| {
                    LLMError::Validation {
                        message: format!("custom tool `{}` is not a Gemini tool: {err}", tool.name),
                    }
                })?;
                result.push(tool);
            }
        }
    }
    if !declarations.is_empty() {
        result.insert(
            0,
            GeminiTool {
                code_execution: None,
                function_declarations: Some(declarations),
            },
        );
    }
    Ok(result)
}

/// ToolChoice -> toolConfig.functionCallingConfig
fn convert_tool_choice(choice: &ToolChoice) -> Result<GeminiToolConfig, LLMError> {
    let config = |mode, allowed: Option<Vec<String>>| GeminiToolConfig {
        function_calling_config: Some(GeminiFunctionCallingConfig {
            mode: Some(mode),
            allowed_function_names: allowed,
        }),
    };
    Ok(match choice {
        ToolChoice::Auto => config(GeminiFunctionCallingMode::Auto, None),
        ToolChoice::Any => config(GeminiFunctionCallingMode::Any, None),
        ToolChoice::None => config(GeminiFunctionCallingMode::None, None),
        ToolChoice::Tool { name } => {
            config(GeminiFunctionCallingMode::Any, Some(vec![name.clone()]))
        }
        ToolChoice::Custom(value) => {
            serde_json::from_value(value.clone()).map_err(|err| LLMError::Validation {
                message: format!("custom tool choice is not a Gemini toolConfig: {err}"),
            })?
        }
    })
}
