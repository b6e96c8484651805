use std::collections::HashMap;

use crate::config::SourceSetup;
use crate::error::LLMError;
use crate::http::HttpRequest;
use crate::intake::{Dialect, IntakeAccess, IntakeModel, OpenAiAccess};
use crate::provider::{PreparedRequest, Vendor, join_endpoint, serialize_body};
use crate::types::ChatGenerateRequest;

pub(crate) mod error;
pub(crate) mod request;
pub(crate) mod stream;
pub(crate) mod types;

use self::error::parse_openai_error;
use self::request::build_openai_body;
use self::stream::OpenAiChunkParser;

pub(crate) const PROVIDER_NAME: &str = "openai_chat";

const VENDOR_ID: &str = "openai";
const DEFAULT_HOST: &str = "https://api.openai.com";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// OpenAI Chat Completions 及兼容端点
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiVendor;

impl Vendor for OpenAiVendor {
    fn id(&self) -> &'static str {
        VENDOR_ID
    }

    fn dialect(&self) -> Dialect {
        Dialect::OpenAi
    }

    fn transport_access(&self, setup: &SourceSetup) -> Result<IntakeAccess, LLMError> {
        let api_key = setup.credential.resolve_api_key(VENDOR_ID)?;
        let host = setup
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_HOST)
            .to_string();

        Ok(IntakeAccess::OpenAi(OpenAiAccess {
            api_key,
            host,
            organization: setup.extra_str("organization").map(str::to_string),
            project: setup.extra_str("project").map(str::to_string),
        }))
    }
}

fn build_headers(access: &OpenAiAccess, streaming: bool) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(
        "Authorization".to_string(),
        format!("Bearer {}", access.api_key),
    );
    headers.insert(
        "Accept".to_string(),
        if streaming {
            "text/event-stream"
        } else {
            "application/json"
        }
        .to_string(),
    );
    if let Some(org) = &access.organization {
        headers.insert("OpenAI-Organization".to_string(), org.clone());
    }
    if let Some(project) = &access.project {
        headers.insert("OpenAI-Project".to_string(), project.clone());
    }
    headers
}

pub(crate) fn prepare_request(
    access: &OpenAiAccess,
    model: &IntakeModel,
    request: &ChatGenerateRequest,
    streaming: bool,
) -> Result<PreparedRequest, LLMError> {
    let body = build_openai_body(request, model, streaming)?;
    let body = serialize_body(&body, &request.options.extra)?;
    let url = join_endpoint(&access.host, "/v1", CHAT_COMPLETIONS_PATH);

    Ok(PreparedRequest {
        request: HttpRequest::post_json(url, body)
            .with_headers(build_headers(access, streaming)),
        parser: Box::new(OpenAiChunkParser::new(model.id.clone())),
        classify_error: parse_openai_error,
        dialect: PROVIDER_NAME,
    })
}
