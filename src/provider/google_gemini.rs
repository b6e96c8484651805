use std::collections::HashMap;
use std::time::Duration;

use tracing::warn;
use validator::Validate;

use crate::config::{LlmDescriptor, SourceSetup};
use crate::error::LLMError;
use crate::http::{HttpRequest, HttpTransport};
use crate::intake::{Dialect, GeminiAccess, IntakeAccess, IntakeModel};
use crate::provider::retry::retry_after_from_headers;
use crate::provider::{PreparedRequest, Vendor, join_endpoint, serialize_body};
use crate::types::ChatGenerateRequest;

pub(crate) mod error;
pub(crate) mod request;
pub(crate) mod stream;
pub mod wiretypes;

use self::error::parse_gemini_error;
use self::request::build_gemini_request;
use self::stream::GeminiChunkParser;
use self::wiretypes::{
    GEMINI_MODELS_LIST_PATH, GeminiModelsList, HarmBlockThreshold, generate_content_path,
    stream_generate_content_path,
};

pub(crate) const PROVIDER_NAME: &str = "google_gemini";

const VENDOR_ID: &str = "gemini";
const DEFAULT_HOST: &str = "https://generativelanguage.googleapis.com";
const API_VERSION_SUFFIX: &str = "/v1beta";
const MIN_SAFETY_LEVEL_KEY: &str = "min_safety_level";

/// Google Gemini vendor backed by the Generative Language API.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiVendor;

impl Vendor for GeminiVendor {
    fn id(&self) -> &'static str {
        VENDOR_ID
    }

    fn dialect(&self) -> Dialect {
        Dialect::Gemini
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

        Ok(IntakeAccess::Gemini(GeminiAccess {
            api_key,
            host,
            min_safety_level: min_safety_level(setup),
        }))
    }

    fn rate_limit_delay(&self, _llm: &LlmDescriptor, setup: &SourceSetup) -> Option<Duration> {
        setup
            .request_delay_ms
            .filter(|delay| *delay > 0)
            .map(Duration::from_millis)
    }
}

fn min_safety_level(setup: &SourceSetup) -> Option<HarmBlockThreshold> {
    let raw = setup.extra.get(MIN_SAFETY_LEVEL_KEY)?;
    match serde_json::from_value::<HarmBlockThreshold>(raw.clone()) {
        Ok(threshold) => Some(threshold),
        Err(err) => {
            warn!(value = %raw, error = %err, "ignoring invalid Gemini min_safety_level");
            None
        }
    }
}

fn headers(access: &GeminiAccess, streaming: bool) -> HashMap<String, String> {
    let accept = if streaming {
        "text/event-stream"
    } else {
        "application/json"
    };
    HashMap::from([
        ("x-goog-api-key".to_string(), access.api_key.clone()),
        ("Accept".to_string(), accept.to_string()),
    ])
}

pub(crate) fn prepare_request(
    access: &GeminiAccess,
    model: &IntakeModel,
    request: &ChatGenerateRequest,
    streaming: bool,
) -> Result<PreparedRequest, LLMError> {
    let body = build_gemini_request(request, model, access)?;
    let path = if streaming {
        stream_generate_content_path(&model.id)
    } else {
        generate_content_path(&model.id)
    };
    let url = join_endpoint(&access.host, API_VERSION_SUFFIX, &path);
    let body = serialize_body(&body, &request.options.extra)?;

    Ok(PreparedRequest {
        request: HttpRequest::post_json(url, body).with_headers(headers(access, streaming)),
        parser: Box::new(GeminiChunkParser::new(model.id.clone())),
        classify_error: parse_gemini_error,
        dialect: PROVIDER_NAME,
    })
}

/// Lists the models visible to `access`, validated against the wire schema.
///
/// # Errors
///
/// Transport failures pass through; non-success statuses are classified like any
/// other Gemini error body.
pub async fn list_models(
    transport: &dyn HttpTransport,
    access: &GeminiAccess,
) -> Result<GeminiModelsList, LLMError> {
    let url = join_endpoint(&access.host, API_VERSION_SUFFIX, GEMINI_MODELS_LIST_PATH);
    let response = transport
        .send(HttpRequest::get(url).with_headers(headers(access, false)))
        .await?;

    let success = response.is_success();
    let status = response.status;
    let retry_after = retry_after_from_headers(&response.headers);
    let text = response.into_string()?;
    if !success {
        return Err(parse_gemini_error(status, &text, retry_after));
    }

    let list: GeminiModelsList = serde_json::from_str(&text).map_err(|err| {
        LLMError::provider(PROVIDER_NAME, format!("failed to parse models list: {err}"))
    })?;
    list.validate()?;
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use crate::http::{HttpMethod, HttpResponse, HttpStreamResponse};
    use crate::types::{Message, Role};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn access(host: &str) -> GeminiAccess {
        GeminiAccess {
            api_key: "AIza-test".to_string(),
            host: host.to_string(),
            min_safety_level: None,
        }
    }

    #[test]
    fn transport_access_resolves_host_key_and_safety() {
        let setup = SourceSetup::with_credential(Credential::api_key("AIza-test"))
            .with_base_url("https://proxy.local/")
            .with_extra(MIN_SAFETY_LEVEL_KEY, json!("BLOCK_LOW_AND_ABOVE"));
        match GeminiVendor.transport_access(&setup).expect("access") {
            IntakeAccess::Gemini(access) => {
                assert_eq!(access.api_key, "AIza-test");
                assert_eq!(access.host, "https://proxy.local");
                assert_eq!(
                    access.min_safety_level,
                    Some(HarmBlockThreshold::BlockLowAndAbove)
                );
            }
            other => panic!("unexpected access: {other:?}"),
        }
    }

    #[test]
    fn transport_access_defaults_host_and_ignores_bad_safety_level() {
        let setup = SourceSetup::with_credential(Credential::api_key("k"))
            .with_extra(MIN_SAFETY_LEVEL_KEY, json!("BLOCK_EVERYTHING"));
        match GeminiVendor.transport_access(&setup).expect("access") {
            IntakeAccess::Gemini(access) => {
                assert_eq!(access.host, DEFAULT_HOST);
                assert_eq!(access.min_safety_level, None);
            }
            other => panic!("unexpected access: {other:?}"),
        }
    }

    #[test]
    fn transport_access_requires_credentials() {
        let setup = SourceSetup::default();
        assert!(matches!(
            GeminiVendor.transport_access(&setup),
            Err(LLMError::InvalidCredentials { vendor: "gemini", .. })
        ));
    }

    #[test]
    fn rate_limit_delay_uses_positive_request_delay() {
        let descriptor = LlmDescriptor::new("g", "gemini", serde_json::Map::new());
        let setup = SourceSetup::default().with_request_delay_ms(1500);
        assert_eq!(
            GeminiVendor.rate_limit_delay(&descriptor, &setup),
            Some(Duration::from_millis(1500))
        );
        let setup = SourceSetup::default().with_request_delay_ms(0);
        assert_eq!(GeminiVendor.rate_limit_delay(&descriptor, &setup), None);
    }

    #[test]
    fn prepare_request_targets_stream_endpoint() {
        let model = IntakeModel {
            id: "gemini-1.5-flash".to_string(),
            temperature: 0.4,
            max_tokens: Some(256),
        };
        let request = ChatGenerateRequest::new(vec![Message::text(Role::user(), "hi")]);

        let prepared =
            prepare_request(&access("https://proxy.local/v1beta"), &model, &request, true)
                .expect("prepared");
        assert_eq!(prepared.request.method, HttpMethod::Post);
        assert_eq!(
            prepared.request.url,
            "https://proxy.local/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            prepared.request.headers.get("x-goog-api-key"),
            Some(&"AIza-test".to_string())
        );
        assert_eq!(prepared.dialect, PROVIDER_NAME);

        let body: Value =
            serde_json::from_slice(prepared.request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert!(body.get("model").is_none());

        let prepared =
            prepare_request(&access(DEFAULT_HOST), &model, &request, false).expect("prepared");
        assert_eq!(
            prepared.request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    struct ModelsTransport {
        status: u16,
        body: Value,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpTransport for ModelsTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
            self.seen.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::from([("Retry-After".to_string(), "3".to_string())]),
                body: serde_json::to_vec(&self.body).unwrap(),
            })
        }

        async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
            Err(LLMError::transport("streaming not expected"))
        }
    }

    #[tokio::test]
    async fn list_models_parses_and_validates() {
        let transport = ModelsTransport {
            status: 200,
            body: json!({
                "models": [{
                    "name": "models/gemini-1.5-pro-001",
                    "version": "001",
                    "displayName": "Gemini 1.5 Pro",
                    "description": "Mid-size multimodal model",
                    "inputTokenLimit": 2097152,
                    "outputTokenLimit": 8192,
                    "supportedGenerationMethods": ["generateContent", "countTokens"]
                }]
            }),
            seen: Mutex::new(Vec::new()),
        };

        let list = list_models(&transport, &access(DEFAULT_HOST))
            .await
            .expect("models");
        assert_eq!(list.models.len(), 1);
        assert_eq!(list.models[0].name, "models/gemini-1.5-pro-001");

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].method, HttpMethod::Get);
        assert_eq!(
            seen[0].url,
            "https://generativelanguage.googleapis.com/v1beta/models?pageSize=1000"
        );
    }

    #[tokio::test]
    async fn list_models_classifies_error_bodies() {
        let transport = ModelsTransport {
            status: 429,
            body: json!({ "error": { "code": 429, "message": "slow down", "status": "RESOURCE_EXHAUSTED" } }),
            seen: Mutex::new(Vec::new()),
        };
        match list_models(&transport, &access(DEFAULT_HOST)).await {
            Err(LLMError::RateLimit { retry_after, .. }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(3)));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        let transport = ModelsTransport {
            status: 200,
            body: json!({ "models": [{ "name": "models/x", "version": "1", "displayName": "X",
                "description": "", "inputTokenLimit": 0, "outputTokenLimit": 1,
                "supportedGenerationMethods": [] }] }),
            seen: Mutex::new(Vec::new()),
        };
        assert!(matches!(
            list_models(&transport, &access(DEFAULT_HOST)).await,
            Err(LLMError::Validation { .. })
        ));
    }
}
