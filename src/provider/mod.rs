use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::config::{LlmDescriptor, SourceSetup};
use crate::error::LLMError;
use crate::http::HttpRequest;
use crate::intake::{Dialect, IntakeAccess, IntakeModel};
use crate::types::{ChatGenerateRequest, StreamUpdate};

pub mod google_gemini;
pub mod openai_chat;
pub(crate) mod retry;

pub use google_gemini::GeminiVendor;
pub use openai_chat::OpenAiVendor;

/// 供应商能力接口 由注册表按 id 选择
///
/// `transport_access` is pure and synchronous; the only failure it may report is
/// [`LLMError::InvalidCredentials`].
pub trait Vendor: Send + Sync {
    /// 注册表中的 id 与 [`LlmDescriptor::vendor`] 对应
    fn id(&self) -> &'static str;

    fn dialect(&self) -> Dialect;

    /// 从 source setup 解析出本次请求的访问信息
    fn transport_access(&self, setup: &SourceSetup) -> Result<IntakeAccess, LLMError>;

    /// 可选能力 调度前需要等待的时长 默认不等待
    fn rate_limit_delay(&self, _llm: &LlmDescriptor, _setup: &SourceSetup) -> Option<Duration> {
        None
    }
}

/// 线程安全 Vendor
pub type DynVendor = Arc<dyn Vendor>;

/// 按 id 查表的 Vendor 注册表
#[derive(Clone, Default)]
pub struct VendorRegistry {
    vendors: HashMap<&'static str, DynVendor>,
}

impl VendorRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 `gemini` 与 `openai`
    pub fn with_builtin_vendors() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GeminiVendor));
        registry.register(Arc::new(OpenAiVendor));
        registry
    }

    /// 注册 Vendor 同 id 时替换并返回旧值
    pub fn register(&mut self, vendor: DynVendor) -> Option<DynVendor> {
        self.vendors.insert(vendor.id(), vendor)
    }

    pub fn get(&self, id: &str) -> Option<DynVendor> {
        self.vendors.get(id).cloned()
    }

    /// 返回当前已注册的 id
    pub fn ids(&self) -> Vec<&'static str> {
        self.vendors.keys().copied().collect()
    }
}

/// Incremental translator from vendor payloads to uniform updates.
pub(crate) trait ChunkParser: Send {
    /// Parses one SSE `data:` payload, or a whole non-streaming body.
    fn parse_chunk(&mut self, payload: &str) -> Result<Vec<StreamUpdate>, LLMError>;

    /// `true` once the vendor reported a condition after which nothing useful follows.
    fn is_terminated(&self) -> bool {
        false
    }
}

/// Maps a non-success status and body to an error, given an optional `Retry-After`.
pub(crate) type ErrorClassifier = fn(u16, &str, Option<Duration>) -> LLMError;

/// A vendor request ready to send, plus the dialect pieces needed to read the answer.
pub(crate) struct PreparedRequest {
    pub(crate) request: HttpRequest,
    pub(crate) parser: Box<dyn ChunkParser>,
    pub(crate) classify_error: ErrorClassifier,
    pub(crate) dialect: &'static str,
}

/// Translates a generic request into the dialect selected by `access`.
pub(crate) fn prepare_request(
    access: &IntakeAccess,
    model: &IntakeModel,
    request: &ChatGenerateRequest,
    streaming: bool,
) -> Result<PreparedRequest, LLMError> {
    match access {
        IntakeAccess::Gemini(access) => {
            google_gemini::prepare_request(access, model, request, streaming)
        }
        IntakeAccess::OpenAi(access) => {
            openai_chat::prepare_request(access, model, request, streaming)
        }
    }
}

/// Serializes a typed wire body and merges vendor-specific top-level fields into it.
pub(crate) fn serialize_body<T: Serialize>(
    body: &T,
    extra: &HashMap<String, Value>,
) -> Result<Vec<u8>, LLMError> {
    let mut value = serde_json::to_value(body).map_err(|err| LLMError::Validation {
        message: format!("failed to serialize request: {err}"),
    })?;
    if let Value::Object(map) = &mut value {
        for (key, field) in extra {
            map.insert(key.clone(), field.clone());
        }
    }
    serde_json::to_vec(&value).map_err(|err| LLMError::Validation {
        message: format!("failed to serialize request: {err}"),
    })
}

/// Joins a configured host with an API path, tolerating a trailing version segment.
pub(crate) fn join_endpoint(host: &str, version: &str, path: &str) -> String {
    let base = host.trim_end_matches('/');
    let base = base.strip_suffix(version).unwrap_or(base);
    format!("{base}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use serde_json::json;

    struct StaticVendor;

    impl Vendor for StaticVendor {
        fn id(&self) -> &'static str {
            "gemini"
        }

        fn dialect(&self) -> Dialect {
            Dialect::Gemini
        }

        fn transport_access(&self, _setup: &SourceSetup) -> Result<IntakeAccess, LLMError> {
            Err(LLMError::invalid_credentials("gemini", "static vendor"))
        }
    }

    #[test]
    fn builtin_registry_knows_gemini_and_openai() {
        let registry = VendorRegistry::with_builtin_vendors();
        let mut ids = registry.ids();
        ids.sort_unstable();
        assert_eq!(ids, vec!["gemini", "openai"]);
        assert_eq!(
            registry.get("gemini").map(|vendor| vendor.dialect()),
            Some(Dialect::Gemini)
        );
        assert!(registry.get("anthropic").is_none());
    }

    #[test]
    fn register_replaces_same_id() {
        let mut registry = VendorRegistry::with_builtin_vendors();
        let previous = registry.register(Arc::new(StaticVendor));
        assert!(previous.is_some());

        let setup = SourceSetup::with_credential(Credential::api_key("k"));
        let vendor = registry.get("gemini").expect("registered");
        assert!(matches!(
            vendor.transport_access(&setup),
            Err(LLMError::InvalidCredentials { .. })
        ));
    }

    #[test]
    fn default_rate_limit_delay_is_none() {
        let descriptor = LlmDescriptor::new("x", "gemini", serde_json::Map::new());
        assert_eq!(
            StaticVendor.rate_limit_delay(&descriptor, &descriptor.source),
            None
        );
    }

    #[test]
    fn serialize_body_merges_extra_fields() {
        let extra = HashMap::from([("cachedContent".to_string(), json!("cachedContents/abc"))]);
        let bytes = serialize_body(&json!({ "contents": [] }), &extra).expect("serializes");
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            json!({ "contents": [], "cachedContent": "cachedContents/abc" })
        );
    }

    #[test]
    fn join_endpoint_strips_duplicate_version() {
        assert_eq!(
            join_endpoint("https://proxy.local/v1beta/", "/v1beta", "/v1beta/models"),
            "https://proxy.local/v1beta/models"
        );
        assert_eq!(
            join_endpoint("https://api.openai.com", "/v1", "/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
