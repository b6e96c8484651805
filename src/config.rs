use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::RelayClient;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::http::reqwest::default_dyn_transport;
use crate::provider::VendorRegistry;

/// 模型描述 由配置层持有 本库只读
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmDescriptor {
    /// 逻辑模型 id 例如 `gemini-flash-fast`
    pub id: String,
    /// Vendor 注册表中的 id
    pub vendor: String,
    /// 不透明选项 包含 `llmRef` / `llmTemperature` / `llmResponseTokens`
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub source: SourceSetup,
}

impl LlmDescriptor {
    pub fn new(id: impl Into<String>, vendor: impl Into<String>, options: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            vendor: vendor.into(),
            options,
            source: SourceSetup::default(),
        }
    }

    pub fn with_source(mut self, source: SourceSetup) -> Self {
        self.source = source;
        self
    }
}

/// 模型来源设置 鉴权与连接信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSetup {
    #[serde(default)]
    pub credential: Credential,
    pub base_url: Option<String>,
    /// 每次调度前的等待 毫秒
    pub request_delay_ms: Option<u64>,
    /// 附加设置 例如 min_safety_level 或 organization
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SourceSetup {
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_request_delay_ms(mut self, delay_ms: u64) -> Self {
        self.request_delay_ms = Some(delay_ms);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// 字符串类型的附加设置
    pub(crate) fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// 鉴权信息
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// 简单 API Key
    ApiKey {
        /// header 名称 留空时按 vendor 默认
        #[serde(default)]
        header: Option<String>,
        /// 密钥
        key: String,
    },
    /// Bearer Token
    Bearer { token: String },
    /// Google/GCP Service Account JSON
    ServiceAccount { json: Value },
    /// 未配置鉴权
    #[default]
    None,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"<redacted>").finish(),
            Self::ServiceAccount { .. } => f
                .debug_struct("ServiceAccount")
                .field("json", &"<redacted>")
                .finish(),
            Self::None => f.write_str("None"),
        }
    }
}

impl Credential {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey {
            header: None,
            key: key.into(),
        }
    }

    /// 提取 API Key 仅接受非空的 ApiKey / Bearer
    pub fn resolve_api_key(&self, vendor: &'static str) -> Result<String, LLMError> {
        let key = match self {
            Credential::ApiKey { key, .. } => key,
            Credential::Bearer { token } => token,
            Credential::ServiceAccount { .. } => {
                return Err(LLMError::invalid_credentials(
                    vendor,
                    "service account credentials are not supported",
                ));
            }
            Credential::None => {
                return Err(LLMError::invalid_credentials(vendor, "credential is required"));
            }
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(LLMError::invalid_credentials(vendor, "API key is empty"));
        }
        Ok(key.to_string())
    }
}

/// 按逻辑 id 索引的模型目录
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    descriptors: HashMap<String, LlmDescriptor>,
}

impl ModelCatalog {
    /// 构建目录 重复 id 视为配置错误
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = LlmDescriptor>,
    ) -> Result<Self, LLMError> {
        let mut catalog = Self::default();
        for descriptor in descriptors {
            if catalog.descriptors.contains_key(&descriptor.id) {
                return Err(LLMError::Configuration {
                    model: descriptor.id.clone(),
                    options: Value::Object(descriptor.options.clone()).to_string(),
                });
            }
            catalog.descriptors.insert(descriptor.id.clone(), descriptor);
        }
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&LlmDescriptor> {
        self.descriptors.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.descriptors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// 根据一组模型描述构建 RelayClient 使用内置 Vendor
pub fn build_client_from_descriptors(
    descriptors: Vec<LlmDescriptor>,
    transport: DynHttpTransport,
) -> Result<RelayClient, LLMError> {
    let catalog = ModelCatalog::from_descriptors(descriptors)?;
    Ok(RelayClient::new(
        catalog,
        VendorRegistry::with_builtin_vendors(),
        transport,
    ))
}

/// 同上 使用默认的 reqwest 传输层
pub fn build_default_client(descriptors: Vec<LlmDescriptor>) -> Result<RelayClient, LLMError> {
    build_client_from_descriptors(descriptors, default_dyn_transport()?)
}
