use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};
use tracing::debug;

use crate::error::LLMError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpMethod, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};

const USER_AGENT: &str = concat!("kotoba-relay/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// 基于 reqwest 的默认 HttpTransport
///
/// No overall timeout is set on the client: chat streams stay open for as long as the
/// vendor keeps writing. Per-request limits come from [`HttpRequest::with_timeout`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// 使用自定义 reqwest::Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 创建默认配置 带 User-Agent 与连接超时
    pub fn default_client() -> Result<Self, LLMError> {
        Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map(Self::new)
            .map_err(|err| LLMError::transport(format!("failed to create reqwest client: {err}")))
    }

    fn build_request(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, LLMError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;
        let method = match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut builder = self.client.request(method, &url);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| LLMError::transport(format!("invalid header name: {err}")))?;
            let header_value = HeaderValue::from_str(&value).map_err(|err| {
                LLMError::transport(format!("invalid header value for {header_name}: {err}"))
            })?;
            builder = builder.header(header_name, header_value);
        }

        if let Some(body) = body {
            builder = builder.body(body);
        }

        Ok(builder)
    }

    async fn open(&self, request: HttpRequest) -> Result<Response, LLMError> {
        let target = redacted_target(&request.url).to_string();
        debug!(method = ?request.method, url = %target, "sending vendor request");

        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(transport_error)?;
        debug!(url = %target, status = response.status().as_u16(), "vendor responded");
        Ok(response)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        let response = self.open(request).await?;
        let status = response.status().as_u16();
        let headers = headers_to_map(response.headers());
        let body = response.bytes().await.map_err(transport_error)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
        let response = self.open(request).await?;
        let status = response.status().as_u16();
        let headers = headers_to_map(response.headers());
        let body: HttpBodyStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(transport_error)),
        );

        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// 便捷构造线程安全 Transport
pub fn default_dyn_transport() -> Result<DynHttpTransport, LLMError> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}

fn transport_error(err: reqwest::Error) -> LLMError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "body read failed"
    } else {
        "request failed"
    };
    LLMError::transport(format!("{kind}: {err}"))
}

fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// URL without its query string, which may carry keys.
fn redacted_target(url: &str) -> &str {
    url.split_once('?').map_or(url, |(target, _)| target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_header_names_are_transport_errors() {
        let transport = ReqwestTransport::default_client().expect("client");
        let request = HttpRequest::get("https://example.com")
            .with_headers(HashMap::from([("bad header".to_string(), "x".to_string())]));
        let err = match transport.build_request(request) {
            Ok(_) => panic!("expected invalid header name"),
            Err(err) => err,
        };
        assert!(matches!(err, LLMError::Transport { .. }));
    }

    #[test]
    fn logged_targets_drop_the_query() {
        assert_eq!(
            redacted_target("https://host/v1beta/models/x:streamGenerateContent?alt=sse&key=secret"),
            "https://host/v1beta/models/x:streamGenerateContent"
        );
        assert_eq!(redacted_target("https://host/v1/chat/completions"), "https://host/v1/chat/completions");
    }

    #[tokio::test]
    async fn unreachable_hosts_report_connection_failures() {
        let transport = ReqwestTransport::default_client().expect("client");
        let err = transport
            .send(HttpRequest::get("http://127.0.0.1:9/unreachable"))
            .await
            .expect_err("nothing listens on the discard port");
        match err {
            LLMError::Transport { message } => assert!(message.starts_with("connection failed")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
