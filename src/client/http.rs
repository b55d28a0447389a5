use super::{ApiClient, ApiResponse, REQUEST_TIMEOUT_SECS};
use crate::error::{SyncError, SyncResult, TransportError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

/// 基于 reqwest 的 Samsara 客户端
pub struct HttpApiClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpApiClient {
    pub fn new(endpoint: &str) -> SyncResult<Self> {
        Self::with_timeout(endpoint, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> SyncResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }
}

/// 响应体读取失败时不影响状态码判断，只记录原因
fn response_body(status: u16, body: reqwest::Result<String>) -> String {
    match body {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("读取响应体失败 ({}): {}", status, e);
            format!("<读取响应体失败: {}>", e)
        }
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        bearer_token: &str,
    ) -> Result<ApiResponse, TransportError> {
        let mut request = self
            .http
            .request(method, self.url(path))
            .bearer_auth(bearer_token);

        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response_body(status, response.text().await);

        Ok(ApiResponse { status, body })
    }

    fn name(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_response_body_read_error_is_reported() {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();

        let body = response_body(400, Err(err));

        assert!(body.starts_with("<读取响应体失败: "));
        assert_eq!(response_body(400, Ok("bad".to_string())), "bad");
    }

    #[tokio::test]
    async fn test_send_posts_json_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fleet/drivers"))
            .and(header("authorization", "Bearer token-1"))
            .and(body_json(json!({"name": "B"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\":{}}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpApiClient::new(&format!("{}/", server.uri())).unwrap();
        let response = client
            .send(
                Method::POST,
                "/fleet/drivers",
                Some(&json!({"name": "B"})),
                "token-1",
            )
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "{\"data\":{}}");
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = HttpApiClient::new(&server.uri()).unwrap();
        let response = client
            .send(Method::PATCH, "/fleet/drivers/1", None, "t")
            .await
            .unwrap();

        assert_eq!(response.status, 429);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client =
            HttpApiClient::with_timeout(&server.uri(), Duration::from_millis(50)).unwrap();
        let err = client
            .send(Method::POST, "/addresses", Some(&json!({})), "t")
            .await
            .unwrap_err();

        assert_eq!(err, TransportError::Timeout);
    }
}
