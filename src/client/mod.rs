pub mod http;

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

pub use http::HttpApiClient;

// ============ 公共常量 ============

/// 单次请求超时（秒）
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// HTTP 响应（任何状态码都算拿到了响应）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// 远程 API 客户端接口
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// 发送请求；只有在没有拿到 HTTP 响应时才返回错误
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        bearer_token: &str,
    ) -> Result<ApiResponse, TransportError>;

    /// 客户端名称（用于日志）
    fn name(&self) -> &str;
}
