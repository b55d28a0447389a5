//! 错误类型

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// 同步过程中的错误
///
/// `Config`、`MissingCredential`、`SourceRead` 属于启动前的致命错误，
/// `UnmappedEnrichment` 只影响单条记录。
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("缺少环境变量 {0}")]
    MissingCredential(&'static str),

    #[error("读取数据源失败 ({source_id}): {message}")]
    SourceRead { source_id: String, message: String },

    #[error("记录 '{identity_key}' 的 {field} '{value}' 没有对应的映射")]
    UnmappedEnrichment {
        identity_key: String,
        field: &'static str,
        value: String,
    },

    #[error("写入审计文件失败: {0}")]
    Audit(String),
}

/// 传输层错误（请求没有拿到 HTTP 响应）
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("请求超时")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_message_names_record() {
        let err = SyncError::UnmappedEnrichment {
            identity_key: "A".into(),
            field: "location",
            value: "Mars".into(),
        };
        assert_eq!(err.to_string(), "记录 'A' 的 location 'Mars' 没有对应的映射");
    }

    #[test]
    fn test_transport_timeout_message() {
        assert_eq!(TransportError::Timeout.to_string(), "请求超时");
    }
}
