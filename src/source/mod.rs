pub mod csv;

use crate::core::record::{LocalRecord, RemoteRecord};
use crate::error::SyncResult;
use async_trait::async_trait;

pub use self::csv::{AuditLog, CsvRecordSource, CsvRemoteDirectory};

/// 本地记录来源
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// 按源顺序返回所有记录
    async fn list_records(&self) -> SyncResult<Vec<LocalRecord>>;

    /// 来源名称（用于日志）
    fn name(&self) -> &str;
}

/// 远程现有记录来源，只用于成员判断
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    async fn list_remote_records(&self) -> SyncResult<Vec<RemoteRecord>>;

    fn name(&self) -> &str;
}
