//! 应用配置模块

use crate::core::enrichment::EnrichmentTables;
use crate::core::retry::RetryPolicy;
use crate::error::{SyncError, SyncResult};
use crate::logging::LogConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// API 密钥环境变量
pub const API_KEY_ENV: &str = "SAMSARA_API_KEY";
/// 新司机初始密码环境变量（可选）
pub const DRIVER_PASSWORD_ENV: &str = "SAMSARA_DRIVER_PASSWORD";

/// API 配置
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub samsara_endpoint: String,
    /// 请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    crate::client::REQUEST_TIMEOUT_SECS
}

/// 文件配置
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    pub encompass_csv: PathBuf,
    pub samsara_csv: PathBuf,
    /// 已创建地址的审计文件
    #[serde(default)]
    pub audit_csv: Option<PathBuf>,
}

/// CSV 列名
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnNames {
    pub customer_name: String,
    pub full_name: String,
    pub user_name: String,
    pub status: String,
    pub location: String,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
    pub mobile: String,
    pub role: String,
    pub external_id: String,
    /// Samsara 司机导出中的 ID 列
    pub driver_id: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            customer_name: "Customer Name".to_string(),
            full_name: "Full Name".to_string(),
            user_name: "User Name".to_string(),
            status: "Active".to_string(),
            location: "Location".to_string(),
            address: "Report Address".to_string(),
            latitude: "Latitude".to_string(),
            longitude: "Longitude".to_string(),
            mobile: "Mobile".to_string(),
            role: "Role".to_string(),
            external_id: "Encompass ID".to_string(),
            driver_id: "Driver ID".to_string(),
        }
    }
}

/// 应用配置，启动时构造一次，之后按引用传递
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub files: FilesConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub enrichment: EnrichmentTables,
    #[serde(default)]
    pub columns: ColumnNames,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl AppConfig {
    /// 从配置文件加载，相对路径以配置文件所在目录为基准
    pub fn load(path: &Path) -> SyncResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("无法读取 {}: {}", path.display(), e)))?;

        let mut config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;

        config.validate()?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.files.encompass_csv = resolve(base, &config.files.encompass_csv);
        config.files.samsara_csv = resolve(base, &config.files.samsara_csv);
        config.files.audit_csv = config.files.audit_csv.as_deref().map(|p| resolve(base, p));

        Ok(config)
    }

    fn validate(&self) -> SyncResult<()> {
        if self.api.samsara_endpoint.trim().is_empty() {
            return Err(SyncError::Config("api.samsara_endpoint 不能为空".to_string()));
        }
        if self.files.encompass_csv.as_os_str().is_empty() {
            return Err(SyncError::Config("files.encompass_csv 不能为空".to_string()));
        }
        if self.files.samsara_csv.as_os_str().is_empty() {
            return Err(SyncError::Config("files.samsara_csv 不能为空".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config("retry.max_attempts 必须大于 0".to_string()));
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// 环境变量中的凭据
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub driver_password: Option<String>,
}

impl Credentials {
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let api_key = lookup(API_KEY_ENV)
            .filter(|v| !v.trim().is_empty())
            .ok_or(SyncError::MissingCredential(API_KEY_ENV))?;

        Ok(Self {
            api_key,
            driver_password: lookup(DRIVER_PASSWORD_ENV).filter(|v| !v.is_empty()),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("driver_password", &self.driver_password.as_ref().map(|_| "***"))
            .finish()
    }
}
