use std::path::Path;

pub mod client;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod source;

pub use crate::core::{JobKind, SyncEngine, SyncReport};
pub use config::{AppConfig, Credentials};
pub use error::{SyncError, SyncResult};

/// 应用上下文，启动时构造一次，按引用传给各个任务
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub credentials: Credentials,
}

impl AppContext {
    /// 加载配置和凭据；任一缺失都是启动前的致命错误
    pub fn new(config_path: &Path) -> SyncResult<Self> {
        let config = AppConfig::load(config_path)?;
        let credentials = Credentials::from_env()?;

        tracing::debug!("使用配置文件: {:?}", config_path);

        Ok(Self {
            config,
            credentials,
        })
    }

    pub fn request_options(&self) -> crate::core::RequestOptions {
        crate::core::RequestOptions {
            initial_password: self.credentials.driver_password.clone(),
        }
    }
}
