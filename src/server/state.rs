// 应用状态

use crate::config::AppConfig;
use crate::uploader::UploadManager;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 默认配置文件路径
pub const CONFIG_PATH: &str = "config/app.toml";

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 上传管理器
    pub upload_manager: Arc<UploadManager>,
    /// 应用配置
    pub config: Arc<RwLock<AppConfig>>,
}

impl AppState {
    /// 创建新的应用状态
    pub async fn new() -> anyhow::Result<Self> {
        // 加载配置
        let config = AppConfig::load_or_default(CONFIG_PATH).await;
        Ok(Self::with_config(config))
    }

    /// 使用给定配置创建应用状态
    pub fn with_config(config: AppConfig) -> Self {
        let upload_manager = Arc::new(UploadManager::new(config.upload.clone()));
        Self {
            upload_manager,
            config: Arc::new(RwLock::new(config)),
        }
    }
}
