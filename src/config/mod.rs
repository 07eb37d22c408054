// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upload: UploadConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// 服务器配置（本地控制API监听地址）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    // 上传目标端点默认占用 8080，控制API错开端口
    8090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 上传目标端点（分片请求发往 `{endpoint}/chunk`）
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// 分片大小 (MB)
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
    /// 每个文件的重试预算（每次分片失败扣减 1）
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// 全局最大并发分片数（所有文件共享）
    #[serde(default = "default_max_global_chunks")]
    pub max_global_chunks: usize,
    /// 是否默认启用分片上传（drop 请求可单独覆盖）
    #[serde(default = "default_chunked")]
    pub chunked: bool,
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8080/api/v1/file".to_string()
}

fn default_chunk_size_mb() -> u64 {
    5
}

fn default_retry_budget() -> u32 {
    5
}

fn default_max_global_chunks() -> usize {
    8
}

fn default_chunked() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            chunk_size_mb: default_chunk_size_mb(),
            retry_budget: default_retry_budget(),
            max_global_chunks: default_max_global_chunks(),
            chunked: default_chunked(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl UploadConfig {
    /// 分片大小（字节）
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb * 1024 * 1024
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("读取配置文件失败")?;

        let config: AppConfig = toml::from_str(&content).context("解析配置文件失败")?;
        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("创建配置目录失败")?;
        }

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content).await.context("写入配置文件失败")?;
        Ok(())
    }

    /// 加载配置，失败时使用默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.upload.endpoint, "http://localhost:8080/api/v1/file");
        assert_eq!(config.upload.chunk_size_mb, 5);
        assert_eq!(config.upload.retry_budget, 5);
        assert!(config.upload.chunked);
    }

    #[test]
    fn test_chunk_size_bytes() {
        let upload = UploadConfig::default();
        assert_eq!(upload.chunk_size_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        // 缺省字段应回落到默认值
        let toml_str = r#"
            [upload]
            endpoint = "http://example.com/api/v1/file"
            chunk_size_mb = 1
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.upload.endpoint, "http://example.com/api/v1/file");
        assert_eq!(config.upload.chunk_size_mb, 1);
        assert_eq!(config.upload.retry_budget, 5);
        assert_eq!(config.server.port, 8090);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = AppConfig::default();
        config.upload.retry_budget = 3;
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.upload.retry_budget, 3);
    }

    #[tokio::test]
    async fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default("/nonexistent/path/app.toml").await;
        assert_eq!(config.upload.chunk_size_mb, 5);
    }
}
