// DropRelay Rust Library
// 拖放分片上传中转服务核心库

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 远端上传接口模块
pub mod remote;

// Web服务器模块
pub mod server;

// 上传模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, LogConfig, UploadConfig};
pub use remote::{RemoteClient, RemoteError, RemoteErrorKind};
pub use server::AppState;
pub use uploader::{
    ChunkManager, ChunkState, ItemStatus, UploadChunk, UploadEngine, UploadItem, UploadManager,
    UploadSummary,
};
