// 上传模块
//
// 拖放 → 分片 → 并发上传 → 进度/重试跟踪 的完整链路：
// - chunk: 分片切分与逐分片状态
// - task: 上传条目（稳定 ID、重试预算、显式状态机）
// - engine: 单文件并发上传引擎（按文件与全局双层并发上限）
// - manager: 多条目注册表、拖放入口、手动重试入口

pub mod chunk;
pub mod engine;
pub mod manager;
pub mod task;

pub use chunk::{
    ChunkManager, ChunkState, UploadChunk, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};
pub use engine::UploadEngine;
pub use manager::{ItemHandle, UploadManager, UploadSummary};
pub use task::{ItemStatus, UploadItem, DEFAULT_RETRY_BUDGET};

/// 根据文件大小计算单文件最大并发分片数
///
/// 小文件单线程即可，大文件逐级放宽到 4（全局另有总并发上限）
///
/// # 参数
/// * `file_size` - 文件大小（字节）
pub fn calculate_item_max_chunks(file_size: u64) -> usize {
    match file_size {
        0..=10_485_760 => 1,             // <=10MB: 单线程
        10_485_761..=104_857_600 => 2,   // 10MB-100MB: 2线程
        104_857_601..=1_073_741_824 => 3, // 100MB-1GB: 3线程
        _ => 4,                           // >1GB: 最多4线程
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_item_max_chunks() {
        assert_eq!(calculate_item_max_chunks(0), 1);
        assert_eq!(calculate_item_max_chunks(5 * 1024 * 1024), 1);
        assert_eq!(calculate_item_max_chunks(50 * 1024 * 1024), 2);
        assert_eq!(calculate_item_max_chunks(500 * 1024 * 1024), 3);
        assert_eq!(calculate_item_max_chunks(2 * 1024 * 1024 * 1024), 4);
    }
}
