// 上传条目定义
//
// 一个条目对应一次拖放中的一个文件，
// 用稳定的 UUID 标识，避免以数组下标索引共享状态

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// 默认重试预算（每次分片失败扣减 1）
pub const DEFAULT_RETRY_BUDGET: u32 = 5;

/// 上传条目状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// 等待中
    Pending,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 部分分片失败，仍有重试预算，等待手动重试
    AwaitingRetry,
    /// 失败（重试预算耗尽，终态）
    Failed,
}

/// 上传条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadItem {
    /// 条目ID
    pub id: String,
    /// 原始文件名
    pub file_name: String,
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 文件大小
    pub total_size: u64,
    /// 已上传大小
    pub uploaded_size: u64,
    /// 条目状态
    pub status: ItemStatus,
    /// 剩余重试预算
    pub retry_budget: u32,
    /// 总分片数
    pub total_chunks: usize,
    /// 已成功分片数
    pub succeeded_chunks: usize,
    /// 是否分片上传
    pub chunked: bool,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 开始时间 (Unix timestamp)
    pub started_at: Option<i64>,
    /// 完成时间 (Unix timestamp)
    pub completed_at: Option<i64>,
    /// 最近一次错误信息
    pub error: Option<String>,
}

impl UploadItem {
    /// 创建新的上传条目
    pub fn new(local_path: PathBuf, total_size: u64, retry_budget: u32, chunked: bool) -> Self {
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());

        Self {
            id: Uuid::new_v4().to_string(),
            file_name,
            local_path,
            total_size,
            uploaded_size: 0,
            status: ItemStatus::Pending,
            retry_budget,
            total_chunks: 0,
            succeeded_chunks: 0,
            chunked,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// 计算进度百分比（向下取整）
    ///
    /// 以已成功分片数为准，空文件（0 分片）只要完成就是 100
    pub fn progress(&self) -> u8 {
        if self.total_chunks == 0 {
            return if self.status == ItemStatus::Completed {
                100
            } else {
                0
            };
        }
        ((self.succeeded_chunks * 100) / self.total_chunks) as u8
    }

    /// 是否还有重试预算
    pub fn has_retry_budget(&self) -> bool {
        self.retry_budget > 0
    }

    /// 扣减一次重试预算
    ///
    /// 只在分片失败时调用，成功不扣减；返回扣减后的剩余值
    pub fn consume_retry(&mut self) -> u32 {
        self.retry_budget = self.retry_budget.saturating_sub(1);
        self.retry_budget
    }

    /// 标记为上传中
    pub fn mark_uploading(&mut self) {
        self.status = ItemStatus::Uploading;
        if self.started_at.is_none() {
            self.started_at = Some(chrono::Utc::now().timestamp());
        }
    }

    /// 标记为已完成
    pub fn mark_completed(&mut self) {
        self.status = ItemStatus::Completed;
        self.completed_at = Some(chrono::Utc::now().timestamp());
        self.uploaded_size = self.total_size;
    }

    /// 标记为等待手动重试
    pub fn mark_awaiting_retry(&mut self) {
        self.status = ItemStatus::AwaitingRetry;
    }

    /// 标记为失败（终态）
    ///
    /// 重试预算耗尽后进入该状态，不再提供重试入口
    pub fn mark_failed(&mut self, error: String) {
        self.status = ItemStatus::Failed;
        self.completed_at = Some(chrono::Utc::now().timestamp());
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_item(size: u64) -> UploadItem {
        UploadItem::new(
            PathBuf::from("./test/file.bin"),
            size,
            DEFAULT_RETRY_BUDGET,
            true,
        )
    }

    #[test]
    fn test_item_creation() {
        let item = test_item(1024 * 1024);
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.file_name, "file.bin");
        assert_eq!(item.retry_budget, 5);
        assert_eq!(item.uploaded_size, 0);
        assert!(!item.id.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = test_item(1);
        let b = test_item(1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_progress_from_chunk_counts() {
        let mut item = test_item(15 * 1024 * 1024);
        item.total_chunks = 3;

        assert_eq!(item.progress(), 0);

        item.succeeded_chunks = 1;
        assert_eq!(item.progress(), 33);

        item.succeeded_chunks = 2;
        assert_eq!(item.progress(), 66);

        item.succeeded_chunks = 3;
        assert_eq!(item.progress(), 100);
    }

    #[test]
    fn test_empty_file_progress() {
        let mut item = test_item(0);
        // 空文件 0 分片：完成前进度为 0，完成后为 100
        assert_eq!(item.progress(), 0);
        item.mark_completed();
        assert_eq!(item.progress(), 100);
    }

    #[test]
    fn test_retry_budget_monotonic_exhaustion() {
        let mut item = test_item(1024);
        // 连续失败依次得到 4, 3, 2, 1, 0
        assert_eq!(item.consume_retry(), 4);
        assert_eq!(item.consume_retry(), 3);
        assert_eq!(item.consume_retry(), 2);
        assert_eq!(item.consume_retry(), 1);
        assert_eq!(item.consume_retry(), 0);
        assert!(!item.has_retry_budget());

        // 已到 0 后不再下溢
        assert_eq!(item.consume_retry(), 0);
    }

    #[test]
    fn test_status_transitions() {
        let mut item = test_item(1024);

        item.mark_uploading();
        assert_eq!(item.status, ItemStatus::Uploading);
        assert!(item.started_at.is_some());

        item.mark_awaiting_retry();
        assert_eq!(item.status, ItemStatus::AwaitingRetry);

        item.mark_failed("预算耗尽".to_string());
        assert_eq!(item.status, ItemStatus::Failed);
        assert!(item.error.is_some());
        assert!(item.completed_at.is_some());
    }

    #[test]
    fn test_completed_sets_uploaded_size() {
        let mut item = test_item(2048);
        item.mark_completed();
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.uploaded_size, 2048);
        assert!(item.completed_at.is_some());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ItemStatus::AwaitingRetry).unwrap();
        assert_eq!(json, "\"awaiting_retry\"");
    }
}
