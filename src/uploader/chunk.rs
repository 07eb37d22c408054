// 上传分片管理
//
// 分片规则：
// - 文件大小 S、分片大小 C，分片数 = ceil(S/C)
// - 分片 i 覆盖字节区间 [i*C, min(S, (i+1)*C))，互不重叠、无缝覆盖 [0, S)
// - 空文件（S = 0）产生 0 个分片，分片计划直接视为已完成
//
// 进度按「已成功的分片数 / 总分片数」计算，
// 与分片完成顺序无关

use anyhow::{Context, Result};
use std::ops::Range;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

/// 默认分片大小: 5MB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// 最小分片大小: 1MB
pub const MIN_CHUNK_SIZE: u64 = 1024 * 1024;

/// 最大分片大小: 32MB
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// 分片状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// 等待上传
    Pending,
    /// 上传中（防止重复调度）
    InFlight,
    /// 已成功
    Succeeded,
    /// 已失败（等待手动重试或预算耗尽）
    Failed,
}

/// 上传分片信息
#[derive(Debug, Clone)]
pub struct UploadChunk {
    /// 分片索引
    pub index: usize,
    /// 字节范围
    pub range: Range<u64>,
    /// 分片状态
    pub state: ChunkState,
    /// 已尝试次数
    pub attempts: u32,
}

impl UploadChunk {
    pub fn new(index: usize, range: Range<u64>) -> Self {
        Self {
            index,
            range,
            state: ChunkState::Pending,
            attempts: 0,
        }
    }

    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// 读取分片数据
    ///
    /// # 参数
    /// * `file_path` - 本地文件路径
    pub async fn read_data(&self, file_path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(file_path).await.context("打开上传文件失败")?;

        // 定位到分片起始位置
        file.seek(std::io::SeekFrom::Start(self.range.start))
            .await
            .context("文件定位失败")?;

        let chunk_size = self.size() as usize;
        let mut buffer = vec![0u8; chunk_size];
        file.read_exact(&mut buffer)
            .await
            .context("读取分片数据失败")?;

        debug!(
            "读取分片 #{}: bytes={}-{}, 大小={} bytes",
            self.index,
            self.range.start,
            self.range.end,
            chunk_size
        );

        Ok(buffer)
    }
}

/// 分片管理器
///
/// 持有单个文件的全部分片及其状态，
/// 进度、完成判定都以逐分片的成功标记为准
#[derive(Debug)]
pub struct ChunkManager {
    /// 所有分片
    chunks: Vec<UploadChunk>,
    /// 文件总大小
    total_size: u64,
}

impl ChunkManager {
    /// 创建新的分片管理器
    ///
    /// # 参数
    /// * `total_size` - 文件总大小
    /// * `chunk_size` - 分片大小（会被限制在 1MB-32MB 范围内）
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        let chunk_size = chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        let chunks = Self::calculate_chunks(total_size, chunk_size);

        info!(
            "创建分片计划: 文件大小={} bytes, 分片大小={} bytes, 分片数量={}",
            total_size,
            chunk_size,
            chunks.len()
        );

        Self { chunks, total_size }
    }

    /// 整文件模式的单分片计划（非分片上传路径复用同一套状态跟踪）
    pub fn whole_file(total_size: u64) -> Self {
        let chunks = if total_size == 0 {
            Vec::new()
        } else {
            vec![UploadChunk::new(0, 0..total_size)]
        };
        Self { chunks, total_size }
    }

    /// 计算分片
    fn calculate_chunks(total_size: u64, chunk_size: u64) -> Vec<UploadChunk> {
        let mut chunks = Vec::new();
        let mut offset = 0u64;
        let mut index = 0;

        while offset < total_size {
            let end = std::cmp::min(offset + chunk_size, total_size);
            chunks.push(UploadChunk::new(index, offset..end));
            offset = end;
            index += 1;
        }

        chunks
    }

    /// 获取下一个待上传的分片
    pub fn next_pending(&mut self) -> Option<&mut UploadChunk> {
        self.chunks
            .iter_mut()
            .find(|c| c.state == ChunkState::Pending)
    }

    /// 获取指定分片
    pub fn get(&self, index: usize) -> Option<&UploadChunk> {
        self.chunks.get(index)
    }

    /// 获取所有分片
    pub fn chunks(&self) -> &[UploadChunk] {
        &self.chunks
    }

    /// 文件总大小
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// 获取分片数量
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// 获取已成功的分片数量
    pub fn succeeded_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.state == ChunkState::Succeeded)
            .count()
    }

    /// 获取失败分片的索引列表
    pub fn failed_indices(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .filter(|c| c.state == ChunkState::Failed)
            .map(|c| c.index)
            .collect()
    }

    /// 获取已上传的字节数
    pub fn uploaded_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .filter(|c| c.state == ChunkState::Succeeded)
            .map(|c| c.size())
            .sum()
    }

    /// 计算上传进度（百分比，向下取整）
    ///
    /// 空文件没有分片，进度直接为 100
    pub fn progress_percent(&self) -> u8 {
        if self.chunks.is_empty() {
            return 100;
        }
        ((self.succeeded_count() * 100) / self.chunks.len()) as u8
    }

    /// 是否全部完成
    pub fn is_completed(&self) -> bool {
        self.chunks.iter().all(|c| c.state == ChunkState::Succeeded)
    }

    /// 是否存在失败分片
    pub fn has_failures(&self) -> bool {
        self.chunks.iter().any(|c| c.state == ChunkState::Failed)
    }

    /// 标记分片上传中（防止重复调度）
    pub fn mark_in_flight(&mut self, index: usize) {
        if let Some(chunk) = self.chunks.get_mut(index) {
            chunk.state = ChunkState::InFlight;
            chunk.attempts += 1;
        }
    }

    /// 标记分片成功
    pub fn mark_succeeded(&mut self, index: usize) {
        if let Some(chunk) = self.chunks.get_mut(index) {
            chunk.state = ChunkState::Succeeded;
        }
    }

    /// 标记分片失败
    pub fn mark_failed(&mut self, index: usize) {
        if let Some(chunk) = self.chunks.get_mut(index) {
            chunk.state = ChunkState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_chunk_creation() {
        let chunk = UploadChunk::new(0, 0..1024);
        assert_eq!(chunk.index, 0);
        assert_eq!(chunk.size(), 1024);
        assert_eq!(chunk.state, ChunkState::Pending);
        assert_eq!(chunk.attempts, 0);
    }

    #[test]
    fn test_chunk_count_is_ceil() {
        // 整除
        let manager = ChunkManager::new(10 * MIB, 5 * MIB);
        assert_eq!(manager.chunk_count(), 2);

        // 有余数时向上取整
        let manager = ChunkManager::new(11 * MIB, 5 * MIB);
        assert_eq!(manager.chunk_count(), 3);

        // 小于一个分片
        let manager = ChunkManager::new(3 * MIB, 5 * MIB);
        assert_eq!(manager.chunk_count(), 1);
    }

    #[test]
    fn test_12mib_file_with_5mib_chunks() {
        // 12MB 文件、5MB 分片 → 3 个分片
        let manager = ChunkManager::new(12 * MIB, 5 * MIB);
        assert_eq!(manager.chunk_count(), 3);
        assert_eq!(manager.chunks()[0].range, 0..(5 * MIB));
        assert_eq!(manager.chunks()[1].range, (5 * MIB)..(10 * MIB));
        assert_eq!(manager.chunks()[2].range, (10 * MIB)..(12 * MIB));
        assert_eq!(manager.chunks()[2].size(), 2 * MIB);
    }

    #[test]
    fn test_empty_file_has_zero_chunks() {
        // 空文件：0 个分片，直接视为完成
        let manager = ChunkManager::new(0, 5 * MIB);
        assert_eq!(manager.chunk_count(), 0);
        assert!(manager.is_completed());
        assert_eq!(manager.progress_percent(), 100);
        assert_eq!(manager.uploaded_bytes(), 0);
    }

    #[test]
    fn test_progress_from_succeeded_set() {
        let mut manager = ChunkManager::new(15 * MIB, 5 * MIB);
        assert_eq!(manager.progress_percent(), 0);

        // 进度只看成功分片的数量，与完成顺序无关
        manager.mark_succeeded(2);
        assert_eq!(manager.progress_percent(), 33);

        manager.mark_succeeded(0);
        assert_eq!(manager.progress_percent(), 66);

        manager.mark_succeeded(1);
        assert_eq!(manager.progress_percent(), 100);
        assert!(manager.is_completed());
    }

    #[test]
    fn test_failed_chunk_tracking() {
        let mut manager = ChunkManager::new(15 * MIB, 5 * MIB);
        manager.mark_succeeded(0);
        manager.mark_failed(1);

        assert!(!manager.is_completed());
        assert!(manager.has_failures());
        assert_eq!(manager.failed_indices(), vec![1]);
        // 失败分片不计入进度
        assert_eq!(manager.progress_percent(), 33);
        assert_eq!(manager.uploaded_bytes(), 5 * MIB);
    }

    #[test]
    fn test_next_pending_skips_in_flight() {
        let mut manager = ChunkManager::new(15 * MIB, 5 * MIB);

        manager.mark_in_flight(0);
        let chunk = manager.next_pending().unwrap();
        assert_eq!(chunk.index, 1);

        manager.mark_in_flight(1);
        manager.mark_in_flight(2);
        assert!(manager.next_pending().is_none());
    }

    #[test]
    fn test_attempts_counted_on_dispatch() {
        let mut manager = ChunkManager::new(5 * MIB, 5 * MIB);
        manager.mark_in_flight(0);
        manager.mark_failed(0);
        assert_eq!(manager.get(0).unwrap().attempts, 1);

        manager.mark_in_flight(0);
        manager.mark_succeeded(0);
        assert_eq!(manager.get(0).unwrap().attempts, 2);
    }

    #[test]
    fn test_chunk_size_clamping() {
        // 小于 1MB 的分片大小被提升到 1MB
        let manager = ChunkManager::new(10 * MIB, 1024);
        assert_eq!(manager.chunk_count(), 10);

        // 大于 32MB 的分片大小被压到 32MB
        let manager = ChunkManager::new(64 * MIB, 128 * MIB);
        assert_eq!(manager.chunk_count(), 2);
    }

    #[test]
    fn test_whole_file_plan() {
        let manager = ChunkManager::whole_file(3 * MIB);
        assert_eq!(manager.chunk_count(), 1);
        assert_eq!(manager.chunks()[0].range, 0..(3 * MIB));

        let empty = ChunkManager::whole_file(0);
        assert_eq!(empty.chunk_count(), 0);
        assert!(empty.is_completed());
    }

    proptest! {
        // 分片必须无缝、无重叠地覆盖 [0, S)，数量等于 ceil(S/C)
        #[test]
        fn prop_chunks_partition_file(
            total_size in 0u64..512 * 1024 * 1024,
            chunk_size in MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE,
        ) {
            let manager = ChunkManager::new(total_size, chunk_size);
            let chunks = manager.chunks();

            prop_assert_eq!(chunks.len() as u64, total_size.div_ceil(chunk_size));

            let mut expected_start = 0u64;
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.range.start, expected_start);
                prop_assert!(chunk.range.end > chunk.range.start);
                prop_assert!(chunk.size() <= chunk_size);
                expected_start = chunk.range.end;
            }
            prop_assert_eq!(expected_start, total_size);
        }
    }
}
