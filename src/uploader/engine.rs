// 上传引擎
//
// 负责协调单个文件的分片上传：
// - 使用 Semaphore 控制每个文件的最大并发分片数（另有全局并发上限）
// - 使用 JoinSet 管理并发任务
// - 每次调度对单个分片只做一次网络尝试，失败扣减条目的重试预算，
//   是否重试由调用方（手动重试入口）决定
// - 全部分片尝试结束后按显式状态收敛：
//   全部成功 → completed
//   有失败且预算 > 0 → awaiting_retry
//   有失败且预算 = 0 → failed（终态）

use crate::remote::RemoteClient;
use crate::uploader::{ChunkManager, ItemStatus, UploadChunk, UploadItem};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 上传引擎
///
/// 每个上传条目对应一个引擎实例，持有条目与分片计划的共享引用
pub struct UploadEngine {
    /// 远端上传客户端
    client: RemoteClient,
    /// 上传条目
    item: Arc<Mutex<UploadItem>>,
    /// 分片管理器
    chunks: Arc<Mutex<ChunkManager>>,
    /// 取消令牌
    cancel_token: CancellationToken,
    /// 全局并发信号量（所有文件共享）
    global_semaphore: Arc<Semaphore>,
    /// 本文件最大并发分片数
    max_concurrent: usize,
}

impl UploadEngine {
    pub fn new(
        client: RemoteClient,
        item: Arc<Mutex<UploadItem>>,
        chunks: Arc<Mutex<ChunkManager>>,
        cancel_token: CancellationToken,
        global_semaphore: Arc<Semaphore>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            client,
            item,
            chunks,
            cancel_token,
            global_semaphore,
            max_concurrent,
        }
    }

    /// 执行上传
    ///
    /// 对所有待上传分片各做一次尝试，然后收敛条目状态
    pub async fn upload(&self) -> Result<()> {
        let (local_path, file_name, chunked) = {
            let item = self.item.lock().await;
            (
                item.local_path.clone(),
                item.file_name.clone(),
                item.chunked,
            )
        };

        let total_chunks = {
            let cm = self.chunks.lock().await;
            cm.chunk_count()
        };

        info!(
            "开始上传: file={}, path={:?}, chunks={}, 并发上限={}",
            file_name, local_path, total_chunks, self.max_concurrent
        );

        {
            let mut item = self.item.lock().await;
            item.total_chunks = total_chunks;
            item.mark_uploading();
        }

        // 空文件：没有分片可传，直接完成
        if total_chunks == 0 {
            self.item.lock().await.mark_completed();
            info!("空文件直接标记完成: file={}", file_name);
            return Ok(());
        }

        if chunked {
            self.dispatch_all_chunks(&local_path, &file_name, total_chunks)
                .await?;
        } else {
            // 整文件路径：单分片计划，走整文件请求
            let chunk = {
                let mut cm = self.chunks.lock().await;
                let chunk = cm.next_pending().map(|c| c.clone());
                if let Some(c) = &chunk {
                    cm.mark_in_flight(c.index);
                }
                chunk
            };
            if let Some(chunk) = chunk {
                upload_single_chunk(
                    self.client.clone(),
                    local_path.clone(),
                    file_name.clone(),
                    chunk,
                    total_chunks,
                    false,
                    self.item.clone(),
                    self.chunks.clone(),
                )
                .await;
            }
        }

        // 收敛条目状态
        let (outcome, failed) = {
            let cm = self.chunks.lock().await;
            let mut item = self.item.lock().await;
            (resolve_outcome(&mut item, &cm), cm.failed_indices())
        };

        if failed.is_empty() {
            info!("上传调度结束: file={}, 状态={:?}", file_name, outcome);
        } else {
            warn!(
                "上传调度结束: file={}, 状态={:?}, 失败分片={:?}",
                file_name, outcome, failed
            );
        }
        Ok(())
    }

    /// 并发调度所有分片（每个分片一次尝试）
    async fn dispatch_all_chunks(
        &self,
        local_path: &PathBuf,
        file_name: &str,
        total_chunks: usize,
    ) -> Result<()> {
        // 本文件的并发上限
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set: JoinSet<()> = JoinSet::new();

        loop {
            // 检查取消
            if self.cancel_token.is_cancelled() {
                join_set.abort_all();
                anyhow::bail!("上传已取消");
            }

            // 获取下一个待上传分片
            let chunk = {
                let mut cm = self.chunks.lock().await;
                match cm.next_pending() {
                    Some(c) => {
                        let chunk = c.clone();
                        cm.mark_in_flight(chunk.index);
                        Some(chunk)
                    }
                    None => None,
                }
            };

            let chunk = match chunk {
                Some(c) => c,
                None => break,
            };

            // 先拿本文件许可，再在任务内拿全局许可
            let permit = semaphore.clone().acquire_owned().await?;
            let global = self.global_semaphore.clone();
            let client = self.client.clone();
            let item = self.item.clone();
            let chunks = self.chunks.clone();
            let cancel_token = self.cancel_token.clone();
            let local_path = local_path.clone();
            let file_name = file_name.to_string();

            join_set.spawn(async move {
                let _permit = permit;
                let _global = match global.acquire_owned().await {
                    Ok(g) => g,
                    Err(_) => return,
                };

                if cancel_token.is_cancelled() {
                    return;
                }

                upload_single_chunk(
                    client,
                    local_path,
                    file_name,
                    chunk,
                    total_chunks,
                    true,
                    item,
                    chunks,
                )
                .await;
            });
        }

        // 等待所有任务完成
        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                warn!("分片任务异常: {}", e);
            }
        }

        Ok(())
    }
}

/// 单分片上传（一次尝试，结果折叠进共享状态）
///
/// 成功：标记分片成功并推进条目的成功计数与已上传字节数；
/// 失败：标记分片失败并扣减条目的重试预算，错误不向外抛出
///
/// # 返回
/// 本次尝试是否成功
#[allow(clippy::too_many_arguments)]
pub(crate) async fn upload_single_chunk(
    client: RemoteClient,
    local_path: PathBuf,
    file_name: String,
    chunk: UploadChunk,
    total_chunks: usize,
    chunked: bool,
    item: Arc<Mutex<UploadItem>>,
    chunks: Arc<Mutex<ChunkManager>>,
) -> bool {
    debug!(
        "[分片#{}] 开始上传 (范围: {}-{}, 大小: {} bytes)",
        chunk.index,
        chunk.range.start,
        chunk.range.end,
        chunk.size()
    );

    // 读取分片数据
    let data = match chunk.read_data(&local_path).await {
        Ok(data) => data,
        Err(e) => {
            warn!("[分片#{}] 读取数据失败: {}", chunk.index, e);
            record_chunk_failure(&item, &chunks, chunk.index, e.to_string()).await;
            return false;
        }
    };

    // 单次网络尝试
    let result = if chunked {
        client
            .upload_chunk(data, &file_name, chunk.index, total_chunks)
            .await
    } else {
        client.upload_file(data, &file_name).await
    };

    match result {
        Ok(()) => {
            // 持有分片锁期间写回条目计数，避免并发分片用旧快照覆盖新值
            // 锁顺序与收敛处一致：先分片后条目
            let succeeded = {
                let mut cm = chunks.lock().await;
                cm.mark_succeeded(chunk.index);
                let mut item = item.lock().await;
                item.succeeded_chunks = cm.succeeded_count();
                item.uploaded_size = cm.uploaded_bytes();
                item.succeeded_chunks
            };
            info!(
                "[分片#{}] 上传成功: file={} ({}/{} 完成)",
                chunk.index, file_name, succeeded, total_chunks
            );
            true
        }
        Err(e) => {
            warn!(
                "[分片#{}] 上传失败: file={}, 分类={:?}, 错误: {}",
                chunk.index,
                file_name,
                e.kind(),
                e
            );
            record_chunk_failure(&item, &chunks, chunk.index, e.to_string()).await;
            false
        }
    }
}

/// 记录一次分片失败：标记分片失败并扣减重试预算
async fn record_chunk_failure(
    item: &Arc<Mutex<UploadItem>>,
    chunks: &Arc<Mutex<ChunkManager>>,
    chunk_index: usize,
    error: String,
) {
    chunks.lock().await.mark_failed(chunk_index);

    let mut item = item.lock().await;
    let remaining = item.consume_retry();
    item.error = Some(error);
    debug!(
        "[分片#{}] 失败记账: file={}, 剩余重试预算={}",
        chunk_index, item.file_name, remaining
    );
}

/// 收敛条目状态
///
/// 以分片计划的显式状态为准：
/// - 全部成功 → Completed
/// - 有失败且预算 > 0 → AwaitingRetry（保留手动重试入口）
/// - 有失败且预算 = 0 → Failed（终态，进度保持在 100 以下）
pub(crate) fn resolve_outcome(item: &mut UploadItem, chunks: &ChunkManager) -> ItemStatus {
    // 收敛前以分片计划为准重新对齐计数
    item.succeeded_chunks = chunks.succeeded_count();
    item.uploaded_size = chunks.uploaded_bytes();

    if chunks.is_completed() {
        item.mark_completed();
    } else if item.has_retry_budget() {
        item.mark_awaiting_retry();
    } else {
        item.mark_failed("重试预算已耗尽".to_string());
    }
    item.status.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::DEFAULT_RETRY_BUDGET;

    const MIB: u64 = 1024 * 1024;

    fn test_item() -> UploadItem {
        let mut item = UploadItem::new(
            PathBuf::from("./test.bin"),
            10 * MIB,
            DEFAULT_RETRY_BUDGET,
            true,
        );
        item.total_chunks = 2;
        item
    }

    #[test]
    fn test_resolve_outcome_completed() {
        let mut cm = ChunkManager::new(10 * MIB, 5 * MIB);
        cm.mark_succeeded(0);
        cm.mark_succeeded(1);

        let mut item = test_item();
        item.succeeded_chunks = 2;

        assert_eq!(resolve_outcome(&mut item, &cm), ItemStatus::Completed);
        assert_eq!(item.progress(), 100);
    }

    #[test]
    fn test_resolve_outcome_awaiting_retry() {
        let mut cm = ChunkManager::new(10 * MIB, 5 * MIB);
        cm.mark_succeeded(0);
        cm.mark_failed(1);

        let mut item = test_item();
        item.succeeded_chunks = 1;
        item.consume_retry();

        assert_eq!(resolve_outcome(&mut item, &cm), ItemStatus::AwaitingRetry);
        assert!(item.progress() < 100);
    }

    #[test]
    fn test_resolve_outcome_failed_terminal() {
        let mut cm = ChunkManager::new(10 * MIB, 5 * MIB);
        cm.mark_succeeded(0);
        cm.mark_failed(1);

        let mut item = test_item();
        item.succeeded_chunks = 1;
        // 预算耗尽
        for _ in 0..DEFAULT_RETRY_BUDGET {
            item.consume_retry();
        }

        assert_eq!(resolve_outcome(&mut item, &cm), ItemStatus::Failed);
        assert!(item.error.is_some());
        // 终态下进度不得虚报 100
        assert!(item.progress() < 100);
    }

    #[test]
    fn test_resolve_outcome_resyncs_stale_counts() {
        // 并发分片完成顺序交错时，条目上可能残留旧计数快照，
        // 收敛必须以分片计划为准重新对齐
        let mut cm = ChunkManager::new(10 * MIB, 5 * MIB);
        cm.mark_succeeded(0);
        cm.mark_succeeded(1);

        let mut item = test_item();
        // 模拟旧快照：计划已全部成功，条目只记到 1
        item.succeeded_chunks = 1;
        item.uploaded_size = 5 * MIB;

        assert_eq!(resolve_outcome(&mut item, &cm), ItemStatus::Completed);
        assert_eq!(item.succeeded_chunks, 2);
        assert_eq!(item.uploaded_size, 10 * MIB);
        assert_eq!(item.progress(), 100);
    }

    #[test]
    fn test_resolve_outcome_empty_plan_is_completed() {
        let cm = ChunkManager::new(0, 5 * MIB);
        let mut item = UploadItem::new(PathBuf::from("./empty"), 0, DEFAULT_RETRY_BUDGET, true);

        assert_eq!(resolve_outcome(&mut item, &cm), ItemStatus::Completed);
        assert_eq!(item.progress(), 100);
    }
}
