// 上传管理器
//
// 负责管理多个上传条目：
// - 以稳定的条目 ID（UUID）为键的并发注册表（DashMap），
//   不依赖数组下标，条目并发加入时互不干扰
// - 拖放入口：为每个文件建立条目与分片计划，并启动各自的上传引擎
// - 手动重试入口：重试前强制校验分片状态与剩余预算（不是仅由 UI 把关）
// - 聚合状态由各条目的显式状态推导，而非“最后一个分片”的隐式判断

use crate::config::UploadConfig;
use crate::remote::RemoteClient;
use crate::uploader::{
    calculate_item_max_chunks, engine, ChunkManager, ChunkState, ItemStatus, UploadEngine,
    UploadItem,
};
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 上传条目句柄（注册表值）
#[derive(Clone)]
pub struct ItemHandle {
    /// 条目
    pub item: Arc<Mutex<UploadItem>>,
    /// 分片管理器
    pub chunks: Arc<Mutex<ChunkManager>>,
    /// 取消令牌
    pub cancel_token: CancellationToken,
    /// 远端客户端（按创建时的配置构建）
    pub client: RemoteClient,
}

/// 聚合状态统计
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    /// 条目总数
    pub total: usize,
    /// 进行中（pending / uploading）
    pub active: usize,
    /// 已完成
    pub completed: usize,
    /// 等待手动重试
    pub awaiting_retry: usize,
    /// 已失败（终态）
    pub failed: usize,
}

/// 上传管理器
pub struct UploadManager {
    /// 上传配置（控制API可更新，drop 时取快照）
    config: Arc<RwLock<UploadConfig>>,
    /// 所有条目（item_id -> ItemHandle）
    items: Arc<DashMap<String, ItemHandle>>,
    /// 全局并发分片信号量（所有文件共享）
    global_semaphore: Arc<Semaphore>,
}

impl UploadManager {
    /// 创建新的上传管理器
    pub fn new(config: UploadConfig) -> Self {
        let max_global = config.max_global_chunks.max(1);
        Self {
            config: Arc::new(RwLock::new(config)),
            items: Arc::new(DashMap::new()),
            global_semaphore: Arc::new(Semaphore::new(max_global)),
        }
    }

    /// 当前上传配置快照
    pub async fn config(&self) -> UploadConfig {
        self.config.read().await.clone()
    }

    /// 更新上传配置（只影响之后创建的条目）
    pub async fn update_config(&self, config: UploadConfig) {
        *self.config.write().await = config;
    }

    /// 处理一次拖放：为每个文件创建条目并启动上传
    ///
    /// # 参数
    /// * `paths` - 拖放的本地文件路径列表
    /// * `chunked` - 是否分片上传，None 时使用配置默认值
    ///
    /// # 返回
    /// 创建的条目快照列表
    pub async fn create_from_drop(
        &self,
        paths: Vec<PathBuf>,
        chunked: Option<bool>,
    ) -> Result<Vec<UploadItem>> {
        let config = self.config.read().await.clone();
        let chunked = chunked.unwrap_or(config.chunked);

        let client = RemoteClient::new(&config.endpoint, config.request_timeout_secs)
            .context("创建上传客户端失败")?;

        // 并发读取所有文件元信息。
        // 整批校验通过后才启动任何条目：任一文件不合法则整个拖放拒绝，
        // 不留下已启动的孤儿上传
        let metas = futures::future::join_all(paths.iter().map(|p| {
            let p = p.clone();
            async move {
                let meta = tokio::fs::metadata(&p)
                    .await
                    .with_context(|| format!("读取文件信息失败: {:?}", p))?;
                if !meta.is_file() {
                    anyhow::bail!("不是普通文件: {:?}", p);
                }
                Ok::<(PathBuf, u64), anyhow::Error>((p, meta.len()))
            }
        }))
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

        let mut created = Vec::with_capacity(metas.len());

        for (path, total_size) in metas {
            let snapshot = self
                .start_item(path, total_size, chunked, &config, client.clone())
                .await;
            created.push(snapshot);
        }

        info!(
            "拖放入队完成: {} 个文件, 分片模式={}",
            created.len(),
            chunked
        );
        Ok(created)
    }

    /// 创建单个条目并启动其上传引擎
    async fn start_item(
        &self,
        path: PathBuf,
        total_size: u64,
        chunked: bool,
        config: &UploadConfig,
        client: RemoteClient,
    ) -> UploadItem {
        let item = UploadItem::new(path, total_size, config.retry_budget, chunked);
        let item_id = item.id.clone();

        let plan = if chunked {
            ChunkManager::new(total_size, config.chunk_size_bytes())
        } else {
            ChunkManager::whole_file(total_size)
        };

        let handle = ItemHandle {
            item: Arc::new(Mutex::new(item.clone())),
            chunks: Arc::new(Mutex::new(plan)),
            cancel_token: CancellationToken::new(),
            client: client.clone(),
        };
        self.items.insert(item_id.clone(), handle.clone());

        let max_concurrent = calculate_item_max_chunks(total_size);
        let engine = UploadEngine::new(
            client,
            handle.item.clone(),
            handle.chunks.clone(),
            handle.cancel_token.clone(),
            self.global_semaphore.clone(),
            max_concurrent,
        );

        let file_name = item.file_name.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.upload().await {
                error!("上传引擎退出: file={}, 错误: {}", file_name, e);
            }
        });

        item
    }

    /// 获取单个条目快照
    pub async fn get(&self, item_id: &str) -> Option<UploadItem> {
        let handle = self.items.get(item_id)?.clone();
        let item = handle.item.lock().await.clone();
        Some(item)
    }

    /// 获取所有条目快照（按创建时间排序）
    pub async fn list(&self) -> Vec<UploadItem> {
        let handles: Vec<ItemHandle> = self.items.iter().map(|e| e.value().clone()).collect();

        let mut items = Vec::with_capacity(handles.len());
        for handle in handles {
            items.push(handle.item.lock().await.clone());
        }
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        items
    }

    /// 聚合状态统计
    ///
    /// 整体是否仍在上传由各条目的显式状态推导
    pub async fn summary(&self) -> UploadSummary {
        let items = self.list().await;
        let mut summary = UploadSummary {
            total: items.len(),
            active: 0,
            completed: 0,
            awaiting_retry: 0,
            failed: 0,
        };
        for item in &items {
            match item.status {
                ItemStatus::Pending | ItemStatus::Uploading => summary.active += 1,
                ItemStatus::Completed => summary.completed += 1,
                ItemStatus::AwaitingRetry => summary.awaiting_retry += 1,
                ItemStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// 手动重试指定条目的单个分片
    ///
    /// 校验在此处强制执行：条目存在、分片处于失败状态、预算 > 0，
    /// 任一不满足即拒绝（UI 的重试按钮只是提示，不是依据）
    pub async fn retry_chunk(&self, item_id: &str, chunk_index: usize) -> Result<UploadItem> {
        let handle = self
            .items
            .get(item_id)
            .map(|e| e.value().clone())
            .with_context(|| format!("条目不存在: {}", item_id))?;

        let (local_path, file_name, chunked) = {
            let item = handle.item.lock().await;

            if item.status == ItemStatus::Completed {
                anyhow::bail!("条目已完成，无需重试: {}", item_id);
            }
            if item.status == ItemStatus::Failed {
                anyhow::bail!("条目已进入失败终态: {}", item_id);
            }
            if !item.has_retry_budget() {
                anyhow::bail!("重试预算已耗尽: {}", item_id);
            }

            (
                item.local_path.clone(),
                item.file_name.clone(),
                item.chunked,
            )
        };

        // 取出待重试分片并校验其状态
        let (chunk, total_chunks) = {
            let mut cm = handle.chunks.lock().await;
            let total = cm.chunk_count();
            let chunk = cm
                .get(chunk_index)
                .cloned()
                .with_context(|| format!("分片不存在: #{}", chunk_index))?;

            if chunk.state != ChunkState::Failed {
                anyhow::bail!("分片 #{} 不在失败状态，无法重试", chunk_index);
            }
            cm.mark_in_flight(chunk_index);
            (chunk, total)
        };

        info!(
            "手动重试分片: file={}, 分片#{}",
            file_name, chunk_index
        );

        let success = engine::upload_single_chunk(
            handle.client.clone(),
            local_path,
            file_name.clone(),
            chunk,
            total_chunks,
            chunked,
            handle.item.clone(),
            handle.chunks.clone(),
        )
        .await;

        if !success {
            warn!("重试仍失败: file={}, 分片#{}", file_name, chunk_index);
        }

        // 重试后重新收敛条目状态
        let snapshot = {
            let cm = handle.chunks.lock().await;
            let mut item = handle.item.lock().await;
            engine::resolve_outcome(&mut item, &cm);
            item.clone()
        };

        Ok(snapshot)
    }

    /// 删除条目（取消在途上传并移出注册表）
    pub async fn remove(&self, item_id: &str) -> Result<()> {
        let (_, handle) = self
            .items
            .remove(item_id)
            .with_context(|| format!("条目不存在: {}", item_id))?;

        handle.cancel_token.cancel();
        info!("条目已删除: {}", item_id);
        Ok(())
    }

    /// 清理所有已完成条目
    ///
    /// # 返回
    /// 清理的条目数量
    pub async fn clear_completed(&self) -> usize {
        let items = self.list().await;
        let mut cleared = 0;
        for item in items {
            if item.status == ItemStatus::Completed && self.items.remove(&item.id).is_some() {
                cleared += 1;
            }
        }
        info!("已清理 {} 个完成条目", cleared);
        cleared
    }
}
