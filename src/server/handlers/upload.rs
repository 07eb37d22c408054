// 上传API处理器
//
// 拖放入口、条目查询、手动重试、删除与清理

use crate::server::handlers::ApiResponse;
use crate::server::AppState;
use crate::uploader::{UploadItem, UploadSummary};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// 拖放上传请求
#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    /// 拖放的本地文件路径列表
    pub files: Vec<String>,
    /// 是否分片上传（缺省时使用配置默认值）
    #[serde(default)]
    pub chunked: Option<bool>,
}

/// 条目视图（附带派生的进度百分比）
#[derive(Debug, Serialize)]
pub struct UploadItemView {
    /// 条目信息
    #[serde(flatten)]
    pub item: UploadItem,
    /// 进度百分比 (0-100, 向下取整)
    pub progress: u8,
    /// 失败分片是否仍可重试
    pub retryable: bool,
}

impl From<UploadItem> for UploadItemView {
    fn from(item: UploadItem) -> Self {
        let progress = item.progress();
        let retryable = item.status == crate::uploader::ItemStatus::AwaitingRetry
            && item.has_retry_budget();
        Self {
            item,
            progress,
            retryable,
        }
    }
}

/// 上传列表响应
#[derive(Debug, Serialize)]
pub struct UploadListData {
    /// 条目列表
    pub list: Vec<UploadItemView>,
    /// 聚合状态
    pub summary: UploadSummary,
}

/// 创建上传（拖放入口）
///
/// POST /api/v1/uploads
pub async fn create_upload(
    State(state): State<AppState>,
    Json(req): Json<CreateUploadRequest>,
) -> Json<ApiResponse<Vec<UploadItemView>>> {
    info!("API: 创建上传, {} 个文件", req.files.len());

    if req.files.is_empty() {
        return Json(ApiResponse::error(400, "文件列表为空".to_string()));
    }

    let paths: Vec<PathBuf> = req.files.iter().map(PathBuf::from).collect();

    match state
        .upload_manager
        .create_from_drop(paths, req.chunked)
        .await
    {
        Ok(items) => {
            let views = items.into_iter().map(UploadItemView::from).collect();
            Json(ApiResponse::success(views))
        }
        Err(e) => {
            warn!("创建上传失败: {}", e);
            Json(ApiResponse::error(400, format!("创建上传失败: {}", e)))
        }
    }
}

/// 获取所有上传条目
///
/// GET /api/v1/uploads
pub async fn get_all_uploads(State(state): State<AppState>) -> Json<ApiResponse<UploadListData>> {
    let list = state
        .upload_manager
        .list()
        .await
        .into_iter()
        .map(UploadItemView::from)
        .collect();
    let summary = state.upload_manager.summary().await;

    Json(ApiResponse::success(UploadListData { list, summary }))
}

/// 获取单个上传条目
///
/// GET /api/v1/uploads/:id
pub async fn get_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<UploadItemView>> {
    match state.upload_manager.get(&id).await {
        Some(item) => Json(ApiResponse::success(UploadItemView::from(item))),
        None => Json(ApiResponse::error(404, format!("条目不存在: {}", id))),
    }
}

/// 手动重试单个分片
///
/// POST /api/v1/uploads/:id/chunks/:index/retry
pub async fn retry_chunk(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Json<ApiResponse<UploadItemView>> {
    info!("API: 手动重试分片 id={}, chunk={}", id, index);

    match state.upload_manager.retry_chunk(&id, index).await {
        Ok(item) => Json(ApiResponse::success(UploadItemView::from(item))),
        Err(e) => {
            warn!("重试被拒绝: {}", e);
            Json(ApiResponse::error(409, format!("重试被拒绝: {}", e)))
        }
    }
}

/// 删除上传条目（取消在途上传）
///
/// DELETE /api/v1/uploads/:id
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<()>> {
    match state.upload_manager.remove(&id).await {
        Ok(()) => Json(ApiResponse::success(())),
        Err(e) => Json(ApiResponse::error(404, format!("删除失败: {}", e))),
    }
}

/// 清理已完成条目
///
/// POST /api/v1/uploads/clear/completed
pub async fn clear_completed_uploads(
    State(state): State<AppState>,
) -> Json<ApiResponse<usize>> {
    let cleared = state.upload_manager.clear_completed().await;
    Json(ApiResponse::success(cleared))
}
