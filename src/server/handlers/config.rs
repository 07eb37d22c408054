// 配置API处理器

use crate::config::{AppConfig, UploadConfig};
use crate::server::handlers::ApiResponse;
use crate::server::state::CONFIG_PATH;
use crate::server::AppState;
use axum::{extract::State, Json};
use tracing::{info, warn};

/// 获取当前配置
///
/// GET /api/v1/config
pub async fn get_config(State(state): State<AppState>) -> Json<ApiResponse<AppConfig>> {
    let config = state.config.read().await.clone();
    Json(ApiResponse::success(config))
}

/// 更新上传配置
///
/// PUT /api/v1/config
///
/// 只影响之后创建的条目，在途上传保持原配置
pub async fn update_config(
    State(state): State<AppState>,
    Json(upload): Json<UploadConfig>,
) -> Json<ApiResponse<AppConfig>> {
    info!(
        "API: 更新上传配置 endpoint={}, chunk_size={}MB, retry_budget={}",
        upload.endpoint, upload.chunk_size_mb, upload.retry_budget
    );

    if upload.endpoint.is_empty() {
        return Json(ApiResponse::error(400, "上传端点不能为空".to_string()));
    }
    if upload.chunk_size_mb == 0 {
        return Json(ApiResponse::error(400, "分片大小必须大于 0".to_string()));
    }

    let updated = {
        let mut config = state.config.write().await;
        config.upload = upload.clone();
        config.clone()
    };

    state.upload_manager.update_config(upload).await;

    // 配置落盘失败不影响本次更新生效
    if let Err(e) = updated.save_to_file(CONFIG_PATH).await {
        warn!("保存配置文件失败: {}", e);
    }

    Json(ApiResponse::success(updated))
}
