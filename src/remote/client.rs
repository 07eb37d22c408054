// 远端上传客户端
//
// 对应上传端点约定：
// - 分片: POST {endpoint}/chunk
//   字段: file (二进制, 文件名 `<name>_part_NNN`), originalFilename,
//         chunkIndex, totalChunks
// - 整文件: POST {endpoint}
//   字段: file (二进制)
//
// 三版草稿对端点路径和字段存在分歧，以 /chunk 子路径为准，
// 重复的 filename 字段不再发送

use crate::remote::RemoteError;
use anyhow::{Context, Result};
use reqwest::multipart;
use std::time::Duration;
use tracing::{debug, info};

/// 远端上传客户端
#[derive(Debug, Clone)]
pub struct RemoteClient {
    /// HTTP 客户端
    client: reqwest::Client,
    /// 上传端点（不含 /chunk 子路径）
    endpoint: String,
}

impl RemoteClient {
    /// 创建新的上传客户端
    ///
    /// # 参数
    /// * `endpoint` - 上传端点，如 `http://localhost:8080/api/v1/file`
    /// * `timeout_secs` - 单次请求超时（秒），0 表示不限制
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let client = builder.build().context("创建 HTTP 客户端失败")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// 上传端点
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 上传单个分片
    ///
    /// 一次调用只做一次网络传输，不做自动重试，重试策略由调用方决定
    ///
    /// # 参数
    /// * `data` - 分片数据
    /// * `original_filename` - 原始文件名
    /// * `chunk_index` - 分片索引（从 0 开始）
    /// * `total_chunks` - 总分片数
    pub async fn upload_chunk(
        &self,
        data: Vec<u8>,
        original_filename: &str,
        chunk_index: usize,
        total_chunks: usize,
    ) -> Result<(), RemoteError> {
        let url = format!("{}/chunk", self.endpoint);
        let part_filename = chunk_part_name(original_filename, chunk_index);
        let size = data.len();

        debug!(
            "上传分片: file={}, part={}/{}, size={} bytes",
            original_filename,
            chunk_index + 1,
            total_chunks,
            size
        );

        // 构建 multipart form
        let part = multipart::Part::bytes(data)
            .file_name(part_filename)
            .mime_str("application/octet-stream")
            .map_err(RemoteError::Http)?;

        let form = multipart::Form::new()
            .part("file", part)
            .text("originalFilename", original_filename.to_string())
            .text("chunkIndex", chunk_index.to_string())
            .text("totalChunks", total_chunks.to_string());

        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }

        debug!(
            "分片上传成功: file={}, part={}/{}",
            original_filename,
            chunk_index + 1,
            total_chunks
        );

        Ok(())
    }

    /// 整文件上传（非分片路径）
    ///
    /// # 参数
    /// * `data` - 文件完整内容
    /// * `filename` - 文件名
    pub async fn upload_file(&self, data: Vec<u8>, filename: &str) -> Result<(), RemoteError> {
        let size = data.len();
        info!("整文件上传: file={}, size={} bytes", filename, size);

        let part = multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(RemoteError::Http)?;

        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status));
        }

        info!("整文件上传成功: file={}", filename);
        Ok(())
    }
}

/// 生成分片文件名：`<name>_part_NNN`
///
/// NNN 为分片序号（index + 1），左侧补零到 3 位
pub fn chunk_part_name(original_filename: &str, chunk_index: usize) -> String {
    format!("{}_part_{:03}", original_filename, chunk_index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_part_name() {
        assert_eq!(chunk_part_name("video.mp4", 0), "video.mp4_part_001");
        assert_eq!(chunk_part_name("video.mp4", 9), "video.mp4_part_010");
        assert_eq!(chunk_part_name("a.bin", 99), "a.bin_part_100");
        // 超过 3 位时不截断
        assert_eq!(chunk_part_name("a.bin", 999), "a.bin_part_1000");
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let client = RemoteClient::new("http://localhost:8080/api/v1/file/", 30).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/api/v1/file");
    }
}
