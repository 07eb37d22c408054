// 上传错误定义
//
// 重试预算对所有失败一视同仁（每次失败扣 1），
// 错误分类仅用于日志定位问题

use thiserror::Error;

/// 远端上传错误
#[derive(Debug, Error)]
pub enum RemoteError {
    /// 请求发送失败（连接、DNS、超时等）
    #[error("请求发送失败: {0}")]
    Http(#[from] reqwest::Error),

    /// 服务端返回非 2xx 状态码
    #[error("服务端返回错误状态: {0}")]
    Status(reqwest::StatusCode),
}

impl RemoteError {
    /// 错误分类
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            RemoteError::Http(e) => {
                if e.is_timeout() {
                    RemoteErrorKind::Timeout
                } else if e.is_connect() || e.is_request() {
                    RemoteErrorKind::Network
                } else {
                    RemoteErrorKind::Unknown
                }
            }
            RemoteError::Status(status) => {
                if status.as_u16() == 429 {
                    RemoteErrorKind::RateLimited
                } else if status.is_server_error() {
                    RemoteErrorKind::ServerError
                } else if status.is_client_error() {
                    RemoteErrorKind::ClientError
                } else {
                    RemoteErrorKind::Unknown
                }
            }
        }
    }
}

/// 上传错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// 网络错误（连接失败、DNS等）
    Network,
    /// 超时
    Timeout,
    /// 被限流 (429)
    RateLimited,
    /// 服务端错误 (5xx)
    ServerError,
    /// 客户端错误 (4xx)
    ClientError,
    /// 未知错误
    Unknown,
}
