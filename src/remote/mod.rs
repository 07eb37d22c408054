// 远端上传接口模块
//
// 封装对固定上传端点的 multipart 请求：
// - 整文件上传：POST {endpoint}
// - 分片上传：POST {endpoint}/chunk
//
// 响应体不做解析，只以 HTTP 状态码判定成败

pub mod client;
pub mod error;

pub use client::RemoteClient;
pub use error::{RemoteError, RemoteErrorKind};
