//! 服务层错误
//!
//! 回退链耗尽和内部故障在这里区分开，处理器据此选择状态码

use thiserror::Error;

/// 服务错误
///
/// 需要 `Clone`：同一个 key 的并发请求共享一次上游调用的结果
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// 所有数据源都没有可用数据 (404)
    #[error("{0}")]
    NotFound(String),

    /// 请求参数无效 (400)
    #[error("{0}")]
    BadRequest(String),

    /// 唯一的数据源未配置 Key (503)
    #[error("{0}")]
    Unavailable(String),

    /// 透传接口上游失败 (502)
    #[error("{0}")]
    BadGateway(String),

    /// 编排或序列化逻辑本身出错 (500)
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Internal(format!("序列化失败: {}", e))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
