//! 推理错误类型与分类
//!
//! 后端抛出 ProviderError；worker 把它转成 `ErrorKind` + 原始消息放进 InferenceResponse，
//! ResponseRouter 再映射为给用户看的短句。任何错误都不会穿出 worker 线程。

use std::fmt;

use thiserror::Error;

/// 后端调用失败（可区分：不可达、超时、模型/参数无效、凭证无效等）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0}")]
    Unreachable(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    ModelNotFound(String),

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Empty response from provider")]
    EmptyResponse,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

impl ProviderError {
    /// 错误分类；未显式分类的（流错误、HTTP 错误）按消息关键字推断
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Unreachable(_) => ErrorKind::Unreachable,
            ProviderError::Timeout(_) => ErrorKind::Timeout,
            ProviderError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            ProviderError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            ProviderError::EmptyResponse => ErrorKind::EmptyResponse,
            ProviderError::UnknownProvider(_) => ErrorKind::UnknownProvider,
            ProviderError::NotImplemented(_) => ErrorKind::NotImplemented,
            ProviderError::Http { status, .. } => match status {
                401 | 403 => ErrorKind::InvalidCredentials,
                404 => ErrorKind::ModelNotFound,
                408 | 504 => ErrorKind::Timeout,
                _ => ErrorKind::Other,
            },
            ProviderError::InvalidRequest(msg) | ProviderError::Stream(msg) => {
                ErrorKind::from_message(msg)
            }
        }
    }
}

/// InferenceResponse 中携带的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unreachable,
    Timeout,
    ModelNotFound,
    InvalidCredentials,
    EmptyResponse,
    UnknownProvider,
    NotImplemented,
    Other,
}

impl ErrorKind {
    /// 按关键字对原始错误消息分类（用于没有结构化分类的错误）
    pub fn from_message(raw: &str) -> ErrorKind {
        let s = raw.to_lowercase();
        if s.contains("timed out") || s.contains("timeout") {
            ErrorKind::Timeout
        } else if s.contains("connect") || s.contains("reach") || s.contains("unavailable") || s.contains("not available") {
            ErrorKind::Unreachable
        } else if s.contains("not found") || s.contains("404") {
            ErrorKind::ModelNotFound
        } else if s.contains("api key") || s.contains("unauthorized") || s.contains("401") || s.contains("403") {
            ErrorKind::InvalidCredentials
        } else if s.contains("empty response") {
            ErrorKind::EmptyResponse
        } else {
            ErrorKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unreachable => "unreachable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ModelNotFound => "model_not_found",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::EmptyResponse => "empty_response",
            ErrorKind::UnknownProvider => "unknown_provider",
            ErrorKind::NotImplemented => "not_implemented",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 编排器生命周期错误
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("failed to spawn inference worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    /// 上一次 stop 超时，旧 worker 仍持有请求队列
    #[error("previous inference worker has not exited yet")]
    WorkerStillRunning,

    #[error("request queue is closed")]
    QueueClosed,
}
