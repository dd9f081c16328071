//! 标准化错误处理
//!
//! 定义项目专用的错误类型，以及它们到 JSON-RPC 错误码的映射

use thiserror::Error;

use crate::protocol::jsonrpc::{JsonRpcError, JsonRpcErrorCode};

/// 项目主要错误类型
#[derive(Error, Debug)]
pub enum AgentError {
    /// 请求体不是合法 JSON
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON-RPC 信封不合法，或请求在当前任务状态下不被接受
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 未知方法
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// 参数校验失败
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// 任务不存在
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// 任务已处于终止状态，无法取消
    #[error("Task cannot be canceled: {0}")]
    TaskNotCancelable(String),

    /// 操作不受支持
    #[error("This operation is not supported")]
    UnsupportedOperation,

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// LLM 服务错误
    #[error("LLM service error: {0}")]
    LlmError(String),

    /// MCP 工具错误
    #[error("Tool execution error: {0}")]
    ToolError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// 对应的 JSON-RPC 错误码
    pub fn code(&self) -> JsonRpcErrorCode {
        match self {
            AgentError::ParseError(_) => JsonRpcErrorCode::ParseError,
            AgentError::InvalidRequest(_) => JsonRpcErrorCode::InvalidRequest,
            AgentError::MethodNotFound(_) => JsonRpcErrorCode::MethodNotFound,
            AgentError::InvalidParams(_) => JsonRpcErrorCode::InvalidParams,
            AgentError::TaskNotFound(_) => JsonRpcErrorCode::TaskNotFound,
            AgentError::TaskNotCancelable(_) => JsonRpcErrorCode::TaskNotCancelable,
            AgentError::UnsupportedOperation => JsonRpcErrorCode::UnsupportedOperation,
            AgentError::ConfigError(_)
            | AgentError::LlmError(_)
            | AgentError::ToolError(_)
            | AgentError::Internal(_) => JsonRpcErrorCode::InternalError,
        }
    }

    /// 转换为 JSON-RPC 错误对象
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        JsonRpcError::new(self.code(), self.to_string())
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::InvalidParams(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::LlmError(err.to_string())
    }
}

/// 项目结果类型别名
pub type Result<T> = std::result::Result<T, AgentError>;
