//! JSON-RPC 2.0 信封与方法参数
//!
//! 请求先以 `serde_json::Value` 接收，再逐字段校验，
//! 这样缺失 `jsonrpc` / `method` / `id` 时也能回带尽可能多的上下文

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::types::Message;
use crate::errors::AgentError;

/// JSON-RPC 协议版本
pub const JSONRPC_VERSION: &str = "2.0";

/// 支持的方法名
pub mod methods {
    pub const MESSAGE_SEND: &str = "message/send";
    pub const MESSAGE_STREAM: &str = "message/stream";
    pub const TASKS_GET: &str = "tasks/get";
    pub const TASKS_CANCEL: &str = "tasks/cancel";

    pub const ALL: [&str; 4] = [MESSAGE_SEND, MESSAGE_STREAM, TASKS_GET, TASKS_CANCEL];
}

/// 请求 ID：字符串或整数
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

/// JSON-RPC 与 A2A 扩展错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum JsonRpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    TaskNotFound = -32001,
    TaskNotCancelable = -32002,
    UnsupportedOperation = -32004,
}

/// 错误对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            data: None,
        }
    }
}

/// 已校验的请求
#[derive(Debug, Clone)]
pub struct JsonRpcRequest {
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

/// 被拒绝的请求，`id` 在能读出时保留
#[derive(Debug)]
pub struct RejectedRequest {
    pub id: Option<RequestId>,
    pub error: AgentError,
}

impl JsonRpcRequest {
    /// 从原始请求体解析并校验信封
    pub fn parse(body: &[u8]) -> Result<Self, RejectedRequest> {
        let value: Value = serde_json::from_slice(body).map_err(|e| RejectedRequest {
            id: None,
            error: AgentError::ParseError(e.to_string()),
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, RejectedRequest> {
        let Value::Object(mut obj) = value else {
            return Err(RejectedRequest {
                id: None,
                error: AgentError::InvalidRequest("request must be a JSON object".to_string()),
            });
        };

        let id = obj
            .get("id")
            .cloned()
            .and_then(|v| serde_json::from_value::<RequestId>(v).ok());

        let reject = |id: Option<RequestId>, msg: &str| RejectedRequest {
            id,
            error: AgentError::InvalidRequest(msg.to_string()),
        };

        match obj.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            Some(_) => return Err(reject(id, "unsupported jsonrpc version")),
            None => return Err(reject(id, "missing 'jsonrpc' field")),
        }

        let Some(id) = id else {
            return Err(reject(None, "missing or invalid 'id' field"));
        };

        let method = match obj.remove("method") {
            Some(Value::String(m)) if !m.is_empty() => m,
            _ => return Err(reject(Some(id), "missing or invalid 'method' field")),
        };

        let params = obj.remove("params").unwrap_or(Value::Null);

        Ok(Self { id, method, params })
    }

    /// 反序列化参数，失败时映射为 invalid params
    pub fn params<P: for<'de> Deserialize<'de>>(&self) -> crate::errors::Result<P> {
        serde_json::from_value(self.params.clone())
            .map_err(|e| AgentError::InvalidParams(format!("{}: {}", self.method, e)))
    }
}

/// 成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcSuccessResponse<R> {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: R,
}

impl<R> JsonRpcSuccessResponse<R> {
    pub fn new(id: RequestId, result: R) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }
    }
}

/// 错误响应，无法确定 id 时序列化为 `null`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub error: JsonRpcError,
}

impl JsonRpcErrorResponse {
    pub fn new(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        }
    }
}

impl From<RejectedRequest> for JsonRpcErrorResponse {
    fn from(rejected: RejectedRequest) -> Self {
        Self::new(rejected.id, rejected.error.to_jsonrpc())
    }
}

/// `message/send` 与 `message/stream` 的参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendParams {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<MessageSendConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_output_modes: Option<Vec<String>>,
}

/// `tasks/get` 参数，兼容 `taskId` 写法
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryParams {
    #[serde(alias = "taskId")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_length: Option<usize>,
}

/// `tasks/cancel` 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIdParams {
    #[serde(alias = "taskId")]
    pub id: String,
}
