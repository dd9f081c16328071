//! 金融问答 Purple Agent
//!
//! 通过 A2A 协议（JSON-RPC 2.0 over HTTP）对外提供金融问答：
//! - 任务模型：submitted -> working -> completed / failed
//! - 流式响应（SSE）
//! - 托管 LLM（OpenAI 兼容接口），可选 MCP 工具调用
//!
//! # 架构分层
//!
//! - `core`: 核心层，Agent、执行器、任务存储与配置
//! - `infrastructure`: 基础设施层，LLM、MCP 与日志
//! - `protocol`: 协议层，A2A 类型、请求处理与 HTTP 服务端

// 核心层
pub mod core;

// 基础设施层
pub mod infrastructure;

// 协议层
pub mod protocol;

pub mod bootstrap;
pub mod errors;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use core::agent::FinanceAgent;
pub use core::config::{AppConfig, ModelProvider};
pub use core::executor::{AgentExecutor, FinanceAgentExecutor, RequestContext};
pub use core::task_store::{InMemoryTaskStore, TaskStore};
pub use errors::{AgentError, Result};

pub use infrastructure::llm::{ChatModel, Message as LlmMessage, OpenAIClient};
pub use infrastructure::logger;
pub use infrastructure::mcp_client::{McpHttpClient, McpToolbox};

pub use protocol::card::{create_agent_card, AgentCard};
pub use protocol::handler::RequestHandler;
pub use protocol::server::{create_router, A2AServer, AppState};
pub use protocol::types::{AgentEvent, Artifact, Message, Part, Role, Task, TaskState, TaskStatus};

/// 版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
