//! 协议层：A2A 协议实现
//!
//! 包括协议数据类型、JSON-RPC 信封、Agent 名片、请求处理和 HTTP 服务端

pub mod card;
pub mod handler;
pub mod jsonrpc;
pub mod server;
pub mod types;
