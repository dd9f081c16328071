//! MCP 客户端
//!
//! 通过 streamable HTTP 连接外部 MCP 服务器，发现工具并代为调用。
//! 服务器可以直接回 JSON，也可以回 `text/event-stream`

use anyhow::{anyhow, bail, Context, Result};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info};

use super::llm::{Function, Tool};

/// MCP 协议版本
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

const SESSION_HEADER: &str = "mcp-session-id";

/// 单次工具调用的默认超时
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// 服务器暴露的工具
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// 补全 `/mcp` 路径
pub fn mcp_endpoint(server_url: &str) -> String {
    let trimmed = server_url.trim_end_matches('/');
    if trimmed.ends_with("/mcp") {
        trimmed.to_string()
    } else {
        format!("{}/mcp", trimmed)
    }
}

/// MCP 工具定义转换为 OpenAI 函数工具
pub fn to_openai_tools(tools: &[McpTool]) -> Vec<Tool> {
    tools
        .iter()
        .map(|t| Tool {
            r#type: "function".to_string(),
            function: Function {
                name: t.name.clone(),
                description: t.description.clone().unwrap_or_default(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect()
}

/// streamable HTTP 传输的 MCP 客户端，可在多个对话间共享
pub struct McpHttpClient {
    endpoint: String,
    http: reqwest::Client,
    session_id: RwLock<Option<String>>,
    initialized: OnceCell<()>,
    next_id: AtomicU64,
}

impl McpHttpClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            endpoint: mcp_endpoint(server_url),
            http: reqwest::Client::new(),
            session_id: RwLock::new(None),
            initialized: OnceCell::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 完成握手，多次调用只握手一次
    pub async fn connect(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| self.initialize())
            .await
            .map(|_| ())
            .map_err(|e| {
                error!("Failed to connect to MCP server at {}: {:#}", self.endpoint, e);
                anyhow!("Cannot connect to MCP server: {:#}", e)
            })
    }

    async fn initialize(&self) -> Result<()> {
        let result = self
            .send_request(
                "initialize",
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "finance-purple-agent",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
            .await?;

        debug!("MCP initialize response: {}", result);

        self.send_notification("notifications/initialized").await?;

        info!("MCP client connected to {}", self.endpoint);
        Ok(())
    }

    /// 列出服务器上的工具
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        self.connect().await?;

        let result = self.send_request("tools/list", json!({})).await?;
        let tools: Vec<McpTool> =
            serde_json::from_value(result.get("tools").cloned().unwrap_or_else(|| json!([])))
                .context("invalid tools/list result")?;

        if tools.is_empty() {
            bail!("MCP server at {} exposes no tools", self.endpoint);
        }

        info!("Discovered {} tools from MCP server", tools.len());
        Ok(tools)
    }

    /// 调用工具，返回原始 `tools/call` 结果
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.connect().await?;

        self.send_request(
            "tools/call",
            json!({
                "name": name,
                "arguments": arguments,
            }),
        )
        .await
    }

    fn request_builder(&self, session: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream");
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let session = self.session_id.read().await.clone();
        let response = self
            .request_builder(session.as_deref())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("failed to send MCP request '{}'", method))?
            .error_for_status()
            .with_context(|| format!("MCP server rejected '{}'", method))?;

        if let Some(new_session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(new_session.to_string());
        }

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let message = if is_event_stream {
            read_event_stream(response, id).await?
        } else {
            response
                .json::<Value>()
                .await
                .context("failed to parse MCP response")?
        };

        if let Some(err) = message.get("error") {
            bail!("MCP error for '{}': {}", method, err);
        }

        message
            .get("result")
            .cloned()
            .ok_or_else(|| anyhow!("MCP response for '{}' has no result", method))
    }

    async fn send_notification(&self, method: &str) -> Result<()> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
        });

        let session = self.session_id.read().await.clone();
        self.request_builder(session.as_deref())
            .json(&notification)
            .send()
            .await
            .with_context(|| format!("failed to send MCP notification '{}'", method))?
            .error_for_status()
            .with_context(|| format!("MCP server rejected notification '{}'", method))?;
        Ok(())
    }
}

/// 从 SSE 响应中取出与请求 id 对应的 JSON-RPC 消息
async fn read_event_stream(response: reqwest::Response, id: u64) -> Result<Value> {
    let mut stream = response.bytes_stream().eventsource();

    while let Some(event) = stream.next().await {
        let event = event.map_err(|e| anyhow!("MCP event stream error: {}", e))?;
        if event.data.trim().is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(&event.data) {
            Ok(v) => v,
            Err(e) => {
                debug!("Skipping non-JSON MCP event: {}", e);
                continue;
            }
        };
        if value.get("id").and_then(Value::as_u64) == Some(id) {
            return Ok(value);
        }
    }

    bail!("MCP event stream ended without a response to request {}", id)
}

/// 将 `tools/call` 结果整理成交给 LLM 的值
pub fn extract_tool_result(result: Value) -> Value {
    let texts: Vec<String> = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return json!({
            "success": false,
            "error": texts.join("\n"),
        });
    }

    if let Some(structured) = result.get("structuredContent") {
        return structured.clone();
    }

    let mut values: Vec<Value> = texts
        .into_iter()
        .map(|t| serde_json::from_str(&t).unwrap_or(Value::String(t)))
        .collect();

    match values.len() {
        0 => json!({"result": result}),
        1 => match values.remove(0) {
            obj @ Value::Object(_) => obj,
            other => json!({"result": other}),
        },
        _ => json!({"success": true, "result": values}),
    }
}

/// 绑定到单个对话上下文的工具集
#[derive(Clone)]
pub struct McpToolbox {
    client: Arc<McpHttpClient>,
    context_id: String,
    timeout: Duration,
}

impl McpToolbox {
    pub fn new(client: Arc<McpHttpClient>, context_id: impl Into<String>) -> Self {
        Self {
            client,
            context_id: context_id.into(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// 以 OpenAI 函数格式列出可用工具
    pub async fn tools(&self) -> Result<Vec<Tool>> {
        let tools = self.client.list_tools().await?;
        Ok(to_openai_tools(&tools))
    }

    /// 调用工具。失败和超时都折叠为 `{"success": false, "error": ...}`
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Value {
        let mut arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        arguments.insert("context_id".to_string(), Value::String(self.context_id.clone()));

        debug!(
            "Calling tool '{}' with args: {:?}",
            tool_name,
            arguments.keys().collect::<Vec<_>>()
        );

        match tokio::time::timeout(
            self.timeout,
            self.client.call_tool(tool_name, Value::Object(arguments)),
        )
        .await
        {
            Ok(Ok(result)) => extract_tool_result(result),
            Ok(Err(e)) => {
                error!("Tool '{}' failed: {:#}", tool_name, e);
                json!({
                    "success": false,
                    "error": format!("MCP tool call failed: {:#}", e),
                })
            }
            Err(_) => {
                error!(
                    "Tool '{}' timed out after {}s",
                    tool_name,
                    self.timeout.as_secs_f32()
                );
                json!({
                    "success": false,
                    "error": format!("Tool '{}' timed out", tool_name),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcp_endpoint_suffix() {
        assert_eq!(mcp_endpoint("http://127.0.0.1:9020"), "http://127.0.0.1:9020/mcp");
        assert_eq!(mcp_endpoint("http://127.0.0.1:9020/"), "http://127.0.0.1:9020/mcp");
        assert_eq!(mcp_endpoint("http://host/mcp"), "http://host/mcp");
        assert_eq!(mcp_endpoint("http://host/mcp/"), "http://host/mcp");
    }

    #[test]
    fn test_to_openai_tools() {
        let tools = vec![McpTool {
            name: "get_quote".to_string(),
            description: Some("Latest quote".to_string()),
            input_schema: json!({"type": "object", "properties": {"ticker": {"type": "string"}}}),
        }];
        let converted = to_openai_tools(&tools);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].r#type, "function");
        assert_eq!(converted[0].function.name, "get_quote");
        assert_eq!(converted[0].function.parameters["properties"]["ticker"]["type"], "string");
    }

    #[test]
    fn test_mcp_tool_defaults() {
        let tool: McpTool = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert!(tool.description.is_none());
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_extract_structured_content() {
        let result = json!({
            "content": [{"type": "text", "text": "{\"price\": 1}"}],
            "structuredContent": {"price": 1}
        });
        assert_eq!(extract_tool_result(result), json!({"price": 1}));
    }

    #[test]
    fn test_extract_single_text() {
        let result = json!({"content": [{"type": "text", "text": "plain answer"}]});
        assert_eq!(extract_tool_result(result), json!({"result": "plain answer"}));

        let result = json!({"content": [{"type": "text", "text": "{\"a\": 2}"}]});
        assert_eq!(extract_tool_result(result), json!({"a": 2}));
    }

    #[test]
    fn test_extract_multiple_texts() {
        let result = json!({"content": [
            {"type": "text", "text": "1"},
            {"type": "text", "text": "two"}
        ]});
        assert_eq!(
            extract_tool_result(result),
            json!({"success": true, "result": [1, "two"]})
        );
    }

    #[test]
    fn test_extract_error_result() {
        let result = json!({"isError": true, "content": [{"type": "text", "text": "boom"}]});
        assert_eq!(
            extract_tool_result(result),
            json!({"success": false, "error": "boom"})
        );
    }

    #[tokio::test]
    async fn test_call_tool_unreachable_server_folds_error() {
        let client = Arc::new(McpHttpClient::new("http://127.0.0.1:1"));
        let toolbox = McpToolbox::new(client, "ctx-1").with_timeout(Duration::from_secs(5));
        let out = toolbox.call_tool("anything", json!({})).await;
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().starts_with("MCP tool call failed"));
    }
}
