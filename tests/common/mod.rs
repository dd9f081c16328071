//! 测试通用工具
//!
//! 提供测试环境初始化、真实端口上的 A2A 服务端以及一个假的 MCP 服务器

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::net::TcpListener;

use finance_purple_agent::{
    create_agent_card, A2AServer, ChatModel, FinanceAgentExecutor, InMemoryTaskStore,
    McpHttpClient, RequestHandler, TaskStore,
};

static INIT: Once = Once::new();

/// 初始化测试环境
pub fn setup() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// 测试超时包装器
pub async fn with_timeout<F, T>(duration: Duration, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, f)
        .await
        .expect("Test timed out")
}

pub const TEST_TIMEOUT_SHORT: Duration = Duration::from_secs(5);
pub const TEST_TIMEOUT_MEDIUM: Duration = Duration::from_secs(30);

/// 在随机端口上启动 A2A 服务端，返回基础 URL
pub async fn spawn_agent(model: Arc<dyn ChatModel>, mcp: Option<Arc<McpHttpClient>>) -> String {
    setup();

    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let mut executor = FinanceAgentExecutor::new(model)
        .with_max_iterations(3)
        .with_store(store.clone());
    if let Some(client) = mcp {
        executor = executor.with_mcp(client);
    }
    let handler = Arc::new(RequestHandler::new(Arc::new(executor), store));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let server = A2AServer::new(create_agent_card(&format!("{}/", url)), handler, "unused");
    tokio::spawn(async move { server.serve(listener).await });
    url
}

/// 构造 `message/send` 请求
pub fn send_request(id: Value, message_id: &str, text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "message/send",
        "params": {
            "message": {
                "messageId": message_id,
                "role": "user",
                "parts": [{"kind": "text", "text": text}]
            }
        }
    })
}

/// POST JSON-RPC 请求，返回 HTTP 状态码与响应体
pub async fn rpc(url: &str, body: &Value) -> (u16, Value) {
    rpc_raw(url, &body.to_string()).await
}

pub async fn rpc_raw(url: &str, body: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/", url))
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// 假 MCP 服务器记录的请求
#[derive(Default)]
pub struct FakeMcpLog {
    pub methods: Vec<String>,
    pub tool_calls: Vec<Value>,
    pub session_headers: Vec<Option<String>>,
}

pub const FAKE_SESSION_ID: &str = "fake-session-1";

/// 启动一个提供 `get_quote` 工具的 MCP 服务器；`sse` 为真时以事件流应答
pub async fn spawn_fake_mcp(sse: bool) -> (String, Arc<Mutex<FakeMcpLog>>) {
    spawn_slow_fake_mcp(sse, Duration::ZERO).await
}

/// 同上，但 `tools/call` 在应答前等待 `call_delay`
pub async fn spawn_slow_fake_mcp(
    sse: bool,
    call_delay: Duration,
) -> (String, Arc<Mutex<FakeMcpLog>>) {
    let log = Arc::new(Mutex::new(FakeMcpLog::default()));
    let app = Router::new()
        .route("/mcp", post(fake_mcp))
        .with_state((log.clone(), sse, call_delay));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await });
    (url, log)
}

async fn fake_mcp(
    State((log, sse, call_delay)): State<(Arc<Mutex<FakeMcpLog>>, bool, Duration)>,
    headers: HeaderMap,
    Json(req): Json<Value>,
) -> Response {
    let method = req["method"].as_str().unwrap_or_default().to_string();
    {
        let mut log = log.lock().unwrap();
        log.methods.push(method.clone());
        log.session_headers.push(
            headers
                .get("mcp-session-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        if method == "tools/call" {
            log.tool_calls.push(req["params"].clone());
        }
    }

    let Some(id) = req.get("id").cloned() else {
        return StatusCode::ACCEPTED.into_response();
    };

    let result = match method.as_str() {
        "initialize" => json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "fake-finance", "version": "0.0.1"}
        }),
        "tools/list" => json!({
            "tools": [{
                "name": "get_quote",
                "description": "Latest price for a ticker",
                "inputSchema": {
                    "type": "object",
                    "properties": {"symbol": {"type": "string"}},
                    "required": ["symbol"]
                }
            }]
        }),
        "tools/call" => {
            tokio::time::sleep(call_delay).await;
            let symbol = req["params"]["arguments"]["symbol"].as_str().unwrap_or("?");
            json!({
                "content": [{
                    "type": "text",
                    "text": json!({"symbol": symbol, "price": 189.5}).to_string()
                }],
                "isError": false
            })
        }
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("unknown method {}", other)}
            }))
            .into_response()
        }
    };

    let body = json!({"jsonrpc": "2.0", "id": id, "result": result});

    if sse && method != "initialize" {
        let stream = format!(
            "event: message\ndata: {}\n\nevent: message\ndata: {}\n\n",
            json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}}),
            body
        );
        return (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::HeaderName::from_static("mcp-session-id"), FAKE_SESSION_ID),
            ],
            stream,
        )
            .into_response();
    }

    (
        [(header::HeaderName::from_static("mcp-session-id"), FAKE_SESSION_ID)],
        Json(body),
    )
        .into_response()
}

/// 读取 SSE 响应中所有 `data:` 行
pub fn sse_data(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| serde_json::from_str(d.trim()).unwrap())
        .collect()
}
