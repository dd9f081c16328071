//! A2A HTTP 服务端
//!
//! 路由：
//! - `GET /card`、`GET /.well-known/agent-card.json`、`GET /.well-known/agent.json`：Agent 名片
//! - `GET /health`：健康检查
//! - `POST /`：JSON-RPC 入口，`message/stream` 以 SSE 应答
//!
//! 所有 JSON-RPC 结果（包括错误）都以 HTTP 200 返回

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::errors::AgentError;
use crate::protocol::card::AgentCard;
use crate::protocol::handler::RequestHandler;
use crate::protocol::jsonrpc::{
    methods, JsonRpcErrorResponse, JsonRpcRequest, JsonRpcSuccessResponse, MessageSendParams,
    RequestId, TaskIdParams, TaskQueryParams,
};
use crate::protocol::types::AgentEvent;

/// 服务状态
pub struct AppState {
    pub card: AgentCard,
    pub handler: Arc<RequestHandler>,
}

/// 构建路由
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/card", get(get_card))
        .route("/.well-known/agent-card.json", get(get_card))
        .route("/.well-known/agent.json", get(get_card))
        .route("/health", get(health_check))
        .route("/", post(handle_jsonrpc))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查
async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn get_card(State(state): State<Arc<AppState>>) -> Json<AgentCard> {
    Json(state.card.clone())
}

fn success<R: Serialize>(id: RequestId, result: R) -> Response {
    Json(JsonRpcSuccessResponse::new(id, result)).into_response()
}

fn failure(id: Option<RequestId>, error: AgentError) -> Response {
    warn!("JSON-RPC error {}: {}", error.code() as i32, error);
    Json(JsonRpcErrorResponse::new(id, error.to_jsonrpc())).into_response()
}

fn respond<R: Serialize>(id: RequestId, result: crate::errors::Result<R>) -> Response {
    match result {
        Ok(r) => success(id, r),
        Err(e) => failure(Some(id), e),
    }
}

/// JSON-RPC 入口
async fn handle_jsonrpc(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match JsonRpcRequest::parse(&body) {
        Ok(r) => r,
        Err(rejected) => return failure(rejected.id, rejected.error),
    };

    let id = request.id.clone();
    let handler = &state.handler;

    match request.method.as_str() {
        methods::MESSAGE_SEND => {
            let result = match request.params::<MessageSendParams>() {
                Ok(params) => handler.on_message_send(params).await,
                Err(e) => Err(e),
            };
            respond(id, result)
        }
        methods::MESSAGE_STREAM => {
            let events = match request.params::<MessageSendParams>() {
                Ok(params) => handler.on_message_stream(params).await,
                Err(e) => Err(e),
            };
            stream_response(id, events)
        }
        methods::TASKS_GET => {
            let result = match request.params::<TaskQueryParams>() {
                Ok(params) => handler.on_get_task(params).await,
                Err(e) => Err(e),
            };
            respond(id, result)
        }
        methods::TASKS_CANCEL => {
            let result = match request.params::<TaskIdParams>() {
                Ok(params) => handler.on_cancel_task(params).await,
                Err(e) => Err(e),
            };
            respond(id, result)
        }
        other => failure(Some(id), AgentError::MethodNotFound(other.to_string())),
    }
}

/// 把事件流包装成 SSE，每条 `data` 都是一个完整的 JSON-RPC 响应
fn stream_response(
    id: RequestId,
    events: crate::errors::Result<BoxStream<'static, crate::errors::Result<AgentEvent>>>,
) -> Response {
    let events = match events {
        Ok(s) => s,
        Err(e) => stream::once(async move { Err(e) }).boxed(),
    };

    let sse = events.map(move |item| {
        let data = match item {
            Ok(event) => serde_json::to_string(&JsonRpcSuccessResponse::new(id.clone(), event)),
            Err(e) => {
                warn!("Stream ended with error: {}", e);
                serde_json::to_string(&JsonRpcErrorResponse::new(Some(id.clone()), e.to_jsonrpc()))
            }
        };
        Ok::<_, Infallible>(Event::default().data(data.unwrap_or_default()))
    });

    Sse::new(sse).keep_alive(KeepAlive::default()).into_response()
}

/// A2A HTTP 服务端
pub struct A2AServer {
    state: Arc<AppState>,
    bind_addr: String,
}

impl A2AServer {
    pub fn new(card: AgentCard, handler: Arc<RequestHandler>, bind_addr: impl Into<String>) -> Self {
        Self {
            state: Arc::new(AppState { card, handler }),
            bind_addr: bind_addr.into(),
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// 绑定地址并启动服务
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind TCP listener on {}", self.bind_addr))?;
        self.serve(listener).await
    }

    /// 在已绑定的监听器上服务
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr().context("Failed to read local address")?;
        info!("A2A server listening on {}", addr);

        axum::serve(listener, self.router())
            .await
            .context("Server error")?;
        Ok(())
    }

    /// 启动服务端（后台任务）
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.start().await {
                error!("A2A server error: {:#}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::FinanceAgentExecutor;
    use crate::core::task_store::{InMemoryTaskStore, TaskStore};
    use crate::protocol::card::create_agent_card;
    use crate::test_utils::ScriptedModel;
    use serde_json::{json, Value};

    async fn spawn_server() -> String {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let executor =
            FinanceAgentExecutor::new(Arc::new(ScriptedModel::echo())).with_store(store.clone());
        let handler = Arc::new(RequestHandler::new(Arc::new(executor), store));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = A2AServer::new(create_agent_card(&url), handler, "unused");
        tokio::spawn(async move { server.serve(listener).await });
        url
    }

    async fn post(url: &str, body: &str) -> (u16, Value) {
        let resp = reqwest::Client::new()
            .post(url)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_health_and_card_routes() {
        let url = spawn_server().await;
        let client = reqwest::Client::new();

        let health = client.get(format!("{}/health", url)).send().await.unwrap();
        assert_eq!(health.status().as_u16(), 200);

        for path in ["/card", "/.well-known/agent-card.json", "/.well-known/agent.json"] {
            let card: Value = client
                .get(format!("{}{}", url, path))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(card["name"], "Finance Purple Agent");
        }
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let url = spawn_server().await;
        let (status, body) = post(&url, "{not json").await;
        assert_eq!(status, 200);
        assert_eq!(body["error"]["code"], -32700);
        assert!(body["id"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let url = spawn_server().await;
        let req = json!({"jsonrpc": "2.0", "id": 7, "method": "tasks/resubscribe", "params": {}});
        let (_, body) = post(&url, &req.to_string()).await;
        assert_eq!(body["error"]["code"], -32601);
        assert_eq!(body["id"], 7);
    }
}
