//! 路由层测试，不经过网络直接驱动 `Router`

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use finance_purple_agent::test_utils::ScriptedModel;
use finance_purple_agent::{
    create_agent_card, create_router, AppState, FinanceAgentExecutor, InMemoryTaskStore,
    RequestHandler, TaskStore,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    common::setup();
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let executor =
        FinanceAgentExecutor::new(Arc::new(ScriptedModel::echo())).with_store(store.clone());
    let handler = Arc::new(RequestHandler::new(Arc::new(executor), store));
    create_router(Arc::new(AppState {
        card: create_agent_card("http://127.0.0.1:9019/"),
        handler,
    }))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_cors_preflight_is_permissive() {
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/")
        .header(header::ORIGIN, "http://evaluator.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_legacy_well_known_card() {
    let req = Request::builder()
        .uri("/.well-known/agent.json")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let card = body_json(response).await;
    assert_eq!(card["url"], "http://127.0.0.1:9019/");
    assert_eq!(card["skills"][0]["id"], "expertise");
}

#[tokio::test]
async fn test_jsonrpc_over_router() {
    let req = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            common::send_request(json!(11), "router-msg", "Define liquidity").to_string(),
        ))
        .unwrap();

    let response = app().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], 11);
    assert_eq!(body["result"]["status"]["state"], "completed");
}

#[tokio::test]
async fn test_wrong_jsonrpc_version() {
    let req = Request::builder()
        .method("POST")
        .uri("/")
        .body(Body::from(
            json!({"jsonrpc": "1.0", "id": 1, "method": "message/send"}).to_string(),
        ))
        .unwrap();

    let response = app().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 1);
}
