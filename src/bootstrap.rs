//! 启动装配
//!
//! 根据 `AppConfig` 组装 LLM 客户端、可选的 MCP 客户端、执行器、
//! 请求处理器与 HTTP 服务端

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::core::config::AppConfig;
use crate::core::executor::FinanceAgentExecutor;
use crate::core::task_store::{InMemoryTaskStore, TaskStore};
use crate::infrastructure::llm::{ChatModel, OpenAIClient};
use crate::infrastructure::mcp_client::McpHttpClient;
use crate::protocol::card::create_agent_card;
use crate::protocol::handler::RequestHandler;
use crate::protocol::server::A2AServer;

/// Agent 启动器
pub struct AgentLauncher {
    config: AppConfig,
}

impl AgentLauncher {
    pub fn with_config(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 按配置创建 LLM 客户端
    pub fn build_model(&self) -> Arc<dyn ChatModel> {
        Arc::new(OpenAIClient::new_with_base_url(
            self.config.nebius_api_key.clone(),
            self.config.model_name.clone(),
            self.config.llm_base_url(),
        ))
    }

    /// 用给定模型组装请求处理器
    pub fn build_handler(&self, model: Arc<dyn ChatModel>) -> RequestHandler {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let mut executor = FinanceAgentExecutor::new(model)
            .with_temperature(self.config.temperature)
            .with_max_iterations(self.config.max_iterations)
            .with_store(store.clone());

        if self.config.mcp_enabled {
            let client = McpHttpClient::new(&self.config.mcp_server);
            info!("MCP tools enabled via {}", client.endpoint());
            executor = executor.with_mcp(Arc::new(client));
        }

        RequestHandler::new(Arc::new(executor), store)
    }

    pub fn build_server(&self, model: Arc<dyn ChatModel>) -> A2AServer {
        let card = create_agent_card(&self.config.card_url());
        let handler = Arc::new(self.build_handler(model));
        A2AServer::new(card, handler, self.config.bind_addr())
    }

    /// 启动服务并阻塞直至退出
    pub async fn launch(&self) -> Result<()> {
        info!(
            provider = %self.config.model_provider,
            model = %self.config.model_name,
            "Using LLM at {}",
            self.config.llm_base_url()
        );

        let server = self.build_server(self.build_model());
        server.start().await
    }
}
