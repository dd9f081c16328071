//! Agent 执行器
//!
//! 把一次 A2A 请求转换为任务事件序列：
//! 建任务、标记 working、运行 Agent、产出 `Response` 并结束

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::core::agent::FinanceAgent;
use crate::core::task_store::TaskStore;
use crate::core::updater::{EventQueue, TaskUpdater};
use crate::errors::{AgentError, Result};
use crate::infrastructure::llm::ChatModel;
use crate::infrastructure::logger::{log_agent_failure, log_agent_success, preview};
use crate::infrastructure::mcp_client::{McpHttpClient, McpToolbox, DEFAULT_TOOL_TIMEOUT};
use crate::protocol::types::{AgentEvent, Message, Part, Task, TaskState};

/// 单次请求的上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub message: Option<Message>,
    pub task_id: String,
    pub context_id: String,
    pub current_task: Option<Task>,
}

impl RequestContext {
    /// 用户输入的纯文本
    pub fn user_input(&self) -> String {
        self.message.as_ref().map(Message::text).unwrap_or_default()
    }
}

/// 执行器抽象
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, context: RequestContext, queue: EventQueue) -> Result<()>;

    async fn cancel(&self, context: RequestContext, queue: EventQueue) -> Result<()>;
}

pub struct FinanceAgentExecutor {
    model: Arc<dyn ChatModel>,
    temperature: f32,
    max_iterations: usize,
    mcp: Option<Arc<McpHttpClient>>,
    tool_timeout: Duration,
    store: Option<Arc<dyn TaskStore>>,
    agents: DashMap<String, Arc<Mutex<FinanceAgent>>>,
    /// 已结束的任务，在释放对话锁之前写入
    finished: DashMap<String, TaskState>,
}

impl FinanceAgentExecutor {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            temperature: 0.0,
            max_iterations: crate::core::agent::DEFAULT_MAX_ITERATIONS,
            mcp: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            store: None,
            agents: DashMap::new(),
            finished: DashMap::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_mcp(mut self, client: Arc<McpHttpClient>) -> Self {
        self.mcp = Some(client);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// 任务状态以存储为准；未设置时使用请求上下文里的快照
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 当前保有的对话数
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn agent_for(&self, context_id: &str) -> Arc<Mutex<FinanceAgent>> {
        self.agents
            .entry(context_id.to_string())
            .or_insert_with(|| {
                let mut agent = FinanceAgent::new(self.model.clone(), context_id)
                    .with_temperature(self.temperature)
                    .with_max_iterations(self.max_iterations);
                if let Some(client) = &self.mcp {
                    agent = agent.with_tools(
                        McpToolbox::new(client.clone(), context_id).with_timeout(self.tool_timeout),
                    );
                }
                Arc::new(Mutex::new(agent))
            })
            .clone()
    }
}

#[async_trait]
impl AgentExecutor for FinanceAgentExecutor {
    #[instrument(skip_all, fields(task_id = %context.task_id, context_id = %context.context_id))]
    async fn execute(&self, context: RequestContext, queue: EventQueue) -> Result<()> {
        let Some(message) = context.message.clone() else {
            return Err(AgentError::InvalidRequest(
                "Missing message in request".to_string(),
            ));
        };

        if context.current_task.is_none() {
            let task = Task::new(&context.task_id, &context.context_id, &message);
            queue.enqueue(AgentEvent::Task(task))?;
        }

        let updater = TaskUpdater::new(queue, &context.task_id, &context.context_id);
        let user_input = message.text();

        // 同一对话串行处理，持锁后再读任务状态
        let agent = self.agent_for(&context.context_id);
        let mut agent = agent.lock().await;

        let current_task = match &self.store {
            Some(store) => store.get(&context.task_id).await,
            None => context.current_task.clone(),
        };
        let finished = self
            .finished
            .get(&context.task_id)
            .map(|state| *state)
            .or_else(|| {
                current_task
                    .as_ref()
                    .map(|t| t.status.state)
                    .filter(|state| state.is_terminal())
            });
        if let Some(state) = finished {
            return Err(AgentError::InvalidRequest(format!(
                "Task {} already processed (state: {})",
                context.task_id, state
            )));
        }

        let is_new = agent.is_new_conversation();
        info!(is_new, "Processing message: {}", preview(&user_input, 200));

        updater.start_work()?;

        match agent.process_message(&user_input, is_new, Some(&updater)).await {
            Ok((status, answer)) => {
                let response = answer
                    .get("response")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();

                updater.add_artifact(vec![Part::text(status), Part::data(answer)], "Response")?;
                updater.complete()?;
                self.finished.insert(context.task_id.clone(), TaskState::Completed);

                log_agent_success(
                    &user_input,
                    &context.context_id,
                    &context.task_id,
                    &preview(&response, 500),
                );
            }
            Err(e) => {
                updater.failed(updater.new_agent_message(format!("Error: {}", e)))?;
                self.finished.insert(context.task_id.clone(), TaskState::Failed);

                log_agent_failure(
                    "agent_error",
                    &user_input,
                    &context.context_id,
                    &context.task_id,
                    &e.to_string(),
                );
            }
        }

        Ok(())
    }

    async fn cancel(&self, _context: RequestContext, _queue: EventQueue) -> Result<()> {
        Err(AgentError::UnsupportedOperation)
    }
}
