//! 金融问答 Agent
//!
//! 维护单个对话上下文的历史，循环调用 LLM，
//! 在启用 MCP 时代为执行模型请求的工具

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::core::updater::TaskUpdater;
use crate::errors::{AgentError, Result};
use crate::infrastructure::llm::{ChatModel, Message, Tool};
use crate::infrastructure::logger::{preview, Timer};
use crate::infrastructure::mcp_client::McpToolbox;
use crate::protocol::types::TaskState;

/// 默认系统提示词
pub const SYSTEM_PROMPT: &str =
    "You are a financial assistant providing faithful information regarding the questions posed by the user.";

/// 默认迭代上限
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// 完成时返回的状态文本
pub const STATUS_COMPLETE: &str = "complete";

/// Agent 的最终回答：状态文本与结构化数据
pub type AgentAnswer = (String, HashMap<String, Value>);

pub struct FinanceAgent {
    model: Arc<dyn ChatModel>,
    temperature: f32,
    max_iterations: usize,
    context_id: String,
    conversation_history: Vec<Message>,
    tools: Option<McpToolbox>,
}

impl FinanceAgent {
    pub fn new(model: Arc<dyn ChatModel>, context_id: impl Into<String>) -> Self {
        Self {
            model,
            temperature: 0.0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            context_id: context_id.into(),
            conversation_history: Vec::new(),
            tools: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_tools(mut self, tools: McpToolbox) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn conversation_history(&self) -> &[Message] {
        &self.conversation_history
    }

    /// 尚未进行过任何对话
    pub fn is_new_conversation(&self) -> bool {
        self.conversation_history.is_empty()
    }

    fn system_messages(&self) -> Vec<Message> {
        vec![Message::system(SYSTEM_PROMPT)]
    }

    /// 列出 MCP 工具，失败时退化为无工具模式
    async fn available_tools(&self) -> Option<Vec<Tool>> {
        let toolbox = self.tools.as_ref()?;
        match toolbox.tools().await {
            Ok(tools) => Some(tools),
            Err(e) => {
                warn!(
                    context_id = %self.context_id,
                    "MCP tools unavailable, answering without tools: {:#}", e
                );
                None
            }
        }
    }

    /// 处理一条用户消息，直到模型给出不含工具调用的回答
    pub async fn process_message(
        &mut self,
        message: &str,
        reset_conversation: bool,
        updater: Option<&TaskUpdater>,
    ) -> Result<AgentAnswer> {
        if reset_conversation {
            self.conversation_history.clear();
        }

        self.conversation_history.push(Message::user(message));

        let tools = self.available_tools().await;
        let mut last_error = None;

        for iteration in 0..self.max_iterations {
            let mut messages = self.system_messages();
            messages.extend(self.conversation_history.iter().cloned());

            let reply = {
                let mut timer = Timer::new("llm_chat");
                if let Some(u) = updater {
                    timer = timer.with_task(u.task_id());
                }
                let result = self
                    .model
                    .chat(messages, tools.clone(), self.temperature)
                    .await;
                drop(timer);
                result
            };

            let (assistant, _finish_reason) = match reply {
                Ok(r) => r,
                Err(e) => {
                    error!("Error in iteration {}: {:#}", iteration + 1, e);
                    last_error = Some(e);
                    continue;
                }
            };

            if assistant.has_tool_calls() {
                if let Some(toolbox) = self.tools.clone().filter(|_| tools.is_some()) {
                    self.run_tool_calls(&toolbox, assistant, updater).await;
                    continue;
                }
                warn!("Model requested tools but none are configured, using its text reply");
            }

            let content = assistant.content.unwrap_or_default();
            debug!(
                "Iteration {}: content={}",
                iteration + 1,
                if content.is_empty() { "(no content)".to_string() } else { preview(&content, 1000) }
            );

            self.conversation_history.push(Message::assistant(content.clone()));

            let mut answer = HashMap::new();
            answer.insert("response".to_string(), Value::String(content));
            return Ok((STATUS_COMPLETE.to_string(), answer));
        }

        warn!(
            "Max iterations ({}) reached without submitting answer",
            self.max_iterations
        );

        Err(match last_error {
            Some(e) => AgentError::LlmError(format!("{:#}", e)),
            None => AgentError::LlmError(format!(
                "max iterations ({}) reached without an answer",
                self.max_iterations
            )),
        })
    }

    async fn run_tool_calls(
        &mut self,
        toolbox: &McpToolbox,
        assistant: Message,
        updater: Option<&TaskUpdater>,
    ) {
        let calls = assistant.tool_calls.clone().unwrap_or_default();
        self.conversation_history.push(assistant);

        for call in calls {
            let name = call.function.name.as_str();

            if let Some(u) = updater {
                let note = u.new_agent_message(format!("Calling tool `{}`", name));
                if let Err(e) = u.update_status(TaskState::Working, Some(note), false) {
                    warn!("Failed to publish progress update: {}", e);
                }
            }

            let arguments: Value = serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                warn!("Tool '{}' called with invalid JSON arguments: {}", name, e);
                json!({})
            });

            let result = toolbox.call_tool(name, arguments).await;
            self.conversation_history
                .push(Message::tool(call.id.clone(), result.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::updater::EventQueue;
    use crate::infrastructure::mcp_client::McpHttpClient;
    use crate::protocol::types::AgentEvent;
    use crate::test_utils::ScriptedModel;
    use std::time::Duration;

    #[tokio::test]
    async fn test_process_message_returns_response() {
        let model = Arc::new(ScriptedModel::echo());
        let mut agent = FinanceAgent::new(model.clone(), "ctx-1");

        let (status, answer) = agent
            .process_message("What is a bond?", true, None)
            .await
            .unwrap();

        assert_eq!(status, "complete");
        assert_eq!(answer["response"], "Echo: What is a bond?");
        assert_eq!(agent.conversation_history().len(), 2);

        let calls = model.calls();
        assert_eq!(calls[0].messages[0].role, "system");
        assert_eq!(calls[0].messages[0].content.as_deref(), Some(SYSTEM_PROMPT));
        assert!(calls[0].tools.is_none());
    }

    #[tokio::test]
    async fn test_history_kept_across_messages() {
        let model = Arc::new(ScriptedModel::echo());
        let mut agent = FinanceAgent::new(model.clone(), "ctx-1");

        agent.process_message("first", true, None).await.unwrap();
        assert!(!agent.is_new_conversation());
        agent.process_message("second", false, None).await.unwrap();

        // system + user + assistant + user
        assert_eq!(model.calls()[1].messages.len(), 4);

        agent.process_message("third", true, None).await.unwrap();
        assert_eq!(model.calls()[2].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_retried_within_iteration_budget() {
        let model = Arc::new(ScriptedModel::echo().push_error("rate limited"));
        let mut agent = FinanceAgent::new(model.clone(), "ctx-1");

        let (_, answer) = agent.process_message("q", true, None).await.unwrap();
        assert_eq!(answer["response"], "Echo: q");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_iterations_return_last_error() {
        let model = Arc::new(ScriptedModel::failing("upstream unavailable"));
        let mut agent = FinanceAgent::new(model.clone(), "ctx-1").with_max_iterations(3);

        let err = agent.process_message("q", true, None).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmError(_)));
        assert!(err.to_string().contains("upstream unavailable"));
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_tool_calls_without_toolbox_use_text_reply() {
        let mut reply = ScriptedModel::tool_call("call_1", "lookup", json!({}));
        reply.content = Some("Direct answer".to_string());
        let model = Arc::new(ScriptedModel::echo().push_reply(reply));
        let mut agent = FinanceAgent::new(model, "ctx-1");

        let (_, answer) = agent.process_message("q", true, None).await.unwrap();
        assert_eq!(answer["response"], "Direct answer");
    }

    #[tokio::test]
    async fn test_unreachable_mcp_falls_back_to_no_tools() {
        let model = Arc::new(ScriptedModel::echo());
        let client = Arc::new(McpHttpClient::new("http://127.0.0.1:1"));
        let toolbox = McpToolbox::new(client, "ctx-1").with_timeout(Duration::from_secs(2));
        let mut agent = FinanceAgent::new(model.clone(), "ctx-1").with_tools(toolbox);

        let (_, answer) = agent.process_message("q", true, None).await.unwrap();
        assert_eq!(answer["response"], "Echo: q");
        assert!(model.calls()[0].tools.is_none());
    }

    #[tokio::test]
    async fn test_progress_updates_published_through_updater() {
        let (queue, mut rx) = EventQueue::new();
        let updater = TaskUpdater::new(queue, "t1", "ctx-1");
        let model = Arc::new(ScriptedModel::echo());
        let mut agent = FinanceAgent::new(model, "ctx-1");

        agent.process_message("q", true, Some(&updater)).await.unwrap();
        drop(updater);

        // 无工具调用时不发布进度
        let mut count = 0;
        while let Some(event) = rx.recv().await {
            assert!(matches!(event, AgentEvent::StatusUpdate(_)));
            count += 1;
        }
        assert_eq!(count, 0);
    }
}
