//! 测试工具和辅助函数
//!
//! 提供可编排回复的聊天模型，用于在不访问真实 LLM 的情况下驱动 Agent

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::infrastructure::llm::{ChatModel, FunctionCall, Message, Tool, ToolCall};

/// 一次被记录的模型调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<Tool>>,
}

enum Fallback {
    Echo,
    Fail(String),
}

/// 按脚本回复的模型，脚本耗尽后回显或报错
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<Message, String>>>,
    fallback: Fallback,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    /// 回显最后一条用户消息
    pub fn echo() -> Self {
        Self::with_fallback(Fallback::Echo)
    }

    /// 每次调用都失败
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with_fallback(Fallback::Fail(reason.into()))
    }

    fn with_fallback(fallback: Fallback) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 每次回复前等待，模拟慢速模型
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(self, reply: Message) -> Self {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).push_back(Ok(reply));
        self
    }

    pub fn push_error(self, reason: impl Into<String>) -> Self {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).push_back(Err(reason.into()));
        self
    }

    /// 构造一条只含工具调用的助手消息
    pub fn tool_call(id: &str, name: &str, arguments: Value) -> Message {
        Message {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: id.to_string(),
                r#type: "function".to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            }]),
            tool_call_id: None,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        _temperature: f32,
    ) -> Result<(Message, Option<String>)> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall { messages, tools });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.replies.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match scripted {
            Some(Ok(reply)) => {
                let finish = if reply.has_tool_calls() { "tool_calls" } else { "stop" };
                Ok((reply, Some(finish.to_string())))
            }
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => match &self.fallback {
                Fallback::Echo => Ok((
                    Message::assistant(format!("Echo: {}", last_user)),
                    Some("stop".to_string()),
                )),
                Fallback::Fail(reason) => Err(anyhow!(reason.clone())),
            },
        }
    }
}
