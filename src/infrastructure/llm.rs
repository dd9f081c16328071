//! LLM 客户端
//!
//! 面向 OpenAI 兼容的 chat completions 接口（Nebius、OpenAI），
//! 支持可选的函数工具调用

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 函数工具定义
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Tool {
    pub r#type: String,
    pub function: Function,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// LLM 返回的工具调用
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCall,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// 对话消息
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// 是否携带待执行的工具调用
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// 聊天模型抽象
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 模型名
    fn model(&self) -> &str;

    /// 发送一轮对话，返回助手消息与 finish_reason
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        temperature: f32,
    ) -> Result<(Message, Option<String>)>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
    finish_reason: Option<String>,
}

/// OpenAI 兼容客户端
#[derive(Clone)]
pub struct OpenAIClient {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAIClient {
    pub fn new_with_base_url(api_key: String, model: String, base_url: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();

        Self {
            api_key,
            model,
            base_url,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatModel for OpenAIClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Tool>>,
        temperature: f32,
    ) -> Result<(Message, Option<String>)> {
        let req = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            tools: tools.filter(|t| !t.is_empty()),
        };

        let res: ChatResponse = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("failed to call LLM provider")?
            .error_for_status()
            .context("LLM provider returned non-success status")?
            .json()
            .await
            .context("failed to parse LLM response")?;

        let choice = res
            .choices
            .into_iter()
            .next()
            .context("empty response from LLM provider")?;

        Ok((choice.message, choice.finish_reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_endpoint_trims_slash() {
        let client = OpenAIClient::new_with_base_url(
            "test-key".to_string(),
            "moonshotai/Kimi-K2-Instruct".to_string(),
            "https://api.tokenfactory.nebius.com/v1/".to_string(),
        );
        assert_eq!(
            client.endpoint(),
            "https://api.tokenfactory.nebius.com/v1/chat/completions"
        );
        assert_eq!(client.model(), "moonshotai/Kimi-K2-Instruct");
    }

    #[test]
    fn test_chat_request_without_tools() {
        let req = ChatRequest {
            model: "m",
            messages: vec![Message::user("Hello")],
            temperature: 0.0,
            tools: None,
        };

        let json_str = serde_json::to_string(&req).unwrap();
        assert!(!json_str.contains("tools"));
        assert!(!json_str.contains("tool_call_id"));
    }

    #[test]
    fn test_chat_request_with_tools() {
        let tool = Tool {
            r#type: "function".to_string(),
            function: Function {
                name: "get_filings".to_string(),
                description: "Fetch SEC filings".to_string(),
                parameters: json!({"type": "object"}),
            },
        };
        let req = ChatRequest {
            model: "m",
            messages: vec![Message::user("Hello")],
            temperature: 0.0,
            tools: Some(vec![tool]),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["tools"][0]["type"], "function");
        assert_eq!(v["tools"][0]["function"]["name"], "get_filings");
    }

    #[test]
    fn test_chat_response_with_tool_calls() {
        let json_str = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_filings", "arguments": "{\"ticker\":\"AAPL\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;

        let resp: ChatResponse = serde_json::from_str(json_str).unwrap();
        let msg = &resp.choices[0].message;
        assert!(msg.has_tool_calls());
        assert!(msg.content.is_none());
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_tool_message_serialization() {
        let v = serde_json::to_value(Message::tool("call_1", "{}")).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call_1");
    }
}
