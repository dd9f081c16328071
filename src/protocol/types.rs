//! A2A 协议数据类型
//!
//! 消息、任务、产出物与流式事件的线上格式（camelCase JSON）

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// 消息与产出物的组成单元，按 `kind` 区分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, Value>>,
    },
    Data {
        data: HashMap<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, Value>>,
    },
    File {
        file: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<HashMap<String, Value>>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn data(data: HashMap<String, Value>) -> Self {
        Part::Data {
            data,
            metadata: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// 消息发送方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A2A 消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default = "message_kind")]
    pub kind: String,
    pub message_id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_task_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

fn message_kind() -> String {
    "message".to_string()
}

impl Message {
    /// 创建 Agent 侧的纯文本消息
    pub fn agent_text(
        text: impl Into<String>,
        context_id: Option<String>,
        task_id: Option<String>,
    ) -> Self {
        Self::plain(Role::Agent, text, context_id, task_id)
    }

    /// 创建用户侧的纯文本消息
    pub fn user_text(
        text: impl Into<String>,
        context_id: Option<String>,
        task_id: Option<String>,
    ) -> Self {
        Self::plain(Role::User, text, context_id, task_id)
    }

    fn plain(
        role: Role,
        text: impl Into<String>,
        context_id: Option<String>,
        task_id: Option<String>,
    ) -> Self {
        Self {
            kind: message_kind(),
            message_id: Uuid::new_v4().to_string(),
            role,
            parts: vec![Part::text(text)],
            context_id,
            task_id,
            reference_task_ids: None,
            metadata: None,
        }
    }

    /// 拼接所有文本部分
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    Rejected,
    AuthRequired,
    Unknown,
}

impl TaskState {
    /// 终止状态之后任务不再接受新的处理
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Canceled | TaskState::Failed | TaskState::Rejected
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::Completed => "completed",
            TaskState::Canceled => "canceled",
            TaskState::Failed => "failed",
            TaskState::Rejected => "rejected",
            TaskState::AuthRequired => "auth-required",
            TaskState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// 当前时间，ISO-8601 带时区偏移
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    pub timestamp: String,
}

impl TaskStatus {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            timestamp: now_timestamp(),
        }
    }

    pub fn with_message(state: TaskState, message: Message) -> Self {
        Self {
            state,
            message: Some(message),
            timestamp: now_timestamp(),
        }
    }
}

/// 任务产出物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            artifact_id: Uuid::new_v4().to_string(),
            name: Some(name.into()),
            description: None,
            parts,
            metadata: None,
        }
    }
}

/// A2A 任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default = "task_kind")]
    pub kind: String,
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

fn task_kind() -> String {
    "task".to_string()
}

impl Task {
    /// 以用户消息创建新任务，状态为 submitted
    pub fn from_message(message: &Message, context_id: impl Into<String>) -> Self {
        let id = message
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self::new(id, context_id, message)
    }

    /// 指定任务 ID 创建新任务
    pub fn new(id: impl Into<String>, context_id: impl Into<String>, message: &Message) -> Self {
        let id = id.into();
        let context_id = context_id.into();

        let mut first = message.clone();
        first.task_id = Some(id.clone());
        first.context_id = Some(context_id.clone());

        Self {
            kind: task_kind(),
            id,
            context_id,
            status: TaskStatus::new(TaskState::Submitted),
            history: vec![first],
            artifacts: Vec::new(),
            metadata: None,
        }
    }

    /// 只保留最后 `n` 条历史
    pub fn truncate_history(&mut self, n: usize) {
        if self.history.len() > n {
            let excess = self.history.len() - n;
            self.history.drain(..excess);
        }
    }
}

/// 状态变更事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    #[serde(default = "status_update_kind")]
    pub kind: String,
    pub task_id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(rename = "final")]
    pub is_final: bool,
}

fn status_update_kind() -> String {
    "status-update".to_string()
}

impl TaskStatusUpdateEvent {
    pub fn new(task_id: &str, context_id: &str, status: TaskStatus, is_final: bool) -> Self {
        Self {
            kind: status_update_kind(),
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            status,
            is_final,
        }
    }
}

/// 产出物事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskArtifactUpdateEvent {
    #[serde(default = "artifact_update_kind")]
    pub kind: String,
    pub task_id: String,
    pub context_id: String,
    pub artifact: Artifact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chunk: Option<bool>,
}

fn artifact_update_kind() -> String {
    "artifact-update".to_string()
}

impl TaskArtifactUpdateEvent {
    pub fn new(task_id: &str, context_id: &str, artifact: Artifact) -> Self {
        Self {
            kind: artifact_update_kind(),
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            artifact,
            append: None,
            last_chunk: None,
        }
    }
}

/// 执行器产生的事件，也是流式响应的 `result`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentEvent {
    Task(Task),
    Message(Message),
    StatusUpdate(TaskStatusUpdateEvent),
    ArtifactUpdate(TaskArtifactUpdateEvent),
}

impl AgentEvent {
    /// 该事件之后不会再有同一任务的事件
    pub fn is_final(&self) -> bool {
        match self {
            AgentEvent::Message(_) => true,
            AgentEvent::StatusUpdate(e) => e.is_final,
            AgentEvent::Task(t) => t.status.state.is_terminal(),
            AgentEvent::ArtifactUpdate(_) => false,
        }
    }
}

/// `message/send` 的结果：任务或直接回复的消息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SendMessageResult {
    Task(Task),
    Message(Message),
}
