//! 事件队列与任务更新器
//!
//! 执行器只通过事件描述任务进展，由请求处理层负责汇总与持久化

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{AgentError, Result};
use crate::protocol::types::{
    AgentEvent, Artifact, Message, Part, TaskArtifactUpdateEvent, TaskState, TaskStatus,
    TaskStatusUpdateEvent,
};

/// 执行器事件队列，所有克隆被丢弃后接收端结束
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl EventQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, event: AgentEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| AgentError::Internal("event queue closed".to_string()))
    }
}

/// 针对单个任务发布状态与产出物
#[derive(Clone)]
pub struct TaskUpdater {
    queue: EventQueue,
    task_id: String,
    context_id: String,
}

impl TaskUpdater {
    pub fn new(queue: EventQueue, task_id: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            queue,
            task_id: task_id.into(),
            context_id: context_id.into(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// 以该任务的身份创建 Agent 文本消息
    pub fn new_agent_message(&self, text: impl Into<String>) -> Message {
        Message::agent_text(
            text,
            Some(self.context_id.clone()),
            Some(self.task_id.clone()),
        )
    }

    pub fn update_status(
        &self,
        state: TaskState,
        message: Option<Message>,
        is_final: bool,
    ) -> Result<()> {
        debug!(task_id = %self.task_id, state = %state, "task status update");
        let status = match message {
            Some(m) => TaskStatus::with_message(state, m),
            None => TaskStatus::new(state),
        };
        self.queue.enqueue(AgentEvent::StatusUpdate(TaskStatusUpdateEvent::new(
            &self.task_id,
            &self.context_id,
            status,
            is_final,
        )))
    }

    pub fn start_work(&self) -> Result<()> {
        self.update_status(TaskState::Working, None, false)
    }

    pub fn add_artifact(&self, parts: Vec<Part>, name: impl Into<String>) -> Result<()> {
        self.queue
            .enqueue(AgentEvent::ArtifactUpdate(TaskArtifactUpdateEvent::new(
                &self.task_id,
                &self.context_id,
                Artifact::new(name, parts),
            )))
    }

    pub fn complete(&self) -> Result<()> {
        self.update_status(TaskState::Completed, None, true)
    }

    pub fn failed(&self, message: Message) -> Result<()> {
        self.update_status(TaskState::Failed, Some(message), true)
    }
}
