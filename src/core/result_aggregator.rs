//! 结果汇总
//!
//! 把执行器事件折叠进任务快照

use crate::protocol::types::{AgentEvent, Task};

#[derive(Default)]
pub struct ResultAggregator {
    task: Option<Task>,
}

impl ResultAggregator {
    pub fn new(task: Option<Task>) -> Self {
        Self { task }
    }

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    pub fn into_task(self) -> Option<Task> {
        self.task
    }

    /// 应用一个事件，返回任务是否发生变化
    pub fn apply(&mut self, event: &AgentEvent) -> bool {
        match event {
            AgentEvent::Task(task) => {
                self.task = Some(task.clone());
                true
            }
            AgentEvent::Message(_) => false,
            AgentEvent::StatusUpdate(update) => {
                let task = self.task.get_or_insert_with(|| Task {
                    kind: "task".to_string(),
                    id: update.task_id.clone(),
                    context_id: update.context_id.clone(),
                    status: update.status.clone(),
                    history: Vec::new(),
                    artifacts: Vec::new(),
                    metadata: None,
                });
                // 旧状态里的消息转入历史
                if let Some(previous) = task.status.message.take() {
                    task.history.push(previous);
                }
                task.status = update.status.clone();
                true
            }
            AgentEvent::ArtifactUpdate(update) => {
                let Some(task) = self.task.as_mut() else {
                    return false;
                };
                let incoming = &update.artifact;
                match task
                    .artifacts
                    .iter_mut()
                    .find(|a| a.artifact_id == incoming.artifact_id)
                {
                    Some(existing) if update.append == Some(true) => {
                        existing.parts.extend(incoming.parts.iter().cloned());
                    }
                    Some(existing) => *existing = incoming.clone(),
                    None => task.artifacts.push(incoming.clone()),
                }
                true
            }
        }
    }
}
