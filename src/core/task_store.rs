//! 任务存储
//!
//! 默认实现为进程内存，按任务 ID 索引

use async_trait::async_trait;
use dashmap::DashMap;

use crate::protocol::types::Task;

/// 任务存储抽象
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 保存或覆盖任务
    async fn save(&self, task: Task);

    /// 按 ID 获取任务
    async fn get(&self, task_id: &str) -> Option<Task>;

    /// 删除任务，返回被删除的任务
    async fn delete(&self, task_id: &str) -> Option<Task>;
}

/// 内存任务存储
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<String, Task>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: Task) {
        self.tasks.insert(task.id.clone(), task);
    }

    async fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|t| t.value().clone())
    }

    async fn delete(&self, task_id: &str) -> Option<Task> {
        self.tasks.remove(task_id).map(|(_, t)| t)
    }
}
