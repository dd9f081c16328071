//! 请求处理
//!
//! 连接 JSON-RPC 方法与执行器：准备请求上下文，后台运行执行器，
//! 把事件汇总进任务并写入存储

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::executor::{AgentExecutor, RequestContext};
use crate::core::result_aggregator::ResultAggregator;
use crate::core::task_store::TaskStore;
use crate::core::updater::EventQueue;
use crate::errors::{AgentError, Result};
use crate::protocol::jsonrpc::{MessageSendParams, TaskIdParams, TaskQueryParams};
use crate::protocol::types::{AgentEvent, SendMessageResult, Task};

/// 一个事件及其应用后的任务快照
#[derive(Debug, Clone)]
struct Update {
    event: AgentEvent,
    task: Option<Task>,
}

struct Prepared {
    context: RequestContext,
    blocking: bool,
    history_length: Option<usize>,
}

pub struct RequestHandler {
    executor: Arc<dyn AgentExecutor>,
    store: Arc<dyn TaskStore>,
}

impl RequestHandler {
    pub fn new(executor: Arc<dyn AgentExecutor>, store: Arc<dyn TaskStore>) -> Self {
        Self { executor, store }
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        self.store.clone()
    }

    /// 校验参数并构造请求上下文
    async fn prepare(&self, params: MessageSendParams) -> Result<Prepared> {
        let MessageSendParams {
            mut message,
            configuration,
            ..
        } = params;

        if message.parts.is_empty() {
            return Err(AgentError::InvalidParams(
                "message must contain at least one part".to_string(),
            ));
        }

        let current_task = match &message.task_id {
            Some(task_id) => Some(
                self.store
                    .get(task_id)
                    .await
                    .ok_or_else(|| AgentError::TaskNotFound(task_id.clone()))?,
            ),
            None => None,
        };

        // 已有任务始终留在它自己的对话里
        let context_id = current_task
            .as_ref()
            .map(|t| t.context_id.clone())
            .or_else(|| message.context_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let task_id = current_task
            .as_ref()
            .map(|t| t.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        message.context_id = Some(context_id.clone());
        message.task_id = Some(task_id.clone());

        // 继续进行中的任务时把新消息记入历史
        let current_task = match current_task {
            Some(mut task) if !task.status.state.is_terminal() => {
                task.history.push(message.clone());
                self.store.save(task.clone()).await;
                Some(task)
            }
            other => other,
        };

        let configuration = configuration.unwrap_or_default();

        Ok(Prepared {
            context: RequestContext {
                message: Some(message),
                task_id,
                context_id,
                current_task,
            },
            blocking: configuration.blocking.unwrap_or(true),
            history_length: configuration.history_length,
        })
    }

    /// 后台运行执行器，返回按顺序的更新；执行器的错误在事件之后送达
    fn run(&self, context: RequestContext) -> mpsc::UnboundedReceiver<Result<Update>> {
        let (queue, mut events) = EventQueue::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let executor = self.executor.clone();
        let store = self.store.clone();
        let mut initial = context.current_task.clone();
        let task_id = context.task_id.clone();

        let execution = tokio::spawn(async move { executor.execute(context, queue).await });

        tokio::spawn(async move {
            let mut aggregator: Option<ResultAggregator> = None;

            while let Some(event) = events.recv().await {
                // 续接任务的首个事件在执行器持有对话锁之后才出现，此时存储里的任务是最新的
                if aggregator.is_none() {
                    let latest = store.get(&task_id).await.or_else(|| initial.take());
                    aggregator = Some(ResultAggregator::new(latest));
                }
                let Some(current) = aggregator.as_mut() else {
                    continue;
                };

                if current.apply(&event) {
                    if let Some(task) = current.task() {
                        store.save(task.clone()).await;
                    }
                }
                let update = Update {
                    event,
                    task: current.task().cloned(),
                };
                // 调用方可能已经返回，任务仍需处理完
                let _ = tx.send(Ok(update));
            }

            let outcome = match execution.await {
                Ok(result) => result,
                Err(e) => Err(AgentError::Internal(format!("executor task failed: {}", e))),
            };
            if let Err(e) = outcome {
                warn!(task_id = %task_id, "Executor rejected request: {}", e);
                let _ = tx.send(Err(e));
            }
        });

        rx
    }

    /// `message/send`
    pub async fn on_message_send(&self, params: MessageSendParams) -> Result<SendMessageResult> {
        let prepared = self.prepare(params).await?;
        info!(
            task_id = %prepared.context.task_id,
            context_id = %prepared.context.context_id,
            blocking = prepared.blocking,
            "message/send"
        );

        let mut updates = self.run(prepared.context);
        let mut task = None;
        let mut direct_reply = None;

        while let Some(update) = updates.recv().await {
            let update = update?;
            if let AgentEvent::Message(m) = &update.event {
                direct_reply = Some(m.clone());
            }
            task = update.task;
            if !prepared.blocking {
                break;
            }
        }

        match (task, direct_reply) {
            (Some(mut task), _) => {
                if let Some(n) = prepared.history_length {
                    task.truncate_history(n);
                }
                Ok(SendMessageResult::Task(task))
            }
            (None, Some(message)) => Ok(SendMessageResult::Message(message)),
            (None, None) => Err(AgentError::Internal(
                "agent finished without producing a task".to_string(),
            )),
        }
    }

    /// `message/stream`：逐个产出执行器事件
    pub async fn on_message_stream(
        &self,
        params: MessageSendParams,
    ) -> Result<BoxStream<'static, Result<AgentEvent>>> {
        let prepared = self.prepare(params).await?;
        info!(
            task_id = %prepared.context.task_id,
            context_id = %prepared.context.context_id,
            "message/stream"
        );

        let updates = self.run(prepared.context);
        let events = stream::unfold(updates, |mut rx| async move {
            rx.recv()
                .await
                .map(|update| (update.map(|u| u.event), rx))
        });

        Ok(events.boxed())
    }

    /// `tasks/get`
    pub async fn on_get_task(&self, params: TaskQueryParams) -> Result<Task> {
        debug!(task_id = %params.id, "tasks/get");
        let mut task = self
            .store
            .get(&params.id)
            .await
            .ok_or_else(|| AgentError::TaskNotFound(params.id.clone()))?;

        if let Some(n) = params.history_length {
            task.truncate_history(n);
        }
        Ok(task)
    }

    /// `tasks/cancel`
    pub async fn on_cancel_task(&self, params: TaskIdParams) -> Result<Task> {
        let task = self
            .store
            .get(&params.id)
            .await
            .ok_or_else(|| AgentError::TaskNotFound(params.id.clone()))?;

        if task.status.state.is_terminal() {
            return Err(AgentError::TaskNotCancelable(format!(
                "task {} is already {}",
                task.id, task.status.state
            )));
        }

        let context = RequestContext {
            message: None,
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            current_task: Some(task.clone()),
        };

        let (queue, mut events) = EventQueue::new();
        self.executor.cancel(context, queue).await?;

        let mut aggregator = ResultAggregator::new(Some(task));
        while let Some(event) = events.recv().await {
            aggregator.apply(&event);
        }
        let task = aggregator
            .into_task()
            .ok_or_else(|| AgentError::Internal("task lost during cancel".to_string()))?;
        self.store.save(task.clone()).await;
        Ok(task)
    }
}
