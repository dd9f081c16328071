//! 核心层：Agent 与任务执行
//!
//! 包含金融问答 Agent、执行器、事件汇总、任务存储和配置管理

pub mod agent;
pub mod config;
pub mod executor;
pub mod result_aggregator;
pub mod task_store;
pub mod updater;
