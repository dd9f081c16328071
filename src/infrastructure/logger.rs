//! 日志模块 - 提供结构化日志、性能计时和结果审计
//!
//! 特性：
//! - 支持人类可读、紧凑和 JSON 三种格式
//! - 同时输出到控制台和按天滚动的日志文件（保留 7 天）
//! - 敏感信息脱敏
//! - Agent 成功/失败的审计事件

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 日志文件名前缀，实际文件为 `<前缀>.<日期>.log`
pub const LOG_FILE_PREFIX: &str = "finance-purple-agent";

/// 保留的日志文件数（按天滚动，即 7 天）
pub const MAX_LOG_FILES: usize = 7;

/// 审计事件的 target
pub const AUDIT_TARGET: &str = "agent_audit";

/// 日志格式类型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// 人类可读格式（带颜色）
    Pretty,
    /// 紧凑单行格式
    Compact,
    /// JSON 结构化格式（适合日志收集系统）
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别，如 `INFO`、`debug`
    pub level: String,
    /// 日志格式
    pub format: LogFormat,
    /// 日志目录，`None` 时只输出到控制台
    pub log_dir: Option<PathBuf>,
    /// 是否启用颜色（仅控制台有效）
    pub enable_color: bool,
    /// 是否显示目标模块
    pub show_target: bool,
    /// 是否显示文件名和行号
    pub show_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Pretty,
            log_dir: Some(PathBuf::from("logs")),
            enable_color: true,
            show_target: true,
            show_file: true,
        }
    }
}

impl LogConfig {
    /// `RUST_LOG` 优先，其次 `LOG_LEVEL`
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.level.to_lowercase()))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// 创建日志目录，返回按天滚动的文件写入器
pub fn rolling_appender(dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("failed to open log file in {}", dir.display()))
}

/// 初始化日志系统
///
/// 文件写入在后台线程完成，返回的 guard 需要保持到进程退出，
/// 否则缓冲中的日志会丢失
///
/// # 环境变量
/// - `RUST_LOG`: 覆盖日志级别过滤（如 `info`, `debug,reqwest=warn`）
/// - `LOG_LEVEL`: 默认级别，由配置传入
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let file = match &config.log_dir {
        Some(dir) => Some(tracing_appender::non_blocking(rolling_appender(dir)?)),
        None => None,
    };

    let console = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(config.show_target)
            .with_file(config.show_file)
            .with_line_number(config.show_file)
            .with_ansi(config.enable_color)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(config.show_target)
            .with_file(config.show_file)
            .with_line_number(config.show_file)
            .with_ansi(config.enable_color)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(config.show_target)
            .with_file(config.show_file)
            .with_line_number(config.show_file)
            .with_current_span(true)
            .boxed(),
    };

    let (writer, guard) = file.unzip();
    let file_layer = writer.map(|w| {
        fmt::layer()
            .with_writer(w)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// 性能计时器 - 自动记录执行时间
pub struct Timer {
    name: String,
    start: Instant,
    task_id: Option<String>,
}

impl Timer {
    /// 创建新的计时器
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            task_id: None,
        }
    }

    /// 关联到任务
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;

        match &self.task_id {
            Some(task_id) => {
                tracing::info!(
                    target: "metrics",
                    task_id = %task_id,
                    operation = %self.name,
                    elapsed_ms = %format!("{:.2}", elapsed_ms),
                    "operation completed"
                );
            }
            None => {
                tracing::info!(
                    target: "metrics",
                    operation = %self.name,
                    elapsed_ms = %format!("{:.2}", elapsed_ms),
                    "operation completed"
                );
            }
        }
    }
}

/// 敏感信息脱敏工具
pub struct Sanitizer;

impl Sanitizer {
    /// 脱敏 API 密钥 - 只保留前 8 位和后 4 位
    pub fn api_key(key: &str) -> String {
        if key.len() <= 16 || !key.is_ascii() {
            return "***".to_string();
        }
        format!("{}...{}", &key[..8], &key[key.len() - 4..])
    }
}

/// 截断预览文本，按字符计数
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// 记录一次成功的问答
pub fn log_agent_success(user_message: &str, context_id: &str, task_id: &str, response_preview: &str) {
    tracing::info!(
        target: AUDIT_TARGET,
        outcome = "success",
        context_id = %context_id,
        task_id = %task_id,
        user_message = %preview(user_message, 200),
        response = %preview(response_preview, 500),
        "agent answered"
    );
}

/// 记录一次失败的问答
pub fn log_agent_failure(
    reason: &str,
    user_message: &str,
    context_id: &str,
    task_id: &str,
    detail: &str,
) {
    tracing::warn!(
        target: AUDIT_TARGET,
        outcome = "failure",
        reason = %reason,
        context_id = %context_id,
        task_id = %task_id,
        user_message = %preview(user_message, 200),
        detail = %detail,
        "agent failed"
    );
}
