use clap::Parser;
use std::path::PathBuf;

use crate::infrastructure::logger::{LogConfig, LogFormat, Sanitizer};

/// LLM 服务提供方
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelProvider {
    /// Nebius Token Factory（OpenAI 兼容）
    Nebius,
    /// OpenAI 官方接口
    OpenAI,
}

impl ModelProvider {
    /// 提供方的 API 根地址
    pub fn base_url(&self) -> &'static str {
        match self {
            ModelProvider::Nebius => "https://api.tokenfactory.nebius.com/v1/",
            ModelProvider::OpenAI => "https://api.openai.com/v1",
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nebius" => Ok(ModelProvider::Nebius),
            "openai" => Ok(ModelProvider::OpenAI),
            _ => Err(format!("Unknown model provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelProvider::Nebius => write!(f, "nebius"),
            ModelProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// `true` / `1` / `t`（不区分大小写）为真，其余为假
fn parse_flag(s: &str) -> Result<bool, String> {
    Ok(matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "t"))
}

#[derive(Parser, Clone)]
#[command(
    author,
    version,
    about = "Finance Purple Agent: A2A JSON-RPC server backed by a hosted LLM"
)]
pub struct AppConfig {
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// 监听端口
    #[arg(long, default_value_t = 9019)]
    pub port: u16,

    /// Agent Card 中对外公布的 URL，默认 http://{host}:{port}/
    #[arg(long)]
    pub card_url: Option<String>,

    // LLM 配置
    #[arg(long, env = "NEBIUS_API_KEY", hide_env_values = true)]
    pub nebius_api_key: String,

    #[arg(long, env = "MODEL_PROVIDER", default_value = "nebius")]
    pub model_provider: ModelProvider,

    #[arg(long, env = "MODEL_NAME", default_value = "moonshotai/Kimi-K2-Instruct")]
    pub model_name: String,

    /// 覆盖提供方默认的 API 根地址
    #[arg(long, env = "LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    #[arg(long, env = "MODEL_TEMPERATURE", default_value_t = 0.0)]
    pub temperature: f32,

    /// 单次问答内 LLM 调用轮数上限
    #[arg(long, env = "MAX_ITERATIONS", default_value_t = 20)]
    pub max_iterations: usize,

    // 工具配置
    #[arg(
        long,
        env = "MCP_ENABLED",
        default_value = "false",
        action = clap::ArgAction::Set,
        value_parser = parse_flag
    )]
    pub mcp_enabled: bool,

    #[arg(long, env = "MCP_SERVER", default_value = "http://127.0.0.1:9020")]
    pub mcp_server: String,

    // 日志配置
    #[arg(long, env = "LOG_LEVEL", default_value = "INFO")]
    pub log_level: String,

    /// 日志格式: pretty, compact, json
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("card_url", &self.card_url)
            .field("nebius_api_key", &Sanitizer::api_key(&self.nebius_api_key))
            .field("model_provider", &self.model_provider)
            .field("model_name", &self.model_name)
            .field("llm_base_url", &self.llm_base_url)
            .field("temperature", &self.temperature)
            .field("max_iterations", &self.max_iterations)
            .field("mcp_enabled", &self.mcp_enabled)
            .field("mcp_server", &self.mcp_server)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.nebius_api_key.trim().is_empty() {
            anyhow::bail!("NEBIUS_API_KEY is required");
        }

        if self.max_iterations == 0 {
            anyhow::bail!("MAX_ITERATIONS must be at least 1");
        }

        url::Url::parse(&self.card_url())
            .map_err(|e| anyhow::anyhow!("invalid card url '{}': {}", self.card_url(), e))?;

        url::Url::parse(&self.llm_base_url())
            .map_err(|e| anyhow::anyhow!("invalid LLM base url '{}': {}", self.llm_base_url(), e))?;

        if self.mcp_enabled {
            url::Url::parse(&self.mcp_server)
                .map_err(|e| anyhow::anyhow!("invalid MCP_SERVER '{}': {}", self.mcp_server, e))?;
        }

        Ok(())
    }

    /// Agent Card 中的 URL
    pub fn card_url(&self) -> String {
        self.card_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/", self.host, self.port))
    }

    /// 监听地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// LLM API 根地址
    pub fn llm_base_url(&self) -> String {
        self.llm_base_url
            .clone()
            .unwrap_or_else(|| self.model_provider.base_url().to_string())
    }

    /// 日志配置
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
            log_dir: Some(self.log_dir.clone()),
            ..Default::default()
        }
    }
}
