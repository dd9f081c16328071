use anyhow::Result;
use clap::Parser;
use tracing::info;

use finance_purple_agent::bootstrap::AgentLauncher;
use finance_purple_agent::infrastructure::logger;
use finance_purple_agent::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // .env 中的值覆盖已有的环境变量
    dotenvy::dotenv_override().ok();

    let cfg = AppConfig::parse();
    let _log_guard = logger::init(&cfg.log_config())?;
    cfg.validate()?;

    info!("Starting Finance Purple Agent on {}:{}", cfg.host, cfg.port);
    info!("Agent card URL: {}", cfg.card_url());

    AgentLauncher::with_config(cfg).launch().await
}
