mod cli;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use floorline_bus::TopicScheme;
use floorline_core::{load_dotenv, AgentConfig};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    match args.command {
        Command::CheckConfig { path } => {
            let config = AgentConfig::from_file(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.validate().context("invalid configuration")?;
            config.log_summary();

            let topics = TopicScheme::from_agent(&config.agent);
            println!("requests:  {}", topics.skill_request());
            println!("responses: {}", topics.skill_response());
            println!("queue:     {}", topics.action_queue());
            Ok(())
        }
        Command::WatchQueue {
            endpoint,
            module,
            namespace,
            role,
        } => {
            let topics = TopicScheme::new(&namespace, module, &role);
            watch::watch_queue(&endpoint, &topics).await
        }
    }
}
