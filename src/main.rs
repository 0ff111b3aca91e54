//! deskpilot - interactive entry point
//!
//! Loads configuration from the environment and starts the prompt loop.

use std::sync::Arc;

use deskpilot::{agent::Session, config::Config, llm::GeminiClient, repl};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs on stderr, conversation on stdout.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deskpilot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: fast={} capable={} workspace={}",
        config.models.fast,
        config.models.capable,
        config.workspace_path.display()
    );

    let llm = Arc::new(GeminiClient::new(
        config.api_key.clone(),
        config.api_host.clone(),
    )?);
    let mut session = Session::new(&config, llm);

    repl::run(&mut session).await
}
