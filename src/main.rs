use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use tabpilot::brain::{OpenAiClient, Orchestrator};
use tabpilot::channel::{CdpChannel, PageChannel};
use tabpilot::face;
use tabpilot::session::BrowserSession;

/// LLM-driven automation agent for a live browser tab.
#[derive(Parser, Debug)]
#[command(name = "tabpilot", version, about)]
struct Args {
    /// Port for the local web UI (falls back to the next free one).
    #[arg(long, default_value_t = 4400)]
    port: u16,

    /// Chat-completions model that drives the agent.
    #[arg(long, default_value = "gpt-4.1-mini")]
    model: String,

    /// Launch the browser without a visible window.
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("starting browser session");
    let headless = args.headless;
    let session = tokio::task::spawn_blocking(move || BrowserSession::start(headless))
        .await
        .map_err(|e| anyhow::anyhow!("browser launch panicked: {e}"))??;

    let api_key = std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|key| !key.is_empty());
    let has_credential = api_key.is_some();
    if !has_credential {
        tracing::warn!("OPENAI_API_KEY is not set; chat requests will be refused");
    }

    let model = OpenAiClient::new(api_key.unwrap_or_default(), args.model.clone());
    let page: Arc<dyn PageChannel> = Arc::new(CdpChannel::new(session.tab()));
    let orchestrator = Arc::new(Orchestrator::new(Box::new(model), page, has_credential));

    face::serve(orchestrator, args.port).await?;

    session.shutdown();
    Ok(())
}
