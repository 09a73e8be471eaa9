mod config;
mod history;
mod llm;
mod prompt;
mod query;
mod search;
mod server;

pub const USER_AGENT: &str = concat!("sleuth/", env!("CARGO_PKG_VERSION"));

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use config::Config;
use llm::OpenAiClient;
use prompt::PromptManager;
use query::{PipelineSettings, QueryOrchestrator};
use reqwest::Client;
use search::SearchEngine;
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 5;

/// Search-grounded question answering over a streamed HTTP response.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8081)]
    port: u16,

    /// Directory served under /ui
    #[arg(long, default_value = "ui")]
    ui_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sleuth=info".parse()?),
        )
        .init();

    let config = Config::from_env()
        .and_then(|c| c.validate().map(|()| c))
        .inspect_err(|e| tracing::error!("invalid configuration: {e}"))?;
    info!(backend = %config.backend, model = %config.model, "starting sleuth");

    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()?;
    let search = SearchEngine::from_config(&config, http.clone())?;
    let llm = OpenAiClient::from_config(&config, http);
    let orchestrator = QueryOrchestrator::new(
        search,
        llm,
        PromptManager::default(),
        PipelineSettings::from_config(&config),
    );

    let app = server::router(Arc::new(orchestrator), &args.ui_dir);
    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    server::serve(listener, app).await?;
    info!("server stopped");
    Ok(())
}
