use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

mod bedrock;
mod clusters;
mod config;
mod console;
mod error;
mod family;
mod models;
mod prompt;
mod server;
mod session;
mod settings;
mod suggestions;

#[derive(Debug, Parser)]
#[command(name = "eks_assistant")]
#[command(about = "Chat assistant for EKS operations backed by Bedrock models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Start {
        #[arg(long, default_value = "127.0.0.1:8501")]
        listen: String,
        /// Overrides AWS_REGION.
        #[arg(long)]
        region: Option<String>,
        /// Overrides ASSISTANT_DEFAULT_MODEL.
        #[arg(long)]
        default_model: Option<String>,
        #[arg(long)]
        max_input_chars: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { listen, region, default_model, max_input_chars } => {
            let addr: SocketAddr = listen.parse()?;
            let mut config = config::AppConfig::from_env()?;
            if let Some(region) = region {
                config.region = region;
            }
            if let Some(model) = default_model {
                config.defaults.default_model = Some(model);
            }
            if let Some(max) = max_input_chars {
                anyhow::ensure!(max > 0, "--max-input-chars must be greater than zero");
                config.max_input_chars = max;
            }
            if config.bedrock_api_key.is_none() {
                tracing::warn!("AWS_BEARER_TOKEN_BEDROCK is not set; model calls will fail");
            }

            let inference = bedrock::BedrockClient::new(
                config.bedrock_url()?,
                config.bedrock_runtime_url()?,
                config.bedrock_api_key.clone(),
            );
            let clusters = clusters::HttpClusterRegistry::new(
                config.eks_url()?,
                config.eks_token.clone(),
                config.eks_proxied(),
            );
            let metrics = PrometheusBuilder::new().install_recorder()?;

            tracing::info!(region = %config.region, "starting assistant");
            let state = server::AppState::new(config, Arc::new(inference), Arc::new(clusters))
                .with_metrics(metrics);
            server::serve(addr, state).await?;
        }
    }
    Ok(())
}
