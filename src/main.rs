// src/main.rs

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use autoforge::agent::ConversationDriver;
use autoforge::config::CONFIG;
use autoforge::conversation::Message;
use autoforge::provider::{AnthropicBackend, ModelBackend, OpenAiBackend, ProviderGateway};
use autoforge::tools::{LocalFileStore, ProgressSink, ToolContext, ToolRegistry};

#[derive(Parser, Debug)]
#[command(name = "autoforge", about = "Drives a coding agent against a local checkout")]
struct Args {
    /// Path to the repository checkout to work on
    #[arg(long, default_value = ".")]
    repo: String,

    /// The ticket text: what should be fixed or built
    #[arg(long)]
    task: String,

    /// Usage record id to attribute LLM calls to (optional)
    #[arg(long)]
    usage_id: Option<i64>,
}

/// Progress surface for CLI runs: the comment body goes to the log.
struct LogProgressSink;

#[async_trait]
impl ProgressSink for LogProgressSink {
    async fn update_comment(&self, body: &str) -> Result<()> {
        info!("\n{body}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(CONFIG.log_level.parse().unwrap_or(Level::INFO))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    // Backend chain: Anthropic primary, OpenAI fallback when configured.
    let mut backends: Vec<Arc<dyn ModelBackend>> = Vec::new();
    if !CONFIG.anthropic_api_key.is_empty() {
        backends.push(Arc::new(AnthropicBackend::from_env()?));
    }
    if !CONFIG.openai_api_key.is_empty() {
        backends.push(Arc::new(OpenAiBackend::from_env()?));
    }
    anyhow::ensure!(
        !backends.is_empty(),
        "set ANTHROPIC_API_KEY and/or OPENAI_API_KEY to configure at least one backend"
    );
    let run_id = uuid::Uuid::new_v4();
    info!(
        %run_id,
        backends = backends.len(),
        repo = %args.repo,
        "starting autoforge"
    );

    let gateway = Arc::new(ProviderGateway::new(backends)?);
    let registry = Arc::new(ToolRegistry::with_builtin_tools()?);
    let store = Arc::new(LocalFileStore::new(&args.repo));
    let mut context = ToolContext::new(store, Arc::new(LogProgressSink));
    context.repo = args.repo.clone();
    context.usage_id = args.usage_id;

    let driver = ConversationDriver::new(gateway, registry, context);
    let report = driver
        .run_resolution_loop(vec![Message::user(args.task.as_str())])
        .await?;

    info!(
        committed = report.committed,
        token_input = report.token_input,
        token_output = report.token_output,
        "resolution loop finished"
    );
    if !report.committed {
        info!("no changes were committed; the ticket may need human attention");
    }
    Ok(())
}
