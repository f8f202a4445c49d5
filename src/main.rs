use std::path::PathBuf;

use clap::Parser;

use ifrit::config::Config;
use ifrit::domains::execution::ExecuteRequest;
use ifrit::error::{IfritError, Result};
use ifrit::providers::ProviderKind;
use ifrit::services::executor::CapabilityExecutor;

#[derive(Parser, Debug)]
#[command(name = "ifrit")]
#[command(about = "Run one capability against the configured AI providers")]
#[command(version = ifrit::GIT_SHA)]
struct Cli {
    /// Capability to run, e.g. generate, research, summarize.
    capability: String,

    prompt: String,

    /// JSON config file; convention defaults when omitted.
    #[arg(long, env = "IFRIT_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    system: Option<String>,

    /// Extra provider key as `provider=key`; repeatable.
    #[arg(long = "key", value_parser = parse_provider_key)]
    keys: Vec<(ProviderKind, String)>,

    #[arg(long)]
    max_retries: Option<u32>,

    #[arg(long, default_value_t = false)]
    no_fallback: bool,

    #[arg(long)]
    prefer: Option<String>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f32>,

    /// Also print per-provider stats for this run.
    #[arg(long, default_value_t = false)]
    stats: bool,
}

fn parse_provider_key(raw: &str) -> std::result::Result<(ProviderKind, String), String> {
    let (provider, key) = raw
        .split_once('=')
        .ok_or_else(|| "expected provider=key".to_string())?;
    let kind: ProviderKind = provider.parse().map_err(|e: IfritError| e.to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key for provider '{provider}'"));
    }
    Ok((kind, key.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    ifrit::logging::init_tracing("ifrit");
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::convention_defaults(),
    };
    let mut config = config.resolve_env();
    for (kind, key) in &cli.keys {
        config.providers.insert(*kind, key.clone());
    }
    if config.providers.is_empty() {
        tracing::warn!("No provider keys configured; set IFRIT_<PROVIDER>_API_KEY or pass --key");
    }

    let mut request = ExecuteRequest::new(cli.capability.as_str(), cli.prompt.clone());
    request.system_prompt = cli.system.clone();
    request.max_retries = cli.max_retries;
    request.preferred_handler = cli.prefer.clone();
    request.timeout_ms = cli.timeout_ms;
    request.max_tokens = cli.max_tokens;
    request.temperature = cli.temperature;
    if cli.no_fallback {
        request.use_fallback = Some(false);
    }

    let executor = CapabilityExecutor::new(config.executor.clone());
    let result = executor
        .execute_with_keys(&request, &config.providers, &config.capabilities)
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if cli.stats {
        println!("{}", serde_json::to_string_pretty(&executor.provider_stats())?);
    }
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
