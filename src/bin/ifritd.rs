use std::path::PathBuf;

use clap::Parser;

use ifrit::config::Config;
use ifrit::daemon;
use ifrit::error::Result;

#[derive(Parser, Debug)]
#[command(name = "ifritd")]
#[command(about = "Ifrit capability executor daemon")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 7979)]
    port: u16,

    #[arg(long, env = "IFRIT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    ifrit::logging::init_tracing("ifritd");
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::convention_defaults(),
    }
    .resolve_env();

    daemon::run_with_shutdown(&cli.host, cli.port, config, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await
}
