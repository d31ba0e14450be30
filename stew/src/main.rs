use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use stew::cli::{Cli, Command};
use stew::config::{Config, Platform};
use stew::http::HttpClient;
use stew::installer::Installer;
use stew::prompt::InquirePrompter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    let platform = Platform::from_config(&config);
    tracing::debug!("Platform: {:?}", platform);

    let http = HttpClient::new(config.default.timeout.map(Duration::from_secs))
        .context("Failed to build HTTP client")?;
    let installer = Installer::new(platform, config, http, Box::new(InquirePrompter));

    match cli.command {
        Command::Install { inputs, host } => {
            installer
                .install_inputs(&inputs, host.host(), host.source)
                .await
                .context("Installation failed")?;
        }
        Command::Browse { repo, host } => {
            installer
                .browse(&repo, host.host(), host.source)
                .await
                .with_context(|| format!("Failed to browse {repo}"))?;
        }
        Command::Search { query, host } => {
            installer
                .search(&query, host.host(), host.source)
                .await
                .with_context(|| format!("Search for '{query}' failed"))?;
        }
        Command::List { tags } => {
            let groups = installer.list(tags).context("Failed to read the lockfile")?;
            if !groups.is_empty() {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            }
        }
        Command::Uninstall { binaries, all } => {
            installer
                .uninstall(&binaries, all)
                .context("Uninstall failed")?;
        }
    }

    Ok(())
}
