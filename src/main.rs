use anyhow::Result;
use clap::Parser;
use contact_sync::cli::CliState;
use contact_sync::config::AppConfig;
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "contact-sync")]
#[command(about = "Contact reconciliation and cross-source sync shell")]
struct Cli {
    /// Path to configuration file (created with defaults if missing)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load()?,
    };
    config.apply_env_overrides();
    config.validate()?;

    // Initialize logging based on config
    let default_directive = format!("contact_sync={}", config.logging.level.to_lowercase());
    let env_override = env::var("RUST_LOG").unwrap_or_default();
    let combined_filter = if env_override.trim().is_empty() {
        default_directive.clone()
    } else if env_override.contains("contact_sync") {
        env_override
    } else {
        format!("{},{}", env_override, default_directive)
    };

    tracing_subscriber::fmt()
        .with_env_filter(combined_filter)
        .with_target(true)
        .init();

    let mut cli = CliState::new_with_config(config).await?;

    // Run REPL
    let outcome = cli.run_repl().await;
    cli.shutdown().await;
    outcome
}
