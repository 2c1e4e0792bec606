// Lexis conversation evaluation engine
// Main entry point for the lexis binary

use clap::Parser;
use lexis_engine::cli::{Cli, Command, ConfigAction};
use lexis_engine::config::Config;
use lexis_engine::handlers::{
    handle_config_path, handle_config_show, handle_evaluate, handle_history, handle_progress,
    handle_providers, handle_show, OutputFormat,
};
use lexis_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // An explicit --log level applies before the config is read, so config
    // warnings are visible too
    if let Some(level) = &cli.log {
        init_telemetry_with_level(level);
    }

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let config = Config::load_or_create_at(&config_path)?;

    // No-op when --log already installed a subscriber
    init_telemetry_with_level(&config.core.log_level);

    tracing::info!(
        "Lexis v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Evaluate(args) => handle_evaluate(args, &config, format).await,

        Command::Providers { check } => handle_providers(&config, check, format).await,

        Command::History { limit } => {
            tracing::debug!("Showing last {} evaluations", limit);
            handle_history(limit, &config, format).await
        }

        Command::Show { id } => handle_show(&id, &config, format).await,

        Command::Progress => handle_progress(&config, format).await,

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Path => handle_config_path(&config_path, format),
        },
    }
}
