use clap::Parser;
use std::process;

use n8n_cli::utils::display;
use n8n_cli::{Cli, CliError, CommandHandler, Commands, ConfigManager, OutputFormat};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: could not load .env: {}", e);
        }
    }

    let cli = Cli::parse();

    // Set up logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(&cli).await {
        match cli.format {
            OutputFormat::Json => match serde_json::to_string_pretty(&e.report()) {
                Ok(json) => println!("{}", json),
                Err(_) => display::error(&e.to_string()),
            },
            _ => display::error(&e.to_string()),
        }
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<(), CliError> {
    let config_manager = ConfigManager::new(cli.config.clone())?;
    tracing::debug!("Using configuration {}", config_manager.config_path().display());

    let mut handler = CommandHandler::new(config_manager.into_config())?;
    handler.set_output_format(cli.format);

    match &cli.command {
        Commands::Status => handler.show_status().await,
        Commands::Versions { limit } => handler.list_versions(*limit).await,
        Commands::Images => handler.list_images().await,
        Commands::Check { version } => handler.check_upgrade(version).await,
        Commands::Backup => handler.backup().await,
        Commands::Upgrade { version, no_backup } => handler.upgrade(version, *no_backup).await,
        Commands::Rollback => handler.rollback().await,
        Commands::Start => handler.control("start").await,
        Commands::Stop => handler.control("stop").await,
        Commands::Restart => handler.control("restart").await,
        Commands::Recover { force } => handler.recover(*force).await,
    }
}

fn setup_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    if quiet {
        return; // No logging in quiet mode
    }

    let level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
