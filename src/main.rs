//! Duet CLI
//!
//! Command-line interface for enhancing recordings and comparing them.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duet::cli::{commands, Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Duet v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Some(cmd) => handle_command(cmd, config),
        None => {
            println!("Duet v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: duet::DuetConfig) -> anyhow::Result<()> {
    match cmd {
        Commands::Enhance(args) => commands::enhance(&args, config)
            .with_context(|| format!("failed to enhance {}", args.input.display())),
        Commands::Info { file } => commands::show_info(&file, &config)
            .with_context(|| format!("failed to read {}", file.display())),
        #[cfg(feature = "device")]
        Commands::Play {
            original,
            enhanced,
            device,
        } => commands::play(&original, &enhanced, device.as_deref(), &config)
            .context("playback failed"),
        #[cfg(feature = "device")]
        Commands::Compare {
            input,
            model,
            device,
        } => commands::compare(&input, &model, device.as_deref(), config)
            .with_context(|| format!("failed to compare {}", input.display())),
        #[cfg(feature = "device")]
        Commands::Devices => commands::list_devices().context("failed to list devices"),
    }
}
