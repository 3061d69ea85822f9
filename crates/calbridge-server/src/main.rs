//! calbridge entry point.

use std::process::ExitCode;

use calbridge_core::{TracingConfig, TracingOutputFormat, init_tracing};
use clap::Parser;
use tracing::Level;

use calbridge_server::cli::{Cli, Command, ConfigAction};
use calbridge_server::commands;
use calbridge_server::config::ServerConfig;
use calbridge_server::error::ServerResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(tracing_config(&cli)) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn tracing_config(cli: &Cli) -> TracingConfig {
    let serving = matches!(cli.command, None | Some(Command::Serve { .. }));

    let config = match (cli.json_logs, serving) {
        (true, _) => TracingConfig::server(),
        (false, true) => TracingConfig::default(),
        (false, false) if cli.verbose > 0 => TracingConfig::cli_debug(),
        (false, false) => TracingConfig::default().with_format(TracingOutputFormat::Compact),
    };

    match cli.verbose {
        0 => config,
        1 => config.with_level(Level::DEBUG),
        _ => config.with_level(Level::TRACE),
    }
}

async fn run(cli: Cli) -> ServerResult<()> {
    let config = ServerConfig::load(cli.config.as_deref())?;

    match cli.command {
        None => commands::serve::run(&config, None).await,
        Some(Command::Serve { listen }) => commands::serve::run(&config, listen).await,
        Some(Command::Auth { force }) => commands::auth::login(&config, force).await,
        Some(Command::Logout) => commands::auth::logout(&config),
        Some(Command::Status) => commands::auth::status(&config),
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
