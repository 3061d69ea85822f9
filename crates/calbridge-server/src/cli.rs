//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// calbridge - Google Calendar over a small local HTTP API
#[derive(Debug, Parser)]
#[command(name = "calbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "CALBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Address to listen on, overrides `listen` in config.toml
        #[arg(long, env = "CALBRIDGE_LISTEN")]
        listen: Option<SocketAddr>,
    },

    /// Authorize calendar access now instead of on the first request
    Auth {
        /// Re-run the consent flow even if a valid token is stored
        #[arg(long)]
        force: bool,
    },

    /// Delete the stored token
    Logout,

    /// Show the state of the stored token
    Status,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Dump,
    /// Check the configuration and resolve credentials
    Validate,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["calbridge"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn serve_with_listen_override() {
        let cli =
            Cli::try_parse_from(["calbridge", "-vv", "serve", "--listen", "0.0.0.0:8080"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Command::Serve { listen }) => {
                assert_eq!(listen, Some("0.0.0.0:8080".parse().unwrap()));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["calbridge", "auth", "--force", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Some(Command::Auth { force: true })));
    }

    #[test]
    fn invalid_listen_address() {
        assert!(Cli::try_parse_from(["calbridge", "serve", "--listen", "localhost"]).is_err());
    }
}
