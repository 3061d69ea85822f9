//! Configuration commands.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Prints the effective configuration with literal secrets masked.
pub fn dump(config: &ServerConfig) -> ServerResult<()> {
    let text = toml::to_string_pretty(&config.redacted())
        .map_err(|e| ServerError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", ServerConfig::default_path().display());
    println!("{}", text);
    Ok(())
}

/// Validates the configuration, including credential resolution.
pub fn validate(config: &ServerConfig) -> ServerResult<()> {
    let google = config.google_config()?;
    println!("Google credentials resolved (client {}).", google.credentials.client_id);
    println!("Token file: {}", google.token_path.display());
    println!("Configuration is valid.");
    Ok(())
}

/// Prints the configuration file path.
pub fn path() -> ServerResult<()> {
    println!("config: {}", ServerConfig::default_path().display());
    Ok(())
}
