//! Credential commands.

use calbridge_providers::{CredentialStatus, FileTokenStore, TokenStore};
use tracing::info;

use crate::backend::Backend;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Runs the consent flow unless a valid token is already stored.
pub async fn login(config: &ServerConfig, force: bool) -> ServerResult<()> {
    let backend = Backend::from_config(config)?;
    let credentials = &backend.credentials;

    if credentials.status() == CredentialStatus::Valid && !force {
        println!("Already authorized. Use --force to re-authorize.");
        return Ok(());
    }

    println!("Authorizing Google Calendar access.");
    println!("A browser window will open; if it does not, the URL is in the log output.");

    let token = credentials
        .authorize_now()
        .await
        .map_err(ServerError::Credentials)?;

    if let Some(err) = credentials.last_persistence_error() {
        println!("Authorized, but the token could not be saved: {}", err);
    } else {
        println!("Authorized. Token saved to {}", backend.google.token_path.display());
    }
    info!(scopes = ?token.scopes, "authorization complete");
    Ok(())
}

/// Deletes the stored token.
pub fn logout(config: &ServerConfig) -> ServerResult<()> {
    let path = config.google.token_path();
    FileTokenStore::new(&path)
        .clear()
        .map_err(ServerError::Credentials)?;
    println!("Removed {}", path.display());
    Ok(())
}

/// Prints the state of the stored token.
pub fn status(config: &ServerConfig) -> ServerResult<()> {
    let backend = Backend::from_config(config)?;
    let status = backend.credentials.status();

    println!("token:  {}", backend.google.token_path.display());
    println!("status: {}", status.as_str());
    if status == CredentialStatus::Absent {
        println!("Run `calbridge auth` or send a request to start the consent flow.");
    }
    Ok(())
}
