//! Wires configuration into the credential manager and calendar client.

use std::sync::Arc;

use calbridge_providers::google::{GoogleCalendarClient, GoogleConfig, OAuthClient};
use calbridge_providers::{CredentialManager, FileTokenStore};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::routes::AppState;

/// The Google-backed collaborators of the HTTP layer.
pub struct Backend {
    /// Resolved provider configuration.
    pub google: GoogleConfig,
    /// Credential manager over the file token store.
    pub credentials: Arc<CredentialManager>,
}

impl Backend {
    /// Resolves credentials and builds the credential manager.
    pub fn from_config(config: &ServerConfig) -> ServerResult<Self> {
        let google = config.google_config()?;
        let auth_server = OAuthClient::new(&google).map_err(|e| ServerError::config(e.to_string()))?;
        let store = FileTokenStore::new(&google.token_path);

        debug!(
            token_path = %google.token_path.display(),
            scopes = ?google.scopes,
            "credential manager configured"
        );

        let credentials = Arc::new(CredentialManager::new(
            Arc::new(store),
            Arc::new(auth_server),
            google.scopes.clone(),
        ));
        Ok(Self {
            google,
            credentials,
        })
    }

    /// Builds the handler state, adding the calendar client.
    pub fn into_state(self, config: &ServerConfig) -> ServerResult<AppState> {
        let calendar =
            GoogleCalendarClient::new(&self.google).map_err(|e| ServerError::config(e.to_string()))?;

        Ok(AppState {
            credentials: self.credentials,
            calendar: Arc::new(calendar),
            calendar_id: config.calendar_id.clone(),
            max_results: config.max_results,
            timezone: config.timezone.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use calbridge_providers::CredentialStatus;

    use super::*;
    use crate::config::GoogleSettings;

    fn config(token_path: std::path::PathBuf) -> ServerConfig {
        ServerConfig {
            calendar_id: "team@example.com".to_string(),
            google: GoogleSettings {
                client_id: Some("wired.apps.googleusercontent.com".to_string()),
                client_secret: Some("secret".to_string()),
                token_path: Some(token_path),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn builds_state_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path().join("token.json"));

        let backend = Backend::from_config(&config).unwrap();
        assert_eq!(backend.credentials.status(), CredentialStatus::Absent);
        assert_eq!(
            backend.credentials.required_scopes(),
            [GoogleConfig::DEFAULT_SCOPE.to_string()]
        );

        let state = backend.into_state(&config).unwrap();
        assert_eq!(state.calendar_id, "team@example.com");
        assert_eq!(state.calendar.name(), "google");
    }

    #[test]
    fn missing_credentials_fail_early() {
        let mut config = config("/tmp/unused-token.json".into());
        config.google.client_secret = None;
        assert!(matches!(
            Backend::from_config(&config),
            Err(ServerError::Config { .. })
        ));
    }
}
