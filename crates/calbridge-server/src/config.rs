//! Server configuration.
//!
//! Settings live in `config.toml` at `$XDG_CONFIG_HOME/calbridge/config.toml`
//! by default. Everything is optional; an absent file yields the defaults.
//!
//! ```toml
//! listen = "127.0.0.1:5000"
//! calendar_id = "primary"
//!
//! [google]
//! credentials_file = "credentials.json"
//! # or inline, with env::/pass:: references
//! client_id = "env::CALBRIDGE_CLIENT_ID"
//! client_secret = "pass::google/calbridge"
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use calbridge_core::DEFAULT_TIMEZONE;
use calbridge_providers::google::{GoogleConfig, OAuthCredentials};
use calbridge_providers::{DEFAULT_MAX_RESULTS, PRIMARY_CALENDAR};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};
use crate::secret;

/// Port the HTTP bridge listens on by default.
pub const DEFAULT_PORT: u16 = 5000;

/// Client secrets file looked up in the working directory when nothing else
/// is configured.
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

/// Configuration for the calbridge server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,

    /// Calendar read and written by the endpoints.
    pub calendar_id: String,

    /// Number of events returned by `/get-events`.
    pub max_results: usize,

    /// Timezone attached to created events.
    pub timezone: String,

    /// Google settings.
    pub google: GoogleSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            calendar_id: PRIMARY_CALENDAR.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            timezone: DEFAULT_TIMEZONE.to_string(),
            google: GoogleSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Loads the configuration.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> ServerResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML.
    pub fn from_toml(content: &str) -> ServerResult<Self> {
        toml::from_str(content)
            .map_err(|e| ServerError::config(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calbridge")
            .join("config.toml")
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> ServerResult<()> {
        if self.calendar_id.is_empty() {
            return Err(ServerError::config("calendar_id must not be empty"));
        }
        if self.max_results == 0 {
            return Err(ServerError::config("max_results must be at least 1"));
        }
        if self.timezone.is_empty() {
            return Err(ServerError::config("timezone must not be empty"));
        }
        Ok(())
    }

    /// Builds the Google provider configuration, resolving credentials.
    pub fn google_config(&self) -> ServerResult<GoogleConfig> {
        self.validate()?;

        let mut config = GoogleConfig::new(self.google.resolve_credentials()?)
            .with_token_path(self.google.token_path());

        if !self.google.scopes.is_empty() {
            config = config.with_scopes(self.google.scopes.clone());
        }
        if let Some(secs) = self.google.flow_timeout_secs {
            config = config.with_flow_timeout(Duration::from_secs(secs));
        }
        if let Some((start, end)) = self.google.loopback_ports {
            config = config.with_loopback_port_range(start, end);
        }
        if let Some(open) = self.google.open_browser {
            config = config.with_open_browser(open);
        }

        config
            .validate()
            .map_err(|e| ServerError::config(e.to_string()))?;
        Ok(config)
    }

    /// Returns a copy safe to print: literal secrets are masked, references
    /// are kept.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(ref secret) = copy.google.client_secret
            && !secret::is_reference(secret)
        {
            copy.google.client_secret = Some("<redacted>".to_string());
        }
        copy
    }
}

/// Google Calendar settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// Client secrets JSON downloaded from the Google Cloud Console.
    pub credentials_file: Option<PathBuf>,

    /// OAuth client ID (supports `env::` and `pass::` references).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `env::` and `pass::` references).
    pub client_secret: Option<String>,

    /// Token storage path.
    pub token_path: Option<PathBuf>,

    /// OAuth scopes; empty means full calendar access.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,

    /// How long the consent flow waits for the browser, in seconds.
    pub flow_timeout_secs: Option<u64>,

    /// Inclusive loopback port range for the consent redirect.
    pub loopback_ports: Option<(u16, u16)>,

    /// Whether the consent flow opens a browser.
    pub open_browser: Option<bool>,
}

impl GoogleSettings {
    /// Returns the configured token path or the default one.
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(GoogleConfig::default_token_path)
    }

    /// Resolves OAuth client credentials.
    ///
    /// Inline `client_id`/`client_secret` win over `credentials_file`; with
    /// neither, `credentials.json` in the working directory is used if present.
    pub(crate) fn resolve_credentials(&self) -> ServerResult<OAuthCredentials> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => {
                let id = secret::resolve(id)
                    .map_err(|e| ServerError::config(format!("failed to resolve client_id: {}", e)))?;
                let secret = secret::resolve(secret).map_err(|e| {
                    ServerError::config(format!("failed to resolve client_secret: {}", e))
                })?;
                return Ok(OAuthCredentials::new(id, secret));
            }
            (Some(_), None) => {
                return Err(ServerError::config(
                    "client_secret is missing from the [google] section",
                ));
            }
            (None, Some(_)) => {
                return Err(ServerError::config(
                    "client_id is missing from the [google] section",
                ));
            }
            (None, None) => {}
        }

        let file = match &self.credentials_file {
            Some(file) => file.clone(),
            None if Path::new(DEFAULT_CREDENTIALS_FILE).exists() => {
                PathBuf::from(DEFAULT_CREDENTIALS_FILE)
            }
            None => {
                return Err(ServerError::config(format!(
                    "Google credentials not found. Add to {}:\n  \
                     [google]\n  \
                     credentials_file = \"/path/to/credentials.json\"\n\n  \
                     or set client_id and client_secret",
                    ServerConfig::default_path().display()
                )));
            }
        };

        OAuthCredentials::from_file(&file).map_err(|e| ServerError::config(e.to_string()))
    }
}
