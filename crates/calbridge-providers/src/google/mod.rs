//! Google implementations of [`AuthorizationServer`](crate::AuthorizationServer)
//! and [`CalendarService`](crate::CalendarService).
//!
//! The user supplies their own OAuth client (`credentials.json` from the
//! Google Cloud Console). The consent flow runs a loopback redirect on
//! 127.0.0.1 with PKCE; tokens are persisted by the credential manager, not
//! here.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use calbridge_providers::google::{GoogleCalendarClient, GoogleConfig, OAuthClient, OAuthCredentials};
//! use calbridge_providers::{CredentialManager, FileTokenStore};
//!
//! let config = GoogleConfig::new(OAuthCredentials::from_file("credentials.json")?);
//! let manager = CredentialManager::new(
//!     Arc::new(FileTokenStore::new(&config.token_path)),
//!     Arc::new(OAuthClient::new(&config)?),
//!     config.scopes.clone(),
//! );
//! let calendar = GoogleCalendarClient::new(&config)?;
//! ```

mod client;
mod config;
mod oauth;

pub use client::GoogleCalendarClient;
pub use config::{
    CALENDAR_API_BASE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GoogleConfig, OAuthCredentials,
};
pub use oauth::{OAuthClient, PkceFlow};
