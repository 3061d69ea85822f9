//! HTTP bridge, configuration and CLI for calbridge.
//!
//! The server exposes a Google Calendar through two endpoints,
//! `GET /get-events` and `POST /add-event`, obtaining credentials on demand
//! through [`calbridge_providers::CredentialManager`].

pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod routes;
pub mod secret;

pub use cli::Cli;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use routes::{AppState, router};
