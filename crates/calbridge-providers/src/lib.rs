//! Credential lifecycle and calendar access for calbridge.
//!
//! - [`CredentialManager`] - Produces a valid token before every calendar call
//! - [`TokenStore`] - Durable storage for the token ([`FileTokenStore`], [`MemoryTokenStore`])
//! - [`AuthorizationServer`] - Consent flow and refresh exchange
//! - [`CalendarService`] - Lists and inserts events with an access token
//! - [`ProviderError`] - Error types shared by all of the above
//!
//! # Architecture
//!
//! ```text
//!   HTTP handler
//!        │
//!        ├──► CredentialManager::acquire() ──► TokenStore
//!        │                │
//!        │                └──► AuthorizationServer (refresh / consent flow)
//!        │
//!        └──► CalendarService (access token) ──► Google Calendar API
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod calendar;
pub mod credentials;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod retry;

/// A boxed future that is Send, used at the async trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use calendar::{CalendarService, CreatedEvent, DEFAULT_MAX_RESULTS, ListQuery, PRIMARY_CALENDAR};
pub use credentials::{
    AuthorizationServer, AuthorizationToken, CredentialManager, CredentialStatus, FileTokenStore,
    MemoryTokenStore, RefreshedAccess, TokenStore,
};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use retry::RetryPolicy;
