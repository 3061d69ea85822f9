//! Error types for credential and calendar operations.
//!
//! Every failure in this crate is a [`ProviderError`] carrying a
//! [`ProviderErrorCode`]. The code is what callers branch on: the credential
//! manager recovers from [`ProviderErrorCode::RefreshRejected`], the retry
//! policy looks at [`ProviderErrorCode::is_retryable`], and the HTTP layer
//! picks a status code from it.

use std::fmt;
use thiserror::Error;

/// What went wrong, independent of which collaborator reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials are missing or were refused by the calendar service.
    AuthenticationFailed,
    /// The resource owner declined consent, or granted too few scopes.
    AuthorizationDenied,
    /// No consent callback arrived within the flow's wait policy.
    FlowTimeout,
    /// The refresh credential was revoked or has expired.
    RefreshRejected,
    /// The token store could not be written.
    PersistenceError,
    /// The calendar service refused access to the resource (403).
    AuthorizationFailed,
    /// Connection failed, timed out, or DNS resolution failed.
    NetworkError,
    /// Too many requests.
    RateLimited,
    /// The remote service returned a 5xx or unexpected status.
    ServerError,
    /// The response body could not be understood.
    InvalidResponse,
    /// The calendar or event does not exist (404).
    NotFound,
    /// The remote service rejected the request as malformed (400).
    BadRequest,
    /// Missing or invalid configuration.
    ConfigurationError,
    /// Unexpected internal state.
    InternalError,
}

impl ProviderErrorCode {
    /// Transient failures worth another attempt: network, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Snake-case name, as rendered in logs and error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationDenied => "authorization_denied",
            Self::FlowTimeout => "flow_timeout",
            Self::RefreshRejected => "refresh_rejected",
            Self::PersistenceError => "persistence_error",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised while obtaining credentials or calling the calendar.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// The collaborator that produced the error (e.g. "google").
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Builds an error from a code and a human-readable message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    // Credential acquisition.

    /// The token endpoint or calendar refused our credentials.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    /// The user declined consent.
    pub fn authorization_denied(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationDenied, message)
    }

    /// No consent callback arrived in time.
    pub fn flow_timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::FlowTimeout, message)
    }

    /// The refresh token is no longer accepted.
    pub fn refresh_rejected(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RefreshRejected, message)
    }

    /// The token store failed to read or write.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::PersistenceError, message)
    }

    // Calendar calls.

    /// 403 from the calendar.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    /// Connection refused, timed out or failed to resolve.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// 429 from the calendar.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// 5xx or any status without a more specific code.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    /// A body that failed to deserialize or lacks required fields.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// 404 from the calendar: unknown calendar id or event.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    /// 400 from the calendar, usually a malformed event body.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    // Local failures.

    /// Unusable client credentials, token path or endpoint settings.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    /// A state the manager should never reach.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Tags the error with the collaborator it came from, e.g. `"google"`.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attaches the underlying I/O, HTTP or serde error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// The category callers branch on.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Detail text, without the code or provider tag.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The collaborator tag set by [`with_provider`](Self::with_provider).
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// See [`ProviderErrorCode::is_retryable`].
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "[{provider}] {}: {}", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Result alias used throughout the credential and calendar layers.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes() {
        assert!(ProviderErrorCode::NetworkError.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(ProviderErrorCode::ServerError.is_retryable());
        assert!(!ProviderErrorCode::AuthorizationDenied.is_retryable());
        assert!(!ProviderErrorCode::RefreshRejected.is_retryable());
        assert!(!ProviderErrorCode::NotFound.is_retryable());
    }

    #[test]
    fn error_display_includes_provider_and_code() {
        let err = ProviderError::flow_timeout("no callback after 300s").with_provider("google");
        let display = err.to_string();
        assert_eq!(display, "[google] flow_timeout: no callback after 300s");
        assert_eq!(err.provider(), Some("google"));
    }

    #[test]
    fn error_display_without_provider() {
        let err = ProviderError::refresh_rejected("invalid_grant");
        assert_eq!(err.to_string(), "refresh_rejected: invalid_grant");
        assert_eq!(err.message(), "invalid_grant");
        assert!(err.provider().is_none());
        assert_eq!(ProviderErrorCode::PersistenceError.to_string(), "persistence_error");
    }

    #[test]
    fn error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("read-only file system");
        let err = ProviderError::persistence("failed to write token").with_source(io_err);
        assert_eq!(err.code(), ProviderErrorCode::PersistenceError);
        assert!(err.source().is_some());
    }
}
