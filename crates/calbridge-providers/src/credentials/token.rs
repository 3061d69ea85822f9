//! The authorization token and its validity rules.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before the server's deadline so a
/// request started just before expiry does not fail mid-flight.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An OAuth token set for the calendar account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationToken {
    /// Bearer token sent to the calendar service.
    pub access_token: String,

    /// Credential for the refresh exchange, if the server issued one.
    pub refresh_token: Option<String>,

    /// When the access token stops being usable. `None` means it does not
    /// expire.
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// When the access token was obtained.
    pub last_refresh: DateTime<Utc>,
}

impl AuthorizationToken {
    /// Creates a token from a token-endpoint response.
    ///
    /// `expires_in_secs` is relative to now; the recorded expiry includes a
    /// safety margin.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(|secs| expiry_from(now, secs)),
            scopes,
            last_refresh: now,
        }
    }

    /// Returns true if the access token is past its (margin-adjusted) expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Returns true if the token can be used for an API call right now.
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    /// Returns true if the token carries a usable refresh credential.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Returns true if every required scope was granted.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Returns the token produced by a successful refresh exchange.
    ///
    /// The access token and expiry are replaced; the refresh token and scopes
    /// are kept unless the server rotated the refresh token.
    pub fn refreshed(&self, access: RefreshedAccess) -> Self {
        let now = Utc::now();
        Self {
            access_token: access.access_token,
            refresh_token: access.refresh_token.or_else(|| self.refresh_token.clone()),
            expires_at: access.expires_in.map(|secs| expiry_from(now, secs)),
            scopes: self.scopes.clone(),
            last_refresh: now,
        }
    }

    /// Returns the time until the token expires, if known.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at.map(|at| at - Utc::now())
    }
}

/// Result of a refresh exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedAccess {
    /// The new access token.
    pub access_token: String,
    /// Lifetime of the new access token in seconds.
    pub expires_in: Option<i64>,
    /// A replacement refresh token, when the server rotates them.
    pub refresh_token: Option<String>,
}

impl RefreshedAccess {
    /// Creates a refresh result without rotation.
    pub fn new(access_token: impl Into<String>, expires_in: Option<i64>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in,
            refresh_token: None,
        }
    }
}

fn expiry_from(now: DateTime<Utc>, expires_in_secs: i64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in_secs) - Duration::seconds(EXPIRY_MARGIN_SECS)
}
