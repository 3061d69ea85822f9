//! Credential lifecycle: acquisition, refresh and persistence of the
//! authorization token.
//!
//! [`CredentialManager::acquire`] is called before every calendar request and
//! walks this decision tree:
//!
//! ```text
//!  load from store ──► valid + scopes ok ──────────────────────────► return
//!        │
//!        ├─► expired, has refresh token ──► refresh ──ok──► persist ► return
//!        │                                     │
//!        │                                  rejected
//!        │                                     ▼
//!        └─► absent / no refresh / scopes ──► interactive flow ─► persist ► return
//! ```
//!
//! Refresh, flow and persist run one at a time behind an acquisition gate.
//! Callers holding a still-valid token never wait on it. The gate stays held
//! across the refresh call and the consent flow, so concurrent requests that
//! find the same expired token share one refresh (or one browser prompt)
//! instead of racing each other and the token file. The cost is that those
//! requests wait for the slow call too, up to the flow timeout.
//!
//! The store is re-read on every acquisition, so a token deleted or replaced
//! on disk is noticed. The exception is a token whose save failed: it is kept
//! in memory and used until a save succeeds or the store holds a token
//! refreshed more recently than it.

mod store;
mod token;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::BoxFuture;
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};

pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::{AuthorizationToken, RefreshedAccess};

/// The authorization server, as seen by the credential manager.
pub trait AuthorizationServer: Send + Sync {
    /// Runs the interactive consent flow and returns a fresh token.
    ///
    /// Fails with [`ProviderErrorCode::AuthorizationDenied`] if the resource
    /// owner declines and [`ProviderErrorCode::FlowTimeout`] if no answer
    /// arrives in time.
    fn authorize<'a>(
        &'a self,
        scopes: &'a [String],
    ) -> BoxFuture<'a, ProviderResult<AuthorizationToken>>;

    /// Trades a refresh credential for a new access token.
    ///
    /// Fails with [`ProviderErrorCode::RefreshRejected`] if the refresh
    /// credential is revoked or expired.
    fn refresh<'a>(&'a self, refresh_token: &'a str)
    -> BoxFuture<'a, ProviderResult<RefreshedAccess>>;
}

/// Where the stored token stands, without contacting any server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// Nothing stored; the next acquisition runs the consent flow.
    Absent,
    /// Usable as-is.
    Valid,
    /// Expired, renewable with the refresh exchange.
    ExpiredWithRefresh,
    /// Expired (or under-scoped) and not renewable; needs the consent flow.
    ExpiredWithoutRefresh,
}

impl CredentialStatus {
    /// Returns a machine-readable name for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Valid => "valid",
            Self::ExpiredWithRefresh => "expired_with_refresh",
            Self::ExpiredWithoutRefresh => "expired_without_refresh",
        }
    }
}

#[derive(Debug, Default)]
struct PersistenceState {
    /// Most recent token whose save failed; shadows the store until a save
    /// succeeds.
    pending: Option<AuthorizationToken>,
    last_error: Option<String>,
}

/// Produces a currently valid token for every calendar request.
pub struct CredentialManager {
    store: Arc<dyn TokenStore>,
    auth_server: Arc<dyn AuthorizationServer>,
    required_scopes: Vec<String>,
    gate: tokio::sync::Mutex<()>,
    persistence: Mutex<PersistenceState>,
}

impl CredentialManager {
    /// Creates a manager over the given store and authorization server.
    pub fn new(
        store: Arc<dyn TokenStore>,
        auth_server: Arc<dyn AuthorizationServer>,
        required_scopes: Vec<String>,
    ) -> Self {
        Self {
            store,
            auth_server,
            required_scopes,
            gate: tokio::sync::Mutex::new(()),
            persistence: Mutex::new(PersistenceState::default()),
        }
    }

    /// Returns the scopes every acquired token must carry.
    pub fn required_scopes(&self) -> &[String] {
        &self.required_scopes
    }

    /// Returns a valid token, refreshing or re-authorizing as needed.
    ///
    /// A refresh rejection is recovered by running the consent flow. A failure
    /// to persist the new token is logged and reported through
    /// [`last_persistence_error`](Self::last_persistence_error) but does not
    /// fail the call.
    pub async fn acquire(&self) -> ProviderResult<AuthorizationToken> {
        if let Some(token) = self.current()
            && self.is_usable(&token)
        {
            return Ok(token);
        }

        let _gate = self.gate.lock().await;

        // Another caller may have finished an acquisition while we waited.
        let current = self.current();
        if let Some(ref token) = current
            && self.is_usable(token)
        {
            debug!("token renewed by a concurrent acquisition");
            return Ok(token.clone());
        }

        let token = match current {
            Some(stale) if stale.can_refresh() && stale.has_scopes(&self.required_scopes) => {
                match self.refresh(&stale).await {
                    Ok(token) => token,
                    Err(e) if e.code() == ProviderErrorCode::RefreshRejected => {
                        warn!(error = %e, "refresh rejected, falling back to authorization flow");
                        self.run_flow().await?
                    }
                    Err(e) => return Err(e),
                }
            }
            Some(_) => {
                info!("stored token is not renewable, starting authorization flow");
                self.run_flow().await?
            }
            None => self.run_flow().await?,
        };

        self.persist(&token);
        Ok(token)
    }

    /// Runs the consent flow unconditionally and persists the result.
    pub async fn authorize_now(&self) -> ProviderResult<AuthorizationToken> {
        let _gate = self.gate.lock().await;
        let token = self.run_flow().await?;
        self.persist(&token);
        Ok(token)
    }

    /// Reports the state of the stored token.
    pub fn status(&self) -> CredentialStatus {
        match self.current() {
            None => CredentialStatus::Absent,
            Some(token) if self.is_usable(&token) => CredentialStatus::Valid,
            Some(token) if token.can_refresh() && token.has_scopes(&self.required_scopes) => {
                CredentialStatus::ExpiredWithRefresh
            }
            Some(_) => CredentialStatus::ExpiredWithoutRefresh,
        }
    }

    /// Deletes the stored token; the next acquisition runs the consent flow.
    pub async fn clear(&self) -> ProviderResult<()> {
        let _gate = self.gate.lock().await;
        self.store.clear()?;
        let mut state = self.persistence_state();
        state.pending = None;
        state.last_error = None;
        Ok(())
    }

    /// Returns the last persistence failure, cleared by the next successful save.
    pub fn last_persistence_error(&self) -> Option<String> {
        self.persistence_state().last_error.clone()
    }

    fn is_usable(&self, token: &AuthorizationToken) -> bool {
        token.is_valid() && token.has_scopes(&self.required_scopes)
    }

    fn current(&self) -> Option<AuthorizationToken> {
        let stored = match self.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "failed to load stored token, treating as absent");
                None
            }
        };

        let mut state = self.persistence_state();
        let Some(pending) = state.pending.clone() else {
            return stored;
        };
        if let Some(token) = &stored
            && token.last_refresh > pending.last_refresh
        {
            debug!("store holds a newer token than the unsaved one, using it");
            state.pending = None;
            return stored;
        }
        Some(pending)
    }

    async fn refresh(&self, stale: &AuthorizationToken) -> ProviderResult<AuthorizationToken> {
        let refresh_token = stale
            .refresh_token
            .as_deref()
            .ok_or_else(|| ProviderError::internal("refresh requested without refresh token"))?;

        debug!("refreshing expired access token");
        let access = self.auth_server.refresh(refresh_token).await?;
        let token = stale.refreshed(access);
        info!(expires_at = ?token.expires_at, "access token refreshed");
        Ok(token)
    }

    async fn run_flow(&self) -> ProviderResult<AuthorizationToken> {
        info!("starting interactive authorization flow");
        let token = self.auth_server.authorize(&self.required_scopes).await?;

        if !token.has_scopes(&self.required_scopes) {
            return Err(ProviderError::authorization_denied(format!(
                "granted scopes [{}] do not cover required [{}]",
                token.scopes.join(" "),
                self.required_scopes.join(" ")
            )));
        }
        if token.access_token.is_empty() {
            return Err(ProviderError::invalid_response(
                "authorization flow returned an empty access token",
            ));
        }

        info!("authorization flow completed");
        Ok(token)
    }

    fn persist(&self, token: &AuthorizationToken) {
        let result = self.store.save(token);
        let mut state = self.persistence_state();
        match result {
            Ok(()) => {
                state.pending = None;
                state.last_error = None;
            }
            Err(e) => {
                error!(error = %e, "failed to persist authorization token, keeping it in memory");
                state.pending = Some(token.clone());
                state.last_error = Some(e.to_string());
            }
        }
    }

    fn persistence_state(&self) -> MutexGuard<'_, PersistenceState> {
        self.persistence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("required_scopes", &self.required_scopes)
            .finish_non_exhaustive()
    }
}
