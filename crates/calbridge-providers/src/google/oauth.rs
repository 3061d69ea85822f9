//! OAuth 2.0 authorization code flow with PKCE for Google APIs.
//!
//! The consent flow uses a loopback redirect:
//!
//! 1. Generate a code verifier, its SHA-256 challenge and a random state
//! 2. Bind a listener on 127.0.0.1
//! 3. Open the browser on Google's consent page
//! 4. Wait (bounded) for the redirect carrying the code or an error
//! 5. Exchange the code and verifier for tokens
//!
//! The refresh exchange reports a revoked or expired refresh token as
//! [`ProviderErrorCode::RefreshRejected`](crate::error::ProviderErrorCode::RefreshRejected)
//! so the credential manager can fall back to the consent flow.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::BoxFuture;
use crate::credentials::{AuthorizationServer, AuthorizationToken, RefreshedAccess};
use crate::error::{ProviderError, ProviderResult};

use super::config::{GoogleConfig, OAuthCredentials};

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

const CALLBACK_PATH: &str = "/callback";

/// How long a loopback connection may take to send its request line.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(10);

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Authorization Successful</h1>\
    <p>You can close this window.</p></body></html>";

const FAILURE_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Authorization Failed</h1>\
    <p>You can close this window.</p></body></html>";

const NOT_FOUND_PAGE: &str =
    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// OAuth client for Google's authorization server.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    http_client: reqwest::Client,
    auth_url: String,
    token_url: String,
    port_range: (u16, u16),
    flow_timeout: Duration,
    open_browser: bool,
}

impl OAuthClient {
    /// Creates an OAuth client from the Google configuration.
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::internal(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self {
            credentials: config.credentials.clone(),
            http_client,
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            port_range: config.loopback_port_range,
            flow_timeout: config.flow_timeout,
            open_browser: config.open_browser,
        })
    }

    /// Runs the consent flow and returns the obtained token.
    pub async fn run_consent_flow(&self, scopes: &[String]) -> ProviderResult<AuthorizationToken> {
        let pkce = PkceFlow::new();
        let (listener, port) = bind_loopback_server(self.port_range).await?;
        let redirect_uri = format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH);

        let auth_url = pkce.build_auth_url(
            &self.auth_url,
            &self.credentials.client_id,
            &redirect_uri,
            scopes,
        )?;

        info!(port, "waiting for authorization in the browser");
        info!("if no browser opens, visit: {}", auth_url);
        if self.open_browser
            && let Err(e) = open::that(auth_url.as_str())
        {
            warn!("failed to open browser: {}", e);
        }

        let code = self.receive_code(&listener, &pkce).await?;

        info!("received authorization code, exchanging for tokens");
        self.exchange_code(&code, &pkce.verifier, &redirect_uri, scopes)
            .await
    }

    /// Trades a refresh token for a new access token.
    pub async fn refresh_access(&self, refresh_token: &str) -> ProviderResult<RefreshedAccess> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let (status, body) = self.post_token_request(&params, "token refresh").await?;

        if !status.is_success() {
            let grant_error = serde_json::from_str::<TokenErrorResponse>(&body).ok();
            let reason = grant_error
                .as_ref()
                .map(|e| e.describe())
                .unwrap_or_else(|| body.clone());

            return Err(match grant_error {
                Some(e) if e.error == "invalid_grant" => {
                    ProviderError::refresh_rejected(format!("refresh token rejected: {}", reason))
                }
                _ if status.is_server_error() => ProviderError::server(format!(
                    "token refresh failed ({}): {}",
                    status, reason
                )),
                _ => ProviderError::authentication(format!(
                    "token refresh failed ({}): {}",
                    status, reason
                )),
            }
            .with_provider("google"));
        }

        let response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
        })?;

        debug!(expires_in = ?response.expires_in, "refresh exchange succeeded");
        Ok(RefreshedAccess {
            access_token: response.access_token,
            expires_in: response.expires_in,
            refresh_token: response.refresh_token,
        })
    }

    /// Waits for the redirect on `listener` and returns the authorization code.
    async fn receive_code(&self, listener: &TcpListener, pkce: &PkceFlow) -> ProviderResult<String> {
        let outcome = tokio::time::timeout(self.flow_timeout, wait_for_callback(listener))
            .await
            .map_err(|_| {
                ProviderError::flow_timeout(format!(
                    "no authorization callback within {}s",
                    self.flow_timeout.as_secs()
                ))
                .with_provider("google")
            })??;

        match outcome {
            CallbackOutcome::Code { code, state } => {
                if state != pkce.state {
                    return Err(ProviderError::authentication(
                        "OAuth state mismatch in authorization callback",
                    ));
                }
                Ok(code)
            }
            CallbackOutcome::Denied(reason) => Err(ProviderError::authorization_denied(format!(
                "consent not granted: {}",
                reason
            ))
            .with_provider("google")),
            CallbackOutcome::MissingCode => Err(ProviderError::authentication(
                "missing authorization code in callback",
            )),
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> ProviderResult<AuthorizationToken> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let (status, body) = self.post_token_request(&params, "token exchange").await?;

        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "token exchange failed ({}): {}",
                status, body
            ))
            .with_provider("google"));
        }

        let response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
        })?;

        let granted = match response.scope.as_deref() {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(String::from).collect()
            }
            _ => scopes.to_vec(),
        };

        info!("obtained tokens from authorization code");
        Ok(AuthorizationToken::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            granted,
        ))
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> ProviderResult<(reqwest::StatusCode, String)> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::network(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;
        Ok((status, body))
    }
}

impl AuthorizationServer for OAuthClient {
    fn authorize<'a>(
        &'a self,
        scopes: &'a [String],
    ) -> BoxFuture<'a, ProviderResult<AuthorizationToken>> {
        Box::pin(self.run_consent_flow(scopes))
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RefreshedAccess>> {
        Box::pin(self.refresh_access(refresh_token))
    }
}

/// Binds the first free port in `port_range` on 127.0.0.1.
async fn bind_loopback_server(port_range: (u16, u16)) -> ProviderResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await else {
            continue;
        };
        let bound = listener
            .local_addr()
            .map_err(|e| ProviderError::internal(format!("loopback listener has no address: {}", e)))?
            .port();
        debug!(port = bound, "bound loopback server");
        return Ok((listener, bound));
    }
    Err(ProviderError::configuration(format!(
        "no available port in range {}-{}",
        port_range.0, port_range.1
    )))
}

/// Accepts connections until one of them is the OAuth redirect.
///
/// Each connection is served on its own task, so a browser preconnect that
/// never sends a request cannot hold up the redirect behind it. Pending tasks
/// are aborted when the set is dropped.
async fn wait_for_callback(listener: &TcpListener) -> ProviderResult<CallbackOutcome> {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.map_err(|e| {
                    ProviderError::network(format!("failed to accept connection: {}", e))
                })?;
                debug!(%peer, "loopback connection");
                connections.spawn(handle_connection(stream));
            }
            Some(joined) = connections.join_next() => {
                if let Ok(Some(outcome)) = joined {
                    return Ok(outcome);
                }
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream) -> Option<CallbackOutcome> {
    let read = tokio::time::timeout(CONNECTION_READ_TIMEOUT, read_request(&mut stream)).await;
    let request_line = match read {
        Ok(Some(line)) => line,
        Ok(None) => return None,
        Err(_) => {
            debug!("loopback connection sent no request, dropping it");
            return None;
        }
    };

    let outcome = parse_callback_request(&request_line);
    let page = match &outcome {
        None => NOT_FOUND_PAGE,
        Some(CallbackOutcome::Code { .. }) => SUCCESS_PAGE,
        Some(_) => FAILURE_PAGE,
    };
    let _ = stream.write_all(page.as_bytes()).await;
    let _ = stream.shutdown().await;
    outcome
}

/// Reads the request line, then drains the headers so closing the socket
/// does not reset the connection before the browser reads the page.
async fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.ok()? == 0 {
        return None;
    }

    let mut header = String::new();
    loop {
        header.clear();
        match reader.read_line(&mut header).await {
            Ok(0) | Err(_) => break,
            Ok(_) if header.trim().is_empty() => break,
            Ok(_) => {}
        }
    }
    Some(request_line)
}

/// What the browser brought back to the loopback server.
#[derive(Debug, PartialEq, Eq)]
enum CallbackOutcome {
    Code { code: String, state: String },
    Denied(String),
    MissingCode,
}

/// Parses `GET /callback?... HTTP/1.1`. Returns `None` for any other request
/// (favicon lookups and the like).
fn parse_callback_request(request_line: &str) -> Option<CallbackOutcome> {
    let mut parts = request_line.split_whitespace();
    let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
        return None;
    };

    let url = Url::parse("http://127.0.0.1").ok()?.join(target).ok()?;
    if url.path() != CALLBACK_PATH {
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    Some(match (error, code) {
        (Some(error), _) => CallbackOutcome::Denied(error),
        (None, Some(code)) => CallbackOutcome::Code {
            code,
            state: state.unwrap_or_default(),
        },
        (None, None) => CallbackOutcome::MissingCode,
    })
}

/// PKCE flow state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 of the verifier, base64url encoded).
    pub challenge: String,
    /// Random state echoed back by the redirect.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent page URL on `auth_endpoint`.
    pub fn build_auth_url(
        &self,
        auth_endpoint: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> ProviderResult<Url> {
        let mut url = Url::parse(auth_endpoint).map_err(|e| {
            ProviderError::configuration(format!("invalid authorization URL: {}", e))
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("code_challenge", &self.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &self.state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(bytes.as_mut_slice());
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Space-separated granted scopes.
    #[serde(default)]
    scope: Option<String>,
}

/// Error body from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{} ({})", self.error, description),
            None => self.error.clone(),
        }
    }
}
