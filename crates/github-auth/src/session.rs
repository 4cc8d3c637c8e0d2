//! Auth session
//!
//! Owns the in-memory auth state and the short-lived login artifacts
//! (verifier + state). The state is rebuilt deterministically from storage
//! at startup; the artifacts live only as long as the process, so an
//! abandoned login flow self-invalidates on restart.
//!
//! The redirect-based control flow is modeled as two separate operations:
//! `begin_login` hands back the authorization URL (the caller navigates),
//! and `complete_login` is invoked by the callback route when the browser
//! returns. Conflating them into one async call would hide the fact that
//! they run in two different page lifetimes.

use std::time::Duration;

use common::Secret;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::constants::{DEFAULT_SCOPES, DEFAULT_TOKEN_TTL_SECS, DEFAULT_VERIFIER_BYTES, USER_ENDPOINT};
use crate::error::{Error, Result};
use crate::pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
use crate::storage::{AuthStorage, GitHubUser, StoredToken, now_millis};
use crate::token::{ExchangeRequest, exchange_code, fetch_user};

/// Configuration for the login flow.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// GitHub OAuth app client id. Not a secret, but deployment-specific;
    /// an empty value makes `begin_login` fail with a configuration error.
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: String,
    /// Token-exchange proxy URL (holds the client secret server-side).
    pub proxy_url: String,
    /// User-info endpoint; overridable for tests.
    pub user_endpoint: String,
    /// Token lifetime to assume when the proxy omits `expires_in`.
    pub default_token_ttl: Duration,
}

impl AuthConfig {
    pub fn new(client_id: String, redirect_uri: String, proxy_url: String) -> Self {
        Self {
            client_id,
            redirect_uri,
            scopes: DEFAULT_SCOPES.to_string(),
            proxy_url,
            user_endpoint: USER_ENDPOINT.to_string(),
            default_token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
        }
    }
}

/// Verifier and state of the login attempt currently awaiting its callback.
/// Consumed exactly once when a validated callback arrives.
#[derive(Debug)]
struct PendingLogin {
    verifier: String,
    state: String,
}

/// Point-in-time view of the auth state, for the UI.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AuthSnapshot {
    pub user: Option<GitHubUser>,
    pub is_ready: bool,
    pub is_authenticating: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    user: Option<GitHubUser>,
    is_ready: bool,
    is_authenticating: bool,
}

/// Process-wide auth session.
///
/// All mutation goes through the two mutexes; handlers on different tasks
/// may race, so nothing is read-modify-written without holding a lock.
pub struct AuthSession {
    config: AuthConfig,
    storage: AuthStorage,
    client: reqwest::Client,
    state: Mutex<SessionState>,
    pending: Mutex<Option<PendingLogin>>,
}

impl AuthSession {
    pub fn new(config: AuthConfig, storage: AuthStorage, client: reqwest::Client) -> Self {
        Self {
            config,
            storage,
            client,
            state: Mutex::new(SessionState::default()),
            pending: Mutex::new(None),
        }
    }

    /// Rebuild auth state from storage.
    ///
    /// No token, or an expired one, means logged out. A token with a
    /// cached user is trusted without a network call (optimistic
    /// rehydration). A token without a user is only trusted if the user
    /// fetch succeeds; otherwise everything is cleared, since a token
    /// without a confirmable identity is not worth keeping. Always ends
    /// with `is_ready = true`.
    pub async fn bootstrap(&self, cancel: &CancellationToken) {
        let user = match self.storage.load_token().await {
            None => None,
            Some(token) => match self.storage.load_user().await {
                Some(user) => Some(user),
                None => {
                    match fetch_user(
                        &self.client,
                        &self.config.user_endpoint,
                        token.access_token.expose(),
                        cancel,
                    )
                    .await
                    {
                        Ok(user) => {
                            if let Err(e) = self.storage.save_user(&user).await {
                                warn!(error = %e, "failed to cache fetched user");
                            }
                            Some(user)
                        }
                        Err(e) if e.is_cancelled() => None,
                        Err(e) => {
                            warn!(error = %e, "user fetch failed during bootstrap, clearing stored auth");
                            self.storage.clear().await;
                            None
                        }
                    }
                }
            },
        };

        let mut state = self.state.lock().await;
        if let Some(ref user) = user {
            info!(login = %user.login, "session rehydrated");
        }
        state.user = user;
        state.is_ready = true;
    }

    /// Start a login attempt: generate and stash the PKCE artifacts, then
    /// return the authorization URL for the caller to redirect to.
    ///
    /// The artifacts are written before the URL is handed out, so they are
    /// guaranteed present when the callback arrives. Starting a new login
    /// replaces any previous pending attempt.
    pub async fn begin_login(&self) -> Result<String> {
        if self.config.client_id.is_empty() {
            return Err(Error::Config("missing GitHub client_id".into()));
        }

        let verifier = generate_verifier(DEFAULT_VERIFIER_BYTES);
        let state = generate_state();
        let challenge = compute_challenge(&verifier);

        {
            let mut pending = self.pending.lock().await;
            *pending = Some(PendingLogin {
                verifier,
                state: state.clone(),
            });
        }

        info!("login started, redirecting to authorization endpoint");
        Ok(build_authorization_url(
            &self.config.client_id,
            &self.config.redirect_uri,
            &self.config.scopes,
            &state,
            &challenge,
        ))
    }

    /// Complete a login attempt from the callback's `code` and `state`.
    ///
    /// `is_authenticating` is set for the duration and cleared on every
    /// exit path.
    pub async fn complete_login(
        &self,
        code: &str,
        state: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        {
            let mut s = self.state.lock().await;
            s.is_authenticating = true;
        }
        let result = self.complete_login_inner(code, state, cancel).await;
        {
            let mut s = self.state.lock().await;
            s.is_authenticating = false;
        }
        result
    }

    async fn complete_login_inner(
        &self,
        code: &str,
        state: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Validate against the pending attempt without consuming it: a
        // stale or forged callback must not destroy a legitimate pending
        // login. Once validation passes, the artifacts are taken exactly
        // once, before any network I/O, so they are gone on both the
        // success and the failure path.
        let verifier = {
            let mut pending = self.pending.lock().await;
            match pending.as_ref() {
                None => return Err(Error::MissingVerifier),
                Some(p) if p.state != state => return Err(Error::InvalidState),
                Some(_) => pending.take().map(|p| p.verifier).unwrap_or_default(),
            }
        };

        let request = ExchangeRequest {
            client_id: &self.config.client_id,
            redirect_uri: &self.config.redirect_uri,
            code,
            code_verifier: &verifier,
        };
        let data = exchange_code(&self.client, &self.config.proxy_url, &request, cancel).await?;

        let expires_in = data
            .expires_in
            .unwrap_or(self.config.default_token_ttl.as_secs());
        // expires_in comes from the proxy; saturate rather than trust it
        // to stay within u64 milliseconds
        let expires_at = now_millis().saturating_add(expires_in.saturating_mul(1000));
        let token = StoredToken {
            access_token: Secret::new(data.access_token.clone()),
            token_type: data.token_type,
            scope: data.scope,
            expires_at,
            refresh_token: data.refresh_token,
        };
        self.storage.save_token(&token).await?;
        info!(expires_in, "token exchange succeeded");

        let user = fetch_user(
            &self.client,
            &self.config.user_endpoint,
            &data.access_token,
            cancel,
        )
        .await?;
        self.storage.save_user(&user).await?;

        let mut s = self.state.lock().await;
        info!(login = %user.login, "login complete");
        s.user = Some(user);
        Ok(())
    }

    /// Clear storage and in-memory user.
    pub async fn logout(&self) {
        self.storage.clear().await;
        let mut s = self.state.lock().await;
        s.user = None;
        info!("logged out");
    }

    /// Current `{ user, is_ready, is_authenticating }`.
    pub async fn snapshot(&self) -> AuthSnapshot {
        let s = self.state.lock().await;
        AuthSnapshot {
            user: s.user.clone(),
            is_ready: s.is_ready,
            is_authenticating: s.is_authenticating,
        }
    }

    /// Whether a login attempt is awaiting its callback.
    pub async fn has_pending_login(&self) -> bool {
        self.pending.lock().await.is_some()
    }
}
