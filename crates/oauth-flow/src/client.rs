//! Flow orchestrator
//!
//! `OAuthClient` drives the authorization-code flow with DPoP-bound tokens:
//!
//! - `authorize` mints a key, records a pending flow keyed by `state` and
//!   returns the authorization URL
//! - `callback` consumes the pending flow exactly once, exchanges the code
//!   and persists the session
//! - `restore`/`refresh` load a session and renew its tokens when needed
//! - `sign_out` forgets the session
//!
//! The credential store is the single source of truth for flows and sessions.
//! The client owns the store's cleanup scheduler and stops it on `shutdown`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::SystemClock;
use credential_store::{
    CleanupScheduler, CredentialStore, PendingFlow, PendingFlows, Session, Sessions, TableKind,
};
use dpop_key::{Algorithm, KeyService};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::{Browser, BrowserOutcome};
use crate::callback::CallbackParams;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::observe;
use crate::protocol::{ClientMetadata, OAuthProtocol, ProtocolContext, ProtocolError};
use crate::session::OAuthSession;

/// Random bytes in a `state` correlation value.
const STATE_LEN: usize = 16;

/// Session plus the caller data given to `authorize`.
#[derive(Debug, Clone)]
pub struct CallbackResult {
    pub session: OAuthSession,
    pub app_state: Option<String>,
}

/// How an interactive sign-in ended.
#[derive(Debug, Clone)]
pub enum SignInOutcome {
    SignedIn(CallbackResult),
    Cancelled,
    Dismissed,
    Locked,
}

pub struct OAuthClient {
    client: Arc<ClientMetadata>,
    protocol: Arc<dyn OAuthProtocol>,
    store: Arc<CredentialStore>,
    keys: KeyService,
    ctx: ProtocolContext,
    scheduler: Mutex<Option<CleanupScheduler>>,
}

impl OAuthClient {
    /// Build a client from configuration with the system clock and the
    /// software crypto provider.
    ///
    /// Must be called within a tokio runtime (starts the cleanup task).
    pub async fn new(config: &Config, protocol: Arc<dyn OAuthProtocol>) -> Result<Self> {
        let client = ClientMetadata::from_config(config.client.as_ref())?;
        let store = Arc::new(CredentialStore::open(&config.store, Arc::new(SystemClock)).await?);
        Self::from_parts(
            client,
            store,
            KeyService::default(),
            protocol,
            config.store.cleanup_interval(),
        )
    }

    /// Build a client around an existing store and key service.
    ///
    /// # Errors
    /// `Store(SchedulerRunning)` if another scheduler already sweeps `store`.
    pub fn from_parts(
        client: ClientMetadata,
        store: Arc<CredentialStore>,
        keys: KeyService,
        protocol: Arc<dyn OAuthProtocol>,
        cleanup_interval: Duration,
    ) -> Result<Self> {
        let client = Arc::new(client);
        let scheduler = store.start_cleanup(cleanup_interval)?;
        let ctx = ProtocolContext {
            client: Arc::clone(&client),
            tables: store.tables(),
            keys: keys.clone(),
        };

        info!(client_id = %client.client_id, "oauth client ready");
        Ok(Self {
            client,
            protocol,
            store,
            keys,
            ctx,
            scheduler: Mutex::new(Some(scheduler)),
        })
    }

    pub fn client_metadata(&self) -> &ClientMetadata {
        &self.client
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn keys(&self) -> &KeyService {
        &self.keys
    }

    /// Start an authorization flow for a handle or account identifier.
    ///
    /// Returns the URL to open. `app_state` comes back from `callback`.
    pub async fn authorize(&self, identifier: &str, app_state: Option<String>) -> Result<String> {
        let started = self.authorize_inner(identifier, app_state).await;
        observe("authorize", started).map(|(url, _)| url)
    }

    /// Returns the authorization URL and the `state` its pending flow is
    /// stored under.
    async fn authorize_inner(
        &self,
        identifier: &str,
        app_state: Option<String>,
    ) -> Result<(String, String)> {
        let identity = self
            .protocol
            .resolve_identity(&self.ctx, identifier)
            .await
            .map_err(|e| Error::Protocol(format!("resolving {identifier}: {e}")))?;

        let dpop_key = self.keys.generate(Algorithm::Es256.as_str())?;
        let state = URL_SAFE_NO_PAD.encode(self.keys.crypto().random_bytes(STATE_LEN));

        let request = self
            .protocol
            .build_authorization_url(&self.ctx, &identity, &dpop_key, &state)
            .await
            .map_err(|e| Error::Protocol(format!("building authorization URL: {e}")))?;

        let pending = PendingFlow {
            dpop_key,
            iss: identity.issuer,
            verifier: request.verifier,
            app_state,
        };
        self.store.set::<PendingFlows>(&state, &pending).await?;

        info!(sub = %identity.sub, state = %state, "authorization started");
        Ok((request.url, state))
    }

    /// Complete a flow from the authorization server's redirect.
    ///
    /// The pending flow is consumed before anything else, so a second
    /// callback with the same `state` fails with `UnknownOrExpiredFlow`
    /// whatever the first one's outcome.
    pub async fn callback(&self, params: &CallbackParams) -> Result<CallbackResult> {
        observe("callback", self.callback_inner(params).await)
    }

    async fn callback_inner(&self, params: &CallbackParams) -> Result<CallbackResult> {
        let pending = self
            .store
            .take::<PendingFlows>(&params.state)
            .await?
            .ok_or(Error::UnknownOrExpiredFlow)?;

        if let Some(error) = &params.error {
            warn!(state = %params.state, error = %error, "authorization denied by server");
            return Err(Error::AuthorizationDenied {
                error: error.clone(),
                description: params.error_description.clone(),
            });
        }

        if let Some(iss) = &params.iss
            && *iss != pending.iss
        {
            return Err(Error::ExchangeFailed(format!(
                "issuer mismatch: expected {}, got {iss}",
                pending.iss
            )));
        }

        let code = params
            .code
            .as_deref()
            .ok_or_else(|| Error::ExchangeFailed("callback is missing code".into()))?;

        let token_set = self
            .protocol
            .exchange_code(&self.ctx, &pending, code)
            .await
            .map_err(|e| Error::ExchangeFailed(e.to_string()))?;

        let sub = token_set.sub.clone();
        let session = Session {
            dpop_key: pending.dpop_key,
            token_set,
        };
        self.store.set::<Sessions>(&sub, &session).await?;

        info!(sub = %sub, "session created");
        Ok(CallbackResult {
            session: OAuthSession::new(session, self.keys.clone()),
            app_state: pending.app_state,
        })
    }

    /// Load a stored session, refreshing its tokens if the access token has
    /// expired and a refresh token is available.
    pub async fn restore(&self, sub: &str) -> Result<OAuthSession> {
        observe("restore", self.restore_inner(sub).await)
    }

    async fn restore_inner(&self, sub: &str) -> Result<OAuthSession> {
        let session = self.load_session(sub).await?;

        let now = self.store.clock().now_millis();
        if session.token_set.is_expired(now) && session.token_set.refresh_token.is_some() {
            debug!(sub, "access token expired, refreshing");
            return self.refresh_session(sub, session).await;
        }

        Ok(OAuthSession::new(session, self.keys.clone()))
    }

    /// Refresh a session's tokens now.
    ///
    /// A refresh rejected by the server deletes the session; a transient
    /// failure keeps it. Both fail with `RefreshFailed`.
    pub async fn refresh(&self, sub: &str) -> Result<OAuthSession> {
        let result = match self.load_session(sub).await {
            Ok(session) => self.refresh_session(sub, session).await,
            Err(e) => Err(e),
        };
        observe("refresh", result)
    }

    /// Delete a session. Signing out an unknown account succeeds.
    pub async fn sign_out(&self, sub: &str) -> Result<()> {
        let result = self
            .store
            .delete(TableKind::Session, sub)
            .await
            .map_err(Error::from);
        if result.is_ok() {
            info!(sub, "signed out");
        }
        observe("sign_out", result)
    }

    /// Run the whole flow through a browser: authorize, open the URL at the
    /// first redirect URI and complete the callback.
    ///
    /// A browser session that ends without a redirect is an outcome, not an
    /// error; its pending flow expires on its own. A redirect that cannot be
    /// parsed is an error and drops the flow this call started.
    pub async fn sign_in(&self, identifier: &str, browser: &dyn Browser) -> Result<SignInOutcome> {
        let (url, state) =
            observe("authorize", self.authorize_inner(identifier, None).await)?;

        match browser.open(&url, self.client.redirect_uri()).await {
            BrowserOutcome::Redirected(redirect) => {
                let params =
                    match CallbackParams::from_redirect_url(&redirect, self.client.response_mode) {
                        Ok(params) => params,
                        Err(e) => {
                            warn!(identifier, error = %e, "unusable redirect, dropping pending flow");
                            if let Err(delete_err) =
                                self.store.delete(TableKind::PendingFlow, &state).await
                            {
                                warn!(state = %state, error = %delete_err, "failed to drop pending flow");
                            }
                            return Err(e);
                        }
                    };
                Ok(SignInOutcome::SignedIn(self.callback(&params).await?))
            }
            BrowserOutcome::Cancelled => {
                info!(identifier, "sign-in cancelled");
                Ok(SignInOutcome::Cancelled)
            }
            BrowserOutcome::Dismissed => {
                info!(identifier, "sign-in dismissed");
                Ok(SignInOutcome::Dismissed)
            }
            BrowserOutcome::Locked => {
                warn!(identifier, "sign-in blocked by another browser session");
                Ok(SignInOutcome::Locked)
            }
        }
    }

    /// Stop the cleanup scheduler. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
        }
    }

    async fn load_session(&self, sub: &str) -> Result<Session> {
        self.store
            .get::<Sessions>(sub)
            .await?
            .ok_or_else(|| Error::NoSession(sub.to_string()))
    }

    async fn refresh_session(&self, sub: &str, session: Session) -> Result<OAuthSession> {
        if session.token_set.refresh_token.is_none() {
            return Err(Error::RefreshFailed(format!("session {sub} has no refresh token")));
        }

        let refreshed = self
            .protocol
            .refresh_token(&self.ctx, &session.dpop_key, &session.token_set)
            .await
            .and_then(|tokens| {
                if tokens.sub == sub {
                    Ok(tokens)
                } else {
                    Err(ProtocolError::Rejected(format!(
                        "refreshed tokens belong to {}",
                        tokens.sub
                    )))
                }
            });

        match refreshed {
            Ok(token_set) => {
                let session = Session {
                    dpop_key: session.dpop_key,
                    token_set,
                };
                self.store.set::<Sessions>(sub, &session).await?;
                info!(sub, "token refresh succeeded");
                Ok(OAuthSession::new(session, self.keys.clone()))
            }
            Err(e) if e.is_rejected() => {
                warn!(sub, error = %e, "refresh rejected, deleting session");
                self.store.delete(TableKind::Session, sub).await?;
                Err(Error::RefreshFailed(e.to_string()))
            }
            Err(e) => {
                warn!(sub, error = %e, "refresh failed (transient), keeping session");
                Err(Error::RefreshFailed(e.to_string()))
            }
        }
    }
}
