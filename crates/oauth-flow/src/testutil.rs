//! In-process protocol library and browser for tests

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Clock, ManualClock};
use credential_store::{CredentialStore, PendingFlow, TokenSet};
use dpop_key::{Key, KeyService, SoftwareCrypto};
use url::Url;

use crate::browser::{Browser, BrowserOutcome};
use crate::client::OAuthClient;
use crate::protocol::{
    AuthorizationRequest, ClientMetadata, OAuthProtocol, ProtocolContext, ProtocolError,
    ProtocolFuture, ResolvedIdentity, ResponseMode,
};

pub(crate) const T0: u64 = 1_700_000_000_000;

pub(crate) const ISSUER: &str = "https://auth.example";

const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(1800);

/// Protocol library that resolves `*.example` handles to `did:plc:<name>`
/// and issues numbered tokens. Code `"bad"` is rejected.
#[derive(Default)]
pub(crate) struct FakeProtocol {
    issued: AtomicUsize,
    exchanges: AtomicUsize,
    refreshes: AtomicUsize,
    refresh_failure: Mutex<Option<ProtocolError>>,
}

impl FakeProtocol {
    pub fn exchange_calls(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Make every following refresh fail with `error`.
    pub fn fail_refresh(&self, error: ProtocolError) {
        if let Ok(mut failure) = self.refresh_failure.lock() {
            *failure = Some(error);
        }
    }

    fn issue(&self, ctx: &ProtocolContext, sub: &str) -> TokenSet {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let now = ctx.keys.clock().now_millis();
        TokenSet {
            iss: ISSUER.into(),
            sub: sub.into(),
            aud: "https://pds.example".into(),
            scope: Some(ctx.client.scope.clone()),
            access_token: format!("at-{n}"),
            token_type: "DPoP".into(),
            refresh_token: Some(format!("rt-{n}")),
            expires_at: Some(now + ACCESS_TOKEN_LIFETIME.as_millis() as u64),
        }
    }
}

impl OAuthProtocol for FakeProtocol {
    fn resolve_identity<'a>(
        &'a self,
        _ctx: &'a ProtocolContext,
        identifier: &'a str,
    ) -> ProtocolFuture<'a, ResolvedIdentity> {
        Box::pin(async move {
            let name = identifier
                .strip_suffix(".example")
                .ok_or_else(|| ProtocolError::Rejected(format!("cannot resolve {identifier}")))?;
            Ok(ResolvedIdentity {
                sub: format!("did:plc:{name}"),
                handle: Some(identifier.to_string()),
                issuer: ISSUER.into(),
            })
        })
    }

    fn build_authorization_url<'a>(
        &'a self,
        ctx: &'a ProtocolContext,
        identity: &'a ResolvedIdentity,
        _dpop_key: &'a Key,
        state: &'a str,
    ) -> ProtocolFuture<'a, AuthorizationRequest> {
        Box::pin(async move {
            let url = Url::parse_with_params(
                &format!("{}/oauth/authorize", identity.issuer),
                &[
                    ("client_id", ctx.client.client_id.as_str()),
                    ("redirect_uri", ctx.client.redirect_uri()),
                    ("state", state),
                ],
            )
            .map_err(|e| ProtocolError::Rejected(e.to_string()))?;
            Ok(AuthorizationRequest {
                url: url.to_string(),
                verifier: Some(format!("verifier-{state}")),
            })
        })
    }

    fn exchange_code<'a>(
        &'a self,
        ctx: &'a ProtocolContext,
        pending: &'a PendingFlow,
        code: &'a str,
    ) -> ProtocolFuture<'a, TokenSet> {
        Box::pin(async move {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            if code == "bad" {
                return Err(ProtocolError::Rejected("invalid_grant".into()));
            }
            if pending.verifier.is_none() {
                return Err(ProtocolError::Rejected("missing code_verifier".into()));
            }
            Ok(self.issue(ctx, "did:plc:alice"))
        })
    }

    fn refresh_token<'a>(
        &'a self,
        ctx: &'a ProtocolContext,
        _dpop_key: &'a Key,
        token_set: &'a TokenSet,
    ) -> ProtocolFuture<'a, TokenSet> {
        Box::pin(async move {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            let failure = self
                .refresh_failure
                .lock()
                .map_err(|e| ProtocolError::Transient(e.to_string()))?
                .clone();
            if let Some(error) = failure {
                return Err(error);
            }
            Ok(self.issue(ctx, &token_set.sub))
        })
    }
}

/// Browser that ends the way it was built to.
pub(crate) enum FakeBrowser {
    /// Follow the authorization URL and redirect back with code `abc`.
    Approve,
    /// Redirect back with an error and no `state`.
    ServerError,
    Cancel,
    Dismiss,
    Lock,
}

impl Browser for FakeBrowser {
    fn open<'a>(
        &'a self,
        url: &'a str,
        redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = BrowserOutcome> + Send + 'a>> {
        Box::pin(async move {
            match self {
                FakeBrowser::Approve => {
                    let state = Url::parse(url)
                        .ok()
                        .and_then(|u| {
                            u.query_pairs()
                                .find(|(k, _)| k == "state")
                                .map(|(_, v)| v.into_owned())
                        })
                        .unwrap_or_default();
                    BrowserOutcome::Redirected(format!(
                        "{redirect_uri}#state={state}&iss={}&code=abc",
                        url::form_urlencoded::byte_serialize(ISSUER.as_bytes()).collect::<String>()
                    ))
                }
                FakeBrowser::ServerError => {
                    BrowserOutcome::Redirected(format!("{redirect_uri}#error=server_error"))
                }
                FakeBrowser::Cancel => BrowserOutcome::Cancelled,
                FakeBrowser::Dismiss => BrowserOutcome::Dismissed,
                FakeBrowser::Lock => BrowserOutcome::Locked,
            }
        })
    }
}

pub(crate) fn client_metadata() -> ClientMetadata {
    ClientMetadata {
        client_id: "https://app.example.com/oauth/client-metadata.json".into(),
        redirect_uris: vec!["com.example.app:/oauth/callback".into()],
        scope: "atproto".into(),
        response_mode: ResponseMode::Fragment,
    }
}

/// Client over an in-memory store, all driven by one manual clock at `T0`.
pub(crate) fn test_client() -> (OAuthClient, Arc<FakeProtocol>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(CredentialStore::in_memory(clock.clone()));
    let keys = KeyService::new(Arc::new(SoftwareCrypto), clock.clone());
    let protocol = Arc::new(FakeProtocol::default());

    let client = OAuthClient::from_parts(
        client_metadata(),
        store,
        keys,
        protocol.clone(),
        Duration::from_secs(30),
    )
    .unwrap();
    (client, protocol, clock)
}
