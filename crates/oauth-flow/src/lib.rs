//! DPoP-bound OAuth authorization flow and session lifecycle
//!
//! Provides:
//! - `OAuthClient`: authorize, callback, restore, refresh, sign-out, sign-in
//! - `OAuthProtocol` and `Browser` seams for the protocol library and the
//!   interactive redirect
//! - TOML configuration loading
//! - Operation metrics

pub mod browser;
pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod session;

#[cfg(test)]
mod testutil;

pub use browser::{Browser, BrowserOutcome};
pub use callback::CallbackParams;
pub use client::{CallbackResult, OAuthClient, SignInOutcome};
pub use config::{ClientConfig, Config};
pub use error::{Error, Result};
pub use protocol::{
    AuthorizationRequest, ClientMetadata, OAuthProtocol, ProtocolContext, ProtocolError,
    ProtocolFuture, ResolvedIdentity, ResponseMode,
};
pub use session::OAuthSession;
