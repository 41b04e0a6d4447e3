//! Interactive browser seam for sign-in

use std::future::Future;
use std::pin::Pin;

/// How an authorization browser session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The browser reached the redirect URI; carries the full URL.
    Redirected(String),
    Cancelled,
    Dismissed,
    /// Another browser session was already in progress.
    Locked,
}

/// Opens an authorization URL and waits for the redirect.
pub trait Browser: Send + Sync {
    fn open<'a>(
        &'a self,
        url: &'a str,
        redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = BrowserOutcome> + Send + 'a>>;
}
