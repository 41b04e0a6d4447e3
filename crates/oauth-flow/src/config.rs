//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults.
//! `OAUTH_STORE_PATH` overrides `store.path` so deployments can relocate the
//! credential file without editing the TOML.

use std::path::{Path, PathBuf};

use credential_store::StoreConfig;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Client identity. Optional at load time; the client refuses to start
    /// without it.
    #[serde(default)]
    pub client: Option<ClientConfig>,
    #[serde(default)]
    pub store: StoreConfig,
}

/// OAuth client identity (`[client]` table)
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// `"query"` or `"fragment"`. Checked when the client is built.
    #[serde(default = "default_response_mode")]
    pub response_mode: String,
}

fn default_scope() -> String {
    "atproto".into()
}

fn default_response_mode() -> String {
    "fragment".into()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        config.store.validate()?;

        if let Some(client) = &config.client {
            if client.client_id.trim().is_empty() {
                return Err(common::Error::Config("client_id must not be empty".into()));
            }
            if client.redirect_uris.is_empty() {
                return Err(common::Error::Config(
                    "redirect_uris must contain at least one URI".into(),
                ));
            }
        }

        if let Ok(p) = std::env::var("OAUTH_STORE_PATH")
            && !p.is_empty()
        {
            config.store.path = Some(PathBuf::from(p));
        }

        Ok(config)
    }

    /// Resolve config file path from an explicit argument or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oauth-client.toml")
    }
}
