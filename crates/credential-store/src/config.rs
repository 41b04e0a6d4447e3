//! Store configuration (`[store]` table)

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Where credentials live and how often expired entries are swept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// JSON file for the file engine. `None` keeps everything in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_cleanup_interval() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl StoreConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn validate(&self) -> common::Result<()> {
        if self.cleanup_interval_secs == 0 {
            return Err(common::Error::Config(
                "cleanup_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
