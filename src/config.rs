//! Runtime configuration.
//!
//! Read from an optional JSON file; every field has a default so a missing
//! file or a partial one both work. CLI flags override the file afterwards.
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/git-herald",
//!   "poll_interval_secs": 600,
//!   "destinations": ["#commits"],
//!   "aliases": { "err-git": "https://github.com/errbotio/err-git" }
//! }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Holds `registry.json` and the `clones/` directory
    pub data_dir: PathBuf,
    pub poll_interval_secs: u64,
    /// Upper bound for polling a single repository
    pub repo_timeout_secs: u64,
    pub destinations: Vec<String>,
    /// Symbolic name → git URL
    pub aliases: BTreeMap<String, String>,
    /// Source name that follows every alias at once
    pub all_aliases_keyword: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("git-herald"),
            poll_interval_secs: 600,
            repo_timeout_secs: 120,
            destinations: Vec::new(),
            aliases: BTreeMap::new(),
            all_aliases_keyword: "allplugins".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = fs::read_to_string(path)?;
                Ok(serde_json::from_str(&contents)?)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.json")
    }

    pub fn clones_dir(&self) -> PathBuf {
        self.data_dir.join("clones")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn repo_timeout(&self) -> Duration {
        Duration::from_secs(self.repo_timeout_secs.max(1))
    }
}
