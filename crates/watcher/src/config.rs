//! TOML configuration for a watcher
//!
//! ```toml
//! interval_ms = 250
//! max_events = 100
//! ignore = ["./target"]
//! ops = ["create", "write"]
//!
//! [[roots]]
//! path = "./src"
//! recursive = true
//! ignore_hidden = true
//! patterns = ["*.log", "node_modules/"]
//! ```

use crate::watcher::Watcher;
use anyhow::{Context, Result};
use pollwatch_core::Op;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Poll interval in milliseconds (default: 100)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Max events per cycle, 0 = unlimited (default: 0)
    #[serde(default)]
    pub max_events: usize,

    /// Paths to watch
    #[serde(default)]
    pub roots: Vec<RootConfig>,

    /// Paths excluded from every root
    #[serde(default)]
    pub ignore: Vec<PathBuf>,

    /// Event kinds to deliver; empty delivers everything
    #[serde(default)]
    pub ops: Vec<Op>,
}

/// One watched path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootConfig {
    pub path: PathBuf,

    /// Watch the whole subtree (default: true)
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Skip hidden entries (default: false)
    #[serde(default)]
    pub ignore_hidden: bool,

    /// Gitignore-style filter patterns
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_events: 0,
            roots: vec![],
            ignore: vec![],
            ops: vec![],
        }
    }
}

fn default_interval_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl WatcherConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse watcher config")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Watcher {
    /// Build a watcher with every configured root added
    ///
    /// The watcher is left idle; call `start(config.interval())` to poll.
    pub fn from_config(config: &WatcherConfig) -> Result<Self> {
        let watcher = Watcher::new();
        watcher.set_max_events(config.max_events);
        watcher.set_filter_ops(config.ops.iter().copied());
        watcher
            .ignore(&config.ignore)
            .context("Failed to register ignored paths")?;

        for root in &config.roots {
            if !root.patterns.is_empty() {
                watcher
                    .add_filter_patterns(&root.path, &root.patterns)
                    .with_context(|| format!("Invalid patterns for {}", root.path.display()))?;
            }
            watcher
                .add(&root.path, root.recursive, root.ignore_hidden)
                .with_context(|| format!("Failed to watch {}", root.path.display()))?;
        }

        Ok(watcher)
    }
}
