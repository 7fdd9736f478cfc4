use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::builtin_providers::DEFAULT_PROVIDER;
use crate::core::providers::GenerationParams;
use crate::core::retry::RetryConfig;

fn default_stream() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub default_provider: Option<String>,
    /// Overrides the built-in base URL of the selected provider.
    pub base_url: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Where sessions, settings and snapshots are kept.
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub generation: GenerationParams,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: None,
            base_url: None,
            stream: default_stream(),
            data_dir: None,
            generation: GenerationParams::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    pub fn provider(&self) -> &str {
        self.default_provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/chatline/config.toml` → `~/.config/chatline/config.toml`
/// - macOS: `/Users/user/Library/Application Support/...` → `~/Library/Application Support/...`
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
