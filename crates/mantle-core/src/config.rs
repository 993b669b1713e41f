//! Read-only user preferences.
//!
//! Loaded once from `<config dir>/mantle/preferences.toml`. The engine
//! only ever reads these; editing the file is left to the user (or an
//! external settings surface).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ai::client::ApiFormat;

/// Root of Mantle's per-user configuration.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mantle")
}

/// User preferences consumed by the orchestration engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Whether the human-in-the-loop confirmation gate is active.
    pub hil_enabled: bool,
    /// Timeout applied by the external tool execution guard, in seconds.
    pub tool_timeout_secs: u64,
    /// Agent loop iteration cap. 0 means unlimited.
    pub max_iterations: usize,
    /// Key watched by the keyboard monitor while a turn is running.
    pub abort_key: char,
    /// Model provider wire format.
    pub api_format: ApiFormat,
    /// Provider base URL.
    pub base_url: String,
    /// Model identifier sent to the provider.
    pub model: String,
    /// Max output tokens per turn.
    pub max_tokens: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            hil_enabled: true,
            tool_timeout_secs: 120,
            max_iterations: 50,
            abort_key: 'q',
            api_format: ApiFormat::Anthropic,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 8192,
        }
    }
}

impl Preferences {
    /// Load preferences from the default location, falling back to
    /// defaults when the file is absent or unreadable.
    pub fn load() -> Self {
        Self::load_from(&config_dir().join("preferences.toml"))
    }

    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };

        match toml::from_str(&contents) {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to parse preferences: {}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let prefs = Preferences::load_from(Path::new("/nonexistent/preferences.toml"));
        assert!(prefs.hil_enabled);
        assert_eq!(prefs.max_iterations, 50);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "hil_enabled = false\nmax_iterations = 0\n").unwrap();

        let prefs = Preferences::load_from(&path);
        assert!(!prefs.hil_enabled);
        assert_eq!(prefs.max_iterations, 0);
        assert_eq!(prefs.tool_timeout_secs, 120);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        std::fs::write(&path, "hil_enabled = maybe???").unwrap();

        let prefs = Preferences::load_from(&path);
        assert!(prefs.hil_enabled);
    }
}
