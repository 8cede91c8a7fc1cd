use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chat::{DEFAULT_CHANNEL_CAPACITY, LocalBus};

/// Environment variable overriding `[store] snapshot_path`.
pub const SNAPSHOT_ENV: &str = "BOARDSYNC_SNAPSHOT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// When set, the store writes a JSON snapshot here after every change.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_true")]
    pub hydrate_history: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            hydrate_history: default_true(),
        }
    }
}

impl ChatConfig {
    /// The process-wide chat bus, buffering `channel_capacity` messages per
    /// subscriber.
    #[must_use]
    pub fn local_bus(&self) -> LocalBus {
        LocalBus::new(self.channel_capacity)
    }
}

fn read_config(path: &Path) -> Result<Option<SyncConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str::<SyncConfig>(&content)
        .map(Some)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `.boardsync/config.toml` under `project_root`, or defaults.
pub fn load_project_config(project_root: &Path) -> Result<SyncConfig> {
    Ok(read_config(&project_root.join(".boardsync/config.toml"))?.unwrap_or_default())
}

/// Load the per-user config, if the platform has a config directory and
/// the file exists.
pub fn load_user_config() -> Result<Option<SyncConfig>> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(None);
    };
    read_config(&config_dir.join("boardsync/config.toml"))
}

/// Project config, falling back to the user config when the project has
/// none, with the environment override applied last.
pub fn resolve_config(project_root: &Path) -> Result<SyncConfig> {
    let project_path = project_root.join(".boardsync/config.toml");
    let config = match read_config(&project_path)? {
        Some(config) => config,
        None => load_user_config()?.unwrap_or_default(),
    };
    Ok(apply_env(config, env::var(SNAPSHOT_ENV).ok()))
}

fn apply_env(mut config: SyncConfig, snapshot: Option<String>) -> SyncConfig {
    if let Some(path) = snapshot.filter(|raw| !raw.trim().is_empty()) {
        config.store.snapshot_path = Some(PathBuf::from(path.trim()));
    }
    config
}

const fn default_true() -> bool {
    true
}

const fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_project_config(root: &Path, content: &str) {
        let dir = root.join(".boardsync");
        std::fs::create_dir_all(&dir).expect("create config dir");
        std::fs::write(dir.join("config.toml"), content).expect("write config");
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.store.snapshot_path, None);
        assert_eq!(cfg.chat.channel_capacity, 256);
        assert!(cfg.chat.hydrate_history);
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let root = tempfile::tempdir().expect("temp dir");
        write_project_config(
            root.path(),
            r#"
[store]
snapshot_path = "state/board.json"

[chat]
hydrate_history = false
"#,
        );

        let cfg = load_project_config(root.path()).expect("parse");
        assert_eq!(
            cfg.store.snapshot_path,
            Some(PathBuf::from("state/board.json"))
        );
        assert!(!cfg.chat.hydrate_history);
        assert_eq!(cfg.chat.channel_capacity, 256);
    }

    #[test]
    fn malformed_config_names_the_file() {
        let root = tempfile::tempdir().expect("temp dir");
        write_project_config(root.path(), "[chat]\nchannel_capacity = \"lots\"\n");

        let err = load_project_config(root.path()).expect_err("should fail");
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn env_snapshot_overrides_file_value() {
        let mut cfg = SyncConfig::default();
        cfg.store.snapshot_path = Some(PathBuf::from("from-file.json"));

        let cfg = apply_env(cfg, Some(" /tmp/env.json ".into()));
        assert_eq!(cfg.store.snapshot_path, Some(PathBuf::from("/tmp/env.json")));

        let cfg = apply_env(cfg, Some("   ".into()));
        assert_eq!(cfg.store.snapshot_path, Some(PathBuf::from("/tmp/env.json")));
    }
}
