use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub players: PlayersConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Defaults for the status-line renderer.  Command-line flags win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_play")]
    pub play: String,
    #[serde(default = "default_pause")]
    pub pause: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Colon-separated element order, e.g. `SYMBOL:ARTIST:TITLE`.
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default)]
    pub position: bool,
    #[serde(default)]
    pub interpolate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayersConfig {
    /// Switch focus to whichever player starts playing.
    #[serde(default)]
    pub autofocus: bool,
    /// Position refresh interval while playing.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
    /// Full re-enumeration interval, on top of change events.
    #[serde(default = "default_rescan_secs")]
    pub rescan_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for the socket, share files and log.  Defaults to the
    /// system temp dir.
    #[serde(default)]
    pub runtime_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            play: default_play(),
            pause: default_pause(),
            separator: default_separator(),
            order: default_order(),
            position: false,
            interpolate: false,
        }
    }
}

impl Default for PlayersConfig {
    fn default() -> Self {
        Self {
            autofocus: false,
            poll_secs: default_poll_secs(),
            rescan_secs: default_rescan_secs(),
        }
    }
}

fn default_play() -> String {
    "▶".to_string()
}

fn default_pause() -> String {
    "".to_string()
}

fn default_separator() -> String {
    " - ".to_string()
}

fn default_order() -> String {
    "SYMBOL:ARTIST:ALBUM:TITLE:POSITION".to_string()
}

fn default_poll_secs() -> u64 {
    1
}

fn default_rescan_secs() -> u64 {
    5
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn runtime_paths(&self) -> platform::RuntimePaths {
        match &self.paths.runtime_dir {
            Some(dir) => platform::RuntimePaths::in_dir(dir),
            None => platform::RuntimePaths::default(),
        }
    }
}
