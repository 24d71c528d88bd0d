//! Bridge configuration
//!
//! The bridge persists its settings as JSON in the platform config directory.
//! Only the rig-facing fields live here; the lookup and logbook settings are
//! owned by their own subsystems.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Number of rig port slots offered in the settings surface
pub const MAX_PORTS: usize = 4;

fn default_baud() -> u32 {
    9600
}

/// One rig port slot; an empty path disables the slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RigPortConfig {
    /// Serial device path (empty = slot disabled)
    #[serde(default)]
    pub port: String,
    /// Baud rate; zero falls back to 9600
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl RigPortConfig {
    /// Whether this slot should be watched
    pub fn enabled(&self) -> bool {
        !self.port.is_empty()
    }

    /// Configured baud with the zero fallback applied
    pub fn effective_baud(&self) -> u32 {
        if self.baud == 0 {
            default_baud()
        } else {
            self.baud
        }
    }
}

impl Default for RigPortConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: default_baud(),
        }
    }
}

/// Which ports contribute to the published global state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// Every port's data contributes
    #[default]
    All,
    /// Only the selected port contributes
    Single,
}

/// Rig-facing bridge settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BridgeConfig {
    /// Master switch for the rig subsystem
    #[serde(default)]
    pub use_rig: bool,
    /// Mirror each port through a pseudo-tty pair (POSIX only)
    #[serde(default)]
    pub use_pty: bool,
    /// Port slots; entries beyond [`MAX_PORTS`] are ignored
    #[serde(default)]
    pub rig_ports: Vec<RigPortConfig>,
    /// Which ports feed the global state
    #[serde(default)]
    pub rig_broadcast_mode: BroadcastMode,
    /// Selected slot when the broadcast mode is `single`
    #[serde(default)]
    pub selected_rig_index: usize,
}

impl BridgeConfig {
    /// Enabled slots with their indices, capped at [`MAX_PORTS`]
    pub fn enabled_ports(&self) -> impl Iterator<Item = (usize, &RigPortConfig)> {
        self.rig_ports
            .iter()
            .take(MAX_PORTS)
            .enumerate()
            .filter(|(_, rp)| rp.enabled())
    }

    /// Platform config directory for the bridge
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg);
            if path.is_absolute() {
                return Some(path.join("rigbridge"));
            }
        }
        dirs::home_dir().map(|h| h.join(".config").join("rigbridge"))
    }

    /// Path of the settings file
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| match serde_json::from_str(&s) {
                Ok(cfg) => Some(cfg),
                Err(e) => {
                    warn!("config file unreadable, using defaults: {e}");
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path().ok_or_else(|| "no config directory".to_string())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create config directory: {e}"))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize config: {e}"))?;
        std::fs::write(&path, json).map_err(|e| format!("failed to write config: {e}"))
    }
}
