use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SottoError};

/// Top-level configuration for the Sotto application.
///
/// Loaded from `~/.sotto/config.toml` by default. Each section corresponds
/// to one subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SottoConfig {
    pub general: GeneralConfig,
    pub trigger: TriggerConfig,
    pub recording: RecordingConfig,
    pub insertion: InsertionConfig,
    pub model: ModelConfig,
}

impl SottoConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SottoConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SottoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the corrections file and logs.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.sotto".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Trigger engine settings: gesture window and key bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Maximum gap between the two press edges of the capture gesture.
    pub double_press_window_ms: u64,
    /// Modifier key that drives the press-and-hold gesture:
    /// "right_alt", "left_alt", "right_ctrl", "left_ctrl", "shift", "super".
    pub trigger_modifier: String,
    /// Virtual key code of the correction hotkey (default: C).
    pub correction_key_code: u16,
    /// Modifier names required for the correction hotkey.
    pub correction_modifiers: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            double_press_window_ms: 400,
            trigger_modifier: "right_alt".to_string(),
            correction_key_code: 0x43,
            correction_modifiers: vec!["super".to_string(), "shift".to_string()],
        }
    }
}

/// Recording limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Hard stop after this many seconds (0 = unlimited).
    pub max_recording_secs: u64,
    /// Recordings shorter than this are discarded without transcription.
    pub min_duration_secs: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_recording_secs: 120,
            min_duration_secs: 0.5,
        }
    }
}

/// Insertion engine timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertionConfig {
    /// How many times to poll for modifier release before inserting anyway.
    pub modifier_wait_retries: u32,
    /// Poll interval between modifier checks, in milliseconds.
    pub modifier_wait_interval_ms: u64,
    /// Settling delay before touching the focused element.
    pub pre_insert_delay_ms: u64,
    /// How long the target application gets to consume a synthesized paste
    /// before the clipboard is restored.
    pub paste_grace_ms: u64,
}

impl Default for InsertionConfig {
    fn default() -> Self {
        Self {
            modifier_wait_retries: 10,
            modifier_wait_interval_ms: 50,
            pre_insert_delay_ms: 100,
            paste_grace_ms: 500,
        }
    }
}

/// Speech model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model preset id: see [`ModelPreset::all`](crate::types::ModelPreset::all).
    pub model: String,
    /// Directory holding downloaded model files.
    pub model_dir: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "balanced".to_string(),
            model_dir: "~/.sotto/models".to_string(),
        }
    }
}
