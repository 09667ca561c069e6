//! Runtime configuration loaded at startup
//!
//! `RuntimeConfig` is read from a TOML file (`patchwork.toml` by default).
//! Every field has a default, so a missing file or a partial file is fine:
//!
//! ```toml
//! fps = 60
//! backend = "cpal"
//! dsp_on_launch = true
//! output_device = "Speakers"
//!
//! [audio]
//! sample_rate = 48000
//! buffer_size = 256
//! ```

use crate::audio::AudioSettings;
use crate::error::{PatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default runtime configuration filename
pub const RUNTIME_CONFIG_FILE: &str = "patchwork.toml";

/// Default frame rate of the scheduler
pub const DEFAULT_FPS: u32 = 60;

/// Which device backend the audio bridge uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Hardware devices through cpal
    #[default]
    Cpal,
    /// Software clock, no hardware
    Offline,
}

/// Startup configuration for the runtime and the audio bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Scheduler ticks per second (0 = as fast as possible)
    pub fps: u32,

    /// Default audio settings (a loaded patch may override them)
    pub audio: AudioSettings,

    pub backend: BackendKind,

    /// Preferred input device name (substring match)
    pub input_device: Option<String>,

    /// Preferred output device name (substring match)
    pub output_device: Option<String>,

    /// Start audio processing as soon as the runtime is up
    pub dsp_on_launch: bool,

    /// Upper bound on waiting for the render thread when removing audio objects
    pub ack_timeout_ms: u64,

    /// Patch opened at startup when no `--patch` is given
    pub startup_patch: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            audio: AudioSettings::default(),
            backend: BackendKind::default(),
            input_device: None,
            output_device: None,
            dsp_on_launch: true,
            ack_timeout_ms: 500,
            startup_patch: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PatchError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PatchError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load configuration, returning defaults if the file is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(PatchError::FileNotFound(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("Failed to load runtime config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| PatchError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn ack_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ack_timeout_ms)
    }
}
