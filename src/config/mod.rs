//! Configuration module for patchwork-rs
//!
//! This module handles:
//! - Application state persistence (recent patches, last patch)
//! - Runtime configuration (`patchwork.toml`, see [`settings`])
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.hxyulin.patchwork-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.patchwork-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.patchwork-rs\`
//!
//! # Files
//!
//! - `app_state.json` - Recent patches list and last opened patch
//! - `logs/` - Daily rolling log files
//! - Patch files (`.pwpatch`) - Saved wherever the user chooses

pub mod settings;

pub use settings::*;

use crate::error::{PatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.patchwork-rs";

/// App state filename
pub const APP_STATE_FILE: &str = "app_state.json";

/// Maximum number of recent patches to remember
pub const MAX_RECENT_PATCHES: usize = 10;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        PatchError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "could not determine app data directory",
        ))
    })?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Get the path to the app state file
pub fn app_state_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(APP_STATE_FILE))
}

// ==================== Recent Patch Entry ====================

/// Information about a recently opened patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentPatch {
    pub path: PathBuf,

    /// Display name (file stem)
    pub name: String,

    pub last_opened: DateTime<Utc>,
}

impl RecentPatch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        Self {
            path,
            name,
            last_opened: Utc::now(),
        }
    }

    /// Check if the patch file still exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

// ==================== App State ====================

/// Persistent application state, separate from individual patch files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default = "default_app_state_version")]
    pub version: u32,

    #[serde(default)]
    pub recent_patches: Vec<RecentPatch>,

    /// Patch reopened by "open last patch"
    #[serde(default)]
    pub last_patch_path: Option<PathBuf>,
}

fn default_app_state_version() -> u32 {
    1
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: 1,
            recent_patches: Vec::new(),
            last_patch_path: None,
        }
    }
}

impl AppState {
    /// Load app state from the default location
    pub fn load() -> Result<Self> {
        let path = app_state_path().ok_or_else(|| {
            PatchError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine app state path",
            ))
        })?;
        Self::load_from(path)
    }

    /// Load app state from an explicit file. A missing file yields defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| PatchError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load app state, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load app state, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save app state to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(APP_STATE_FILE))
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).map_err(|e| PatchError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Add or refresh a recent patch and make it the last patch
    pub fn add_recent_patch(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.recent_patches.retain(|p| p.path != path);
        self.recent_patches.insert(0, RecentPatch::new(path.clone()));
        self.recent_patches.truncate(MAX_RECENT_PATCHES);
        self.last_patch_path = Some(path);
    }

    /// Remove a patch from recents (e.g., if the file was deleted)
    pub fn remove_recent_patch(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.recent_patches.retain(|p| p.path != path);
        if self.last_patch_path.as_deref() == Some(path) {
            self.last_patch_path = None;
        }
    }

    /// Drop recent patches that no longer exist
    pub fn cleanup_missing_patches(&mut self) {
        self.recent_patches.retain(|p| p.exists());
        if self.last_patch_path.as_ref().is_some_and(|p| !p.exists()) {
            self.last_patch_path = None;
        }
    }

    /// The last patch path, if the file still exists
    pub fn last_patch(&self) -> Option<&Path> {
        self.last_patch_path
            .as_deref()
            .filter(|p| p.exists())
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_default() {
        let state = AppState::default();
        assert!(state.recent_patches.is_empty());
        assert!(state.last_patch_path.is_none());
        assert_eq!(state.version, 1);
    }

    #[test]
    fn test_add_recent_patch() {
        let mut state = AppState::default();
        state.add_recent_patch("/patches/drone.pwpatch");
        state.add_recent_patch("/patches/beat.pwpatch");
        assert_eq!(state.recent_patches.len(), 2);
        assert_eq!(state.recent_patches[0].name, "beat");

        // Re-adding moves to the front instead of duplicating
        state.add_recent_patch("/patches/drone.pwpatch");
        assert_eq!(state.recent_patches.len(), 2);
        assert_eq!(state.recent_patches[0].name, "drone");
        assert_eq!(
            state.last_patch_path.as_deref(),
            Some(Path::new("/patches/drone.pwpatch"))
        );
    }

    #[test]
    fn test_recent_patches_max_limit() {
        let mut state = AppState::default();
        for i in 0..15 {
            state.add_recent_patch(format!("/patches/p{}.pwpatch", i));
        }
        assert_eq!(state.recent_patches.len(), MAX_RECENT_PATCHES);
        assert_eq!(state.recent_patches[0].name, "p14");
    }

    #[test]
    fn test_remove_recent_clears_last() {
        let mut state = AppState::default();
        state.add_recent_patch("/patches/a.pwpatch");
        state.remove_recent_patch("/patches/a.pwpatch");
        assert!(state.recent_patches.is_empty());
        assert!(state.last_patch_path.is_none());
    }

    #[test]
    fn test_app_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(APP_STATE_FILE);
        let mut state = AppState::default();
        state.add_recent_patch("/patches/a.pwpatch");
        state.save_to(&path).unwrap();

        let loaded = AppState::load_from(&path).unwrap();
        assert_eq!(loaded, state);
    }
}
