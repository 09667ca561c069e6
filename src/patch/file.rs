//! Patch file format.
//!
//! A patch is stored as pretty-printed JSON:
//!
//! ```json
//! {
//!   "version": 1,
//!   "settings": { "audio": { "sample_rate": 48000, ... }, "output_width": 1280, ... },
//!   "objects": [ { "id": 3, "type_name": "slider", "x": 40.0, "y": 60.0, ... } ],
//!   "links":   [ { "from_id": 3, "from_outlet": 0, "to_id": 5, "to_inlet": 1, "kind": "numeric" } ]
//! }
//! ```
//!
//! Ids in a file only relate records to each other. They are remapped to
//! fresh process ids on load.

use crate::audio::AudioSettings;
use crate::error::{PatchError, Result};
use crate::patch::id::ObjectId;
use crate::patch::port::PayloadKind;
use crate::types::{NamedVars, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PATCH_FILE_EXTENSION: &str = "pwpatch";
pub const PATCH_FILE_VERSION: u32 = 1;

/// Patch-level settings, saved once per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchSettings {
    pub audio: AudioSettings,
    pub output_width: u32,
    pub output_height: u32,
    /// Canvas scroll offset.
    pub viewport: Vec2,
    /// Free-form patch variables without a dedicated field.
    pub vars: NamedVars,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            audio: AudioSettings::default(),
            output_width: 1280,
            output_height: 720,
            viewport: Vec2::ZERO,
            vars: NamedVars::new(),
        }
    }
}

impl PatchSettings {
    /// Set a named patch variable. Known names map onto typed fields.
    pub fn set_variable(&mut self, name: &str, value: f32) {
        match name {
            "sample_rate" => self.audio.sample_rate = value.max(1.0) as u32,
            "buffer_size" => self.audio.buffer_size = value.max(1.0) as u32,
            "channels" => self.audio.channels = value.max(1.0) as u16,
            "output_width" => self.output_width = value.max(1.0) as u32,
            "output_height" => self.output_height = value.max(1.0) as u32,
            _ => self.vars.set(name, value),
        }
    }
}

/// One saved object. A missing or zero size means "use the type's default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    #[serde(alias = "typeName")]
    pub type_name: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default, alias = "namedVariables")]
    pub vars: NamedVars,
}

impl ObjectRecord {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Saved size, if the record carries a usable one.
    pub fn size(&self) -> Option<Vec2> {
        (self.width > 0.0 && self.height > 0.0).then_some(Vec2::new(self.width, self.height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub from_id: ObjectId,
    pub from_outlet: usize,
    pub to_id: ObjectId,
    pub to_inlet: usize,
    pub kind: PayloadKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchFile {
    #[serde(default = "default_patch_version")]
    pub version: u32,
    #[serde(default)]
    pub settings: PatchSettings,
    #[serde(default)]
    pub objects: Vec<ObjectRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

fn default_patch_version() -> u32 {
    PATCH_FILE_VERSION
}

impl Default for PatchFile {
    fn default() -> Self {
        Self {
            version: PATCH_FILE_VERSION,
            settings: PatchSettings::default(),
            objects: Vec::new(),
            links: Vec::new(),
        }
    }
}

impl PatchFile {
    /// Read and parse a patch file. Nothing is instantiated here.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PatchError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let file: PatchFile = serde_json::from_str(&content).map_err(|e| PatchError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if file.version > PATCH_FILE_VERSION {
            tracing::warn!(
                "Patch {:?} has version {} (newer than {}); loading what is understood",
                path,
                file.version,
                PATCH_FILE_VERSION
            );
        }
        Ok(file)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| PatchError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// What happened while instantiating a loaded patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub path: Option<PathBuf>,
    pub objects_loaded: usize,
    /// `(file id, type name)` of records whose type is not registered.
    pub skipped: Vec<(ObjectId, String)>,
    pub links_loaded: usize,
    pub links_refused: usize,
    /// File id → live id.
    pub id_map: BTreeMap<ObjectId, ObjectId>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.links_refused == 0
    }
}
