//! Error handling for the patch runtime
//!
//! Every recoverable failure in the graph engine is one of these variants.
//! Connection and lookup errors leave the graph untouched, load errors leave
//! the active patch in place, and device errors degrade to silence.

use crate::patch::id::{LinkId, ObjectId};
use crate::patch::port::PayloadKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for patch runtime operations
#[derive(Error, Debug)]
pub enum PatchError {
    /// No factory is registered under this type name
    #[error("Unknown object type: {0}")]
    UnknownType(String),

    /// An object id, link id, or port index does not name anything live
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Outlet, inlet, and requested payload kinds disagree
    #[error("Type mismatch: outlet {outlet} -> inlet {inlet} (requested {requested})")]
    TypeMismatch {
        outlet: PayloadKind,
        inlet: PayloadKind,
        requested: PayloadKind,
    },

    /// The destination inlet already has an incoming link
    #[error("Inlet {inlet} of {object} is already connected by {existing}")]
    AlreadyConnected {
        object: ObjectId,
        inlet: usize,
        existing: LinkId,
    },

    /// A singleton object type already has a live instance
    #[error("Object type '{0}' allows a single instance per patch")]
    SingletonExists(String),

    /// Patch file does not exist
    #[error("Patch file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Patch or config file is structurally invalid
    #[error("Parse error in {}: {message}", path.display())]
    ParseError { path: PathBuf, message: String },

    /// Audio device missing, busy, or rejected the stream configuration
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The render thread did not pick up a plan in time
    #[error("Render thread did not acknowledge plan {epoch} within {waited:?}")]
    RenderTimeout {
        epoch: u64,
        waited: std::time::Duration,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PatchError>,
    },
}

impl PatchError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PatchError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &PatchError {
        match self {
            PatchError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for patch runtime operations
pub type Result<T> = std::result::Result<T, PatchError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
