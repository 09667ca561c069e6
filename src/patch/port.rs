//! Port descriptors for patch objects.
//!
//! Each object declares its inlets and outlets via a static `PortDescriptor`
//! array. The connection manager uses the declared kinds to validate links.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of payload flowing through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// A single float.
    Numeric,
    /// A sequence of floats.
    Array,
    /// A UTF-8 string.
    Text,
    /// An image / frame buffer.
    Texture,
    /// One block of audio samples.
    Audio,
    /// Opaque handle owned by a scripting host.
    Script,
}

impl PayloadKind {
    /// Get all payload kinds.
    pub fn all() -> &'static [PayloadKind] {
        &[
            PayloadKind::Numeric,
            PayloadKind::Array,
            PayloadKind::Text,
            PayloadKind::Texture,
            PayloadKind::Audio,
            PayloadKind::Script,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Numeric => "numeric",
            PayloadKind::Array => "array",
            PayloadKind::Text => "text",
            PayloadKind::Texture => "texture",
            PayloadKind::Audio => "audio",
            PayloadKind::Script => "script",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a port is an inlet or an outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Inlet,
    Outlet,
}

/// Static descriptor for an object's port.
#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub name: &'static str,
    pub direction: PortDirection,
    pub kind: PayloadKind,
}

impl PortDescriptor {
    pub const fn inlet(name: &'static str, kind: PayloadKind) -> Self {
        Self {
            name,
            direction: PortDirection::Inlet,
            kind,
        }
    }

    pub const fn outlet(name: &'static str, kind: PayloadKind) -> Self {
        Self {
            name,
            direction: PortDirection::Outlet,
            kind,
        }
    }
}

/// Split a port list into (inlets, outlets), preserving declaration order.
pub fn split_ports(ports: &[PortDescriptor]) -> (Vec<&PortDescriptor>, Vec<&PortDescriptor>) {
    ports
        .iter()
        .partition(|p| p.direction == PortDirection::Inlet)
}
