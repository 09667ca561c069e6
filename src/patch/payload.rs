//! Shared payload cells: the communication bus between patch objects.
//!
//! Each outlet owns exactly one `SharedCell`. A connected inlet does not copy
//! anything: it keeps a weak reference to the producing outlet's cell, so the
//! consumer observes whatever the producer last wrote, in the same frame,
//! regardless of evaluation order. When the inlet is disconnected it falls
//! back to its own private cell, which holds a stable "no input" value.
//!
//! The outlet is the sole strong owner of its cell (the audio render plan
//! may also hold one to publish blocks). Inlets never keep a producer cell
//! alive.

use crate::patch::port::{PayloadKind, PortDescriptor};
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::{Arc, Weak};

/// One mutable payload slot shared between an outlet and its inlets.
pub type SharedCell = Arc<RwLock<Payload>>;

/// RGBA8 frame buffer carried by texture ports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Create a black frame of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Opaque handle into a scripting host. `0` means "no script".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub u64);

/// Tagged payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Numeric(f32),
    Array(Vec<f32>),
    Text(String),
    Texture(Frame),
    Audio(Vec<f32>),
    Script(ScriptHandle),
}

impl Payload {
    /// The "no input" value for a kind.
    pub fn empty(kind: PayloadKind) -> Self {
        match kind {
            PayloadKind::Numeric => Payload::Numeric(0.0),
            PayloadKind::Array => Payload::Array(Vec::new()),
            PayloadKind::Text => Payload::Text(String::new()),
            PayloadKind::Texture => Payload::Texture(Frame::default()),
            PayloadKind::Audio => Payload::Audio(Vec::new()),
            PayloadKind::Script => Payload::Script(ScriptHandle::default()),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Numeric(_) => PayloadKind::Numeric,
            Payload::Array(_) => PayloadKind::Array,
            Payload::Text(_) => PayloadKind::Text,
            Payload::Texture(_) => PayloadKind::Texture,
            Payload::Audio(_) => PayloadKind::Audio,
            Payload::Script(_) => PayloadKind::Script,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Payload::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Sample data of an array or audio payload.
    pub fn as_samples(&self) -> Option<&[f32]> {
        match self {
            Payload::Array(v) | Payload::Audio(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Payload::Texture(f) => Some(f),
            _ => None,
        }
    }
}

/// Create a fresh cell holding the empty value of `kind`.
pub fn new_cell(kind: PayloadKind) -> SharedCell {
    Arc::new(RwLock::new(Payload::empty(kind)))
}

/// Producer side of a port. Owns the payload cell.
#[derive(Debug)]
pub struct Outlet {
    name: &'static str,
    kind: PayloadKind,
    cell: SharedCell,
}

impl Outlet {
    pub fn new(descriptor: &PortDescriptor) -> Self {
        Self {
            name: descriptor.name,
            kind: descriptor.kind,
            cell: new_cell(descriptor.kind),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn cell(&self) -> &SharedCell {
        &self.cell
    }

    /// Replace the payload. Values of the wrong kind are dropped.
    pub fn set(&self, payload: Payload) {
        if payload.kind() != self.kind {
            tracing::warn!(
                "Outlet '{}' ({}) refused a {} payload",
                self.name,
                self.kind,
                payload.kind()
            );
            return;
        }
        *self.cell.write() = payload;
    }

    /// Shorthand for numeric outlets.
    pub fn set_float(&self, value: f32) {
        self.set(Payload::Numeric(value));
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Payload> {
        self.cell.read()
    }

    /// In-place access to the samples of an array or audio outlet, reusing
    /// the allocation. `None` on any other kind; the payload variant itself
    /// cannot be changed through here.
    pub fn with_samples_mut<R>(&self, f: impl FnOnce(&mut Vec<f32>) -> R) -> Option<R> {
        let mut payload = self.cell.write();
        match &mut *payload {
            Payload::Array(v) | Payload::Audio(v) => Some(f(v)),
            _ => None,
        }
    }
}

/// Consumer side of a port. Aliases the connected outlet's cell.
#[derive(Debug)]
pub struct Inlet {
    name: &'static str,
    kind: PayloadKind,
    own: SharedCell,
    source: Option<Weak<RwLock<Payload>>>,
}

impl Inlet {
    pub fn new(descriptor: &PortDescriptor) -> Self {
        Self {
            name: descriptor.name,
            kind: descriptor.kind,
            own: new_cell(descriptor.kind),
            source: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// True while a link targets this inlet.
    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// The cell currently observed: the producer's cell while connected,
    /// otherwise the private default cell.
    pub fn cell(&self) -> SharedCell {
        self.source
            .as_ref()
            .and_then(Weak::upgrade)
            .unwrap_or_else(|| self.own.clone())
    }

    /// Run `f` against the current payload without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&Payload) -> R) -> R {
        let cell = self.cell();
        let guard = cell.read();
        f(&guard)
    }

    /// Clone the current payload.
    pub fn snapshot(&self) -> Payload {
        self.with(Payload::clone)
    }

    pub fn float(&self) -> Option<f32> {
        self.with(Payload::as_float)
    }

    /// Set the value observed while nothing is connected.
    pub fn set_default(&self, payload: Payload) {
        if payload.kind() == self.kind {
            *self.own.write() = payload;
        }
    }

    pub(crate) fn alias(&mut self, cell: &SharedCell) {
        self.source = Some(Arc::downgrade(cell));
    }

    pub(crate) fn unalias(&mut self) {
        self.source = None;
    }
}
