//! The patch graph engine.
//!
//! Objects are typed nodes with inlets and outlets; links alias an inlet to
//! an outlet's payload cell. A single-threaded runtime ticks every object in
//! creation order, and audio-capable objects additionally run inside the
//! real-time render graph owned by [`crate::audio::AudioBridge`].
//!
//! # Architecture
//!
//! ```text
//! host UI ──PatchCommand──► PatchRuntime ──RuntimeMessage──► host UI
//!                              │
//!                              ├── PatchGraph (objects + links)
//!                              ├── ObjectRegistry (type name → factory)
//!                              └── AudioBridge ──RenderPlan──► device callback
//! ```
//!
//! # Design
//!
//! - **Shared cells**: an outlet owns an `Arc<RwLock<Payload>>`; a linked inlet holds a weak alias.
//! - **Two-phase tick**: iterate a snapshot of ids, commit structural changes afterwards.
//! - **Capabilities, not subclasses**: optional hooks are resolved once per object.
//! - **Immutable render plans**: the device callback never sees a patch object.

pub mod bridge;
pub mod connection;
pub mod draw;
pub mod executor;
pub mod file;
pub mod file_ops;
pub mod graph;
pub mod id;
pub mod object;
pub mod objects;
pub mod payload;
pub mod port;
pub mod registry;

pub use bridge::{ObjectSnapshot, PatchBridge, PatchCommand, RuntimeMessage, TopologySnapshot};
pub use connection::Connections;
pub use draw::{Color, DrawCommand, DrawSurface, NullSurface, RecordingSurface};
pub use executor::{PatchRuntime, RuntimeBuilder};
pub use file::{LoadReport, PatchFile, PatchSettings, PATCH_FILE_EXTENSION};
pub use file_ops::{AsyncFileResult, FileOp};
pub use graph::{Link, PatchGraph, PeerView};
pub use id::{LinkId, ObjectId};
pub use object::{
    Capabilities, DeferredOp, DrawContext, InputContext, LifecycleState, ObjectSlot, PatchObject,
    SetupContext, UpdateContext,
};
pub use payload::{Frame, Inlet, Outlet, Payload, ScriptHandle};
pub use port::{PayloadKind, PortDescriptor, PortDirection};
pub use registry::{ObjectCategory, ObjectDescriptor, ObjectRegistry, RegistryBuilder};
