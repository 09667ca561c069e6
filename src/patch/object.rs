//! Patch object contract and the per-object slot the graph stores.
//!
//! Concrete behaviors implement `PatchObject`. The runtime calls the hooks in
//! a fixed lifecycle:
//!
//! ```text
//! Constructed ─► ContentSetup ─► { Updating ⇄ Drawing } ─► PendingRemoval ─► Destroyed
//! ```
//!
//! `setup_content` runs exactly once, after the object is in the graph and
//! its audio unit (if any) is registered. Once an object is `PendingRemoval`
//! no update or draw hook fires again.
//!
//! Optional behavior is opted into through capability queries (`capabilities`,
//! `audio_binding`) that are resolved once, when the slot is built.

use crate::audio::unit::{AudioBinding, AudioRole};
use crate::audio::AudioSettings;
use crate::patch::draw::DrawSurface;
use crate::patch::file_ops::{AsyncFileResult, FileService};
use crate::patch::graph::PeerView;
use crate::patch::id::ObjectId;
use crate::patch::payload::{Inlet, Outlet};
use crate::patch::port::{split_ports, PortDescriptor};
use crate::types::{NamedVars, Rect, Vec2};
use std::path::PathBuf;
use std::time::Duration;

/// Optional hook families an object takes part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Receives pointer move / drag input.
    pub interactive: bool,
    /// Produces audio into the render graph.
    pub audio_source: bool,
    /// Consumes audio from the render graph.
    pub audio_sink: bool,
    /// Has a unit in the render graph at all.
    pub audio_participant: bool,
}

impl Capabilities {
    pub fn interactive() -> Self {
        Self {
            interactive: true,
            ..Self::default()
        }
    }

    pub fn is_audio(&self) -> bool {
        self.audio_source || self.audio_sink || self.audio_participant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    ContentSetup,
    Updating,
    Drawing,
    PendingRemoval,
    Destroyed,
}

impl LifecycleState {
    /// Whether update/draw hooks may still run.
    pub fn is_live(self) -> bool {
        !matches!(
            self,
            LifecycleState::Constructed | LifecycleState::PendingRemoval | LifecycleState::Destroyed
        )
    }

    /// Whether new links may still target this object.
    pub fn accepts_links(self) -> bool {
        !matches!(
            self,
            LifecycleState::PendingRemoval | LifecycleState::Destroyed
        )
    }
}

/// Structural change requested by an object during a tick. Applied after the
/// draw pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredOp {
    Remove(ObjectId),
    Duplicate(ObjectId),
    Add { type_name: String, position: Vec2 },
}

/// Context for `setup_content`.
pub struct SetupContext<'a> {
    pub id: ObjectId,
    pub audio: &'a AudioSettings,
    pub inlets: &'a [Inlet],
    pub outlets: &'a [Outlet],
    pub vars: &'a mut NamedVars,
}

/// Context for `update_content`, passed every tick.
pub struct UpdateContext<'a> {
    pub id: ObjectId,
    pub tick: u64,
    pub dt: Duration,
    pub audio: &'a AudioSettings,
    pub inlets: &'a [Inlet],
    pub outlets: &'a [Outlet],
    pub vars: &'a mut NamedVars,
    /// Read-only view of every other object and the link table.
    pub peers: PeerView<'a>,
    pub(crate) requests: &'a mut Vec<DeferredOp>,
    pub(crate) files: &'a FileService,
}

impl UpdateContext<'_> {
    /// Ask for `id` to be removed once the current tick completes.
    pub fn request_removal(&mut self, id: ObjectId) {
        self.requests.push(DeferredOp::Remove(id));
    }

    pub fn request_duplicate(&mut self, id: ObjectId) {
        self.requests.push(DeferredOp::Duplicate(id));
    }

    pub fn request_add(&mut self, type_name: impl Into<String>, position: Vec2) {
        self.requests.push(DeferredOp::Add {
            type_name: type_name.into(),
            position,
        });
    }

    /// Read a file off-thread; the result arrives via `on_async_file_result`.
    pub fn open_file(&self, path: impl Into<PathBuf>) {
        self.files.open(self.id, path);
    }

    /// Write a file off-thread; completion arrives via `on_async_file_result`.
    pub fn save_file(&self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.files.save(self.id, path, bytes);
    }
}

/// Context for `draw_content`.
pub struct DrawContext<'a> {
    pub id: ObjectId,
    pub rect: Rect,
    pub inlets: &'a [Inlet],
    pub outlets: &'a [Outlet],
    pub vars: &'a NamedVars,
    pub surface: &'a mut dyn DrawSurface,
}

/// Context for input and async-result hooks.
pub struct InputContext<'a> {
    pub id: ObjectId,
    pub rect: Rect,
    pub outlets: &'a [Outlet],
    pub vars: &'a mut NamedVars,
}

/// The contract every patch object implements.
pub trait PatchObject: Send {
    /// Inlets and outlets, in order. Read once at construction.
    fn ports(&self) -> &[PortDescriptor];

    fn default_size(&self) -> Vec2 {
        Vec2::new(120.0, 60.0)
    }

    /// Seed named variables for a freshly created object. Values loaded from
    /// a patch file are applied afterwards and win.
    fn init_vars(&self, _vars: &mut NamedVars) {}

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Render-side unit for audio participants.
    fn audio_binding(&self) -> Option<AudioBinding> {
        None
    }

    /// Runs once, after construction, with shared audio context available.
    fn setup_content(&mut self, _ctx: &mut SetupContext) {}

    /// Runs every tick.
    fn update_content(&mut self, ctx: &mut UpdateContext);

    /// Runs every tick after all updates.
    fn draw_content(&mut self, _ctx: &mut DrawContext) {}

    /// Runs once, right before the object is dropped.
    fn remove_content(&mut self) {}

    fn on_pointer_moved(&mut self, _pos: Vec2, _ctx: &mut InputContext) {}

    /// Return `true` if the drag was consumed (e.g. moved a slider) rather
    /// than moving the object on the canvas.
    fn on_dragged(&mut self, _pos: Vec2, _ctx: &mut InputContext) -> bool {
        false
    }

    fn on_async_file_result(&mut self, _result: AsyncFileResult, _ctx: &mut InputContext) {}

    /// Called on the destination object when a recognized
    /// (source type, destination type) pair gets linked.
    fn on_special_connection(&mut self, _peer_type: &str, _inlet: usize) {}

    /// System objects re-read audio settings after device reconfiguration.
    fn reset_system_object(&mut self, _audio: &AudioSettings) {}
}

/// A live object in the graph: the behavior plus everything the runtime
/// tracks about it.
pub struct ObjectSlot {
    pub id: ObjectId,
    pub type_name: String,
    pub position: Vec2,
    pub size: Vec2,
    pub vars: NamedVars,
    pub state: LifecycleState,
    capabilities: Capabilities,
    inlets: Vec<Inlet>,
    outlets: Vec<Outlet>,
    audio: Option<AudioBinding>,
    pub(crate) object: Option<Box<dyn PatchObject>>,
}

impl ObjectSlot {
    /// Build a slot, sizing its ports from the object's declaration.
    pub fn new(id: ObjectId, type_name: impl Into<String>, object: Box<dyn PatchObject>) -> Self {
        let (inlet_desc, outlet_desc) = split_ports(object.ports());
        let inlets = inlet_desc.into_iter().map(Inlet::new).collect();
        let outlets = outlet_desc.into_iter().map(Outlet::new).collect();

        let audio = object.audio_binding();
        let mut capabilities = object.capabilities();
        if audio.is_some() {
            capabilities.audio_participant = true;
        }

        let mut vars = NamedVars::new();
        object.init_vars(&mut vars);

        Self {
            id,
            type_name: type_name.into(),
            position: Vec2::ZERO,
            size: object.default_size(),
            vars,
            state: LifecycleState::Constructed,
            capabilities,
            inlets,
            outlets,
            audio,
            object: Some(object),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn inlets(&self) -> &[Inlet] {
        &self.inlets
    }

    pub fn outlets(&self) -> &[Outlet] {
        &self.outlets
    }

    pub(crate) fn inlets_mut(&mut self) -> &mut [Inlet] {
        &mut self.inlets
    }

    /// Per-inlet connected flags.
    pub fn connected_flags(&self) -> Vec<bool> {
        self.inlets.iter().map(Inlet::is_connected).collect()
    }

    pub fn audio_binding(&self) -> Option<&AudioBinding> {
        self.audio.as_ref()
    }

    pub fn is_audio_device(&self) -> bool {
        matches!(&self.audio, Some(b) if b.role == AudioRole::Device)
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.position, self.size)
    }

    /// Run `f` with the behavior object and an input context. Returns `None`
    /// if the object is currently checked out (re-entrant call).
    pub(crate) fn with_input<R>(
        &mut self,
        f: impl FnOnce(&mut dyn PatchObject, &mut InputContext) -> R,
    ) -> Option<R> {
        let rect = self.rect();
        let ObjectSlot {
            id,
            object,
            outlets,
            vars,
            ..
        } = self;
        let object = object.as_mut()?;
        let mut ctx = InputContext {
            id: *id,
            rect,
            outlets,
            vars,
        };
        Some(f(object.as_mut(), &mut ctx))
    }

    pub(crate) fn object_mut(&mut self) -> Option<&mut (dyn PatchObject + 'static)> {
        self.object.as_deref_mut()
    }
}

impl std::fmt::Debug for ObjectSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSlot")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("state", &self.state)
            .field("inlets", &self.inlets.len())
            .field("outlets", &self.outlets.len())
            .finish()
    }
}
