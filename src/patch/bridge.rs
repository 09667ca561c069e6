//! Thread boundary between a host UI and the patch runtime.
//!
//! The host holds a `PatchBridge`; the runtime thread owns the command
//! receiver and the message sender. Every runtime operation has a command,
//! and every state change the host may care about comes back as a message.

use crate::audio::{AudioDeviceInfo, AudioStatus};
use crate::patch::file::LoadReport;
use crate::patch::graph::Link;
use crate::patch::id::{LinkId, ObjectId};
use crate::patch::port::PayloadKind;
use crate::types::{NamedVars, Vec2};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::PathBuf;

/// Snapshot of a single live object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSnapshot {
    pub id: ObjectId,
    pub type_name: String,
    pub position: Vec2,
    pub size: Vec2,
    pub inlets: Vec<PayloadKind>,
    pub outlets: Vec<PayloadKind>,
    pub connected: Vec<bool>,
    pub vars: NamedVars,
}

/// Complete topology of the active patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologySnapshot {
    pub objects: Vec<ObjectSnapshot>,
    pub links: Vec<Link>,
    pub selected: Option<ObjectId>,
}

/// Commands sent from the host to the runtime.
#[derive(Debug, Clone)]
pub enum PatchCommand {
    AddObject { type_name: String, position: Vec2 },
    RemoveObject(ObjectId),
    DeleteSelectedObject,
    DuplicateObject(ObjectId),
    ResetObject(ObjectId),
    ReconnectOutlets(ObjectId),
    Connect {
        from: ObjectId,
        from_outlet: usize,
        to: ObjectId,
        to_inlet: usize,
        kind: PayloadKind,
    },
    Disconnect(LinkId),
    SelectObject(Option<ObjectId>),
    DragObject { id: ObjectId, position: Vec2 },
    PointerMoved(Vec2),
    NewPatch,
    OpenPatch(PathBuf),
    NewTempPatchFromFile(PathBuf),
    SavePatch,
    SavePatchAs(PathBuf),
    OpenLastPatch,
    SavePatchAsLast,
    SetPatchVariable { name: String, value: f32 },
    SetAudioInDevice(usize),
    SetAudioOutDevice(usize),
    ActivateDsp,
    DeactivateDsp,
    ResetSystemObjects,
    ResetSpecificSystemObjects(String),
    ListObjectTypes,
    ListDevices,
    RequestTopology,
    Shutdown,
}

/// Messages sent from the runtime back to the host.
#[derive(Debug, Clone)]
pub enum RuntimeMessage {
    ObjectAdded { id: ObjectId, type_name: String },
    ObjectRemoved(ObjectId),
    LinkAdded(Link),
    LinkRemoved(LinkId),
    Selected(Option<ObjectId>),
    PatchLoaded { path: Option<PathBuf>, report: LoadReport },
    PatchSaved(PathBuf),
    ObjectTypes(Vec<String>),
    Devices(Vec<AudioDeviceInfo>),
    Audio(AudioStatus),
    Topology(TopologySnapshot),
    Error(String),
    Shutdown,
}

const CMD_CHANNEL_CAPACITY: usize = 256;
const MSG_CHANNEL_CAPACITY: usize = 4_096;

/// Host-side handle for talking to the runtime thread.
pub struct PatchBridge {
    pub cmd_tx: Sender<PatchCommand>,
    pub msg_rx: Receiver<RuntimeMessage>,
}

impl PatchBridge {
    /// Create `(bridge_for_host, cmd_rx, msg_tx)`. The runtime owns the last two.
    pub fn new() -> (Self, Receiver<PatchCommand>, Sender<RuntimeMessage>) {
        let (cmd_tx, cmd_rx) = bounded(CMD_CHANNEL_CAPACITY);
        let (msg_tx, msg_rx) = bounded(MSG_CHANNEL_CAPACITY);
        (Self { cmd_tx, msg_rx }, cmd_rx, msg_tx)
    }

    /// Drain all pending messages.
    pub fn drain(&self) -> Vec<RuntimeMessage> {
        let mut msgs = Vec::new();
        while let Ok(msg) = self.msg_rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    pub fn try_recv(&self) -> Option<RuntimeMessage> {
        self.msg_rx.try_recv().ok()
    }

    pub fn send_command(&self, cmd: PatchCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    pub fn add_object(&self, type_name: impl Into<String>, position: Vec2) {
        let _ = self.cmd_tx.send(PatchCommand::AddObject {
            type_name: type_name.into(),
            position,
        });
    }

    pub fn remove_object(&self, id: ObjectId) {
        let _ = self.cmd_tx.send(PatchCommand::RemoveObject(id));
    }

    pub fn connect(&self, from: ObjectId, from_outlet: usize, to: ObjectId, to_inlet: usize, kind: PayloadKind) {
        let _ = self.cmd_tx.send(PatchCommand::Connect {
            from,
            from_outlet,
            to,
            to_inlet,
            kind,
        });
    }

    pub fn open_patch(&self, path: impl Into<PathBuf>) {
        let _ = self.cmd_tx.send(PatchCommand::OpenPatch(path.into()));
    }

    pub fn save_patch_as(&self, path: impl Into<PathBuf>) {
        let _ = self.cmd_tx.send(PatchCommand::SavePatchAs(path.into()));
    }

    pub fn request_topology(&self) {
        let _ = self.cmd_tx.send(PatchCommand::RequestTopology);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(PatchCommand::Shutdown);
    }
}
