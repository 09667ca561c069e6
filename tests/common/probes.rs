//! Instrumented patch objects for integration tests

use parking_lot::Mutex;
use patchwork_rs::audio::{
    shared_unit, AudioBinding, AudioSettings, AudioUnit, RenderInfo, SharedUnit,
};
use patchwork_rs::patch::{
    AsyncFileResult, DrawContext, InputContext, ObjectId, PatchObject, Payload, PayloadKind,
    PortDescriptor, SetupContext, UpdateContext,
};
use patchwork_rs::types::Vec2;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A hook invocation seen by a probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    Setup(ObjectId),
    Update(ObjectId),
    Draw(ObjectId),
    Remove(ObjectId),
    FileResult(ObjectId),
}

impl Hook {
    pub fn id(&self) -> ObjectId {
        match self {
            Hook::Setup(id)
            | Hook::Update(id)
            | Hook::Draw(id)
            | Hook::Remove(id)
            | Hook::FileResult(id) => *id,
        }
    }
}

pub type HookLog = Arc<Mutex<Vec<Hook>>>;

pub fn hook_log() -> HookLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// What a probe does during its update
#[derive(Debug, Clone, Default)]
pub enum Action {
    #[default]
    Nothing,
    /// Write this payload to outlet 0
    Write(Payload),
    /// Copy inlet 0 into the shared slot
    Read(Arc<Mutex<Option<Payload>>>),
    /// Request removal of an object once, then do nothing
    RemoveOnce(ObjectId),
    /// Request a new object once
    AddOnce(&'static str),
}

pub type ActionHandle = Arc<Mutex<Action>>;

pub fn action_handle() -> ActionHandle {
    Arc::new(Mutex::new(Action::Nothing))
}

/// One inlet and one outlet of a given kind; logs every hook.
pub struct Probe {
    id: Option<ObjectId>,
    ports: Vec<PortDescriptor>,
    log: HookLog,
    action: ActionHandle,
}

impl Probe {
    pub fn new(kind: PayloadKind, log: HookLog, action: ActionHandle) -> Self {
        Self {
            id: None,
            ports: vec![
                PortDescriptor::inlet("in", kind),
                PortDescriptor::outlet("out", kind),
            ],
            log,
            action,
        }
    }
}

impl PatchObject for Probe {
    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn setup_content(&mut self, ctx: &mut SetupContext) {
        self.id = Some(ctx.id);
        self.log.lock().push(Hook::Setup(ctx.id));
    }

    fn update_content(&mut self, ctx: &mut UpdateContext) {
        self.log.lock().push(Hook::Update(ctx.id));
        let current = self.action.lock().clone();
        match current {
            Action::Nothing => {}
            Action::Write(payload) => ctx.outlets[0].set(payload),
            Action::Read(slot) => *slot.lock() = Some(ctx.inlets[0].snapshot()),
            Action::RemoveOnce(target) => {
                ctx.request_removal(target);
                *self.action.lock() = Action::Nothing;
            }
            Action::AddOnce(type_name) => {
                ctx.request_add(type_name, Vec2::new(5.0, 5.0));
                *self.action.lock() = Action::Nothing;
            }
        }
    }

    fn draw_content(&mut self, ctx: &mut DrawContext) {
        self.log.lock().push(Hook::Draw(ctx.id));
    }

    fn remove_content(&mut self) {
        if let Some(id) = self.id {
            self.log.lock().push(Hook::Remove(id));
        }
    }

    fn on_async_file_result(&mut self, _result: AsyncFileResult, ctx: &mut InputContext) {
        self.log.lock().push(Hook::FileResult(ctx.id));
    }
}

/// Counts blocks processed after its owner was retired.
#[derive(Clone, Default)]
pub struct Guard {
    pub retired: Arc<AtomicBool>,
    pub violations: Arc<AtomicUsize>,
    pub blocks: Arc<AtomicUsize>,
    pub resets: Arc<AtomicUsize>,
}

struct GuardUnit {
    guard: Guard,
}

impl AudioUnit for GuardUnit {
    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], _info: &RenderInfo) {
        if self.guard.retired.load(Ordering::Acquire) {
            self.guard.violations.fetch_add(1, Ordering::Relaxed);
        }
        self.guard.blocks.fetch_add(1, Ordering::Relaxed);
        let level = inputs.first().and_then(|b| b.first()).copied().unwrap_or(0.0);
        for out in outputs.iter_mut() {
            out.fill(level + 0.25);
        }
    }
}

static GUARD_PORTS: &[PortDescriptor] = &[
    PortDescriptor::inlet("in", PayloadKind::Audio),
    PortDescriptor::outlet("out", PayloadKind::Audio),
];

/// Audio processor that flags any render after its `remove_content`.
pub struct GuardedProcessor {
    guard: Guard,
    unit: SharedUnit,
}

impl GuardedProcessor {
    pub fn new(guard: Guard) -> Self {
        let unit = shared_unit(GuardUnit {
            guard: guard.clone(),
        });
        Self { guard, unit }
    }
}

impl PatchObject for GuardedProcessor {
    fn ports(&self) -> &[PortDescriptor] {
        GUARD_PORTS
    }

    fn audio_binding(&self) -> Option<AudioBinding> {
        Some(AudioBinding::processor(self.unit.clone()))
    }

    fn update_content(&mut self, _ctx: &mut UpdateContext) {}

    fn reset_system_object(&mut self, _audio: &AudioSettings) {
        self.guard.resets.fetch_add(1, Ordering::Relaxed);
    }

    fn remove_content(&mut self) {
        self.guard.retired.store(true, Ordering::Release);
    }
}
