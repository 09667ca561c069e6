//! Builders for registries, runtimes and patch files

use super::probes::{Action, ActionHandle, Guard, GuardedProcessor, HookLog, Probe};
use parking_lot::Mutex;
use patchwork_rs::audio::{AudioBridge, AudioSettings};
use patchwork_rs::patch::file::{LinkRecord, ObjectRecord};
use patchwork_rs::patch::objects::register_builtins;
use patchwork_rs::patch::{
    ObjectCategory, ObjectDescriptor, ObjectId, ObjectRegistry, PatchFile, PatchRuntime,
    PayloadKind, RegistryBuilder,
};
use patchwork_rs::types::NamedVars;
use std::sync::Arc;

/// Small blocks so the offline clock acknowledges quickly
pub fn fast_audio() -> AudioSettings {
    AudioSettings {
        sample_rate: 48_000,
        buffer_size: 64,
        channels: 1,
    }
}

fn probe_descriptor(name: &'static str) -> ObjectDescriptor {
    ObjectDescriptor {
        type_name: name,
        category: ObjectCategory::Data,
        description: "test probe",
        singleton: false,
    }
}

/// Builtins plus instrumented probe types
pub struct TestRegistry {
    builder: RegistryBuilder,
    log: HookLog,
}

impl TestRegistry {
    pub fn new(log: HookLog) -> Self {
        Self {
            builder: register_builtins(RegistryBuilder::new()),
            log,
        }
    }

    /// Register a probe type; every instance shares `action`
    pub fn probe(self, name: &'static str, kind: PayloadKind, action: Action) -> Self {
        self.probe_with(name, kind, Arc::new(Mutex::new(action)))
    }

    /// Like `probe`, keeping a handle so the action can change later
    pub fn probe_with(mut self, name: &'static str, kind: PayloadKind, action: ActionHandle) -> Self {
        let log = self.log.clone();
        self.builder = self.builder.register(probe_descriptor(name), move || {
            Box::new(Probe::new(kind, log.clone(), action.clone()))
        });
        self
    }

    /// Register a guard-instrumented audio processor type
    pub fn guarded(mut self, name: &'static str, guard: Guard) -> Self {
        self.builder = self.builder.register(probe_descriptor(name), move || {
            Box::new(GuardedProcessor::new(guard.clone()))
        });
        self
    }

    pub fn build(self) -> Arc<ObjectRegistry> {
        Arc::new(self.builder.build())
    }

    /// Runtime on the offline clock with this registry
    pub fn runtime(self) -> PatchRuntime {
        PatchRuntime::new(self.build(), AudioBridge::offline(fast_audio()))
    }
}

/// Builder for hand-written patch files
#[derive(Default)]
pub struct PatchFileBuilder {
    file: PatchFile,
}

impl PatchFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(mut self, id: u32, type_name: &str, x: f32, y: f32) -> Self {
        self.file.objects.push(ObjectRecord {
            id: ObjectId(id),
            type_name: type_name.to_string(),
            x,
            y,
            width: 100.0,
            height: 40.0,
            vars: NamedVars::new(),
        });
        self
    }

    pub fn var(mut self, name: &str, value: f32) -> Self {
        if let Some(last) = self.file.objects.last_mut() {
            last.vars.set(name, value);
        }
        self
    }

    pub fn link(mut self, from: u32, from_outlet: usize, to: u32, to_inlet: usize, kind: PayloadKind) -> Self {
        self.file.links.push(LinkRecord {
            from_id: ObjectId(from),
            from_outlet,
            to_id: ObjectId(to),
            to_inlet,
            kind,
        });
        self
    }

    pub fn build(self) -> PatchFile {
        self.file
    }
}
