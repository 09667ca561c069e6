//! Patch runtime: the frame scheduler and every graph-level operation.
//!
//! The runtime runs on one thread. Each tick:
//! 1. Deliver finished off-thread file results to their owners.
//! 2. Update every live object, in creation order, over a snapshot of ids.
//! 3. Draw every live object, same order.
//! 4. Commit structural changes the objects requested during 2.
//!
//! Objects that ask for a removal are marked `PendingRemoval` right away, so
//! a doomed object is neither updated nor drawn again, even later in the same
//! tick.

use crate::audio::backend::{AudioBackend, AudioDeviceInfo, OfflineBackend};
use crate::audio::bridge::{AudioBridge, AudioStatus};
use crate::audio::cpal_backend::CpalBackend;
use crate::config::{AppState, BackendKind, RuntimeConfig};
use crate::error::{PatchError, Result, ResultExt};
use crate::patch::bridge::{ObjectSnapshot, PatchCommand, RuntimeMessage, TopologySnapshot};
use crate::patch::connection::Connections;
use crate::patch::draw::{DrawSurface, NullSurface};
use crate::patch::file::{LoadReport, ObjectRecord, PatchFile, PatchSettings, LinkRecord};
use crate::patch::file_ops::{FileResultMsg, FileService};
use crate::patch::graph::{Link, PatchGraph, PeerView};
use crate::patch::id::{LinkId, ObjectId};
use crate::patch::object::{
    DeferredOp, DrawContext, LifecycleState, ObjectSlot, SetupContext, UpdateContext,
};
use crate::patch::port::PayloadKind;
use crate::patch::registry::ObjectRegistry;
use crate::types::{NamedVars, Vec2};
use crossbeam_channel::{Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Canvas offset applied to duplicated objects.
const DUPLICATE_OFFSET: f32 = 20.0;

pub struct PatchRuntime {
    registry: Arc<ObjectRegistry>,
    graph: PatchGraph,
    audio: AudioBridge,
    settings: PatchSettings,
    deferred: Vec<DeferredOp>,
    files: FileService,
    file_rx: Receiver<FileResultMsg>,
    surface: Box<dyn DrawSurface>,
    msg_tx: Option<Sender<RuntimeMessage>>,
    app_state: Option<(AppState, PathBuf)>,
    current_patch: Option<PathBuf>,
    selected: Option<ObjectId>,
    tick: u64,
    fps: u32,
    last_tick_time: Option<Instant>,
}

impl PatchRuntime {
    pub fn new(registry: Arc<ObjectRegistry>, audio: AudioBridge) -> Self {
        let (files, file_rx) = FileService::new();
        let settings = PatchSettings {
            audio: *audio.settings(),
            ..PatchSettings::default()
        };
        Self {
            registry,
            graph: PatchGraph::new(),
            audio,
            settings,
            deferred: Vec::new(),
            files,
            file_rx,
            surface: Box::new(NullSurface),
            msg_tx: None,
            app_state: None,
            current_patch: None,
            selected: None,
            tick: 0,
            fps: crate::config::DEFAULT_FPS,
            last_tick_time: None,
        }
    }

    /// Built-in registry on the offline clock. Handy for tests and tools.
    pub fn headless() -> Self {
        Self::new(
            ObjectRegistry::builtin(),
            AudioBridge::offline(Default::default()),
        )
    }

    // ── Accessors ──

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &PatchGraph {
        &self.graph
    }

    pub fn object(&self, id: ObjectId) -> Option<&ObjectSlot> {
        self.graph.get(id)
    }

    pub fn audio(&self) -> &AudioBridge {
        &self.audio
    }

    pub fn settings(&self) -> &PatchSettings {
        &self.settings
    }

    pub fn current_patch(&self) -> Option<&Path> {
        self.current_patch.as_deref()
    }

    pub fn selected(&self) -> Option<ObjectId> {
        self.selected
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn app_state(&self) -> Option<&AppState> {
        self.app_state.as_ref().map(|(s, _)| s)
    }

    pub fn set_surface(&mut self, surface: Box<dyn DrawSurface>) {
        self.surface = surface;
    }

    pub fn set_message_sender(&mut self, msg_tx: Sender<RuntimeMessage>) {
        self.msg_tx = Some(msg_tx);
    }

    /// Track recent patches in `state`, persisted to `path` on change.
    pub fn set_app_state(&mut self, state: AppState, path: PathBuf) {
        self.app_state = Some((state, path));
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
    }

    fn emit(&self, msg: RuntimeMessage) {
        if let Some(tx) = &self.msg_tx {
            if tx.try_send(msg).is_err() {
                tracing::trace!("Host message queue full, dropping message");
            }
        }
    }

    fn connections(&mut self) -> Connections<'_> {
        Connections {
            graph: &mut self.graph,
            audio: &mut self.audio,
            registry: &self.registry,
        }
    }

    // ── Object lifecycle ──

    /// Create an object by type name and place it at `position`.
    pub fn add_object(&mut self, type_name: &str, position: Vec2) -> Result<ObjectId> {
        self.spawn(type_name, position, None, None)
    }

    fn spawn(
        &mut self,
        type_name: &str,
        position: Vec2,
        size: Option<Vec2>,
        vars: Option<&NamedVars>,
    ) -> Result<ObjectId> {
        if let Some(desc) = self.registry.descriptor(type_name) {
            if desc.singleton && self.graph.count_of_type(type_name) > 0 {
                return Err(PatchError::SingletonExists(type_name.to_string()));
            }
        }
        let object = self.registry.create(type_name)?;

        let id = ObjectId::next();
        let mut slot = ObjectSlot::new(id, type_name, object);
        slot.position = position;
        if let Some(size) = size {
            slot.size = size;
        }
        if let Some(vars) = vars {
            for (key, value) in vars.iter() {
                slot.vars.set(key, value);
            }
        }

        if let Some(binding) = slot.audio_binding().cloned() {
            let inputs = slot
                .inlets()
                .iter()
                .filter(|i| i.kind() == PayloadKind::Audio)
                .count();
            let cells = slot
                .outlets()
                .iter()
                .filter(|o| o.kind() == PayloadKind::Audio)
                .map(|o| o.cell().clone())
                .collect();
            self.audio.register(id, &binding, inputs, cells);
        }
        self.graph.insert(slot);
        self.setup_object(id);

        tracing::info!("Added object {} '{}'", id, type_name);
        self.emit(RuntimeMessage::ObjectAdded {
            id,
            type_name: type_name.to_string(),
        });
        Ok(id)
    }

    fn setup_object(&mut self, id: ObjectId) {
        let audio = *self.audio.settings();
        let Some(slot) = self.graph.get_mut(id) else {
            return;
        };
        let Some(mut object) = slot.object.take() else {
            return;
        };
        let mut vars = std::mem::take(&mut slot.vars);
        {
            let mut ctx = SetupContext {
                id,
                audio: &audio,
                inlets: slot.inlets(),
                outlets: slot.outlets(),
                vars: &mut vars,
            };
            object.setup_content(&mut ctx);
        }
        slot.vars = vars;
        slot.object = Some(object);
        slot.state = LifecycleState::ContentSetup;
    }

    /// Sever every link, retire the audio unit, run `remove_content` and drop
    /// the object. No hook fires on it after this returns.
    pub fn remove_object(&mut self, id: ObjectId) -> Result<()> {
        let slot = self
            .graph
            .get_mut(id)
            .ok_or_else(|| PatchError::InvalidEndpoint(format!("object {} is not live", id)))?;
        slot.state = LifecycleState::PendingRemoval;

        let severed = self.connections().sever(id);
        for link in &severed {
            self.emit(RuntimeMessage::LinkRemoved(link.id));
        }
        if let Err(e) = self.audio.unregister(id) {
            tracing::warn!("Removing {} without a render acknowledgement: {}", id, e);
            self.emit(RuntimeMessage::Error(e.to_string()));
        }

        if let Some(mut slot) = self.graph.take(id) {
            if let Some(object) = slot.object_mut() {
                object.remove_content();
            }
            slot.state = LifecycleState::Destroyed;
            tracing::info!(
                "Removed object {} '{}' ({} links)",
                id,
                slot.type_name,
                severed.len()
            );
        }
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.emit(RuntimeMessage::ObjectRemoved(id));
        Ok(())
    }

    /// Remove the selected object, if any. Returns the removed id.
    pub fn delete_selected_object(&mut self) -> Result<Option<ObjectId>> {
        let Some(id) = self.selected else {
            return Ok(None);
        };
        self.remove_object(id)?;
        Ok(Some(id))
    }

    /// Copy an object's type, size and variables into a new, unlinked object.
    pub fn duplicate_object(&mut self, id: ObjectId) -> Result<ObjectId> {
        let slot = self
            .graph
            .get(id)
            .ok_or_else(|| PatchError::InvalidEndpoint(format!("object {} is not live", id)))?;
        let type_name = slot.type_name.clone();
        let position = slot.position.offset(DUPLICATE_OFFSET, DUPLICATE_OFFSET);
        let size = slot.size;
        let vars = slot.vars.clone();
        self.spawn(&type_name, position, Some(size), Some(&vars))
            .with_context(|| format!("Failed to duplicate {}", id))
    }

    /// Re-run content setup on an object and re-alias its consumers.
    pub fn reset_object(&mut self, id: ObjectId) -> Result<()> {
        if !self.graph.contains(id) {
            return Err(PatchError::InvalidEndpoint(format!("object {} is not live", id)));
        }
        self.setup_object(id);
        self.reconnect_outlets(id)?;
        tracing::debug!("Reset object {}", id);
        Ok(())
    }

    /// Point every inlet fed by `id` at that outlet's current cell.
    pub fn reconnect_outlets(&mut self, id: ObjectId) -> Result<usize> {
        if !self.graph.contains(id) {
            return Err(PatchError::InvalidEndpoint(format!("object {} is not live", id)));
        }
        Ok(self.graph.realias_from(id))
    }

    // ── Links ──

    pub fn connect(
        &mut self,
        from: ObjectId,
        from_outlet: usize,
        to: ObjectId,
        to_inlet: usize,
        kind: PayloadKind,
    ) -> Result<LinkId> {
        let result = self
            .connections()
            .connect(from, from_outlet, to, to_inlet, kind);
        match &result {
            Ok(link) => {
                if let Some(link) = self.graph.link(*link).copied() {
                    self.emit(RuntimeMessage::LinkAdded(link));
                }
            }
            Err(e) => tracing::warn!("Refused link {}:{} -> {}:{}: {}", from, from_outlet, to, to_inlet, e),
        }
        result
    }

    pub fn disconnect(&mut self, link: LinkId) -> Result<Link> {
        let removed = self.connections().disconnect(link)?;
        self.emit(RuntimeMessage::LinkRemoved(link));
        Ok(removed)
    }

    // ── Selection and input ──

    pub fn select_object(&mut self, id: Option<ObjectId>) -> Result<()> {
        if let Some(id) = id {
            if !self.graph.contains(id) {
                return Err(PatchError::InvalidEndpoint(format!("object {} is not live", id)));
            }
        }
        self.selected = id;
        self.emit(RuntimeMessage::Selected(id));
        Ok(())
    }

    /// Live objects of a type, in creation order.
    pub fn objects_of_type(&self, type_name: &str) -> Vec<ObjectId> {
        self.graph
            .iter()
            .filter(|s| s.type_name == type_name)
            .map(|s| s.id)
            .collect()
    }

    /// Route a drag to an interactive object; move it if the object does not
    /// consume the drag.
    pub fn drag_object(&mut self, id: ObjectId, position: Vec2) -> Result<()> {
        let slot = self
            .graph
            .get_mut(id)
            .ok_or_else(|| PatchError::InvalidEndpoint(format!("object {} is not live", id)))?;
        let consumed = slot.capabilities().interactive
            && slot.state.is_live()
            && slot
                .with_input(|object, ctx| object.on_dragged(position, ctx))
                .unwrap_or(false);
        if !consumed {
            slot.position = position;
        }
        Ok(())
    }

    /// Deliver pointer motion to the topmost interactive object under it.
    pub fn pointer_moved(&mut self, position: Vec2) -> Option<ObjectId> {
        let hit = self
            .graph
            .iter()
            .filter(|s| s.capabilities().interactive && s.state.is_live())
            .filter(|s| s.rect().contains(position))
            .map(|s| s.id)
            .last()?;
        if let Some(slot) = self.graph.get_mut(hit) {
            slot.with_input(|object, ctx| object.on_pointer_moved(position, ctx));
        }
        Some(hit)
    }

    // ── Frame scheduling ──

    /// Run one frame: async results, update pass, draw pass, deferred commits.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let dt = self
            .last_tick_time
            .map(|t| now.duration_since(t))
            .unwrap_or(Duration::ZERO);
        self.last_tick_time = Some(now);

        self.deliver_file_results();

        let ids = self.graph.ids();
        for &id in &ids {
            self.update_one(id, dt);
        }
        for &id in &ids {
            self.draw_one(id);
        }
        self.commit_deferred();

        self.tick += 1;
    }

    fn deliver_file_results(&mut self) {
        while let Ok((owner, result)) = self.file_rx.try_recv() {
            match self.graph.get_mut(owner).filter(|s| s.state.is_live()) {
                Some(slot) => {
                    slot.with_input(|object, ctx| object.on_async_file_result(result, ctx));
                }
                None => tracing::debug!("Dropping file result for retired object {}", owner),
            }
        }
    }

    fn update_one(&mut self, id: ObjectId, dt: Duration) {
        let Some(slot) = self.graph.get_mut(id) else {
            return;
        };
        if !slot.state.is_live() {
            return;
        }
        let Some(mut object) = slot.object.take() else {
            return;
        };
        slot.state = LifecycleState::Updating;
        let mut vars = std::mem::take(&mut slot.vars);
        let first_request = self.deferred.len();

        if let Some(slot) = self.graph.get(id) {
            let audio = *self.audio.settings();
            let mut ctx = UpdateContext {
                id,
                tick: self.tick,
                dt,
                audio: &audio,
                inlets: slot.inlets(),
                outlets: slot.outlets(),
                vars: &mut vars,
                peers: PeerView::new(&self.graph, id),
                requests: &mut self.deferred,
                files: &self.files,
            };
            object.update_content(&mut ctx);
        }

        if let Some(slot) = self.graph.get_mut(id) {
            slot.vars = vars;
            slot.object = Some(object);
        }

        for op in &self.deferred[first_request..] {
            if let DeferredOp::Remove(target) = op {
                if let Some(slot) = self.graph.get_mut(*target) {
                    slot.state = LifecycleState::PendingRemoval;
                }
            }
        }
    }

    fn draw_one(&mut self, id: ObjectId) {
        let Some(slot) = self.graph.get_mut(id) else {
            return;
        };
        if !slot.state.is_live() {
            return;
        }
        let Some(mut object) = slot.object.take() else {
            return;
        };
        slot.state = LifecycleState::Drawing;

        if let Some(slot) = self.graph.get(id) {
            let mut ctx = DrawContext {
                id,
                rect: slot.rect(),
                inlets: slot.inlets(),
                outlets: slot.outlets(),
                vars: &slot.vars,
                surface: self.surface.as_mut(),
            };
            object.draw_content(&mut ctx);
        }

        if let Some(slot) = self.graph.get_mut(id) {
            slot.object = Some(object);
        }
    }

    fn commit_deferred(&mut self) {
        for op in std::mem::take(&mut self.deferred) {
            let outcome = match &op {
                DeferredOp::Remove(id) if self.graph.contains(*id) => self.remove_object(*id),
                DeferredOp::Remove(_) => Ok(()),
                DeferredOp::Duplicate(id) => self.duplicate_object(*id).map(|_| ()),
                DeferredOp::Add {
                    type_name,
                    position,
                } => self.add_object(type_name, *position).map(|_| ()),
            };
            if let Err(e) = outcome {
                tracing::warn!("Deferred {:?} failed: {}", op, e);
                self.emit(RuntimeMessage::Error(e.to_string()));
            }
        }
    }

    // ── Patches ──

    /// Tear down the active graph and start an empty patch.
    pub fn new_patch(&mut self) {
        self.clear_graph();
        self.settings = PatchSettings {
            audio: *self.audio.settings(),
            ..PatchSettings::default()
        };
        self.current_patch = None;
        tracing::info!("New patch");
        self.emit(RuntimeMessage::PatchLoaded {
            path: None,
            report: LoadReport::default(),
        });
    }

    fn clear_graph(&mut self) {
        for id in self.graph.ids() {
            if let Err(e) = self.remove_object(id) {
                tracing::warn!("Failed to remove {} during teardown: {}", id, e);
            }
        }
        self.deferred.clear();
        self.selected = None;
    }

    /// Load a patch file, replacing the active patch.
    ///
    /// The file is fully parsed before anything is torn down, so a missing or
    /// malformed file leaves the current patch untouched.
    pub fn open_patch(&mut self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let path = path.as_ref();
        let file = PatchFile::load(path)?;

        self.clear_graph();
        let mut report = self.instantiate(file);
        report.path = Some(path.to_path_buf());
        self.current_patch = Some(path.to_path_buf());
        self.remember_patch(path);

        tracing::info!(
            "Loaded patch {:?}: {} objects, {} links, {} skipped, {} links refused",
            path,
            report.objects_loaded,
            report.links_loaded,
            report.skipped.len(),
            report.links_refused
        );
        self.emit(RuntimeMessage::PatchLoaded {
            path: Some(path.to_path_buf()),
            report: report.clone(),
        });
        Ok(report)
    }

    /// Load a patch file as a template: the graph is replaced but the result
    /// stays untitled, so the next save needs a path and the template file is
    /// never overwritten.
    pub fn new_temp_patch_from_file(&mut self, path: impl AsRef<Path>) -> Result<LoadReport> {
        let path = path.as_ref();
        let file = PatchFile::load(path)?;

        self.clear_graph();
        let report = self.instantiate(file);
        self.current_patch = None;

        tracing::info!(
            "New patch from template {:?}: {} objects, {} links",
            path,
            report.objects_loaded,
            report.links_loaded
        );
        self.emit(RuntimeMessage::PatchLoaded {
            path: None,
            report: report.clone(),
        });
        Ok(report)
    }

    fn instantiate(&mut self, file: PatchFile) -> LoadReport {
        let mut report = LoadReport::default();

        if let Err(e) = self.apply_settings(file.settings) {
            tracing::warn!("Patch audio settings not applied: {}", e);
        }

        for record in &file.objects {
            if !self.registry.contains(&record.type_name) {
                tracing::warn!(
                    "Skipping object {} of unknown type '{}'",
                    record.id,
                    record.type_name
                );
                report.skipped.push((record.id, record.type_name.clone()));
                continue;
            }
            match self.spawn(
                &record.type_name,
                record.position(),
                record.size(),
                Some(&record.vars),
            ) {
                Ok(id) => {
                    report.id_map.insert(record.id, id);
                    report.objects_loaded += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping object {}: {}", record.id, e);
                    report.skipped.push((record.id, record.type_name.clone()));
                }
            }
        }

        for record in &file.links {
            let (Some(&from), Some(&to)) = (
                report.id_map.get(&record.from_id),
                report.id_map.get(&record.to_id),
            ) else {
                tracing::warn!(
                    "Skipping link {}:{} -> {}:{} with a missing endpoint",
                    record.from_id,
                    record.from_outlet,
                    record.to_id,
                    record.to_inlet
                );
                report.links_refused += 1;
                continue;
            };
            let live_kind = self
                .graph
                .get(from)
                .and_then(|s| s.outlets().get(record.from_outlet))
                .map(|o| o.kind())
                .unwrap_or(record.kind);
            if live_kind != record.kind {
                tracing::warn!(
                    "Link {}:{} saved as {} but the outlet is now {}",
                    record.from_id,
                    record.from_outlet,
                    record.kind,
                    live_kind
                );
            }
            match self.connect(from, record.from_outlet, to, record.to_inlet, live_kind) {
                Ok(_) => report.links_loaded += 1,
                Err(_) => report.links_refused += 1,
            }
        }

        report
    }

    /// Serialize the live graph.
    pub fn to_patch_file(&self) -> PatchFile {
        PatchFile {
            version: crate::patch::file::PATCH_FILE_VERSION,
            settings: self.settings.clone(),
            objects: self
                .graph
                .iter()
                .map(|s| ObjectRecord {
                    id: s.id,
                    type_name: s.type_name.clone(),
                    x: s.position.x,
                    y: s.position.y,
                    width: s.size.x,
                    height: s.size.y,
                    vars: s.vars.clone(),
                })
                .collect(),
            links: self
                .graph
                .links()
                .iter()
                .map(|l| LinkRecord {
                    from_id: l.from,
                    from_outlet: l.from_outlet,
                    to_id: l.to,
                    to_inlet: l.to_inlet,
                    kind: l.kind,
                })
                .collect(),
        }
    }

    /// Save to the current patch path.
    pub fn save_patch(&mut self) -> Result<PathBuf> {
        let path = self.current_patch.clone().ok_or_else(|| {
            PatchError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "untitled patch has no file path",
            ))
        })?;
        self.save_patch_as(&path)?;
        Ok(path)
    }

    pub fn save_patch_as(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.to_patch_file()
            .save(path)
            .with_context(|| format!("Failed to save patch to {:?}", path))?;
        self.current_patch = Some(path.to_path_buf());
        self.remember_patch(path);
        tracing::info!("Saved patch {:?} ({} objects)", path, self.graph.len());
        self.emit(RuntimeMessage::PatchSaved(path.to_path_buf()));
        Ok(())
    }

    /// Reopen the patch recorded as last in the app state.
    pub fn open_last_patch(&mut self) -> Result<LoadReport> {
        let last = self
            .app_state
            .as_ref()
            .and_then(|(s, _)| s.last_patch_path.clone())
            .ok_or_else(|| PatchError::FileNotFound(PathBuf::new()))?;
        self.open_patch(last)
    }

    /// Save the current patch (if it has a path) and record it as last.
    pub fn save_patch_as_last(&mut self) -> Result<()> {
        if self.current_patch.is_some() {
            self.save_patch()?;
        }
        if let (Some(path), Some((state, _))) = (self.current_patch.clone(), self.app_state.as_mut()) {
            state.last_patch_path = Some(path);
        }
        self.persist_app_state();
        Ok(())
    }

    fn remember_patch(&mut self, path: &Path) {
        if let Some((state, _)) = self.app_state.as_mut() {
            state.add_recent_patch(path);
        }
        self.persist_app_state();
    }

    fn persist_app_state(&self) {
        if let Some((state, path)) = &self.app_state {
            if let Err(e) = state.save_to(path) {
                tracing::warn!("Failed to save app state: {}", e);
            }
        }
    }

    /// Set a patch-level variable (sample rate, buffer size, output size, ...).
    pub fn set_patch_variable(&mut self, name: &str, value: f32) -> Result<()> {
        let mut settings = self.settings.clone();
        settings.set_variable(name, value);
        self.apply_settings(settings)
    }

    fn apply_settings(&mut self, settings: PatchSettings) -> Result<()> {
        let audio_changed = settings.audio != *self.audio.settings();
        self.settings = settings;
        if audio_changed {
            self.audio.set_settings(self.settings.audio)?;
            self.reset_system_objects();
            self.emit(RuntimeMessage::Audio(self.audio.status()));
        }
        Ok(())
    }

    // ── Audio ──

    pub fn list_devices(&self) -> Result<Vec<AudioDeviceInfo>> {
        self.audio.list_devices()
    }

    pub fn set_audio_in_device(&mut self, index: usize) -> Result<()> {
        self.audio.set_input_device(index)?;
        self.reset_system_objects();
        self.emit(RuntimeMessage::Audio(self.audio.status()));
        Ok(())
    }

    pub fn set_audio_out_device(&mut self, index: usize) -> Result<()> {
        self.audio.set_output_device(index)?;
        self.reset_system_objects();
        self.emit(RuntimeMessage::Audio(self.audio.status()));
        Ok(())
    }

    pub fn activate_dsp(&mut self) -> Result<()> {
        self.audio.activate_dsp()?;
        self.emit(RuntimeMessage::Audio(self.audio.status()));
        Ok(())
    }

    pub fn deactivate_dsp(&mut self) {
        self.audio.deactivate_dsp();
        self.emit(RuntimeMessage::Audio(self.audio.status()));
    }

    pub fn audio_status(&self) -> AudioStatus {
        self.audio.status()
    }

    /// Let audio objects re-read the current audio settings.
    pub fn reset_system_objects(&mut self) {
        self.reset_audio_objects(|_| true);
    }

    /// Like `reset_system_objects`, limited to one object type.
    pub fn reset_specific_system_objects(&mut self, type_name: &str) {
        self.reset_audio_objects(|slot| slot.type_name == type_name);
    }

    fn reset_audio_objects(&mut self, accept: impl Fn(&ObjectSlot) -> bool) {
        let audio = *self.audio.settings();
        for slot in self.graph.iter_mut() {
            if !slot.capabilities().is_audio() || !accept(slot) {
                continue;
            }
            if let Some(object) = slot.object_mut() {
                object.reset_system_object(&audio);
            }
        }
    }

    // ── Host surface ──

    pub fn topology(&self) -> TopologySnapshot {
        TopologySnapshot {
            objects: self
                .graph
                .iter()
                .map(|s| ObjectSnapshot {
                    id: s.id,
                    type_name: s.type_name.clone(),
                    position: s.position,
                    size: s.size,
                    inlets: s.inlets().iter().map(|i| i.kind()).collect(),
                    outlets: s.outlets().iter().map(|o| o.kind()).collect(),
                    connected: s.connected_flags(),
                    vars: s.vars.clone(),
                })
                .collect(),
            links: self.graph.links().to_vec(),
            selected: self.selected,
        }
    }

    /// Apply one host command. Returns `false` on shutdown.
    pub fn handle_command(&mut self, cmd: PatchCommand) -> bool {
        let outcome = match cmd {
            PatchCommand::AddObject {
                type_name,
                position,
            } => self.add_object(&type_name, position).map(|_| ()),
            PatchCommand::RemoveObject(id) => self.remove_object(id),
            PatchCommand::DeleteSelectedObject => self.delete_selected_object().map(|_| ()),
            PatchCommand::DuplicateObject(id) => self.duplicate_object(id).map(|_| ()),
            PatchCommand::ResetObject(id) => self.reset_object(id),
            PatchCommand::ReconnectOutlets(id) => self.reconnect_outlets(id).map(|_| ()),
            PatchCommand::Connect {
                from,
                from_outlet,
                to,
                to_inlet,
                kind,
            } => self.connect(from, from_outlet, to, to_inlet, kind).map(|_| ()),
            PatchCommand::Disconnect(link) => self.disconnect(link).map(|_| ()),
            PatchCommand::SelectObject(id) => self.select_object(id),
            PatchCommand::DragObject { id, position } => self.drag_object(id, position),
            PatchCommand::PointerMoved(position) => {
                self.pointer_moved(position);
                Ok(())
            }
            PatchCommand::NewPatch => {
                self.new_patch();
                Ok(())
            }
            PatchCommand::OpenPatch(path) => self.open_patch(path).map(|_| ()),
            PatchCommand::NewTempPatchFromFile(path) => {
                self.new_temp_patch_from_file(path).map(|_| ())
            }
            PatchCommand::SavePatch => self.save_patch().map(|_| ()),
            PatchCommand::SavePatchAs(path) => self.save_patch_as(path),
            PatchCommand::OpenLastPatch => self.open_last_patch().map(|_| ()),
            PatchCommand::SavePatchAsLast => self.save_patch_as_last(),
            PatchCommand::SetPatchVariable { name, value } => self.set_patch_variable(&name, value),
            PatchCommand::SetAudioInDevice(index) => self.set_audio_in_device(index),
            PatchCommand::SetAudioOutDevice(index) => self.set_audio_out_device(index),
            PatchCommand::ActivateDsp => self.activate_dsp(),
            PatchCommand::DeactivateDsp => {
                self.deactivate_dsp();
                Ok(())
            }
            PatchCommand::ResetSystemObjects => {
                self.reset_system_objects();
                Ok(())
            }
            PatchCommand::ResetSpecificSystemObjects(type_name) => {
                self.reset_specific_system_objects(&type_name);
                Ok(())
            }
            PatchCommand::ListObjectTypes => {
                let names = self.registry.type_names().iter().map(|s| s.to_string()).collect();
                self.emit(RuntimeMessage::ObjectTypes(names));
                Ok(())
            }
            PatchCommand::ListDevices => self
                .list_devices()
                .map(|devices| self.emit(RuntimeMessage::Devices(devices))),
            PatchCommand::RequestTopology => {
                self.emit(RuntimeMessage::Topology(self.topology()));
                Ok(())
            }
            PatchCommand::Shutdown => return false,
        };
        if let Err(e) = outcome {
            tracing::warn!("Command failed: {}", e);
            self.emit(RuntimeMessage::Error(e.to_string()));
        }
        true
    }

    // ── Main run loop ──

    /// Tick until `running` clears, a shutdown command arrives, or
    /// `max_frames` ticks have run.
    pub fn run(
        &mut self,
        cmd_rx: &Receiver<PatchCommand>,
        running: &Arc<AtomicBool>,
        max_frames: Option<u64>,
    ) {
        tracing::info!("Patch runtime started at {} fps", self.fps);
        let start_tick = self.tick;

        'frames: while running.load(Ordering::Relaxed) {
            while let Ok(cmd) = cmd_rx.try_recv() {
                if !self.handle_command(cmd) {
                    break 'frames;
                }
            }
            self.tick();
            if max_frames.is_some_and(|max| self.tick - start_tick >= max) {
                break;
            }
            self.rate_limit();
        }

        self.shutdown();
    }

    /// Stop audio and release every object.
    pub fn shutdown(&mut self) {
        self.audio.deactivate_dsp();
        self.clear_graph();
        self.emit(RuntimeMessage::Shutdown);
        tracing::info!("Patch runtime stopped after {} ticks", self.tick);
    }

    fn rate_limit(&self) {
        if self.fps == 0 {
            return;
        }
        let target_interval = Duration::from_nanos(1_000_000_000 / self.fps as u64);
        if let Some(last) = self.last_tick_time {
            let elapsed = last.elapsed();
            if elapsed < target_interval {
                std::thread::sleep(target_interval - elapsed);
            }
        }
    }
}

impl Drop for PatchRuntime {
    // Live objects still get `remove_content`, after audio has stopped.
    fn drop(&mut self) {
        self.audio.deactivate_dsp();
        if !self.graph.is_empty() {
            self.clear_graph();
        }
    }
}

/// Builds a runtime from a `RuntimeConfig`.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    registry: Option<Arc<ObjectRegistry>>,
    backend: Option<Box<dyn AudioBackend>>,
    surface: Option<Box<dyn DrawSurface>>,
    msg_tx: Option<Sender<RuntimeMessage>>,
    app_state: Option<(AppState, PathBuf)>,
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            registry: None,
            backend: None,
            surface: None,
            msg_tx: None,
            app_state: None,
        }
    }

    pub fn registry(mut self, registry: Arc<ObjectRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the backend named in the config.
    pub fn backend(mut self, backend: Box<dyn AudioBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn surface(mut self, surface: Box<dyn DrawSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn messages(mut self, msg_tx: Sender<RuntimeMessage>) -> Self {
        self.msg_tx = Some(msg_tx);
        self
    }

    pub fn app_state(mut self, state: AppState, path: PathBuf) -> Self {
        self.app_state = Some((state, path));
        self
    }

    pub fn build(self) -> PatchRuntime {
        let backend = self.backend.unwrap_or_else(|| match self.config.backend {
            BackendKind::Cpal => Box::new(CpalBackend::new()),
            BackendKind::Offline => Box::new(OfflineBackend::new()),
        });
        let mut audio = AudioBridge::new(backend, self.config.audio);
        audio.prefer_devices(
            self.config.input_device.clone(),
            self.config.output_device.clone(),
        );
        audio.set_ack_timeout(self.config.ack_timeout());

        let mut runtime = PatchRuntime::new(
            self.registry.unwrap_or_else(ObjectRegistry::builtin),
            audio,
        );
        runtime.set_fps(self.config.fps);
        if let Some(surface) = self.surface {
            runtime.set_surface(surface);
        }
        if let Some(msg_tx) = self.msg_tx {
            runtime.set_message_sender(msg_tx);
        }
        if let Some((state, path)) = self.app_state {
            runtime.set_app_state(state, path);
        }
        runtime
    }
}
