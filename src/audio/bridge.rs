//! Graph-thread owner of the real-time render graph.
//!
//! The bridge keeps the authoritative unit and cord tables, recompiles a
//! `RenderPlan` on every structural change and publishes it to the render
//! thread. Removing a unit waits for the render thread to acknowledge a plan
//! that no longer contains it, so the caller may release the owning object
//! as soon as `unregister` returns.
//!
//! Device operations follow stop / apply / restart. A device that fails to
//! open degrades to the offline clock so the render graph keeps running
//! (silently) instead of stalling.

use crate::audio::backend::{AudioBackend, AudioDeviceInfo, OfflineBackend, StreamHandle, StreamSettings};
use crate::audio::plan::{PatchCord, RenderPlan, UnitEntry};
use crate::audio::render::{InputTap, RenderEngine, RenderShared};
use crate::audio::unit::AudioBinding;
use crate::audio::AudioSettings;
use crate::error::{PatchError, Result};
use crate::patch::id::{LinkId, ObjectId};
use crate::patch::payload::SharedCell;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default upper bound on waiting for the render thread to drop a unit.
const ACK_TIMEOUT: Duration = Duration::from_millis(500);

/// Summary of the bridge for hosts and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStatus {
    pub backend: String,
    pub dsp_on: bool,
    /// Running on the offline clock because the configured device failed.
    pub degraded: bool,
    pub settings: AudioSettings,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub units: usize,
    pub cords: usize,
    pub blocks_rendered: u64,
}

pub struct AudioBridge {
    shared: Arc<RenderShared>,
    units: BTreeMap<ObjectId, UnitEntry>,
    cords: Vec<(LinkId, PatchCord)>,
    epoch: u64,
    settings: AudioSettings,
    backend: Box<dyn AudioBackend>,
    input_device: Option<String>,
    output_device: Option<String>,
    input_tap: InputTap,
    output_stream: Option<StreamHandle>,
    input_stream: Option<StreamHandle>,
    stream_error: Arc<AtomicBool>,
    degraded: bool,
    dsp_on: bool,
    ack_timeout: Duration,
}

impl AudioBridge {
    pub fn new(backend: Box<dyn AudioBackend>, settings: AudioSettings) -> Self {
        tracing::info!(
            "Audio bridge using '{}' backend ({} Hz, {} frames)",
            backend.name(),
            settings.sample_rate,
            settings.buffer_size
        );
        Self {
            shared: RenderShared::new(),
            units: BTreeMap::new(),
            cords: Vec::new(),
            epoch: 0,
            settings,
            backend,
            input_device: None,
            output_device: None,
            input_tap: Arc::new(Mutex::new(Vec::new())),
            output_stream: None,
            input_stream: None,
            stream_error: Arc::new(AtomicBool::new(false)),
            degraded: false,
            dsp_on: false,
            ack_timeout: ACK_TIMEOUT,
        }
    }

    /// Bridge on the software clock, for headless hosts and tests.
    pub fn offline(settings: AudioSettings) -> Self {
        Self::new(Box::new(OfflineBackend::new()), settings)
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    pub fn shared(&self) -> &Arc<RenderShared> {
        &self.shared
    }

    pub fn is_dsp_on(&self) -> bool {
        self.dsp_on
    }

    pub fn is_registered(&self, id: ObjectId) -> bool {
        self.units.contains_key(&id)
    }

    pub fn cord_count(&self) -> usize {
        self.cords.len()
    }

    pub fn set_ack_timeout(&mut self, timeout: Duration) {
        self.ack_timeout = timeout;
    }

    pub fn status(&self) -> AudioStatus {
        AudioStatus {
            backend: self.backend.name(),
            dsp_on: self.dsp_on,
            degraded: self.degraded || self.stream_error.load(Ordering::Relaxed),
            settings: self.settings,
            input_device: self.input_device.clone(),
            output_device: self.output_device.clone(),
            units: self.units.len(),
            cords: self.cords.len(),
            blocks_rendered: self.shared.blocks_rendered(),
        }
    }

    // ── Units and cords ──

    /// Add an object's unit to the render graph.
    pub fn register(&mut self, id: ObjectId, binding: &AudioBinding, inputs: usize, cells: Vec<SharedCell>) {
        self.units.insert(
            id,
            UnitEntry {
                unit: binding.unit.clone(),
                role: binding.role,
                inputs,
                cells,
            },
        );
        tracing::debug!("Registered audio unit for {}", id);
        self.republish();
    }

    /// Drop every cord touching `id`, then the unit, and wait until the
    /// render thread runs a plan without it.
    ///
    /// On `RenderTimeout` the unit is already out of every published plan,
    /// but the thread may still be inside a block that started before. The
    /// engine only reaches units through `try_lock` on an `Arc`, so dropping
    /// the owner afterwards is still sound.
    pub fn unregister(&mut self, id: ObjectId) -> Result<()> {
        let before = self.cords.len();
        self.cords.retain(|(_, c)| c.from != id && c.to != id);
        let had_unit = self.units.remove(&id).is_some();
        if !had_unit && before == self.cords.len() {
            return Ok(());
        }
        let epoch = self.republish();
        self.wait_for_ack(epoch)?;
        tracing::debug!("Unregistered audio unit for {}", id);
        Ok(())
    }

    pub fn add_cord(&mut self, link: LinkId, cord: PatchCord) {
        self.cords.push((link, cord));
        tracing::debug!(
            "Patch cord {}: {}:{} -> {}:{}",
            link,
            cord.from,
            cord.from_port,
            cord.to,
            cord.to_port
        );
        self.republish();
    }

    pub fn remove_cord(&mut self, link: LinkId) -> bool {
        let before = self.cords.len();
        self.cords.retain(|(l, _)| *l != link);
        if self.cords.len() == before {
            return false;
        }
        self.republish();
        true
    }

    fn republish(&mut self) -> u64 {
        self.epoch += 1;
        let cords: Vec<PatchCord> = self.cords.iter().map(|(_, c)| *c).collect();
        self.shared
            .publish(RenderPlan::compile(&self.units, &cords, self.epoch));
        self.epoch
    }

    fn wait_for_ack(&self, epoch: u64) -> Result<()> {
        if !self.shared.is_running() {
            return Ok(());
        }
        let start = Instant::now();
        while self.shared.acked_epoch() < epoch {
            if start.elapsed() > self.ack_timeout {
                return Err(PatchError::RenderTimeout {
                    epoch,
                    waited: self.ack_timeout,
                });
            }
            std::thread::sleep(Duration::from_micros(200));
        }
        Ok(())
    }

    // ── Devices ──

    pub fn list_devices(&self) -> Result<Vec<AudioDeviceInfo>> {
        self.backend.list_devices()
    }

    pub fn set_input_device(&mut self, index: usize) -> Result<()> {
        let name = self.resolve_device(index, AudioDeviceInfo::is_input)?;
        tracing::info!("Audio input device -> {}", name);
        self.reconfigure(|bridge| bridge.input_device = Some(name))
    }

    pub fn set_output_device(&mut self, index: usize) -> Result<()> {
        let name = self.resolve_device(index, AudioDeviceInfo::is_output)?;
        tracing::info!("Audio output device -> {}", name);
        self.reconfigure(|bridge| bridge.output_device = Some(name))
    }

    /// Select devices by name without validation (from config at startup).
    pub fn prefer_devices(&mut self, input: Option<String>, output: Option<String>) {
        self.input_device = input;
        self.output_device = output;
    }

    pub fn set_settings(&mut self, settings: AudioSettings) -> Result<()> {
        if settings == self.settings {
            return Ok(());
        }
        self.reconfigure(|bridge| bridge.settings = settings)
    }

    fn resolve_device(&self, index: usize, accept: fn(&AudioDeviceInfo) -> bool) -> Result<String> {
        self.backend
            .list_devices()?
            .into_iter()
            .find(|d| d.index == index && accept(d))
            .map(|d| d.name)
            .ok_or_else(|| PatchError::DeviceUnavailable(format!("no device at index {}", index)))
    }

    fn reconfigure(&mut self, apply: impl FnOnce(&mut Self)) -> Result<()> {
        let was_on = self.dsp_on;
        if was_on {
            self.deactivate_dsp();
        }
        apply(self);
        if was_on {
            self.activate_dsp()?;
        }
        Ok(())
    }

    // ── DSP ──

    pub fn activate_dsp(&mut self) -> Result<()> {
        if self.dsp_on {
            return Ok(());
        }
        self.stream_error.store(false, Ordering::Relaxed);
        self.degraded = false;

        let channels = self.settings.channels.max(1);
        let out_settings = StreamSettings {
            sample_rate: self.settings.sample_rate,
            buffer_size: self.settings.buffer_size,
            channels,
            device: self.output_device.clone(),
        };

        self.shared.set_running(true);
        let output = match self.backend.build_output_stream(
            &out_settings,
            self.output_callback(channels),
            self.error_callback(),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Output device unavailable ({}), falling back to offline clock", e);
                self.degraded = true;
                let fallback = StreamSettings {
                    device: None,
                    ..out_settings
                };
                match OfflineBackend::new().build_output_stream(
                    &fallback,
                    self.output_callback(channels),
                    self.error_callback(),
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        self.shared.set_running(false);
                        return Err(PatchError::DeviceUnavailable(e.to_string()));
                    }
                }
            }
        };
        self.output_stream = Some(output);

        let in_settings = StreamSettings {
            sample_rate: self.settings.sample_rate,
            buffer_size: self.settings.buffer_size,
            channels,
            device: self.input_device.clone(),
        };
        let tap = self.input_tap.clone();
        let in_channels = channels as usize;
        match self.backend.build_input_stream(
            &in_settings,
            Box::new(move |data: &[f32]| {
                if let Some(mut tap) = tap.try_lock() {
                    tap.clear();
                    tap.extend(data.chunks(in_channels).map(|frame| frame[0]));
                }
            }),
            self.error_callback(),
        ) {
            Ok(stream) => self.input_stream = Some(stream),
            Err(e) => tracing::warn!("Input device unavailable ({}), input stays silent", e),
        }

        self.dsp_on = true;
        tracing::info!("DSP on");
        Ok(())
    }

    pub fn deactivate_dsp(&mut self) {
        if !self.dsp_on {
            return;
        }
        self.output_stream = None;
        self.input_stream = None;
        self.shared.set_running(false);
        self.input_tap.lock().clear();
        self.dsp_on = false;
        tracing::info!("DSP off");
    }

    fn output_callback(&self, channels: u16) -> Box<dyn FnMut(&mut [f32]) + Send> {
        let mut engine = RenderEngine::new(
            self.shared.clone(),
            self.settings.sample_rate,
            self.input_tap.clone(),
        );
        Box::new(move |out: &mut [f32]| engine.render_interleaved(out, channels as usize))
    }

    fn error_callback(&self) -> Box<dyn FnMut(&str) + Send> {
        let flag = self.stream_error.clone();
        Box::new(move |err: &str| {
            flag.store(true, Ordering::Relaxed);
            tracing::error!("Audio stream error: {}", err);
        })
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.deactivate_dsp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::MockAudioBackend;
    use crate::audio::unit::{shared_unit, AudioUnit, RenderInfo};
    use crate::patch::payload::new_cell;
    use crate::patch::port::PayloadKind;

    struct Dc;

    impl AudioUnit for Dc {
        fn process(&mut self, _inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], _info: &RenderInfo) {
            outputs[0].fill(1.0);
        }
    }

    fn small() -> AudioSettings {
        AudioSettings {
            sample_rate: 48_000,
            buffer_size: 64,
            channels: 1,
        }
    }

    #[test]
    fn test_register_and_unregister_update_plan() {
        let mut bridge = AudioBridge::offline(small());
        let binding = AudioBinding::processor(shared_unit(Dc));
        bridge.register(ObjectId(1), &binding, 0, vec![new_cell(PayloadKind::Audio)]);
        bridge.register(ObjectId(2), &binding, 1, vec![]);
        bridge.add_cord(
            LinkId(0),
            PatchCord {
                from: ObjectId(1),
                from_port: 0,
                to: ObjectId(2),
                to_port: 0,
            },
        );
        assert!(bridge.shared().current().contains(ObjectId(1)));
        assert_eq!(bridge.cord_count(), 1);

        bridge.unregister(ObjectId(1)).unwrap();
        assert!(!bridge.is_registered(ObjectId(1)));
        assert_eq!(bridge.cord_count(), 0);
        assert!(!bridge.shared().current().contains(ObjectId(1)));
    }

    #[test]
    fn test_unacknowledged_plan_reports_timeout() {
        let mut bridge = AudioBridge::offline(small());
        bridge.set_ack_timeout(Duration::from_millis(5));
        let binding = AudioBinding::processor(shared_unit(Dc));
        bridge.register(ObjectId(1), &binding, 0, vec![]);

        // Running with no stream pulling blocks: nothing ever acknowledges
        bridge.shared().set_running(true);
        let err = bridge.unregister(ObjectId(1)).unwrap_err();
        assert!(matches!(err, PatchError::RenderTimeout { .. }));
        assert!(!bridge.is_registered(ObjectId(1)));
        assert!(!bridge.shared().current().contains(ObjectId(1)));
        bridge.shared().set_running(false);
    }

    #[test]
    fn test_dsp_toggle_renders_blocks() {
        let mut bridge = AudioBridge::offline(small());
        bridge.activate_dsp().unwrap();
        assert!(bridge.is_dsp_on());
        std::thread::sleep(Duration::from_millis(20));
        bridge.deactivate_dsp();
        assert!(!bridge.is_dsp_on());
        assert!(bridge.status().blocks_rendered > 0);
    }

    #[test]
    fn test_failed_output_device_degrades_to_offline_clock() {
        let mut backend = MockAudioBackend::new();
        backend.expect_name().return_const("mock".to_string());
        backend
            .expect_build_output_stream()
            .returning(|_, _, _| Err(PatchError::DeviceUnavailable("busy".into())));
        backend
            .expect_build_input_stream()
            .returning(|_, _, _| Err(PatchError::DeviceUnavailable("busy".into())));

        let mut bridge = AudioBridge::new(Box::new(backend), small());
        bridge.activate_dsp().unwrap();
        let status = bridge.status();
        assert!(status.dsp_on);
        assert!(status.degraded);
        bridge.deactivate_dsp();
    }

    #[test]
    fn test_invalid_device_index_is_refused() {
        let mut backend = MockAudioBackend::new();
        backend.expect_name().return_const("mock".to_string());
        backend.expect_list_devices().returning(|| {
            Ok(vec![AudioDeviceInfo {
                index: 0,
                name: "Speakers".into(),
                inputs: 0,
                outputs: 2,
                is_default: true,
            }])
        });

        let mut bridge = AudioBridge::new(Box::new(backend), small());
        let err = bridge.set_input_device(0).unwrap_err();
        assert!(matches!(err, PatchError::DeviceUnavailable(_)));
        assert!(bridge.set_output_device(0).is_ok());
        assert_eq!(bridge.status().output_device.as_deref(), Some("Speakers"));
    }
}
