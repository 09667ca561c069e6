use crate::audio::unit::{shared_unit, AudioBinding, AudioUnit, ParamCell, RenderInfo, SharedUnit};
use crate::audio::AudioSettings;
use crate::patch::draw::Color;
use crate::patch::object::{Capabilities, DrawContext, PatchObject, SetupContext, UpdateContext};
use crate::patch::port::{PayloadKind, PortDescriptor};
use crate::types::{Rect, Vec2};
use std::sync::Arc;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::inlet("to output", PayloadKind::Audio),
    PortDescriptor::outlet("from input", PayloadKind::Audio),
];

const METER: Color = [70, 200, 110, 255];

/// Render side of the hardware endpoint. The bridge routes whatever reaches
/// inlet 0 to the output device; the unit itself publishes the input device.
struct DeviceUnit {
    out_peak: Arc<ParamCell>,
}

impl AudioUnit for DeviceUnit {
    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], info: &RenderInfo) {
        let out = &mut outputs[0];
        let n = info.device_input.len().min(out.len());
        out[..n].copy_from_slice(&info.device_input[..n]);
        out[n..].fill(0.0);

        let peak = inputs
            .first()
            .map(|b| b.iter().fold(0.0f32, |m, s| m.max(s.abs())))
            .unwrap_or(0.0);
        self.out_peak.set(peak);
    }
}

/// The patch's single connection to the sound card.
pub struct AudioDeviceObject {
    settings: AudioSettings,
    out_peak: Arc<ParamCell>,
    unit: SharedUnit,
}

impl AudioDeviceObject {
    pub fn new() -> Self {
        let out_peak = Arc::new(ParamCell::new(0.0));
        let unit = shared_unit(DeviceUnit {
            out_peak: out_peak.clone(),
        });
        Self {
            settings: AudioSettings::default(),
            out_peak,
            unit,
        }
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }
}

impl Default for AudioDeviceObject {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchObject for AudioDeviceObject {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn default_size(&self) -> Vec2 {
        Vec2::new(160.0, 50.0)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            audio_source: true,
            audio_sink: true,
            ..Capabilities::default()
        }
    }

    fn audio_binding(&self) -> Option<AudioBinding> {
        Some(AudioBinding::device(self.unit.clone()))
    }

    fn setup_content(&mut self, ctx: &mut SetupContext) {
        self.settings = *ctx.audio;
    }

    fn update_content(&mut self, _ctx: &mut UpdateContext) {}

    fn draw_content(&mut self, ctx: &mut DrawContext) {
        ctx.surface.text(
            ctx.rect.origin.offset(6.0, 8.0),
            &format!(
                "{} Hz / {} frames",
                self.settings.sample_rate, self.settings.buffer_size
            ),
        );
        let level = self.out_peak.get().clamp(0.0, 1.0);
        let meter = Rect::new(
            ctx.rect.origin.offset(0.0, ctx.rect.size.y - 6.0),
            Vec2::new(ctx.rect.size.x * level, 6.0),
        );
        ctx.surface.fill_rect(meter, METER);
    }

    fn reset_system_object(&mut self, audio: &AudioSettings) {
        tracing::debug!(
            "Audio device object now at {} Hz, {} frames",
            audio.sample_rate,
            audio.buffer_size
        );
        self.settings = *audio;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_publishes_device_input() {
        let device = AudioDeviceObject::new();
        let input = [0.1, -0.2, 0.3];
        let mut outputs = vec![vec![9.0; 4]];
        let info = RenderInfo {
            sample_rate: 48_000,
            frames: 4,
            device_input: &input,
        };
        device
            .unit
            .lock()
            .process(&[vec![0.5, -0.8, 0.0, 0.0]], &mut outputs, &info);
        assert_eq!(outputs[0], vec![0.1, -0.2, 0.3, 0.0]);
        assert_eq!(device.out_peak.get(), 0.8);
    }

    #[test]
    fn test_reset_rereads_settings() {
        let mut device = AudioDeviceObject::new();
        let audio = AudioSettings {
            sample_rate: 44_100,
            buffer_size: 128,
            channels: 2,
        };
        device.reset_system_object(&audio);
        assert_eq!(device.settings().sample_rate, 44_100);
    }
}
