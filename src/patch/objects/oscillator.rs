use crate::audio::unit::{shared_unit, AudioBinding, AudioUnit, ParamCell, RenderInfo, SharedUnit};
use crate::patch::object::{Capabilities, DrawContext, PatchObject, UpdateContext};
use crate::patch::port::{PayloadKind, PortDescriptor};
use crate::types::{NamedVars, Vec2};
use std::f32::consts::TAU;
use std::sync::Arc;

use super::numeric_input;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::inlet("frequency", PayloadKind::Numeric),
    PortDescriptor::inlet("amplitude", PayloadKind::Numeric),
    PortDescriptor::outlet("signal", PayloadKind::Audio),
];

const FREQUENCY: &str = "FREQUENCY";
const AMPLITUDE: &str = "AMPLITUDE";
const WAVEFORM: &str = "WAVEFORM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
}

impl Waveform {
    fn from_var(value: f32) -> Self {
        match value.round() as i32 {
            1 => Waveform::Saw,
            2 => Waveform::Square,
            _ => Waveform::Sine,
        }
    }

    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * TAU).sin(),
            Waveform::Saw => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct OscParams {
    frequency: ParamCell,
    amplitude: ParamCell,
    waveform: ParamCell,
}

struct OscUnit {
    params: Arc<OscParams>,
    phase: f32,
}

impl AudioUnit for OscUnit {
    fn process(&mut self, _inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], info: &RenderInfo) {
        let step = self.params.frequency.get().max(0.0) / info.sample_rate.max(1) as f32;
        let amplitude = self.params.amplitude.get();
        let waveform = Waveform::from_var(self.params.waveform.get());
        for sample in outputs[0].iter_mut() {
            *sample = waveform.sample(self.phase) * amplitude;
            self.phase = (self.phase + step).fract();
        }
    }
}

/// Periodic audio source.
pub struct OscillatorObject {
    params: Arc<OscParams>,
    unit: SharedUnit,
}

impl OscillatorObject {
    pub fn new() -> Self {
        let params = Arc::new(OscParams::default());
        let unit = shared_unit(OscUnit {
            params: params.clone(),
            phase: 0.0,
        });
        Self { params, unit }
    }
}

impl Default for OscillatorObject {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchObject for OscillatorObject {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn default_size(&self) -> Vec2 {
        Vec2::new(120.0, 40.0)
    }

    fn init_vars(&self, vars: &mut NamedVars) {
        vars.set(FREQUENCY, 440.0);
        vars.set(AMPLITUDE, 0.5);
        vars.set(WAVEFORM, 0.0);
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            audio_source: true,
            ..Capabilities::default()
        }
    }

    fn audio_binding(&self) -> Option<AudioBinding> {
        Some(AudioBinding::processor(self.unit.clone()))
    }

    fn update_content(&mut self, ctx: &mut UpdateContext) {
        let frequency = numeric_input(&ctx.inlets[0], ctx.vars, FREQUENCY, 440.0);
        let amplitude = numeric_input(&ctx.inlets[1], ctx.vars, AMPLITUDE, 0.5);
        self.params.frequency.set(frequency);
        self.params.amplitude.set(amplitude.clamp(0.0, 1.0));
        self.params.waveform.set(ctx.vars.get_or(WAVEFORM, 0.0));
    }

    fn draw_content(&mut self, ctx: &mut DrawContext) {
        let label = format!(
            "{:?} {:.1} Hz",
            Waveform::from_var(ctx.vars.get_or(WAVEFORM, 0.0)),
            self.params.frequency.get()
        );
        ctx.surface.text(ctx.rect.origin.offset(6.0, 8.0), &label);
    }
}
