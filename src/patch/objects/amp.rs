use crate::audio::unit::{shared_unit, AudioBinding, AudioUnit, ParamCell, RenderInfo, SharedUnit};
use crate::patch::object::{Capabilities, PatchObject, UpdateContext};
use crate::patch::port::{PayloadKind, PortDescriptor};
use crate::types::NamedVars;
use std::sync::Arc;

use super::numeric_input;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::inlet("signal", PayloadKind::Audio),
    PortDescriptor::inlet("gain", PayloadKind::Numeric),
    PortDescriptor::outlet("signal", PayloadKind::Audio),
];

const GAIN: &str = "GAIN";

struct GainUnit {
    target: Arc<ParamCell>,
    current: f32,
}

impl AudioUnit for GainUnit {
    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], info: &RenderInfo) {
        let target = self.target.get();
        // Linear ramp across the block to avoid zipper noise
        let step = (target - self.current) / info.frames.max(1) as f32;
        let out = &mut outputs[0];
        match inputs.first() {
            Some(input) => {
                for (o, i) in out.iter_mut().zip(input) {
                    self.current += step;
                    *o = i * self.current;
                }
            }
            None => out.fill(0.0),
        }
        self.current = target;
    }
}

/// Gain stage.
pub struct AmpObject {
    gain: Arc<ParamCell>,
    unit: SharedUnit,
}

impl AmpObject {
    pub fn new() -> Self {
        let gain = Arc::new(ParamCell::new(1.0));
        let unit = shared_unit(GainUnit {
            target: gain.clone(),
            current: 1.0,
        });
        Self { gain, unit }
    }
}

impl Default for AmpObject {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchObject for AmpObject {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn init_vars(&self, vars: &mut NamedVars) {
        vars.set(GAIN, 1.0);
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            audio_source: true,
            audio_sink: true,
            ..Capabilities::default()
        }
    }

    fn audio_binding(&self) -> Option<AudioBinding> {
        Some(AudioBinding::processor(self.unit.clone()))
    }

    fn update_content(&mut self, ctx: &mut UpdateContext) {
        let gain = numeric_input(&ctx.inlets[1], ctx.vars, GAIN, 1.0);
        self.gain.set(gain.max(0.0));
    }
}
