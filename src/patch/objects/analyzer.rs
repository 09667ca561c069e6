use crate::audio::spectrum::{rms, SpectrumAnalyzer, WindowFunction, DEFAULT_FFT_SIZE};
use crate::patch::draw::Color;
use crate::patch::object::{Capabilities, DrawContext, PatchObject, UpdateContext};
use crate::patch::payload::Outlet;
use crate::patch::port::{PayloadKind, PortDescriptor};
use crate::types::{NamedVars, Rect, Vec2};

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::inlet("signal", PayloadKind::Audio),
    PortDescriptor::outlet("rms", PayloadKind::Numeric),
    PortDescriptor::outlet("spectrum", PayloadKind::Array),
    PortDescriptor::outlet("bands", PayloadKind::Array),
];

const BANDS: &str = "BANDS";
const SMOOTHING: &str = "SMOOTHING";

const BAR: Color = [90, 150, 240, 255];

/// Level and spectrum of the latest audio block seen on its inlet.
///
/// Reads the block the render thread last published into the producer's
/// outlet cell; no render-side unit of its own.
pub struct AudioAnalyzerObject {
    analyzer: SpectrumAnalyzer,
    history: Vec<f32>,
    bands: Vec<f32>,
}

impl AudioAnalyzerObject {
    pub fn new() -> Self {
        Self {
            analyzer: SpectrumAnalyzer::new(DEFAULT_FFT_SIZE, WindowFunction::Hann),
            history: Vec::with_capacity(DEFAULT_FFT_SIZE),
            bands: Vec::new(),
        }
    }

    fn push_block(&mut self, block: &[f32]) {
        let size = self.analyzer.size();
        self.history.extend_from_slice(block);
        if self.history.len() > size {
            let excess = self.history.len() - size;
            self.history.drain(..excess);
        }
    }
}

impl Default for AudioAnalyzerObject {
    fn default() -> Self {
        Self::new()
    }
}

fn write_array(outlet: &Outlet, values: &[f32]) {
    outlet.with_samples_mut(|v| {
        v.clear();
        v.extend_from_slice(values);
    });
}

impl PatchObject for AudioAnalyzerObject {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn default_size(&self) -> Vec2 {
        Vec2::new(200.0, 80.0)
    }

    fn init_vars(&self, vars: &mut NamedVars) {
        vars.set(BANDS, 16.0);
        vars.set(SMOOTHING, 0.5);
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            audio_sink: true,
            ..Capabilities::default()
        }
    }

    fn update_content(&mut self, ctx: &mut UpdateContext) {
        let level = ctx.inlets[0].with(|p| {
            let block = p.as_samples().unwrap_or(&[]);
            let level = rms(block);
            self.push_block(block);
            level
        });
        ctx.outlets[0].set_float(level);

        let spectrum = self.analyzer.compute(&self.history);
        write_array(&ctx.outlets[1], spectrum);

        let count = ctx.vars.get_or(BANDS, 16.0).clamp(1.0, 256.0) as usize;
        let smoothing = ctx.vars.get_or(SMOOTHING, 0.5).clamp(0.0, 0.99);
        let fresh = self.analyzer.bands(count);
        if self.bands.len() != fresh.len() {
            self.bands = fresh;
        } else {
            for (old, new) in self.bands.iter_mut().zip(fresh) {
                *old = *old * smoothing + new * (1.0 - smoothing);
            }
        }
        write_array(&ctx.outlets[2], &self.bands);
    }

    fn draw_content(&mut self, ctx: &mut DrawContext) {
        if self.bands.is_empty() {
            return;
        }
        let width = ctx.rect.size.x / self.bands.len() as f32;
        for (i, &band) in self.bands.iter().enumerate() {
            let height = (band * 4.0).clamp(0.0, 1.0) * ctx.rect.size.y;
            let bar = Rect::new(
                ctx.rect
                    .origin
                    .offset(i as f32 * width, ctx.rect.size.y - height),
                Vec2::new(width.max(1.0) - 1.0, height),
            );
            ctx.surface.fill_rect(bar, BAR);
        }
    }
}
