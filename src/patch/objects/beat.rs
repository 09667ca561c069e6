use crate::patch::draw::Color;
use crate::patch::object::{DrawContext, PatchObject, UpdateContext};
use crate::patch::port::{PayloadKind, PortDescriptor};
use crate::types::NamedVars;
use std::collections::VecDeque;
use std::time::Duration;

use super::AUDIO_ANALYZER;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::inlet("bands", PayloadKind::Array),
    PortDescriptor::outlet("beat", PayloadKind::Numeric),
    PortDescriptor::outlet("bpm", PayloadKind::Numeric),
];

const SENSITIVITY: &str = "SENSITIVITY";
const LOW_BANDS: &str = "LOW_BANDS";

/// Energy history, about one second at 60 fps.
const HISTORY: usize = 60;
/// Shortest gap between two beats (300 bpm).
const MIN_INTERVAL: Duration = Duration::from_millis(200);
const ENERGY_FLOOR: f32 = 1e-4;

const FLASH: Color = [255, 255, 255, 255];
const IDLE: Color = [60, 60, 60, 255];

/// Onset detector over the low bands of an audio analyzer.
///
/// Does nothing unless its inlet is fed by an `audio analyzer`; the link is
/// recognized when it is made and re-checked against the peer table on every
/// update.
#[derive(Debug, Default)]
pub struct BeatExtractorObject {
    linked: bool,
    energies: VecDeque<f32>,
    since_beat: Duration,
    intervals: VecDeque<Duration>,
    beat: bool,
}

impl BeatExtractorObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    fn reset(&mut self) {
        self.energies.clear();
        self.intervals.clear();
        self.since_beat = Duration::ZERO;
        self.beat = false;
    }

    fn detect(&mut self, energy: f32, sensitivity: f32, dt: Duration) -> bool {
        self.since_beat += dt;
        let average = if self.energies.is_empty() {
            0.0
        } else {
            self.energies.iter().sum::<f32>() / self.energies.len() as f32
        };

        let beat = self.energies.len() >= HISTORY / 4
            && energy > ENERGY_FLOOR
            && energy > average * sensitivity
            && self.since_beat >= MIN_INTERVAL;

        if self.energies.len() == HISTORY {
            self.energies.pop_front();
        }
        self.energies.push_back(energy);

        if beat {
            self.intervals.push_back(self.since_beat);
            if self.intervals.len() > 8 {
                self.intervals.pop_front();
            }
            self.since_beat = Duration::ZERO;
        }
        beat
    }

    fn bpm(&self) -> f32 {
        if self.intervals.is_empty() {
            return 0.0;
        }
        let mean = self.intervals.iter().sum::<Duration>().as_secs_f32() / self.intervals.len() as f32;
        if mean > 0.0 {
            60.0 / mean
        } else {
            0.0
        }
    }
}

impl PatchObject for BeatExtractorObject {
    fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    fn init_vars(&self, vars: &mut NamedVars) {
        vars.set(SENSITIVITY, 1.4);
        vars.set(LOW_BANDS, 4.0);
    }

    fn update_content(&mut self, ctx: &mut UpdateContext) {
        let linked = ctx.peers.source_type(0) == Some(AUDIO_ANALYZER);
        if linked != self.linked {
            tracing::debug!(
                "Beat extractor {} {}",
                ctx.id,
                if linked { "linked to analyzer" } else { "lost its analyzer" }
            );
            self.linked = linked;
            self.reset();
        }
        if !self.linked {
            ctx.outlets[0].set_float(0.0);
            ctx.outlets[1].set_float(0.0);
            return;
        }

        let low = ctx.vars.get_or(LOW_BANDS, 4.0).max(1.0) as usize;
        let energy = ctx.inlets[0].with(|p| {
            p.as_samples()
                .map(|bands| bands.iter().take(low).map(|b| b * b).sum::<f32>())
                .unwrap_or(0.0)
        });
        let sensitivity = ctx.vars.get_or(SENSITIVITY, 1.4);
        self.beat = self.detect(energy, sensitivity, ctx.dt);

        ctx.outlets[0].set_float(if self.beat { 1.0 } else { 0.0 });
        ctx.outlets[1].set_float(self.bpm());
    }

    fn draw_content(&mut self, ctx: &mut DrawContext) {
        ctx.surface
            .fill_rect(ctx.rect, if self.beat { FLASH } else { IDLE });
        if !self.linked {
            ctx.surface
                .text(ctx.rect.origin.offset(6.0, 8.0), "needs an audio analyzer");
        }
    }

    fn on_special_connection(&mut self, peer_type: &str, inlet: usize) {
        if peer_type == AUDIO_ANALYZER && inlet == 0 {
            self.linked = true;
            self.reset();
        }
    }
}
