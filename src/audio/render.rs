//! Render-thread side of the audio bridge.
//!
//! `RenderShared` is the only state both threads touch. The graph thread
//! swaps the plan under `plan`'s mutex; the render thread clones the `Arc`
//! under the same mutex once per block and acknowledges the plan's epoch.
//! Once the graph thread has seen an acknowledgement for epoch `n`, no block
//! is still running against any earlier plan.

use crate::audio::plan::RenderPlan;
use crate::audio::unit::RenderInfo;
use crate::patch::payload::Payload;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub struct RenderShared {
    plan: Mutex<Arc<RenderPlan>>,
    acked_epoch: AtomicU64,
    running: AtomicBool,
    blocks_rendered: AtomicU64,
}

impl RenderShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            plan: Mutex::new(Arc::new(RenderPlan::empty(0))),
            acked_epoch: AtomicU64::new(0),
            running: AtomicBool::new(false),
            blocks_rendered: AtomicU64::new(0),
        })
    }

    /// Replace the active plan. The lock is held only for the pointer swap;
    /// the old plan is dropped outside it.
    pub fn publish(&self, plan: RenderPlan) {
        let next = Arc::new(plan);
        let _old = std::mem::replace(&mut *self.plan.lock(), next);
    }

    pub fn current(&self) -> Arc<RenderPlan> {
        self.plan.lock().clone()
    }

    pub fn acked_epoch(&self) -> u64 {
        self.acked_epoch.load(Ordering::Acquire)
    }

    /// True while a device (or the offline clock) is pulling blocks.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Relaxed)
    }
}

/// Latest captured input block, written by the input stream callback.
pub type InputTap = Arc<Mutex<Vec<f32>>>;

/// Owns the scratch buffers for one output stream. Moved into the callback.
pub struct RenderEngine {
    shared: Arc<RenderShared>,
    sample_rate: u32,
    input_tap: InputTap,
    epoch: Option<u64>,
    frames: usize,
    outputs: Vec<Vec<Vec<f32>>>,
    mix: Vec<Vec<f32>>,
    device_out: Vec<f32>,
    device_in: Vec<f32>,
}

impl RenderEngine {
    pub fn new(shared: Arc<RenderShared>, sample_rate: u32, input_tap: InputTap) -> Self {
        Self {
            shared,
            sample_rate,
            input_tap,
            epoch: None,
            frames: 0,
            outputs: Vec::new(),
            mix: Vec::new(),
            device_out: Vec::new(),
            device_in: Vec::new(),
        }
    }

    fn reshape(&mut self, plan: &RenderPlan, frames: usize) {
        self.outputs = plan
            .nodes
            .iter()
            .map(|n| vec![vec![0.0; frames]; n.outputs])
            .collect();
        let max_inputs = plan.nodes.iter().map(|n| n.inputs.len()).max().unwrap_or(0);
        self.mix = vec![vec![0.0; frames]; max_inputs.max(1)];
        self.device_out = vec![0.0; frames];
        self.device_in = vec![0.0; frames];
        self.frames = frames;
        self.epoch = Some(plan.epoch);
    }

    /// Render one block into an interleaved output buffer.
    pub fn render_interleaved(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        let plan = self.shared.current();
        self.shared.acked_epoch.store(plan.epoch, Ordering::Release);

        if self.epoch != Some(plan.epoch) || self.frames != frames {
            self.reshape(&plan, frames);
        }

        match self.input_tap.try_lock() {
            Some(tap) => {
                let n = tap.len().min(frames);
                self.device_in[..n].copy_from_slice(&tap[..n]);
                self.device_in[n..].fill(0.0);
            }
            None => self.device_in.fill(0.0),
        }
        self.device_out.fill(0.0);

        for (i, node) in plan.nodes.iter().enumerate() {
            for (slot, sources) in node.inputs.iter().enumerate() {
                let buf = &mut self.mix[slot];
                buf.fill(0.0);
                for &(src, port) in sources {
                    for (d, s) in buf.iter_mut().zip(&self.outputs[src][port]) {
                        *d += *s;
                    }
                }
            }

            if plan.device == Some(i) && !node.inputs.is_empty() {
                self.device_out.copy_from_slice(&self.mix[0]);
            }

            let info = RenderInfo {
                sample_rate: self.sample_rate,
                frames,
                device_input: &self.device_in,
            };
            let outputs = &mut self.outputs[i];
            match node.unit.try_lock() {
                Some(mut unit) => unit.process(&self.mix[..node.inputs.len()], outputs, &info),
                None => outputs.iter_mut().for_each(|b| b.fill(0.0)),
            }

            for (cell, block) in node.cells.iter().zip(outputs.iter()) {
                if let Some(mut payload) = cell.try_write() {
                    if let Payload::Audio(samples) = &mut *payload {
                        samples.clear();
                        samples.extend_from_slice(block);
                    }
                }
            }
        }

        for (frame, &sample) in out.chunks_mut(channels).zip(&self.device_out) {
            frame.fill(sample);
        }
        // Trailing partial frame, if any.
        let tail = frames * channels;
        out[tail..].fill(0.0);

        self.shared.blocks_rendered.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::plan::{PatchCord, UnitEntry};
    use crate::audio::unit::{shared_unit, AudioRole, AudioUnit};
    use crate::patch::id::ObjectId;
    use crate::patch::payload::new_cell;
    use crate::patch::port::PayloadKind;
    use std::collections::BTreeMap;

    struct Dc(f32);

    impl AudioUnit for Dc {
        fn process(&mut self, _inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], _info: &RenderInfo) {
            outputs[0].fill(self.0);
        }
    }

    struct PassThrough;

    impl AudioUnit for PassThrough {
        fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], info: &RenderInfo) {
            outputs[0].copy_from_slice(&info.device_input[..info.frames]);
            let _ = inputs;
        }
    }

    fn tap() -> InputTap {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_empty_plan_renders_silence() {
        let shared = RenderShared::new();
        let mut engine = RenderEngine::new(shared.clone(), 48_000, tap());
        let mut out = vec![1.0; 64];
        engine.render_interleaved(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(shared.blocks_rendered(), 1);
    }

    #[test]
    fn test_source_mixes_into_device() {
        let shared = RenderShared::new();
        let mut units = BTreeMap::new();
        let src_cell = new_cell(PayloadKind::Audio);
        units.insert(
            ObjectId(1),
            UnitEntry {
                unit: shared_unit(Dc(0.25)),
                role: AudioRole::Processor,
                inputs: 0,
                cells: vec![src_cell.clone()],
            },
        );
        units.insert(
            ObjectId(2),
            UnitEntry {
                unit: shared_unit(PassThrough),
                role: AudioRole::Device,
                inputs: 1,
                cells: vec![new_cell(PayloadKind::Audio)],
            },
        );
        let cords = [PatchCord {
            from: ObjectId(1),
            from_port: 0,
            to: ObjectId(2),
            to_port: 0,
        }];
        shared.publish(RenderPlan::compile(&units, &cords, 3));

        let mut engine = RenderEngine::new(shared.clone(), 48_000, tap());
        let mut out = vec![0.0; 32];
        engine.render_interleaved(&mut out, 2);

        assert!(out.iter().all(|&s| s == 0.25));
        assert_eq!(shared.acked_epoch(), 3);
        assert_eq!(src_cell.read().as_samples().map(<[f32]>::len), Some(16));
    }

    #[test]
    fn test_device_input_reaches_outlet() {
        let shared = RenderShared::new();
        let mut units = BTreeMap::new();
        let out_cell = new_cell(PayloadKind::Audio);
        units.insert(
            ObjectId(1),
            UnitEntry {
                unit: shared_unit(PassThrough),
                role: AudioRole::Device,
                inputs: 1,
                cells: vec![out_cell.clone()],
            },
        );
        shared.publish(RenderPlan::compile(&units, &[], 1));

        let input = tap();
        *input.lock() = vec![0.5; 8];
        let mut engine = RenderEngine::new(shared, 48_000, input);
        let mut out = vec![0.0; 8];
        engine.render_interleaved(&mut out, 1);

        assert_eq!(out_cell.read().as_samples().unwrap(), &[0.5; 8]);
        // Nothing patched into the device: hardware output stays silent.
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
