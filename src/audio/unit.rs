//! Render-side processing units.
//!
//! An audio-capable patch object hands the bridge an `AudioUnit` when it is
//! constructed. The render thread only ever touches units (through the render
//! plan), never the patch objects that created them. Objects talk to their
//! unit through lock-free parameter cells.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Per-block information handed to every unit.
pub struct RenderInfo<'a> {
    pub sample_rate: u32,
    pub frames: usize,
    /// Latest hardware input block, or silence when no input device is bound.
    pub device_input: &'a [f32],
}

/// Real-time processor driven by the render thread.
///
/// `inputs` has one mixed buffer per audio inlet of the owning object and
/// `outputs` one buffer per audio outlet. Every buffer is `info.frames` long.
/// Implementations must not block, allocate on the steady path, or do I/O.
pub trait AudioUnit: Send {
    fn process(&mut self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>], info: &RenderInfo);
}

/// Shared handle to a unit. The render plan and the owning object each hold one.
pub type SharedUnit = Arc<Mutex<dyn AudioUnit>>;

pub fn shared_unit<U: AudioUnit + 'static>(unit: U) -> SharedUnit {
    Arc::new(Mutex::new(unit))
}

/// How the bridge treats a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioRole {
    /// Ordinary processor inside the render graph.
    Processor,
    /// The hardware endpoint: whatever is patched into its audio inlet is sent
    /// to the output device, and its outlet carries the input device.
    Device,
}

/// What an audio-capable object registers with the bridge.
#[derive(Clone)]
pub struct AudioBinding {
    pub unit: SharedUnit,
    pub role: AudioRole,
}

impl AudioBinding {
    pub fn processor(unit: SharedUnit) -> Self {
        Self {
            unit,
            role: AudioRole::Processor,
        }
    }

    pub fn device(unit: SharedUnit) -> Self {
        Self {
            unit,
            role: AudioRole::Device,
        }
    }
}

impl std::fmt::Debug for AudioBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBinding")
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Lock-free f32 shared between the graph thread and the render thread.
#[derive(Debug, Default)]
pub struct ParamCell(AtomicU32);

impl ParamCell {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}
