//! Real-time audio side of the runtime.
//!
//! The graph thread owns an `AudioBridge`. Audio-capable objects register a
//! render-side `AudioUnit` with it; audio links become patch cords. The bridge
//! compiles units and cords into an immutable `RenderPlan` and publishes it to
//! the device callback, which only ever sees plans, units and sample buffers.

pub mod backend;
pub mod bridge;
pub mod cpal_backend;
pub mod plan;
pub mod render;
pub mod spectrum;
pub mod unit;

pub use backend::{AudioBackend, AudioDeviceInfo, OfflineBackend, StreamSettings};
pub use bridge::{AudioBridge, AudioStatus};
pub use cpal_backend::CpalBackend;
pub use plan::{PatchCord, RenderPlan};
pub use render::RenderShared;
pub use spectrum::{SpectrumAnalyzer, WindowFunction};
pub use unit::{shared_unit, AudioBinding, AudioRole, AudioUnit, ParamCell, RenderInfo, SharedUnit};

use serde::{Deserialize, Serialize};

/// Sample rate and block size shared by the render graph and every audio
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub channels: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_size: 512,
            channels: 2,
        }
    }
}

impl AudioSettings {
    /// Wall-clock length of one block.
    pub fn block_duration(&self) -> std::time::Duration {
        let rate = self.sample_rate.max(1) as u64;
        std::time::Duration::from_nanos(self.buffer_size as u64 * 1_000_000_000 / rate)
    }
}
