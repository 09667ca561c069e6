//! # patchwork-rs: live visual patching runtime
//!
//! A patch is a graph of typed objects connected by typed links. The runtime
//! ticks the graph at a fixed frame rate while a real-time render thread pulls
//! audio blocks through whichever objects carry audio units.
//!
//! ## Architecture
//!
//! - **Patch**: object registry, graph store, connection manager and the frame
//!   scheduler ([`patch::PatchRuntime`])
//! - **Audio**: device backends (cpal or an offline clock), render plans and
//!   the bridge that keeps them in sync with the graph
//! - **Communication**: crossbeam channels between a host UI and the runtime
//!   thread ([`patch::PatchBridge`])
//!
//! ## Configuration
//!
//! Recent patches live in the platform data directory under
//! `dev.hxyulin.patchwork-rs`; startup settings come from `patchwork.toml`.
//!
//! ## Example
//!
//! ```no_run
//! use patchwork_rs::patch::{PatchRuntime, PayloadKind};
//! use patchwork_rs::types::Vec2;
//!
//! # fn main() -> patchwork_rs::Result<()> {
//! let mut runtime = PatchRuntime::headless();
//! let osc = runtime.add_object("oscillator", Vec2::new(40.0, 40.0))?;
//! let out = runtime.add_object("audio device", Vec2::new(40.0, 160.0))?;
//! runtime.connect(osc, 0, out, 0, PayloadKind::Audio)?;
//! runtime.activate_dsp()?;
//! runtime.tick();
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod patch;
pub mod types;

// Re-export commonly used types
pub use audio::{AudioBridge, AudioSettings};
pub use config::{AppState, RuntimeConfig};
pub use error::{PatchError, Result};
pub use patch::{ObjectId, PatchBridge, PatchCommand, PatchRuntime, RuntimeBuilder, RuntimeMessage};
pub use types::{NamedVars, Vec2};
