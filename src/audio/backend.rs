//! Pluggable device backend.
//!
//! The bridge builds streams through `AudioBackend` so it can run on real
//! hardware (`CpalBackend`) or on a software clock (`OfflineBackend`) in
//! headless hosts and tests. Callbacks are boxed closures so the trait stays
//! object safe; streams come back as a type-erased `StreamHandle` that stops
//! the stream when dropped.

use crate::error::Result;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Stream request handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub channels: u16,
    /// Device name to match (case-insensitive substring). `None` = system default.
    pub device: Option<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_size: 512,
            channels: 2,
            device: None,
        }
    }
}

/// Device as reported by a backend. `index` is the position in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    pub index: usize,
    pub name: String,
    pub inputs: u16,
    pub outputs: u16,
    pub is_default: bool,
}

impl AudioDeviceInfo {
    pub fn is_input(&self) -> bool {
        self.inputs > 0
    }

    pub fn is_output(&self) -> bool {
        self.outputs > 0
    }
}

/// Keeps a stream alive. Dropping it stops the stream.
///
/// Not `Send`: some platform streams must stay on the thread that built them.
pub struct StreamHandle {
    _inner: Box<dyn Any>,
}

impl StreamHandle {
    pub fn new<T: 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Fills an interleaved output block.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send>;
/// Receives an interleaved input block.
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send>;
pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

#[cfg_attr(test, mockall::automock)]
pub trait AudioBackend {
    fn name(&self) -> String;

    fn list_devices(&self) -> Result<Vec<AudioDeviceInfo>>;

    fn build_output_stream(
        &self,
        settings: &StreamSettings,
        callback: OutputCallback,
        on_error: ErrorCallback,
    ) -> Result<StreamHandle>;

    fn build_input_stream(
        &self,
        settings: &StreamSettings,
        callback: InputCallback,
        on_error: ErrorCallback,
    ) -> Result<StreamHandle>;
}

/// Drives the output callback from a plain thread at the configured block
/// rate. Used when no hardware is wanted or the device failed to open.
#[derive(Debug, Default, Clone)]
pub struct OfflineBackend;

impl OfflineBackend {
    pub fn new() -> Self {
        Self
    }
}

struct ClockThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for ClockThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioBackend for OfflineBackend {
    fn name(&self) -> String {
        "offline".to_string()
    }

    fn list_devices(&self) -> Result<Vec<AudioDeviceInfo>> {
        Ok(vec![AudioDeviceInfo {
            index: 0,
            name: "Offline clock".to_string(),
            inputs: 2,
            outputs: 2,
            is_default: true,
        }])
    }

    fn build_output_stream(
        &self,
        settings: &StreamSettings,
        mut callback: OutputCallback,
        _on_error: ErrorCallback,
    ) -> Result<StreamHandle> {
        let frames = settings.buffer_size.max(1) as usize;
        let channels = settings.channels.max(1) as usize;
        let period = Duration::from_nanos(
            frames as u64 * 1_000_000_000 / settings.sample_rate.max(1) as u64,
        );
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::Builder::new()
            .name("offline-audio".into())
            .spawn(move || {
                let mut block = vec![0.0f32; frames * channels];
                let mut next = Instant::now();
                while !stop_flag.load(Ordering::Acquire) {
                    callback(&mut block);
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        next = now;
                    }
                }
            })?;

        tracing::info!(
            "Offline clock started: {} frames @ {} Hz",
            frames,
            settings.sample_rate
        );
        Ok(StreamHandle::new(ClockThread {
            stop,
            handle: Some(handle),
        }))
    }

    fn build_input_stream(
        &self,
        _settings: &StreamSettings,
        callback: InputCallback,
        _on_error: ErrorCallback,
    ) -> Result<StreamHandle> {
        // No capture source; the tap stays silent.
        Ok(StreamHandle::new(callback))
    }
}
