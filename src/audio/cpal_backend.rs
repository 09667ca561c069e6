//! Hardware backend on top of cpal.

use crate::audio::backend::{
    AudioBackend, AudioDeviceInfo, ErrorCallback, InputCallback, OutputCallback, StreamHandle,
    StreamSettings,
};
use crate::error::{PatchError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

pub struct CpalBackend {
    host: cpal::Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::info!("cpal backend initialized on host {}", host.id().name());
        Self { host }
    }

    fn find_device(&self, name: Option<&str>, output: bool) -> Result<cpal::Device> {
        let Some(search) = name else {
            let device = if output {
                self.host.default_output_device()
            } else {
                self.host.default_input_device()
            };
            return device.ok_or_else(|| {
                PatchError::DeviceUnavailable(format!(
                    "no default {} device",
                    if output { "output" } else { "input" }
                ))
            });
        };

        let search_lower = search.to_lowercase();
        let devices = if output {
            self.host.output_devices()
        } else {
            self.host.input_devices()
        }
        .map_err(|e| PatchError::DeviceUnavailable(e.to_string()))?;

        for device in devices {
            if let Ok(dev_name) = device.name() {
                if dev_name.to_lowercase().contains(&search_lower) {
                    return Ok(device);
                }
            }
        }
        Err(PatchError::DeviceUnavailable(format!(
            "no device matching '{}'",
            search
        )))
    }

    fn stream_config(settings: &StreamSettings) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: settings.channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(settings.buffer_size),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> String {
        "cpal".to_string()
    }

    fn list_devices(&self) -> Result<Vec<AudioDeviceInfo>> {
        let default_out = self.host.default_output_device().and_then(|d| d.name().ok());
        let default_in = self.host.default_input_device().and_then(|d| d.name().ok());

        let devices = self
            .host
            .devices()
            .map_err(|e| PatchError::DeviceUnavailable(e.to_string()))?;

        let mut result = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };
            let inputs = device
                .default_input_config()
                .map(|c| c.channels())
                .unwrap_or(0);
            let outputs = device
                .default_output_config()
                .map(|c| c.channels())
                .unwrap_or(0);
            result.push(AudioDeviceInfo {
                index: result.len(),
                is_default: Some(&name) == default_out.as_ref() || Some(&name) == default_in.as_ref(),
                name,
                inputs,
                outputs,
            });
        }
        Ok(result)
    }

    fn build_output_stream(
        &self,
        settings: &StreamSettings,
        mut callback: OutputCallback,
        mut on_error: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_device(settings.device.as_deref(), true)?;
        let stream = device
            .build_output_stream(
                &Self::stream_config(settings),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback(data),
                move |err| on_error(&err.to_string()),
                None,
            )
            .map_err(|e| PatchError::DeviceUnavailable(e.to_string()))?;
        stream
            .play()
            .map_err(|e| PatchError::DeviceUnavailable(e.to_string()))?;

        tracing::info!(
            "Output stream started on '{}' ({} ch @ {} Hz)",
            device.name().unwrap_or_default(),
            settings.channels,
            settings.sample_rate
        );
        Ok(StreamHandle::new(stream))
    }

    fn build_input_stream(
        &self,
        settings: &StreamSettings,
        mut callback: InputCallback,
        mut on_error: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_device(settings.device.as_deref(), false)?;
        let stream = device
            .build_input_stream(
                &Self::stream_config(settings),
                move |data: &[f32], _: &cpal::InputCallbackInfo| callback(data),
                move |err| on_error(&err.to_string()),
                None,
            )
            .map_err(|e| PatchError::DeviceUnavailable(e.to_string()))?;
        stream
            .play()
            .map_err(|e| PatchError::DeviceUnavailable(e.to_string()))?;

        tracing::info!(
            "Input stream started on '{}' ({} ch @ {} Hz)",
            device.name().unwrap_or_default(),
            settings.channels,
            settings.sample_rate
        );
        Ok(StreamHandle::new(stream))
    }
}
