//! Built-in patch objects.
//!
//! A small catalog that exercises every part of the object contract: plain
//! data flow, interactive input, render-side audio units, the hardware
//! endpoint, special connections and off-thread file loads.

mod amp;
mod analyzer;
mod audio_device;
mod beat;
mod number;
mod oscillator;
mod slider;
mod text_reader;

pub use amp::AmpObject;
pub use analyzer::AudioAnalyzerObject;
pub use audio_device::AudioDeviceObject;
pub use beat::BeatExtractorObject;
pub use number::NumberObject;
pub use oscillator::OscillatorObject;
pub use slider::SliderObject;
pub use text_reader::TextReaderObject;

use crate::patch::payload::Inlet;
use crate::patch::registry::{ObjectCategory, ObjectDescriptor, RegistryBuilder};
use crate::types::NamedVars;

pub const NUMBER: &str = "number";
pub const SLIDER: &str = "slider";
pub const OSCILLATOR: &str = "oscillator";
pub const AMP: &str = "amp";
pub const AUDIO_DEVICE: &str = "audio device";
pub const AUDIO_ANALYZER: &str = "audio analyzer";
pub const BEAT_EXTRACTOR: &str = "beat extractor";
pub const TEXT_READER: &str = "text reader";

fn descriptor(
    type_name: &'static str,
    category: ObjectCategory,
    description: &'static str,
) -> ObjectDescriptor {
    ObjectDescriptor {
        type_name,
        category,
        description,
        singleton: false,
    }
}

/// Add every built-in object type to `builder`.
pub fn register_builtins(builder: RegistryBuilder) -> RegistryBuilder {
    builder
        .register(
            descriptor(NUMBER, ObjectCategory::Math, "Holds a number, or passes one through"),
            || Box::new(NumberObject::new()),
        )
        .register(
            descriptor(SLIDER, ObjectCategory::Gui, "Horizontal slider between MIN and MAX"),
            || Box::new(SliderObject::new()),
        )
        .register(
            descriptor(OSCILLATOR, ObjectCategory::Sound, "Sine, saw or square oscillator"),
            || Box::new(OscillatorObject::new()),
        )
        .register(
            descriptor(AMP, ObjectCategory::Sound, "Scales an audio signal by a gain"),
            || Box::new(AmpObject::new()),
        )
        .register(
            ObjectDescriptor {
                singleton: true,
                ..descriptor(AUDIO_DEVICE, ObjectCategory::Audio, "Hardware audio input and output")
            },
            || Box::new(AudioDeviceObject::new()),
        )
        .register(
            descriptor(AUDIO_ANALYZER, ObjectCategory::Sound, "Level and spectrum of an audio signal"),
            || Box::new(AudioAnalyzerObject::new()),
        )
        .register(
            descriptor(BEAT_EXTRACTOR, ObjectCategory::Data, "Detects beats in analyzer bands"),
            || Box::new(BeatExtractorObject::new()),
        )
        .register(
            descriptor(TEXT_READER, ObjectCategory::Data, "Loads a text file from a path"),
            || Box::new(TextReaderObject::new()),
        )
        .special_connection(AUDIO_ANALYZER, BEAT_EXTRACTOR)
}

/// Value of a numeric inlet while connected, otherwise the named variable.
/// A connected value is written back so it survives a save. NaN and
/// infinities on the inlet fall back to the stored value.
pub(crate) fn numeric_input(inlet: &Inlet, vars: &mut NamedVars, key: &str, default: f32) -> f32 {
    if inlet.is_connected() {
        if let Some(value) = inlet.float().filter(|v| v.is_finite()) {
            vars.set(key, value);
            return value;
        }
    }
    vars.get_or(key, default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::registry::ObjectRegistry;

    #[test]
    fn test_builtins_register_every_type() {
        let registry = register_builtins(RegistryBuilder::new()).build();
        for name in [
            NUMBER,
            SLIDER,
            OSCILLATOR,
            AMP,
            AUDIO_DEVICE,
            AUDIO_ANALYZER,
            BEAT_EXTRACTOR,
            TEXT_READER,
        ] {
            assert!(registry.create(name).is_ok(), "{} missing", name);
        }
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn test_only_audio_device_is_singleton() {
        let registry = ObjectRegistry::builtin();
        let singletons: Vec<_> = registry
            .type_names()
            .into_iter()
            .filter(|n| registry.descriptor(n).is_some_and(|d| d.singleton))
            .collect();
        assert_eq!(singletons, vec![AUDIO_DEVICE]);
        assert!(registry.is_special_connection(AUDIO_ANALYZER, BEAT_EXTRACTOR));
    }
}
