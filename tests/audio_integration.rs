//! Render thread behavior against a live graph, on the offline clock

mod common;

use common::builders::TestRegistry;
use common::probes::{hook_log, Guard};
use common::wait_until;
use patchwork_rs::patch::{Payload, PayloadKind};
use patchwork_rs::types::Vec2;
use serial_test::serial;
use std::sync::atomic::Ordering;

#[test]
#[serial]
fn test_removed_unit_is_never_rendered_again() {
    let guard = Guard::default();
    let mut rt = TestRegistry::new(hook_log())
        .guarded("guarded", guard.clone())
        .runtime();
    let osc = rt.add_object("oscillator", Vec2::ZERO).unwrap();
    let out = rt.add_object("audio device", Vec2::ZERO).unwrap();
    rt.activate_dsp().unwrap();

    for round in 0..25 {
        guard.retired.store(false, Ordering::Release);
        let start = guard.blocks.load(Ordering::Relaxed);

        let g = rt.add_object("guarded", Vec2::ZERO).unwrap();
        if round % 2 == 0 {
            rt.connect(osc, 0, g, 0, PayloadKind::Audio).unwrap();
        }
        rt.connect(g, 0, out, 0, PayloadKind::Audio).unwrap();
        assert!(
            wait_until(|| guard.blocks.load(Ordering::Relaxed) > start),
            "round {}: guarded unit never rendered",
            round
        );
        rt.tick();

        rt.remove_object(g).unwrap();
        assert!(guard.retired.load(Ordering::Acquire));
        assert!(!rt.audio().is_registered(g));
    }

    // Let the clock run on after the last removal
    let blocks = rt.audio_status().blocks_rendered;
    assert!(wait_until(|| rt.audio_status().blocks_rendered > blocks + 5));
    assert_eq!(guard.violations.load(Ordering::Relaxed), 0);
    rt.deactivate_dsp();
}

#[test]
#[serial]
fn test_dsp_toggle_controls_block_clock() {
    let mut rt = TestRegistry::new(hook_log()).runtime();
    rt.add_object("oscillator", Vec2::ZERO).unwrap();
    assert_eq!(rt.audio_status().blocks_rendered, 0);

    rt.activate_dsp().unwrap();
    let status = rt.audio_status();
    assert!(status.dsp_on);
    assert!(!status.degraded);
    assert_eq!(status.units, 1);
    assert!(wait_until(|| rt.audio_status().blocks_rendered > 3));

    rt.deactivate_dsp();
    let stopped_at = rt.audio_status().blocks_rendered;
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(rt.audio_status().blocks_rendered, stopped_at);
}

#[test]
#[serial]
fn test_analyzer_sees_oscillator_level() {
    let mut rt = TestRegistry::new(hook_log()).runtime();
    let osc = rt.add_object("oscillator", Vec2::ZERO).unwrap();
    let analyzer = rt.add_object("audio analyzer", Vec2::ZERO).unwrap();
    rt.connect(osc, 0, analyzer, 0, PayloadKind::Audio).unwrap();
    rt.activate_dsp().unwrap();

    let heard = wait_until(|| {
        rt.tick();
        rt.object(analyzer)
            .and_then(|s| s.outlets()[0].read().as_float())
            .is_some_and(|level| level > 0.1)
    });
    assert!(heard, "analyzer never saw a signal");

    // A block of a 0.5 amplitude sine never exceeds the peak
    let level = rt.object(analyzer).unwrap().outlets()[0].read().as_float().unwrap();
    assert!(level <= 0.5 + 1e-3);
    let bands = rt.object(analyzer).unwrap().outlets()[2].read().clone();
    assert!(matches!(bands, Payload::Array(ref b) if b.len() == 16));
    rt.deactivate_dsp();
}

#[test]
#[serial]
fn test_audio_device_reset_on_settings_change() {
    let mut rt = TestRegistry::new(hook_log()).runtime();
    rt.add_object("audio device", Vec2::ZERO).unwrap();
    rt.activate_dsp().unwrap();

    rt.set_patch_variable("buffer_size", 128.0).unwrap();
    let status = rt.audio_status();
    assert_eq!(status.settings.buffer_size, 128);
    assert!(status.dsp_on);
    let before = status.blocks_rendered;
    assert!(wait_until(|| rt.audio_status().blocks_rendered > before));
    rt.deactivate_dsp();
}
