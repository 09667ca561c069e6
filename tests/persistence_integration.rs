//! Patch save/load, load reports and last-patch bookkeeping

mod common;

use common::builders::{PatchFileBuilder, TestRegistry};
use common::probes::{hook_log, Action};
use patchwork_rs::config::AppState;
use patchwork_rs::patch::{PatchFile, PatchRuntime, Payload, PayloadKind};
use patchwork_rs::types::Vec2;
use patchwork_rs::{ObjectId, PatchError};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn runtime() -> PatchRuntime {
    TestRegistry::new(hook_log()).runtime()
}

/// Objects as (type, position, vars) and links as (from type, outlet, to type, inlet)
/// so two patches compare equal up to id relabeling.
fn shape(file: &PatchFile) -> (Vec<String>, BTreeSet<(String, usize, String, usize)>) {
    let objects = file
        .objects
        .iter()
        .map(|o| format!("{} @{},{} {:?}", o.type_name, o.x, o.y, o.vars))
        .collect();
    let type_of = |id: ObjectId| {
        file.objects
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.type_name.clone())
            .unwrap_or_default()
    };
    let links = file
        .links
        .iter()
        .map(|l| (type_of(l.from_id), l.from_outlet, type_of(l.to_id), l.to_inlet))
        .collect();
    (objects, links)
}

#[test]
fn test_save_then_open_restores_graph() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("synth.pwpatch");

    let mut rt = runtime();
    let slider = rt.add_object("slider", Vec2::new(10.0, 10.0)).unwrap();
    let osc = rt.add_object("oscillator", Vec2::new(10.0, 80.0)).unwrap();
    let amp = rt.add_object("amp", Vec2::new(10.0, 160.0)).unwrap();
    let out = rt.add_object("audio device", Vec2::new(10.0, 240.0)).unwrap();
    rt.connect(slider, 0, amp, 1, PayloadKind::Numeric).unwrap();
    rt.connect(osc, 0, amp, 0, PayloadKind::Audio).unwrap();
    rt.connect(amp, 0, out, 0, PayloadKind::Audio).unwrap();
    rt.drag_object(slider, Vec2::new(130.0, 20.0)).unwrap();
    rt.set_patch_variable("output_width", 640.0).unwrap();
    rt.tick();

    rt.save_patch_as(&path).unwrap();
    let saved = rt.to_patch_file();
    assert_eq!(rt.current_patch(), Some(path.as_path()));

    let mut other = runtime();
    let report = other.open_patch(&path).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.objects_loaded, 4);
    assert_eq!(report.links_loaded, 3);
    assert_eq!(other.settings().output_width, 640);

    let reloaded = other.to_patch_file();
    assert_eq!(shape(&reloaded), shape(&saved));
    assert_eq!(other.audio().cord_count(), 2);
}

#[test]
fn test_unknown_type_skips_only_that_object() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.pwpatch");
    PatchFileBuilder::new()
        .object(1, "number", 0.0, 0.0)
        .var("NUMBER", 3.0)
        .object(2, "theremin", 0.0, 50.0)
        .object(3, "number", 0.0, 100.0)
        .link(1, 0, 2, 0, PayloadKind::Numeric)
        .link(1, 0, 3, 0, PayloadKind::Numeric)
        .build()
        .save(&path)
        .unwrap();

    let mut rt = runtime();
    let report = rt.open_patch(&path).unwrap();
    assert_eq!(report.objects_loaded, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].1, "theremin");
    assert_eq!(report.links_loaded, 1);
    assert_eq!(report.links_refused, 1);

    // The surviving link still carries data
    rt.tick();
    let sink = report.id_map[&ObjectId(3)];
    assert_eq!(rt.object(sink).unwrap().vars.get("NUMBER"), Some(3.0));
}

#[test]
fn test_mismatched_link_in_file_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad_link.pwpatch");
    PatchFileBuilder::new()
        .object(1, "oscillator", 0.0, 0.0)
        .object(2, "number", 0.0, 50.0)
        .link(1, 0, 2, 0, PayloadKind::Audio)
        .build()
        .save(&path)
        .unwrap();

    let mut rt = runtime();
    let report = rt.open_patch(&path).unwrap();
    assert_eq!(report.objects_loaded, 2);
    assert_eq!(report.links_refused, 1);
    assert!(rt.graph().links().is_empty());
}

#[test]
fn test_failed_open_keeps_current_patch() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.pwpatch");
    std::fs::write(&broken, "not json at all").unwrap();

    let mut rt = runtime();
    let a = rt.add_object("number", Vec2::ZERO).unwrap();
    let b = rt.add_object("number", Vec2::ZERO).unwrap();
    rt.connect(a, 0, b, 0, PayloadKind::Numeric).unwrap();

    assert!(matches!(
        rt.open_patch(&broken),
        Err(PatchError::ParseError { .. })
    ));
    assert!(matches!(
        rt.open_patch(dir.path().join("missing.pwpatch")),
        Err(PatchError::FileNotFound(_))
    ));
    assert_eq!(rt.graph().len(), 2);
    assert_eq!(rt.graph().links().len(), 1);
    assert!(rt.current_patch().is_none());
}

#[test]
fn test_open_replaces_graph_and_reload_gets_fresh_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.pwpatch");
    PatchFileBuilder::new()
        .object(1, "number", 0.0, 0.0)
        .build()
        .save(&path)
        .unwrap();

    let mut rt = runtime();
    let old = rt.add_object("slider", Vec2::ZERO).unwrap();
    let first = rt.open_patch(&path).unwrap();
    assert!(rt.object(old).is_none());
    assert_eq!(rt.graph().len(), 1);

    let second = rt.open_patch(&path).unwrap();
    let a = first.id_map[&ObjectId(1)];
    let b = second.id_map[&ObjectId(1)];
    assert_ne!(a, b);
    assert!(rt.object(a).is_none());
}

#[test]
fn test_save_untitled_patch_is_refused() {
    let mut rt = runtime();
    rt.add_object("number", Vec2::ZERO).unwrap();
    assert!(matches!(rt.save_patch(), Err(PatchError::Io(_))));

    rt.new_patch();
    assert!(rt.graph().is_empty());
    assert!(rt.current_patch().is_none());
}

#[test]
fn test_last_patch_round_trip_through_app_state() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("app_state.json");
    let patch_path = dir.path().join("last.pwpatch");

    let mut rt = runtime();
    rt.set_app_state(AppState::default(), state_path.clone());
    assert!(matches!(
        rt.open_last_patch(),
        Err(PatchError::FileNotFound(_))
    ));

    rt.add_object("number", Vec2::new(4.0, 4.0)).unwrap();
    rt.save_patch_as(&patch_path).unwrap();
    rt.save_patch_as_last().unwrap();

    let stored = AppState::load_from(&state_path).unwrap();
    assert_eq!(stored.last_patch_path.as_deref(), Some(patch_path.as_path()));
    assert_eq!(stored.recent_patches.len(), 1);

    let mut next = runtime();
    next.set_app_state(stored, state_path);
    let report = next.open_last_patch().unwrap();
    assert_eq!(report.objects_loaded, 1);
    assert_eq!(next.current_patch(), Some(patch_path.as_path()));
}

#[test]
fn test_patch_file_settings_apply_audio_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate.pwpatch");
    let mut file = PatchFileBuilder::new().object(1, "audio device", 0.0, 0.0).build();
    file.settings.audio = common::builders::fast_audio();
    file.settings.audio.sample_rate = 44_100;
    file.save(&path).unwrap();

    let mut rt = runtime();
    rt.open_patch(&path).unwrap();
    assert_eq!(rt.audio().settings().sample_rate, 44_100);
    assert_eq!(rt.settings().audio.sample_rate, 44_100);
}

/// Builtins plus two numeric writers pushing fixed values every update
fn writer_runtime(first: f32, second: f32) -> PatchRuntime {
    TestRegistry::new(hook_log())
        .probe("writer a", PayloadKind::Numeric, Action::Write(Payload::Numeric(first)))
        .probe("writer b", PayloadKind::Numeric, Action::Write(Payload::Numeric(second)))
        .runtime()
}

#[test]
fn test_non_finite_input_still_saves_and_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nan.pwpatch");

    let mut rt = writer_runtime(f32::NAN, f32::INFINITY);
    let nan = rt.add_object("writer a", Vec2::ZERO).unwrap();
    let inf = rt.add_object("writer b", Vec2::ZERO).unwrap();
    let first = rt.add_object("number", Vec2::new(0.0, 50.0)).unwrap();
    let second = rt.add_object("number", Vec2::new(0.0, 100.0)).unwrap();
    rt.connect(nan, 0, first, 0, PayloadKind::Numeric).unwrap();
    rt.connect(inf, 0, second, 0, PayloadKind::Numeric).unwrap();
    rt.tick();
    rt.tick();
    assert_eq!(rt.object(first).unwrap().vars.get("NUMBER"), Some(0.0));
    assert_eq!(rt.object(second).unwrap().vars.get("NUMBER"), Some(0.0));

    rt.save_patch_as(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains("null"));

    let mut other = writer_runtime(0.0, 0.0);
    let report = other.open_patch(&path).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.objects_loaded, 4);
    assert_eq!(report.links_loaded, 2);
}

#[test]
fn test_record_without_size_gets_type_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sizeless.pwpatch");
    std::fs::write(
        &path,
        r#"{"objects": [
            {"id": 4, "typeName": "number", "x": 12.0, "y": 8.0, "namedVariables": {"NUMBER": 6.0}}
        ]}"#,
    )
    .unwrap();

    let mut rt = runtime();
    let report = rt.open_patch(&path).unwrap();
    let id = report.id_map[&ObjectId(4)];
    let slot = rt.object(id).unwrap();
    assert_eq!(slot.size, Vec2::new(80.0, 30.0));
    assert_eq!(slot.position, Vec2::new(12.0, 8.0));
    assert_eq!(slot.vars.get("NUMBER"), Some(6.0));
}

#[test]
fn test_new_temp_patch_leaves_template_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.pwpatch");
    let copy = dir.path().join("mine.pwpatch");
    PatchFileBuilder::new()
        .object(1, "slider", 0.0, 0.0)
        .object(2, "number", 0.0, 50.0)
        .link(1, 0, 2, 0, PayloadKind::Numeric)
        .build()
        .save(&template)
        .unwrap();
    let before = std::fs::read_to_string(&template).unwrap();

    let mut rt = runtime();
    let report = rt.new_temp_patch_from_file(&template).unwrap();
    assert_eq!(report.objects_loaded, 2);
    assert_eq!(report.links_loaded, 1);
    assert!(rt.current_patch().is_none());

    rt.add_object("number", Vec2::new(0.0, 100.0)).unwrap();
    assert!(matches!(rt.save_patch(), Err(PatchError::Io(_))));
    rt.save_patch_as(&copy).unwrap();

    assert_eq!(std::fs::read_to_string(&template).unwrap(), before);
    assert_eq!(PatchFile::load(&copy).unwrap().objects.len(), 3);
}

const NODE_TYPES: [&str; 4] = ["number", "slider", "writer a", "writer b"];

fn edge_float() -> impl Strategy<Value = f32> {
    prop_oneof![
        Just(f32::NAN),
        Just(f32::INFINITY),
        Just(f32::NEG_INFINITY),
        Just(0.0f32),
        Just(-0.0f32),
        Just(f32::MAX),
        Just(f32::MIN),
        Just(f32::MIN_POSITIVE),
        Just(f32::EPSILON),
        -1.0e6f32..1.0e6f32,
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn save_then_open_preserves_any_graph(
        first in edge_float(),
        second in edge_float(),
        nodes in prop::collection::vec(
            (0..NODE_TYPES.len(), -1.0e4f32..1.0e4f32, -1.0e4f32..1.0e4f32),
            1..8,
        ),
        links in prop::collection::vec((any::<usize>(), any::<usize>()), 0..12),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("random.pwpatch");

        let mut rt = writer_runtime(first, second);
        let ids: Vec<ObjectId> = nodes
            .iter()
            .map(|&(t, x, y)| rt.add_object(NODE_TYPES[t], Vec2::new(x, y)).unwrap())
            .collect();
        for (from, to) in links {
            // Refused links (occupied inlet, slider has no inlet) just do not count
            let _ = rt.connect(
                ids[from % ids.len()],
                0,
                ids[to % ids.len()],
                0,
                PayloadKind::Numeric,
            );
        }
        rt.tick();
        rt.tick();

        rt.save_patch_as(&path).unwrap();
        let saved = rt.to_patch_file();

        let mut other = writer_runtime(first, second);
        let report = other.open_patch(&path).unwrap();
        prop_assert!(report.is_clean());
        prop_assert_eq!(report.objects_loaded, saved.objects.len());
        prop_assert_eq!(report.links_loaded, saved.links.len());
        prop_assert_eq!(shape(&other.to_patch_file()), shape(&saved));
    }
}
