//! Hardware control scenarios end to end
//!
//! MIDI bytes go in, volume writes on the fake audio server come out.

use crate::support::{cc, stream, Stack};
use faderlink_core::domain::{
    compile, AudioTargetRef, Configuration, ControlId, DeviceLayout, LiveAudioObject,
    MatchPattern, StoreEvent, TargetCategory,
};
use faderlink_infra::audio::pactl::parse_objects;

fn slider(index: u8) -> ControlId {
    ControlId::slider(index).unwrap()
}

fn knob(index: u8) -> ControlId {
    ControlId::knob(index).unwrap()
}

fn music() -> AudioTargetRef {
    AudioTargetRef::new(TargetCategory::PlaybackStream, "Music")
}

// ============================================================================
// RULE COMPILATION
// ============================================================================

#[tokio::test]
async fn test_assign_compiles_single_rule() {
    let stack = Stack::new(Configuration::default_scaffold(), vec![]);
    stack.watch_assignments();

    stack.store.assign(slider(3), music());
    stack.wait_for_rules(1).await;

    let rules = stack.dispatcher.rules();
    assert_eq!(rules[0].control, slider(3));
    assert_eq!(rules[0].pattern, MatchPattern::control_change(0, 2));
    assert_eq!(rules[0].actions.len(), 1);
    assert_eq!(rules[0].actions[0].target, music());
}

#[test]
fn test_compile_changes_only_the_edited_binding() {
    let mut config = Configuration::default_scaffold();
    config.binding_mut(slider(1)).unwrap().add_target(music());
    config
        .binding_mut(knob(4))
        .unwrap()
        .add_target(AudioTargetRef::new(TargetCategory::OutputDevice, "Default"));

    let layout = DeviceLayout::default();
    let before = compile(&config, &layout);
    assert_eq!(before, compile(&config, &layout));

    config
        .binding_mut(knob(4))
        .unwrap()
        .add_target(AudioTargetRef::new(TargetCategory::RecordStream, "OBS"));
    let after = compile(&config, &layout);

    assert_eq!(before.len(), after.len());
    let slider_rule = |rules: &[faderlink_core::domain::CompiledRule]| {
        rules.iter().find(|r| r.control == slider(1)).cloned()
    };
    assert_eq!(slider_rule(&before), slider_rule(&after));
    let knob_actions = after.iter().find(|r| r.control == knob(4)).unwrap().actions.len();
    assert_eq!(knob_actions, 2);
}

// ============================================================================
// DISPATCH
// ============================================================================

#[tokio::test]
async fn test_full_slider_sets_full_volume() {
    let mut config = Configuration::default_scaffold();
    config.binding_mut(slider(3)).unwrap().add_target(music());
    let stack = Stack::new(config, vec![stream("Music", "mpv", "music:7")]);

    stack.dispatcher.handle(&cc(0, 2, 127)).await;

    assert_eq!(stack.store.value(slider(3)).unwrap().get(), 100);
    let writes = stack.server.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].stable_id, "music:7");
    assert!((writes[0].fraction - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_one_slider_drives_every_matching_target() {
    let mut config = Configuration::default_scaffold();
    let binding = config.binding_mut(slider(2)).unwrap();
    binding.add_target(AudioTargetRef::new(TargetCategory::PlaybackStream, "Chromium"));
    binding.add_target(AudioTargetRef::new(TargetCategory::OutputDevice, "Default"));

    let stack = Stack::new(
        config,
        vec![
            LiveAudioObject::new(TargetCategory::OutputDevice, "Speakers", "alsa.speakers", "alsa.speakers"),
            LiveAudioObject::new(TargetCategory::OutputDevice, "Headset", "usb.headset", "usb.headset"),
            stream("Chromium", "chromium", "c:1"),
            stream("Chromium", "chromium", "c:2"),
        ],
    );
    stack.server.set_default(TargetCategory::OutputDevice, "usb.headset");

    // Knob CCs do not touch slider targets
    stack.dispatcher.handle(&cc(0, 17, 127)).await;
    assert!(stack.server.writes().is_empty());

    stack.dispatcher.handle(&cc(0, 1, 64)).await;

    let mut ids: Vec<String> = stack.server.writes().into_iter().map(|w| w.stable_id).collect();
    ids.sort();
    assert_eq!(ids, vec!["c:1", "c:2", "usb.headset"]);
    assert_eq!(stack.store.value(slider(2)).unwrap().get(), 50);
}

#[tokio::test]
async fn test_failed_write_does_not_block_siblings() {
    let mut config = Configuration::default_scaffold();
    config
        .binding_mut(knob(1))
        .unwrap()
        .add_target(AudioTargetRef::new(TargetCategory::PlaybackStream, "Game"));
    let stack = Stack::new(
        config,
        vec![stream("Game", "wine", "g:1"), stream("Game", "wine", "g:2")],
    );
    stack.server.reject_writes("g:1");

    stack.dispatcher.handle(&cc(0, 16, 0)).await;

    let writes = stack.server.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].stable_id, "g:2");
}

// ============================================================================
// MIGRATION
// ============================================================================

#[tokio::test]
async fn test_legacy_ref_upgraded_by_hardware_event() {
    let legacy = AudioTargetRef::new(TargetCategory::PlaybackStream, "Chromium");
    let mut config = Configuration::default_scaffold();
    config.binding_mut(knob(5)).unwrap().add_target(legacy.clone());
    let stack = Stack::new(config, vec![stream("Chromium", "chromium", "c:1")]);
    let mut changes = stack.store.subscribe_changes();

    stack.dispatcher.handle(&cc(0, 20, 100)).await;

    let targets = stack.store.binding(knob(5)).unwrap().targets().to_vec();
    assert_eq!(targets, vec![legacy.clone().with_disambiguator("chromium")]);
    assert!(!targets.contains(&legacy));
    assert_eq!(stack.server.writes().len(), 1);

    assert!(matches!(changes.try_recv(), Ok(StoreEvent::Unassigned { .. })));
    assert!(matches!(changes.try_recv(), Ok(StoreEvent::Assigned { .. })));
}

#[tokio::test]
async fn test_migration_from_pactl_listing() {
    let json = r#"[
        {
            "index": 88,
            "volume": {"front-left": {"value_percent": "40%"}},
            "properties": {
                "application.name": "Chromium",
                "application.process.binary": "chromium-browser",
                "module-stream-restore.id": "sink-input-by-application-name:Chromium",
                "object.id": "101"
            }
        }
    ]"#;
    let objects = parse_objects(TargetCategory::PlaybackStream, json).unwrap();

    let legacy = AudioTargetRef::new(TargetCategory::PlaybackStream, "Chromium");
    let mut config = Configuration::default_scaffold();
    config.binding_mut(slider(8)).unwrap().add_target(legacy.clone());
    let stack = Stack::new(config, objects);

    assert_eq!(stack.dispatcher.startup_sweep().await, 1);
    assert_eq!(
        stack.store.binding(slider(8)).unwrap().targets(),
        &[legacy.with_disambiguator("chromium-browser")]
    );
    assert_eq!(
        stack.server.writes()[0].stable_id,
        "sink-input-by-application-name:Chromium:101"
    );
}

// ============================================================================
// STORE SEMANTICS
// ============================================================================

#[tokio::test]
async fn test_values_are_clamped() {
    let stack = Stack::new(Configuration::default_scaffold(), vec![]);
    assert_eq!(stack.store.update_value(slider(1), 150).get(), 100);
    assert_eq!(stack.store.update_value(slider(1), -5).get(), 0);
}

#[tokio::test]
async fn test_assign_is_idempotent() {
    let stack = Stack::new(Configuration::default_scaffold(), vec![]);
    let mut changes = stack.store.subscribe_changes();

    assert!(stack.store.assign(slider(1), music()));
    assert!(!stack.store.assign(slider(1), music()));

    assert_eq!(stack.store.binding(slider(1)).unwrap().targets().len(), 1);
    assert!(changes.try_recv().is_ok());
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_unassign_absent_is_silent() {
    let stack = Stack::new(Configuration::default_scaffold(), vec![]);
    let mut changes = stack.store.subscribe_changes();

    let removed = stack
        .store
        .unassign(slider(1), TargetCategory::PlaybackStream, "Nothing", None);
    assert!(removed.is_empty());
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn test_unassign_keeps_other_targets() {
    let obs = AudioTargetRef::new(TargetCategory::RecordStream, "OBS");
    let mut config = Configuration::default_scaffold();
    let binding = config.binding_mut(knob(2)).unwrap();
    binding.add_target(music());
    binding.add_target(obs.clone());
    let stack = Stack::new(config, vec![]);

    let removed = stack
        .store
        .unassign(knob(2), TargetCategory::PlaybackStream, "Music", None);

    assert_eq!(removed, vec![music()]);
    assert_eq!(stack.store.binding(knob(2)).unwrap().targets(), &[obs]);
}
