//! Bindings file lifecycle through the store

use crate::support::Stack;
use faderlink_core::domain::{
    AudioTargetRef, ConfigManager, Configuration, ControlId, LoadOrigin, TargetCategory,
};
use std::sync::Arc;
use tempfile::TempDir;

fn manager(dir: &TempDir) -> Arc<ConfigManager> {
    Arc::new(ConfigManager::new(dir.path().join("config.yaml")))
}

const LEGACY: &str = r#"
midiDevices:
  - name: Studio Korg
    type: KorgNanoKontrol2
    midiInName: "nanoKONTROL2 in"
    midiOutName: "nanoKONTROL2 out"
rules:
  - midiMessage:
      deviceControlPath: Group4/Slider
      type: ControlChange
      channel: 0
      controller: 3
    actions:
      - type: SetVolume
        target:
          type: PlaybackStream
          name: Spotify
"#;

#[tokio::test]
async fn test_first_run_writes_scaffold() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);

    let first = manager.load().await;
    assert_eq!(first.origin, LoadOrigin::Created);
    assert!(manager.exists());
    assert_eq!(first.config, Configuration::default_scaffold());

    let second = manager.load().await;
    assert_eq!(second.origin, LoadOrigin::Loaded);
    assert_eq!(second.config, first.config);
}

#[tokio::test]
async fn test_store_changes_survive_restart() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let config = manager.load().await.config;

    let stack = Stack::with_persistence(config, vec![], manager.clone());
    let slider = ControlId::slider(6).unwrap();
    let strong = AudioTargetRef::new(TargetCategory::PlaybackStream, "Firefox").with_disambiguator("firefox");
    let legacy = AudioTargetRef::new(TargetCategory::RecordStream, "Discord");
    stack.store.assign(slider, strong.clone());
    stack.store.assign(slider, legacy.clone());
    stack.store.update_value(slider, 83);
    stack.store.flush().await.unwrap();

    let reloaded = manager.load().await;
    assert_eq!(reloaded.origin, LoadOrigin::Loaded);
    let binding = reloaded.config.binding(slider).unwrap();
    assert_eq!(binding.value.get(), 83);
    assert_eq!(binding.targets(), &[strong, legacy]);
    assert_eq!(reloaded.config, stack.store.snapshot());
}

#[tokio::test]
async fn test_legacy_file_converted_once() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    tokio::fs::write(manager.config_path(), LEGACY).await.unwrap();

    let converted = manager.load().await;
    assert_eq!(converted.origin, LoadOrigin::Converted);
    assert_eq!(converted.config.device.name, "Studio Korg");
    assert_eq!(
        converted
            .config
            .binding(ControlId::slider(4).unwrap())
            .unwrap()
            .targets(),
        &[AudioTargetRef::new(TargetCategory::PlaybackStream, "Spotify")]
    );

    let backup = dir.path().join("config.yaml.legacy");
    assert_eq!(tokio::fs::read_to_string(&backup).await.unwrap(), LEGACY);

    let again = manager.load().await;
    assert_eq!(again.origin, LoadOrigin::Loaded);
    assert_eq!(again.config, converted.config);
}

#[tokio::test]
async fn test_corrupt_file_is_never_overwritten() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    let garbage = "controls: [this is: not: valid";
    tokio::fs::write(manager.config_path(), garbage).await.unwrap();

    let outcome = manager.load().await;
    assert_eq!(outcome.origin, LoadOrigin::Fallback);
    assert_eq!(outcome.config, Configuration::default_scaffold());
    assert!(dir.path().join("config.yaml.corrupt").exists());

    // Edits and the shutdown flush leave the unreadable file alone
    let stack = Stack::with_persistence(outcome.config, vec![], manager.clone());
    stack.store.update_value(ControlId::slider(1).unwrap(), 10);
    stack.store.assign(
        ControlId::knob(1).unwrap(),
        AudioTargetRef::new(TargetCategory::PlaybackStream, "Music"),
    );
    stack.store.flush().await.unwrap();
    assert_eq!(
        tokio::fs::read_to_string(manager.config_path()).await.unwrap(),
        garbage
    );
}

#[tokio::test]
async fn test_unbacked_legacy_file_is_never_overwritten() {
    let dir = TempDir::new().unwrap();
    let manager = manager(&dir);
    tokio::fs::write(manager.config_path(), LEGACY).await.unwrap();
    tokio::fs::create_dir(dir.path().join("config.yaml.legacy"))
        .await
        .unwrap();

    let outcome = manager.load().await;
    assert_eq!(outcome.origin, LoadOrigin::Converted);

    let stack = Stack::with_persistence(outcome.config, vec![], manager.clone());
    stack.store.update_value(ControlId::slider(4).unwrap(), 90);
    stack.store.flush().await.unwrap();
    assert_eq!(
        tokio::fs::read_to_string(manager.config_path()).await.unwrap(),
        LEGACY
    );
}
