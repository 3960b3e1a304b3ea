//! Shared wiring for scenario tests

use faderlink_core::domain::{
    AssignmentStore, AudioTargetRegistry, ConfigPersistence, Configuration, ControlEvent,
    DeviceLayout, EventDispatcher, LiveAudioObject, MigrationResolver, TargetCategory,
};
use faderlink_core::testing::{FakeAudioServer, NullPersistence};
use std::sync::Arc;
use std::time::Duration;

/// The full runtime minus real hardware
pub struct Stack {
    pub server: Arc<FakeAudioServer>,
    pub registry: Arc<AudioTargetRegistry>,
    pub store: Arc<AssignmentStore>,
    pub dispatcher: Arc<EventDispatcher>,
}

impl Stack {
    pub fn new(config: Configuration, objects: Vec<LiveAudioObject>) -> Self {
        Self::with_persistence(config, objects, Arc::new(NullPersistence))
    }

    pub fn with_persistence(
        config: Configuration,
        objects: Vec<LiveAudioObject>,
        persistence: Arc<dyn ConfigPersistence>,
    ) -> Self {
        let server = Arc::new(FakeAudioServer::with_objects(objects));
        let registry = Arc::new(AudioTargetRegistry::new(server.clone()));
        let store = Arc::new(AssignmentStore::new(
            config,
            persistence,
            AssignmentStore::DEFAULT_DEBOUNCE,
        ));
        let migrator = Arc::new(MigrationResolver::new(store.clone(), registry.clone()));
        let dispatcher = Arc::new(EventDispatcher::new(
            store.clone(),
            migrator,
            DeviceLayout::default(),
        ));
        Self {
            server,
            registry,
            store,
            dispatcher,
        }
    }

    /// Keep rules in sync with the store, as the application does
    pub fn watch_assignments(&self) {
        tokio::spawn(
            self.dispatcher
                .clone()
                .watch_assignments(self.store.subscribe_changes()),
        );
    }

    /// Wait until the fake server has recorded `count` volume writes
    pub async fn wait_for_writes(&self, count: usize) {
        let server = self.server.clone();
        tokio::time::timeout(Duration::from_secs(2), async move {
            while server.writes().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("volume writes");
    }

    /// Wait until the dispatcher holds `count` rules
    pub async fn wait_for_rules(&self, count: usize) {
        let dispatcher = self.dispatcher.clone();
        tokio::time::timeout(Duration::from_secs(2), async move {
            while dispatcher.rules().len() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("rule recompile");
    }
}

/// Decode a raw control change the way the MIDI callback does
pub fn cc(channel: u8, controller: u8, value: u8) -> ControlEvent {
    ControlEvent::decode(&[0xB0 | channel, controller, value]).expect("valid control change")
}

pub fn stream(name: &str, binary: &str, stable_id: &str) -> LiveAudioObject {
    LiveAudioObject::new(TargetCategory::PlaybackStream, name, stable_id, stable_id)
        .with_disambiguator(binary)
}
