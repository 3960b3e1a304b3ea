//! In-memory collaborators for tests

use crate::domain::config::{self, ConfigPersistence};
use crate::domain::control::Configuration;
use crate::domain::target::{AudioError, AudioServer, LiveAudioObject, Result, TargetCategory};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// One recorded `set_volume` call
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeWrite {
    pub stable_id: String,
    pub name: String,
    pub fraction: f32,
}

/// Scriptable [`AudioServer`] that records every volume write
#[derive(Default)]
pub struct FakeAudioServer {
    objects: Mutex<Vec<LiveAudioObject>>,
    defaults: Mutex<HashMap<TargetCategory, String>>,
    writes: Mutex<Vec<VolumeWrite>>,
    failing: Mutex<HashSet<TargetCategory>>,
    rejecting: Mutex<HashSet<String>>,
    default_output: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeAudioServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(objects: Vec<LiveAudioObject>) -> Self {
        let server = Self::default();
        *server.objects.lock() = objects;
        server
    }

    pub fn add(&self, object: LiveAudioObject) {
        self.objects.lock().push(object);
    }

    pub fn remove(&self, stable_id: &str) {
        self.objects.lock().retain(|o| o.stable_id != stable_id);
    }

    pub fn set_default(&self, category: TargetCategory, stable_id: &str) {
        self.defaults.lock().insert(category, stable_id.to_string());
    }

    /// Make `list` fail for one category
    pub fn fail_category(&self, category: TargetCategory) {
        self.failing.lock().insert(category);
    }

    /// Make `set_volume` fail for one object
    pub fn reject_writes(&self, stable_id: &str) {
        self.rejecting.lock().insert(stable_id.to_string());
    }

    /// Delay every `list` call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn writes(&self) -> Vec<VolumeWrite> {
        self.writes.lock().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }

    pub fn default_output(&self) -> Option<String> {
        self.default_output.lock().clone()
    }
}

#[async_trait]
impl AudioServer for FakeAudioServer {
    async fn list(&self, category: TargetCategory) -> Result<Vec<LiveAudioObject>> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&category) {
            return Err(AudioError::Command(format!("list {} failed", category)));
        }
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|o| o.category == category)
            .cloned()
            .collect())
    }

    async fn default_device(&self, category: TargetCategory) -> Result<Option<String>> {
        Ok(self.defaults.lock().get(&category).cloned())
    }

    async fn set_volume(&self, object: &LiveAudioObject, fraction: f32) -> Result<()> {
        if self.rejecting.lock().contains(&object.stable_id) {
            return Err(AudioError::Command(format!(
                "stream {} went away",
                object.stable_id
            )));
        }
        self.writes.lock().push(VolumeWrite {
            stable_id: object.stable_id.clone(),
            name: object.name.clone(),
            fraction,
        });
        Ok(())
    }

    async fn set_default_output(&self, object: &LiveAudioObject) -> Result<()> {
        *self.default_output.lock() = Some(object.stable_id.clone());
        Ok(())
    }
}

/// Persistence that discards every save
pub struct NullPersistence;

#[async_trait]
impl ConfigPersistence for NullPersistence {
    async fn save(&self, _config: &Configuration) -> config::Result<()> {
        Ok(())
    }
}
