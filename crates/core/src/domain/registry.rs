//! Audio target registry
//!
//! Bridges symbolic [`AudioTargetRef`]s to whatever the audio server
//! reports right now. Nothing is cached: every call re-queries the server,
//! and every server call is bounded by a timeout so one stuck query cannot
//! stall the dispatch path.

use crate::domain::target::{
    AudioError, AudioServer, AudioTargetRef, LiveAudioObject, Result, TargetCategory,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Name that device refs use to follow the server's default sink/source
pub const DEFAULT_DEVICE_NAME: &str = "Default";

/// Outcome of resolving one ref
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Live objects the ref currently drives
    pub matches: Vec<LiveAudioObject>,
    /// For legacy stream refs: the first name match that carries a binary
    pub migration: Option<LiveAudioObject>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

pub struct AudioTargetRegistry {
    server: Arc<dyn AudioServer>,
    timeout: Duration,
}

impl AudioTargetRegistry {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

    pub fn new(server: Arc<dyn AudioServer>) -> Self {
        Self {
            server,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn server(&self) -> &Arc<dyn AudioServer> {
        &self.server
    }

    async fn bounded<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| AudioError::Timeout(op.to_string()))?
    }

    /// Objects of one category
    pub async fn list(&self, category: TargetCategory) -> Result<Vec<LiveAudioObject>> {
        self.bounded("list", self.server.list(category)).await
    }

    /// All live objects, devices first
    ///
    /// A failing category is logged and skipped.
    pub async fn enumerate(&self) -> Vec<LiveAudioObject> {
        let mut objects = Vec::new();
        for category in TargetCategory::ALL {
            match self.list(category).await {
                Ok(found) => objects.extend(found),
                Err(e) => warn!(%category, error = %e, "Failed to enumerate audio objects"),
            }
        }
        objects
    }

    /// Resolve a ref against the live server state
    ///
    /// Lookup failures resolve to nothing; the caller treats that as a no-op.
    pub async fn resolve(&self, target: &AudioTargetRef) -> Resolution {
        let live = match self.list(target.category).await {
            Ok(live) => live,
            Err(e) => {
                warn!(target = %target, error = %e, "Failed to resolve audio target");
                return Resolution::default();
            }
        };

        let resolution = if target.category.is_device() {
            self.resolve_device(target, live).await
        } else {
            resolve_stream(target, live)
        };

        if resolution.is_empty() {
            debug!(target = %target, "Audio target matched nothing");
        }
        resolution
    }

    async fn resolve_device(
        &self,
        target: &AudioTargetRef,
        live: Vec<LiveAudioObject>,
    ) -> Resolution {
        let matches = if target.name == DEFAULT_DEVICE_NAME {
            let default = self
                .bounded("default_device", self.server.default_device(target.category))
                .await;
            match default {
                Ok(Some(id)) => live.into_iter().filter(|o| o.stable_id == id).collect(),
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(category = %target.category, error = %e, "Failed to query default device");
                    Vec::new()
                }
            }
        } else {
            live.into_iter().filter(|o| o.name == target.name).collect()
        };

        Resolution {
            matches,
            migration: None,
        }
    }

    /// Write one volume to every object; failures are logged per object
    ///
    /// Returns how many writes succeeded.
    pub async fn apply_volume(&self, objects: &[LiveAudioObject], fraction: f32) -> usize {
        let fraction = fraction.clamp(0.0, 1.0);
        let mut applied = 0;
        for object in objects {
            match self
                .bounded("set_volume", self.server.set_volume(object, fraction))
                .await
            {
                Ok(()) => {
                    debug!(target = %object.display_name(), volume = fraction, "Volume set");
                    applied += 1;
                }
                Err(e) => warn!(
                    target = %object.display_name(),
                    id = %object.stable_id,
                    error = %e,
                    "Failed to set volume"
                ),
            }
        }
        applied
    }

    /// Make the output device with exactly this name the default
    pub async fn set_default_output(&self, name: &str) -> Result<()> {
        let outputs = self.list(TargetCategory::OutputDevice).await?;
        let device = outputs
            .into_iter()
            .find(|o| o.name == name)
            .ok_or_else(|| AudioError::NotFound(name.to_string()))?;

        self.bounded("set_default_output", self.server.set_default_output(&device))
            .await
    }

    /// Live object with the given stable id, if any
    pub async fn find_by_stable_id(&self, stable_id: &str) -> Option<LiveAudioObject> {
        self.enumerate()
            .await
            .into_iter()
            .find(|o| o.stable_id == stable_id)
    }
}

fn resolve_stream(target: &AudioTargetRef, live: Vec<LiveAudioObject>) -> Resolution {
    match target.disambiguator() {
        Some(binary) => Resolution {
            matches: live
                .into_iter()
                .filter(|o| o.name == target.name && o.disambiguator.as_deref() == Some(binary))
                .collect(),
            migration: None,
        },
        None => {
            let matches: Vec<_> = live.into_iter().filter(|o| o.name == target.name).collect();
            let migration = matches.iter().find(|o| o.disambiguator.is_some()).cloned();
            Resolution { matches, migration }
        }
    }
}
