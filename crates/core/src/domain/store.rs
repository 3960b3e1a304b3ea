//! Assignment store
//!
//! Sole owner of the live [`Configuration`]. All mutation goes through one
//! mutex; readers get copies. Every change is published to subscribers and
//! persistence runs on a background task behind a debounce timer.
//!
//! Two subscription kinds exist:
//! - `subscribe_values()`: lossy broadcast of `ValueChanged`, for the UI fast path
//! - `subscribe_changes()`: unbounded, lossless stream of `Assigned`/`Unassigned`

use crate::domain::config::{ConfigError, ConfigPersistence, Result};
use crate::domain::control::{ControlBinding, ControlId, ControlValue, Configuration};
use crate::domain::target::{AudioTargetRef, TargetCategory};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Capacity of the lossy value channel
const VALUE_CHANNEL_CAPACITY: usize = 256;

/// Change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ValueChanged {
        control: ControlId,
        value: ControlValue,
    },
    /// `value` is the control's position at assignment time
    Assigned {
        control: ControlId,
        target: AudioTargetRef,
        value: ControlValue,
    },
    Unassigned {
        control: ControlId,
        removed: Vec<AudioTargetRef>,
    },
}

impl StoreEvent {
    pub fn control(&self) -> ControlId {
        match self {
            StoreEvent::ValueChanged { control, .. }
            | StoreEvent::Assigned { control, .. }
            | StoreEvent::Unassigned { control, .. } => *control,
        }
    }

    /// Assign/unassign; these must never be dropped
    pub fn is_structural(&self) -> bool {
        !matches!(self, StoreEvent::ValueChanged { .. })
    }
}

enum SaveCommand {
    Dirty,
    Flush(oneshot::Sender<Result<()>>),
}

pub struct AssignmentStore {
    config: Arc<Mutex<Configuration>>,
    values: broadcast::Sender<StoreEvent>,
    changes: Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
    saver: mpsc::UnboundedSender<SaveCommand>,
}

impl AssignmentStore {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

    /// Create the store and spawn its persistence task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: Configuration,
        persistence: Arc<dyn ConfigPersistence>,
        debounce: Duration,
    ) -> Self {
        let config = Arc::new(Mutex::new(config));
        let (values, _) = broadcast::channel(VALUE_CHANNEL_CAPACITY);
        let (saver, save_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_saver(config.clone(), persistence, debounce, save_rx));

        Self {
            config,
            values,
            changes: Mutex::new(Vec::new()),
            saver,
        }
    }

    /// Lossy stream of value changes
    pub fn subscribe_values(&self) -> broadcast::Receiver<StoreEvent> {
        self.values.subscribe()
    }

    /// Lossless stream of assignment changes
    pub fn subscribe_changes(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.changes.lock().push(tx);
        rx
    }

    fn publish(&self, event: StoreEvent) {
        if event.is_structural() {
            self.changes
                .lock()
                .retain(|tx| tx.send(event.clone()).is_ok());
        } else {
            // No receivers is fine
            let _ = self.values.send(event);
        }
    }

    fn schedule_save(&self) {
        if self.saver.send(SaveCommand::Dirty).is_err() {
            error!("Persistence task stopped, change will not be saved");
        }
    }

    /// Record a control position, clamped to 0..=100
    pub fn update_value(&self, control: ControlId, raw: i64) -> ControlValue {
        let value = ControlValue::new(raw);
        let changed = {
            let mut config = self.config.lock();
            let binding = config.binding_or_insert(control);
            let changed = binding.value != value;
            binding.value = value;
            self.publish(StoreEvent::ValueChanged { control, value });
            changed
        };

        if changed {
            self.schedule_save();
        }
        value
    }

    /// Append a target; returns false if an equal one was already present
    pub fn assign(&self, control: ControlId, target: AudioTargetRef) -> bool {
        {
            let mut config = self.config.lock();
            let binding = config.binding_or_insert(control);
            if !binding.add_target(target.clone()) {
                debug!(%control, %target, "Target already assigned");
                return false;
            }
            let value = binding.value;
            self.publish(StoreEvent::Assigned {
                control,
                target: target.clone(),
                value,
            });
        }

        info!(%control, %target, "Target assigned");
        self.schedule_save();
        true
    }

    /// Remove targets by identity
    ///
    /// Without a disambiguator every target with this category and name is
    /// removed; with one only the exact match is. Nothing is published when
    /// nothing matched.
    pub fn unassign(
        &self,
        control: ControlId,
        category: TargetCategory,
        name: &str,
        disambiguator: Option<&str>,
    ) -> Vec<AudioTargetRef> {
        let removed = {
            let mut config = self.config.lock();
            let Some(binding) = config.binding_mut(control) else {
                return Vec::new();
            };
            let removed = binding.remove_matching(category, name, disambiguator);
            if !removed.is_empty() {
                self.publish(StoreEvent::Unassigned {
                    control,
                    removed: removed.clone(),
                });
            }
            removed
        };

        if !removed.is_empty() {
            info!(%control, %category, name, count = removed.len(), "Targets unassigned");
            self.schedule_save();
        }
        removed
    }

    /// Remove exactly one stored ref
    pub fn unassign_exact(&self, control: ControlId, target: &AudioTargetRef) -> bool {
        {
            let mut config = self.config.lock();
            let Some(binding) = config.binding_mut(control) else {
                return false;
            };
            if !binding.remove_exact(target) {
                return false;
            }
            self.publish(StoreEvent::Unassigned {
                control,
                removed: vec![target.clone()],
            });
        }

        info!(%control, %target, "Target unassigned");
        self.schedule_save();
        true
    }

    /// Replace a legacy ref with its disambiguated form in one step
    ///
    /// Returns false when the legacy ref is no longer stored, which means
    /// another caller already migrated or removed it.
    pub fn migrate(
        &self,
        control: ControlId,
        legacy: &AudioTargetRef,
        upgraded: AudioTargetRef,
    ) -> bool {
        {
            let mut config = self.config.lock();
            let Some(binding) = config.binding_mut(control) else {
                return false;
            };
            if !binding.remove_exact(legacy) {
                return false;
            }
            let value = binding.value;
            let added = binding.add_target(upgraded.clone());

            self.publish(StoreEvent::Unassigned {
                control,
                removed: vec![legacy.clone()],
            });
            if added {
                self.publish(StoreEvent::Assigned {
                    control,
                    target: upgraded.clone(),
                    value,
                });
            }
        }

        info!(%control, from = %legacy, to = %upgraded, "Target migrated");
        self.schedule_save();
        true
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> Configuration {
        self.config.lock().clone()
    }

    pub fn binding(&self, control: ControlId) -> Option<ControlBinding> {
        self.config.lock().binding(control).cloned()
    }

    pub fn value(&self, control: ControlId) -> Option<ControlValue> {
        self.config.lock().binding(control).map(|b| b.value)
    }

    /// Write pending changes now, bypassing the debounce window
    ///
    /// Does nothing when no change is pending.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.saver
            .send(SaveCommand::Flush(tx))
            .map_err(|_| ConfigError::Invalid("persistence task stopped".to_string()))?;
        rx.await
            .map_err(|_| ConfigError::Invalid("persistence task stopped".to_string()))?
    }
}

async fn save_now(config: &Mutex<Configuration>, persistence: &dyn ConfigPersistence) -> Result<()> {
    let snapshot = config.lock().clone();
    let result = persistence.save(&snapshot).await;
    match &result {
        Ok(()) => debug!("Bindings saved"),
        Err(e) => error!(error = %e, "Failed to save bindings"),
    }
    result
}

async fn run_saver(
    config: Arc<Mutex<Configuration>>,
    persistence: Arc<dyn ConfigPersistence>,
    debounce: Duration,
    mut commands: mpsc::UnboundedReceiver<SaveCommand>,
) {
    // Pending changes stay dirty until a save succeeds; a failed save re-arms the timer
    let mut dirty = false;
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                command = commands.recv() => command,
                _ = tokio::time::sleep_until(at) => {
                    deadline = None;
                    if save_now(&config, persistence.as_ref()).await.is_ok() {
                        dirty = false;
                    } else {
                        deadline = Some(Instant::now() + debounce);
                    }
                    continue;
                }
            },
            None => commands.recv().await,
        };

        match command {
            Some(SaveCommand::Dirty) => {
                dirty = true;
                deadline = Some(Instant::now() + debounce);
            }
            Some(SaveCommand::Flush(reply)) => {
                let result = if dirty {
                    save_now(&config, persistence.as_ref()).await
                } else {
                    Ok(())
                };
                match result {
                    Ok(()) => {
                        dirty = false;
                        deadline = None;
                    }
                    Err(_) => deadline = Some(Instant::now() + debounce),
                }
                let _ = reply.send(result);
            }
            None => {
                if dirty {
                    let _ = save_now(&config, persistence.as_ref()).await;
                }
                break;
            }
        }
    }
}
