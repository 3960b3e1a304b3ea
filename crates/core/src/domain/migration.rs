//! Legacy target migration
//!
//! Stored stream refs without a disambiguator match any live stream with
//! the same name. The first time such a ref is driven and a matching live
//! stream reports its binary, the ref is replaced by the disambiguated form.
//! Refs that are never driven stay legacy.

use crate::domain::control::ControlId;
use crate::domain::registry::{AudioTargetRegistry, Resolution};
use crate::domain::store::AssignmentStore;
use crate::domain::target::AudioTargetRef;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The ref is already strong, or no live stream offers a binary
    NotNeeded,
    /// The stored ref was replaced
    Migrated { upgraded: AudioTargetRef },
    /// A candidate existed but the legacy ref was gone from the store
    AlreadyMigrated,
}

pub struct MigrationResolver {
    store: Arc<AssignmentStore>,
    registry: Arc<AudioTargetRegistry>,
}

impl MigrationResolver {
    pub fn new(store: Arc<AssignmentStore>, registry: Arc<AudioTargetRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &Arc<AudioTargetRegistry> {
        &self.registry
    }

    /// Upgrade `target` on `control` if the resolution offers a candidate
    pub fn reconcile(
        &self,
        control: ControlId,
        target: &AudioTargetRef,
        resolution: &Resolution,
    ) -> MigrationOutcome {
        let Some(candidate) = resolution.migration.as_ref() else {
            return MigrationOutcome::NotNeeded;
        };
        if !target.is_legacy() {
            return MigrationOutcome::NotNeeded;
        }

        let upgraded = candidate.to_ref();
        if upgraded.is_legacy() {
            return MigrationOutcome::NotNeeded;
        }

        if self.store.migrate(control, target, upgraded.clone()) {
            info!(
                %control,
                source = %target.name,
                binary = upgraded.disambiguator().unwrap_or_default(),
                "Migrated legacy source"
            );
            MigrationOutcome::Migrated { upgraded }
        } else {
            debug!(%control, %target, "Legacy source already migrated");
            MigrationOutcome::AlreadyMigrated
        }
    }

    /// Resolve a stored target, upgrade it if needed and set its volume
    ///
    /// This is the single volume-apply path used by hardware events,
    /// fresh assignments and the startup sweep.
    pub async fn apply(
        &self,
        control: ControlId,
        target: &AudioTargetRef,
        fraction: f32,
    ) -> MigrationOutcome {
        let resolution = self.registry.resolve(target).await;
        let outcome = self.reconcile(control, target, &resolution);

        if !resolution.is_empty() {
            self.registry.apply_volume(&resolution.matches, fraction).await;
        }
        outcome
    }
}
