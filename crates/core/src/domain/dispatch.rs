//! Event dispatcher
//!
//! Runtime control loop. Each hardware event first updates the stored
//! control position (when it comes from a slider or knob), then runs the
//! volume actions of every matching compiled rule. The active rule list is
//! immutable and replaced wholesale whenever assignments change.

use crate::domain::control::ControlValue;
use crate::domain::midi::ControlEvent;
use crate::domain::migration::{MigrationOutcome, MigrationResolver};
use crate::domain::rules::{compile, matching_rules, ActionKind, CompiledRule, DeviceLayout, MessageKind};
use crate::domain::store::{AssignmentStore, StoreEvent};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

pub struct EventDispatcher {
    rules: ArcSwap<Vec<CompiledRule>>,
    store: Arc<AssignmentStore>,
    migrator: Arc<MigrationResolver>,
    layout: DeviceLayout,
}

impl EventDispatcher {
    /// Create a dispatcher with rules compiled from the current bindings
    pub fn new(
        store: Arc<AssignmentStore>,
        migrator: Arc<MigrationResolver>,
        layout: DeviceLayout,
    ) -> Self {
        let rules = compile(&store.snapshot(), &layout);
        Self {
            rules: ArcSwap::from_pointee(rules),
            store,
            migrator,
            layout,
        }
    }

    pub fn layout(&self) -> &DeviceLayout {
        &self.layout
    }

    /// Current rule list
    pub fn rules(&self) -> Arc<Vec<CompiledRule>> {
        self.rules.load_full()
    }

    pub fn replace_rules(&self, rules: Vec<CompiledRule>) {
        self.rules.store(Arc::new(rules));
    }

    /// Rebuild rules from the latest snapshot; returns the rule count
    pub fn recompile(&self) -> usize {
        let rules = compile(&self.store.snapshot(), &self.layout);
        let count = rules.len();
        self.replace_rules(rules);
        debug!(rules = count, "Rules recompiled");
        count
    }

    /// Handle one decoded hardware event
    pub async fn handle(&self, event: &ControlEvent) {
        let Some((kind, channel, number, raw)) = event.rule_input() else {
            trace!("Ignoring SysEx message");
            return;
        };

        if kind == MessageKind::ControlChange {
            if let Some(control) = self.layout.control_for(channel, number) {
                let value = ControlValue::from_midi(raw);
                self.store.update_value(control, value.get() as i64);
            }
        }

        // One rule list for the whole event
        let rules = self.rules.load_full();
        for rule in matching_rules(&rules, kind, channel, number) {
            let fraction = rule.volume_fraction(raw);
            trace!(control = %rule.control, fraction, "Rule matched");
            for action in &rule.actions {
                match action.kind {
                    ActionKind::SetVolume => {
                        self.migrator.apply(rule.control, &action.target, fraction).await;
                    }
                }
            }
        }
    }

    /// Consume hardware events until the sender goes away
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ControlEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(&event).await;
        }
        info!("MIDI event stream closed");
    }

    /// Keep rules in sync with assignments
    ///
    /// A fresh assignment is immediately driven to the control's stored
    /// position so it does not wait for the next hardware event.
    pub async fn watch_assignments(self: Arc<Self>, mut changes: mpsc::UnboundedReceiver<StoreEvent>) {
        while let Some(event) = changes.recv().await {
            self.recompile();

            if let StoreEvent::Assigned {
                control,
                target,
                value,
            } = event
            {
                debug!(%control, %target, value = value.get(), "Syncing new assignment");
                self.migrator
                    .apply(control, &target, value.as_fraction())
                    .await;
            }
        }
        debug!("Assignment stream closed");
    }

    /// Drive every assigned target to its stored position
    ///
    /// Legacy refs get migrated here when a matching stream is live.
    /// Returns how many refs were migrated.
    pub async fn startup_sweep(&self) -> usize {
        let snapshot = self.store.snapshot();
        let mut migrated = 0;

        for binding in snapshot.bindings().filter(|b| !b.is_empty()) {
            let fraction = binding.value.as_fraction();
            for target in binding.targets() {
                let outcome = self.migrator.apply(binding.id, target, fraction).await;
                if matches!(outcome, MigrationOutcome::Migrated { .. }) {
                    migrated += 1;
                }
            }
        }

        info!(migrated, "Startup sweep complete");
        migrated
    }
}
