//! Background tasks that push state to browsers
//!
//! Control values go out immediately on the lossy path. Structural state
//! (sources and assignments) has a single authoritative producer, the
//! [`StructuralPoller`], which diffs against its last broadcast. Store
//! changes and audio server events only make it run sooner.

use crate::context::WebContext;
use crate::error::Result;
use crate::hub::ClientHub;
use crate::messages::ServerMessage;
use faderlink_core::domain::StoreEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

pub struct StructuralPoller {
    ctx: WebContext,
    last: Option<String>,
}

impl StructuralPoller {
    pub fn new(ctx: WebContext) -> Self {
        Self { ctx, last: None }
    }

    /// Build the current state and broadcast it if it changed
    pub async fn poll_once(&mut self) -> Result<bool> {
        let state = self.ctx.build_state(false).await;
        let frame = serde_json::to_string(&ServerMessage::AudioSourcesUpdate(state))?;

        if self.last.as_deref() == Some(frame.as_str()) {
            return Ok(false);
        }

        trace!(clients = self.ctx.hub().client_count(), "Broadcasting source state");
        self.ctx.hub().broadcast_reliable(&frame);
        self.last = Some(frame);
        Ok(true)
    }

    pub async fn run(mut self, interval: Duration) {
        let trigger = self.ctx.poll_trigger();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = trigger.notified() => {}
            }
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Structural poll failed");
            }
        }
    }
}

/// Turn value changes into `controlValueUpdate` frames
pub async fn relay_values(hub: Arc<ClientHub>, mut values: broadcast::Receiver<StoreEvent>) {
    loop {
        match values.recv().await {
            Ok(StoreEvent::ValueChanged { control, value }) => {
                let message = ServerMessage::ControlValueUpdate {
                    control_type: control.kind().as_str().to_string(),
                    control_id: control.to_string(),
                    value: value.get(),
                };
                match serde_json::to_string(&message) {
                    Ok(frame) => hub.broadcast_fast(&frame),
                    Err(e) => warn!(error = %e, "Failed to encode value update"),
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Value relay lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wake the poller on every assignment change
pub async fn relay_changes(trigger: Arc<Notify>, mut changes: mpsc::UnboundedReceiver<StoreEvent>) {
    while let Some(event) = changes.recv().await {
        trace!(control = %event.control(), "Assignment changed, polling early");
        trigger.notify_one();
    }
}

/// Spawn the poller and both relays
pub fn spawn_background(ctx: &WebContext, poll_interval: Duration) -> Vec<JoinHandle<()>> {
    let store = ctx.store();
    vec![
        tokio::spawn(relay_values(ctx.hub().clone(), store.subscribe_values())),
        tokio::spawn(relay_changes(ctx.poll_trigger(), store.subscribe_changes())),
        tokio::spawn(StructuralPoller::new(ctx.clone()).run(poll_interval)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use faderlink_core::domain::{
        AssignmentStore, AudioTargetRef, AudioTargetRegistry, Configuration, ControlId,
        LiveAudioObject, TargetCategory,
    };
    use faderlink_core::testing::{FakeAudioServer, NullPersistence};

    fn context(server: Arc<FakeAudioServer>) -> WebContext {
        let registry = Arc::new(AudioTargetRegistry::new(server));
        let store = Arc::new(AssignmentStore::new(
            Configuration::default_scaffold(),
            Arc::new(NullPersistence),
            AssignmentStore::DEFAULT_DEBOUNCE,
        ));
        WebContext::new(store, registry)
    }

    #[tokio::test]
    async fn test_poll_broadcasts_only_on_change() {
        let server = Arc::new(FakeAudioServer::new());
        let ctx = context(server.clone());
        let (_, mut queues) = ctx.hub().register();
        let mut poller = StructuralPoller::new(ctx.clone());

        assert!(poller.poll_once().await.unwrap());
        assert!(!poller.poll_once().await.unwrap());
        assert!(queues.reliable.try_recv().is_ok());
        assert!(queues.reliable.try_recv().is_err());

        server.add(LiveAudioObject::new(
            TargetCategory::PlaybackStream,
            "Music",
            "music:1",
            "1",
        ));
        assert!(poller.poll_once().await.unwrap());

        ctx.store().assign(
            ControlId::slider(1).unwrap(),
            AudioTargetRef::new(TargetCategory::PlaybackStream, "Music"),
        );
        assert!(poller.poll_once().await.unwrap());

        let frame = {
            queues.reliable.try_recv().unwrap();
            queues.reliable.try_recv().unwrap()
        };
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["sliderAssignments"]["slider1"][0], "music:1");
        assert!(value.get("sliderValues").is_none());
    }

    #[tokio::test]
    async fn test_value_relay_reaches_clients() {
        let ctx = context(Arc::new(FakeAudioServer::new()));
        let (_, mut queues) = ctx.hub().register();
        tokio::spawn(relay_values(
            ctx.hub().clone(),
            ctx.store().subscribe_values(),
        ));

        ctx.store().update_value(ControlId::knob(2).unwrap(), 64);

        let frame = tokio::time::timeout(Duration::from_secs(1), queues.fast.recv())
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "controlValueUpdate");
        assert_eq!(value["controlType"], "knob");
        assert_eq!(value["controlId"], "knob2");
        assert_eq!(value["value"], 64);
    }

    #[tokio::test]
    async fn test_assignment_triggers_early_poll() {
        let ctx = context(Arc::new(FakeAudioServer::new()));
        let trigger = ctx.poll_trigger();
        tokio::spawn(relay_changes(trigger.clone(), ctx.store().subscribe_changes()));

        ctx.store().assign(
            ControlId::slider(2).unwrap(),
            AudioTargetRef::new(TargetCategory::OutputDevice, "Default"),
        );

        tokio::time::timeout(Duration::from_secs(1), trigger.notified())
            .await
            .expect("poll trigger");
    }
}
