//! Browser protocol driving the runtime

use crate::support::{cc, stream, Stack};
use faderlink_core::domain::{Configuration, ControlId};
use faderlink_web::messages::ClientMessage;
use faderlink_web::updates::{relay_values, StructuralPoller};
use faderlink_web::WebContext;
use std::time::Duration;

fn context(stack: &Stack) -> WebContext {
    WebContext::new(stack.store.clone(), stack.registry.clone())
}

#[tokio::test]
async fn test_ui_assignment_syncs_volume_and_rules() {
    let stack = Stack::new(
        Configuration::default_scaffold(),
        vec![stream("Firefox", "firefox", "ff:3")],
    );
    stack.watch_assignments();
    let ctx = context(&stack);
    let slider = ControlId::slider(2).unwrap();
    stack.store.update_value(slider, 30);

    ctx.handle(ClientMessage::AssignControl {
        control_type: "slider".into(),
        control_id: "slider2".into(),
        source_id: "ff:3".into(),
    })
    .await
    .unwrap();

    // Initial sync to the stored position
    stack.wait_for_writes(1).await;
    assert!((stack.server.writes()[0].fraction - 0.3).abs() < 1e-6);

    // Then the hardware takes over
    stack.wait_for_rules(1).await;
    stack.dispatcher.handle(&cc(0, 1, 127)).await;
    stack.wait_for_writes(2).await;
    assert!((stack.server.writes()[1].fraction - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_hardware_moves_reach_the_browser() {
    let stack = Stack::new(Configuration::default_scaffold(), vec![]);
    let ctx = context(&stack);
    let (_, mut queues) = ctx.hub().register();
    tokio::spawn(relay_values(ctx.hub().clone(), stack.store.subscribe_values()));

    stack.dispatcher.handle(&cc(0, 23, 127)).await;

    let frame = tokio::time::timeout(Duration::from_secs(1), queues.fast.recv())
        .await
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["controlId"], "knob8");
    assert_eq!(value["value"], 100);
}

#[tokio::test]
async fn test_vanished_stream_shows_as_virtual() {
    let stack = Stack::new(
        Configuration::default_scaffold(),
        vec![stream("Spotify", "spotify", "sp:9")],
    );
    let ctx = context(&stack);
    let (_, mut queues) = ctx.hub().register();
    let mut poller = StructuralPoller::new(ctx.clone());

    ctx.handle(ClientMessage::AssignControl {
        control_type: "knob".into(),
        control_id: "knob1".into(),
        source_id: "sp:9".into(),
    })
    .await
    .unwrap();
    assert!(poller.poll_once().await.unwrap());

    stack.server.remove("sp:9");
    assert!(poller.poll_once().await.unwrap());

    queues.reliable.try_recv().unwrap();
    let frame = queues.reliable.try_recv().unwrap();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["knobAssignments"]["knob1"][0], "PlaybackStream:Spotify");
    assert_eq!(value["sources"].as_array().unwrap().len(), 0);

    // The stored ref kept its binary, so unassigning by virtual id still works
    ctx.handle(ClientMessage::UnassignControl {
        control_type: "knob".into(),
        control_id: "knob1".into(),
        source_id: "PlaybackStream:Spotify".into(),
    })
    .await
    .unwrap();
    assert!(stack
        .store
        .binding(ControlId::knob(1).unwrap())
        .unwrap()
        .is_empty());
}
