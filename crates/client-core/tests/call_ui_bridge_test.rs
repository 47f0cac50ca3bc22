//! Platform call UI bridge tests

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{
    client, eventually, MockBackend, MockInvite, MockPendingAction, RecordingCallManagement,
    Report,
};
use voxlink_client_core::{
    ActionOutcome, CallActionKind, CallContext, CallId, CallManagement, CallStatus, CallUiBridge,
    ClientManager, EndedReason, LegId, OutgoingCallProgress, TransactionId,
};

fn attach(client: &ClientManager) -> (CallUiBridge, Arc<RecordingCallManagement>) {
    let platform = RecordingCallManagement::new();
    let bridge = CallUiBridge::attach(client, Arc::clone(&platform) as Arc<dyn CallManagement>)
        .expect("bridge should attach");
    (bridge, platform)
}

fn ring(client: &ClientManager, caller: &str) -> (CallId, Arc<MockInvite>) {
    let id = CallId::new_v4();
    let invite = MockInvite::new(id, caller);
    client
        .event_adapter()
        .did_receive_invite(&id.to_string(), invite.clone());
    (id, invite)
}

#[tokio::test]
async fn test_incoming_call_is_reported() {
    let client = client(MockBackend::new());
    let (_bridge, platform) = attach(&client);

    let (a, _invite) = ring(&client, "carol");
    eventually("incoming report", || {
        platform.reports() == vec![Report::Incoming(a, "carol".to_string())]
    })
    .await;
}

#[tokio::test]
async fn test_app_answer_is_requested_and_fulfilled() {
    let client = client(MockBackend::new());
    let (bridge, platform) = attach(&client);
    let (a, invite) = ring(&client, "carol");

    let tx = client.answer_call(a).unwrap();
    eventually("answer request", || platform.request_for(a, CallActionKind::Answer).is_some()).await;
    let request = platform.request_for(a, CallActionKind::Answer).unwrap();
    assert_eq!(request.transaction_id, tx.transaction_id);
    assert_eq!(request.handle, None);

    let (action, outcome) = MockPendingAction::new(tx.transaction_id, a, CallActionKind::Answer);
    bridge.perform_action(action).await;
    assert_eq!(*outcome.lock().unwrap(), Some(true));
    assert_eq!(invite.answers.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lock_screen_end_rejects_ringing_call() {
    let client = client(MockBackend::new());
    let (bridge, platform) = attach(&client);
    let (a, invite) = ring(&client, "dave");
    eventually("call known", || client.call(&a).is_some()).await;

    let platform_tid = TransactionId::new_v4();
    let (action, outcome) = MockPendingAction::new(platform_tid, a, CallActionKind::End);
    bridge.perform_action(action).await;

    assert_eq!(*outcome.lock().unwrap(), Some(true));
    assert_eq!(invite.rejects.load(Ordering::SeqCst), 1);
    assert!(client.call(&a).is_none());
    // The platform already knows about its own transaction.
    assert!(platform.request_for(a, CallActionKind::End).is_none());
}

#[tokio::test]
async fn test_lock_screen_answer_then_end_hangs_up() {
    let backend = MockBackend::new();
    let client = client(backend);
    let (bridge, _platform) = attach(&client);
    let (a, _invite) = ring(&client, "erin");
    eventually("call known", || client.call(&a).is_some()).await;

    let (answer, answered) = MockPendingAction::new(TransactionId::new_v4(), a, CallActionKind::Answer);
    bridge.perform_action(answer).await;
    assert_eq!(*answered.lock().unwrap(), Some(true));

    client
        .event_adapter()
        .did_receive_leg_status(&a.to_string(), &a.to_string(), "answered");
    eventually("call answered", || {
        client.call(&a).map(|record| record.status) == Some(CallStatus::Answered)
    })
    .await;

    let (end, ended) = MockPendingAction::new(TransactionId::new_v4(), a, CallActionKind::End);
    bridge.perform_action(end).await;
    assert_eq!(*ended.lock().unwrap(), Some(true));
    assert!(client.call(&a).is_none());
}

#[tokio::test]
async fn test_outbound_call_reports_progress() {
    let client = client(MockBackend::new());
    let (bridge, platform) = attach(&client);
    let adapter = client.event_adapter();

    let tx = client.start_outbound_call(CallContext::to("bob")).unwrap();
    let x = match client.wait_for_result(tx.transaction_id).await.unwrap().result {
        Ok(ActionOutcome::OutboundStarted(id)) => id,
        other => panic!("unexpected result {:?}", other),
    };

    eventually("outgoing report", || {
        platform
            .reports()
            .contains(&Report::Outgoing(x, OutgoingCallProgress::Connecting))
    })
    .await;
    let request = platform.request_for(x, CallActionKind::StartOutbound).unwrap();
    assert_eq!(request.handle.as_deref(), Some("bob"));

    let (start, started) = MockPendingAction::new(request.transaction_id, x, CallActionKind::StartOutbound);
    bridge.perform_start_outbound(start);
    assert_eq!(*started.lock().unwrap(), Some(true));

    let callee = LegId::new_v4();
    adapter.did_receive_leg_status(&x.to_string(), &callee.to_string(), "answered");
    adapter.did_receive_leg_status(&x.to_string(), &callee.to_string(), "completed");
    eventually("ended report", || {
        platform
            .reports()
            .contains(&Report::Ended(x, EndedReason::RemoteEnded))
    })
    .await;
    assert_eq!(
        platform.reports(),
        vec![
            Report::Outgoing(x, OutgoingCallProgress::Connecting),
            Report::Outgoing(x, OutgoingCallProgress::Connected),
            Report::Ended(x, EndedReason::RemoteEnded),
        ]
    );
}

#[tokio::test]
async fn test_caller_cancel_reports_unanswered() {
    let client = client(MockBackend::new());
    let (_bridge, platform) = attach(&client);
    let (a, _invite) = ring(&client, "frank");

    client
        .event_adapter()
        .did_receive_hangup(&a.to_string(), &LegId::new_v4().to_string());
    eventually("unanswered report", || {
        platform
            .reports()
            .contains(&Report::Ended(a, EndedReason::Unanswered))
    })
    .await;
}

#[tokio::test]
async fn test_platform_answer_for_unknown_call_fails() {
    let client = client(MockBackend::new());
    let (bridge, _platform) = attach(&client);

    let (action, outcome) =
        MockPendingAction::new(TransactionId::new_v4(), CallId::new_v4(), CallActionKind::Answer);
    bridge.perform_action(action).await;
    assert_eq!(*outcome.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn test_detached_bridge_stops_reporting() {
    let client = client(MockBackend::new());
    let (bridge, platform) = attach(&client);
    let (first, _invite) = ring(&client, "gina");
    eventually("first report", || platform.reports().len() == 1).await;

    bridge.detach();
    let (_second, _invite) = ring(&client, "hal");
    let (sentinel, _invite) = ring(&client, "ivy");
    eventually("sentinel call", || client.call(&sentinel).is_some()).await;
    tokio::task::yield_now().await;

    assert_eq!(platform.reports(), vec![Report::Incoming(first, "gina".to_string())]);
}

#[tokio::test]
async fn test_detached_bridge_stops_reporting_live_calls() {
    let client = client(MockBackend::new());
    let (bridge, platform) = attach(&client);
    let (a, _invite) = ring(&client, "jo");
    eventually("incoming report", || platform.reports().len() == 1).await;

    bridge.detach();
    client
        .event_adapter()
        .did_receive_hangup(&a.to_string(), &LegId::new_v4().to_string());
    eventually("call gone", || client.call(&a).is_none()).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(platform.reports(), vec![Report::Incoming(a, "jo".to_string())]);
}
