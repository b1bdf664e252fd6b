mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use common::*;
use dialphone::{
    BridgeBuilder, BridgeEvent, CallBridge, HostCallState, LinkFailure, LinkState,
};
use dialphone_test_harness::{MockConnector, MockHandle, MockTransport};

fn bridge_with(connector: &Arc<MockConnector>, host: &Arc<TestHost>) -> CallBridge {
    BridgeBuilder::new()
        .read_poll_interval(Duration::from_millis(10))
        .build_with_connector(connector.clone(), host.clone())
        .unwrap()
}

/// A bridge connected to a mock handset named "DialPhone", with the
/// initial state request already written.
async fn connected_bridge() -> (
    CallBridge,
    Arc<TestHost>,
    MockHandle,
    broadcast::Receiver<BridgeEvent>,
) {
    let connector = Arc::new(MockConnector::new());
    let transport = MockTransport::new().with_name("DialPhone");
    let handle = transport.handle();
    connector.add_device("00:11:22:33:44:55", transport);
    let host = TestHost::new();
    let bridge = bridge_with(&connector, &host);
    let mut rx = bridge.subscribe();

    bridge.connect("00:11:22:33:44:55").await;

    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::StateChanged {
            state: LinkState::Connecting,
            remote_name: None,
        }
    );
    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::StateChanged {
            state: LinkState::Connected,
            remote_name: Some("DialPhone".into()),
        }
    );
    wait_for_sent(&handle, b"s").await;

    (bridge, host, handle, rx)
}

fn dial(handle: &MockHandle, digits: &str) {
    for d in digits.chars() {
        handle.push_line(&format!("DIAL{d}"));
    }
}

// ===========================================================================
// Dialing
// ===========================================================================

#[tokio::test]
async fn nine_digits_place_exactly_one_call() {
    let (bridge, host, handle, mut rx) = connected_bridge().await;

    dial(&handle, "612345678");

    for d in "612345678".chars() {
        assert_eq!(next_event(&mut rx).await, BridgeEvent::DigitDialed(d));
    }
    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::CallPlaced("612345678".into())
    );
    assert_quiet(&mut rx).await;

    assert_eq!(host.placed(), vec!["612345678".to_string()]);
    assert!(bridge.dialed_number().await.is_empty());

    bridge.shutdown().await;
}

#[tokio::test]
async fn hangup_clears_partial_number() {
    let (bridge, host, handle, mut rx) = connected_bridge().await;

    dial(&handle, "12");
    handle.push_line("HANGUP");

    assert_eq!(next_event(&mut rx).await, BridgeEvent::DigitDialed('1'));
    assert_eq!(next_event(&mut rx).await, BridgeEvent::DigitDialed('2'));
    assert_eq!(next_event(&mut rx).await, BridgeEvent::CallEnded);
    assert!(bridge.dialed_number().await.is_empty());

    // The next call starts from scratch.
    dial(&handle, "987654321");
    wait_for(&mut rx, |e| matches!(e, BridgeEvent::CallPlaced(_))).await;
    assert_eq!(host.placed(), vec!["987654321".to_string()]);

    bridge.shutdown().await;
}

#[tokio::test]
async fn pickup_answers() {
    let (bridge, _host, handle, mut rx) = connected_bridge().await;

    handle.push_line("PICKUP");
    assert_eq!(next_event(&mut rx).await, BridgeEvent::CallAnswered);

    bridge.shutdown().await;
}

#[tokio::test]
async fn unrecognized_lines_are_ignored() {
    let (bridge, _host, handle, mut rx) = connected_bridge().await;

    handle.push_line("ready");
    handle.push_line("DIAL12");
    handle.push_line(" HANGUP");
    handle.push_bytes(&[0xFF, 0xFE, b'\n']);
    handle.push_line("DIAL5");

    assert_eq!(next_event(&mut rx).await, BridgeEvent::DigitDialed('5'));
    assert_eq!(bridge.dialed_number().await.as_str(), "5");

    bridge.shutdown().await;
}

#[tokio::test]
async fn delete_last_digit_and_request_call() {
    let (bridge, host, handle, mut rx) = connected_bridge().await;

    dial(&handle, "123");
    for _ in 0..3 {
        next_event(&mut rx).await;
    }

    assert_eq!(bridge.delete_last_digit().await, Some('3'));
    assert_eq!(bridge.dialed_number().await.to_string(), "12");

    assert!(bridge.request_call().await);
    assert_eq!(next_event(&mut rx).await, BridgeEvent::CallPlaced("12".into()));
    assert_eq!(host.placed(), vec!["12".to_string()]);

    // Nothing left to call.
    assert!(!bridge.request_call().await);
    assert_eq!(bridge.delete_last_digit().await, None);
    assert_quiet(&mut rx).await;

    bridge.shutdown().await;
}

#[tokio::test]
async fn failed_call_is_reported_and_cleared() {
    let (bridge, host, handle, mut rx) = connected_bridge().await;
    host.refuse_calls("no network");

    dial(&handle, "612345678");

    match wait_for(&mut rx, |e| !matches!(e, BridgeEvent::DigitDialed(_))).await {
        BridgeEvent::CallFailed { number, reason } => {
            assert_eq!(number, "612345678");
            assert!(reason.contains("no network"), "reason: {reason}");
        }
        other => panic!("expected CallFailed, got {other:?}"),
    }
    assert!(bridge.dialed_number().await.is_empty());
    assert!(host.placed().is_empty());

    bridge.shutdown().await;
}

// ===========================================================================
// Ringing
// ===========================================================================

#[tokio::test]
async fn host_call_state_drives_the_bell() {
    let (bridge, host, handle, _rx) = connected_bridge().await;

    host.set_call_state(HostCallState::Ringing);
    wait_for_sent(&handle, b"sr").await;

    host.set_call_state(HostCallState::OffHook);
    wait_for_sent(&handle, b"sro").await;

    host.set_call_state(HostCallState::Idle);
    wait_for_sent(&handle, b"sroo").await;

    bridge.shutdown().await;
}

#[tokio::test]
async fn nothing_is_written_while_disconnected() {
    let connector = Arc::new(MockConnector::new());
    let transport = MockTransport::new();
    let handle = transport.handle();
    connector.add_device("dev", transport);
    let host = TestHost::new();
    let bridge = bridge_with(&connector, &host);
    let mut rx = bridge.subscribe();

    host.set_call_state(HostCallState::Ringing);
    host.set_call_state(HostCallState::Idle);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.sent_data().is_empty());

    // The state request is the first thing written once connected.
    bridge.connect("dev").await;
    wait_for(&mut rx, is_connected).await;
    wait_for_sent(&handle, b"s").await;

    bridge.shutdown().await;
}

#[tokio::test]
async fn ring_while_disconnected_is_dropped() {
    let connector = Arc::new(MockConnector::new());
    let transport = MockTransport::new();
    let handle = transport.handle();
    connector.add_device("dev", transport);
    let host = TestHost::new();
    let bridge = bridge_with(&connector, &host);
    let mut rx = bridge.subscribe();

    host.set_call_state(HostCallState::Ringing);
    tokio::time::sleep(Duration::from_millis(20)).await;
    bridge.connect("dev").await;
    wait_for(&mut rx, is_connected).await;

    wait_for_sent(&handle, b"s").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.sent_bytes(), b"s");

    // The next change is delivered as usual.
    host.set_call_state(HostCallState::Idle);
    wait_for_sent(&handle, b"so").await;

    bridge.shutdown().await;
}

#[tokio::test]
async fn reconnect_reports_disconnect_of_the_old_link() {
    let (bridge, _host, handle, mut rx) = connected_bridge().await;

    bridge.connect("00:11:22:33:44:55").await;
    assert!(handle.is_closed());

    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::StateChanged {
            state: LinkState::Disconnected,
            remote_name: None,
        }
    );
    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::StateChanged {
            state: LinkState::Connecting,
            remote_name: None,
        }
    );

    bridge.shutdown().await;
}

// ===========================================================================
// Link lifecycle
// ===========================================================================

#[tokio::test]
async fn second_connect_supersedes_first() {
    let connector = Arc::new(MockConnector::new());
    let first = MockTransport::new().with_name("A");
    let first_handle = first.handle();
    connector.add_device("A", first);
    connector.set_delay("A", Duration::from_millis(100));
    let second = MockTransport::new().with_name("B");
    let second_handle = second.handle();
    connector.add_device("B", second);
    let host = TestHost::new();
    let bridge = bridge_with(&connector, &host);
    let mut rx = bridge.subscribe();

    bridge.connect("A").await;
    bridge.connect("B").await;

    let connecting = BridgeEvent::StateChanged {
        state: LinkState::Connecting,
        remote_name: None,
    };
    assert_eq!(next_event(&mut rx).await, connecting);
    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::StateChanged {
            state: LinkState::Disconnected,
            remote_name: None,
        }
    );
    assert_eq!(next_event(&mut rx).await, connecting);
    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::StateChanged {
            state: LinkState::Connected,
            remote_name: Some("B".into()),
        }
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_quiet(&mut rx).await;
    wait_for_sent(&second_handle, b"s").await;
    assert!(first_handle.sent_data().is_empty());

    bridge.shutdown().await;
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (bridge, _host, handle, mut rx) = connected_bridge().await;

    bridge.disconnect().await;
    bridge.disconnect().await;

    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::StateChanged {
            state: LinkState::Disconnected,
            remote_name: None,
        }
    );
    assert_quiet(&mut rx).await;
    assert!(handle.is_closed());
    assert_eq!(bridge.link_state().await, LinkState::Disconnected);
}

#[tokio::test]
async fn disconnect_without_connecting_is_silent() {
    let connector = Arc::new(MockConnector::new());
    let host = TestHost::new();
    let bridge = bridge_with(&connector, &host);
    let mut rx = bridge.subscribe();

    bridge.disconnect().await;
    bridge.disconnect().await;

    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn connect_failure_is_forwarded() {
    let connector = Arc::new(MockConnector::new());
    connector.add_failure("dev", "host is down");
    let host = TestHost::new();
    let bridge = bridge_with(&connector, &host);
    let mut rx = bridge.subscribe();

    bridge.connect("dev").await;

    next_event(&mut rx).await;
    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::StateChanged {
            state: LinkState::Disconnected,
            remote_name: None,
        }
    );
    match next_event(&mut rx).await {
        BridgeEvent::LinkError(LinkFailure::Connect(reason)) => {
            assert!(reason.contains("host is down"), "reason: {reason}");
        }
        other => panic!("expected connect failure, got {other:?}"),
    }
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn link_loss_is_forwarded() {
    let (bridge, _host, handle, mut rx) = connected_bridge().await;

    handle.drop_link();

    assert_eq!(
        next_event(&mut rx).await,
        BridgeEvent::StateChanged {
            state: LinkState::Disconnected,
            remote_name: None,
        }
    );
    assert!(matches!(
        next_event(&mut rx).await,
        BridgeEvent::LinkError(LinkFailure::Read(_))
    ));
    assert_quiet(&mut rx).await;

    bridge.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_the_link() {
    let (bridge, _host, handle, _rx) = connected_bridge().await;

    bridge.shutdown().await;

    assert!(handle.is_closed());
    assert_eq!(bridge.link_state().await, LinkState::Disconnected);
}
