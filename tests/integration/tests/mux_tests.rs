//! Multiplexer Integration Tests
//!
//! Every test drives real sockets on 127.0.0.1; nothing external is needed.
//!
//! Run with: cargo test -p integration-tests --test mux_tests

use std::time::Duration;

use futures_util::SinkExt;
use integration_tests::{
    closed_port, connect_peer, next_close, next_text, wait_until, RemotePeer, TestMux, WAIT,
};
use reqwest::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use wsmux_console::{FocusState, Outbound};
use wsmux_core::{Endpoint, MuxError, SessionKind, SessionState};

// ============================================================================
// Client Sessions
// ============================================================================

#[tokio::test]
async fn test_add_client_and_list() {
    let remote = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    let index = test.mux.add_client(remote.endpoint()).await.unwrap();
    assert_eq!(index, 0);

    let list = test.mux.list(SessionKind::Client);
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].index, 0);
    assert_eq!(list[0].endpoint.to_string(), format!("127.0.0.1:{}", remote.port()));
    assert!(!list[0].secure);
    assert_eq!(list[0].state, SessionState::Open);
    assert!(list[0].task_alive);

    test.shutdown().await;
}

#[tokio::test]
async fn test_invalid_ip_is_rejected() {
    let test = TestMux::start();

    let err = test
        .mux
        .add_client(Endpoint::new("not-an-ip", 9000, false))
        .await
        .unwrap_err();
    assert!(matches!(err, MuxError::InvalidEndpoint(_)));
    assert!(test.mux.list(SessionKind::Client).is_empty());

    test.shutdown().await;
}

#[tokio::test]
async fn test_connect_failure_registers_nothing() {
    let test = TestMux::start();
    let port = closed_port().await.unwrap();

    let err = test
        .mux
        .add_client(Endpoint::new("127.0.0.1", port, false))
        .await
        .unwrap_err();
    assert!(matches!(err, MuxError::ConnectFailed { .. }));
    assert!(test.mux.list(SessionKind::Client).is_empty());

    test.shutdown().await;
}

#[tokio::test]
async fn test_remove_shifts_indices() {
    let remote = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    for expected in 0..3 {
        let index = test.mux.add_client(remote.endpoint()).await.unwrap();
        assert_eq!(index, expected);
    }
    let before = test.mux.list(SessionKind::Client);

    test.mux.remove(SessionKind::Client, 0).await.unwrap();

    let after = test.mux.list(SessionKind::Client);
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].id, before[1].id);
    assert_eq!(after[0].index, 0);
    assert_eq!(after[1].id, before[2].id);
    assert_eq!(after[1].index, 1);

    test.shutdown().await;
}

#[tokio::test]
async fn test_remove_sends_normal_close() {
    let remote = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    test.mux.add_client(remote.endpoint()).await.unwrap();
    assert!(remote.wait_for_connections(1).await);

    let removed = test.mux.remove(SessionKind::Client, 0).await.unwrap();
    assert_eq!(removed.state, SessionState::Closed);
    assert!(!removed.task_alive);
    assert!(wait_until(WAIT, || remote.normal_closes() == 1).await);

    test.shutdown().await;
}

#[tokio::test]
async fn test_remote_close_ends_pump() {
    let remote = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    test.mux.add_client(remote.endpoint()).await.unwrap();
    assert!(remote.wait_for_connections(1).await);

    remote.close_all().await.unwrap();

    let closed = wait_until(WAIT, || {
        let list = test.mux.list(SessionKind::Client);
        list[0].state == SessionState::Closed && !list[0].task_alive
    })
    .await;
    assert!(closed);

    // The entry stays until the operator removes it
    assert_eq!(test.mux.list(SessionKind::Client).len(), 1);
    test.mux.remove(SessionKind::Client, 0).await.unwrap();

    test.shutdown().await;
}

// ============================================================================
// Focus Routing
// ============================================================================

#[tokio::test]
async fn test_only_focused_session_is_shown() {
    let first = RemotePeer::start().await.unwrap();
    let second = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    test.mux.add_client(first.endpoint()).await.unwrap();
    test.mux.add_client(second.endpoint()).await.unwrap();
    assert!(first.wait_for_connections(1).await);
    assert!(second.wait_for_connections(1).await);

    test.mux.select(SessionKind::Client, 1).unwrap();

    first.say("from first").await.unwrap();
    second.say("from second").await.unwrap();
    assert!(test.wait_for_message("from second").await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(test.sink.messages(), vec!["from second"]);

    test.shutdown().await;
}

#[tokio::test]
async fn test_focused_messages_keep_order() {
    let remote = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    test.mux.add_client(remote.endpoint()).await.unwrap();
    assert!(remote.wait_for_connections(1).await);
    test.mux.select(SessionKind::Client, 0).unwrap();

    let expected: Vec<String> = (0..20).map(|i| format!("line {i}")).collect();
    for line in &expected {
        remote.say(line).await.unwrap();
    }

    assert!(test.wait_for_message("line 19").await);
    assert_eq!(test.sink.messages(), expected);

    test.shutdown().await;
}

#[tokio::test]
async fn test_select_out_of_range_keeps_focus() {
    let remote = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    test.mux.add_client(remote.endpoint()).await.unwrap();
    test.mux.add_client(remote.endpoint()).await.unwrap();
    let focused = test.mux.select(SessionKind::Client, 0).unwrap();

    let err = test.mux.select(SessionKind::Client, 3).unwrap_err();
    assert!(matches!(err, MuxError::IndexOutOfRange { index: 3, len: 2, .. }));
    assert_eq!(
        test.mux.router().focus(),
        FocusState::Focused(focused.session_ref())
    );

    test.shutdown().await;
}

#[tokio::test]
async fn test_focus_follows_session_across_index_shift() {
    let remote = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    test.mux.add_client(remote.endpoint()).await.unwrap();
    test.mux.add_client(remote.endpoint()).await.unwrap();
    assert!(remote.wait_for_connections(2).await);

    let focused = test.mux.select(SessionKind::Client, 1).unwrap();
    test.mux.remove(SessionKind::Client, 0).await.unwrap();

    assert_eq!(
        test.mux.router().focus(),
        FocusState::Focused(focused.session_ref())
    );
    assert_eq!(
        test.mux.router().focus_index(),
        Some((SessionKind::Client, 0))
    );

    test.shutdown().await;
}

#[tokio::test]
async fn test_removing_focused_session_clears_focus() {
    let remote = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    test.mux.add_client(remote.endpoint()).await.unwrap();
    test.mux.select(SessionKind::Client, 0).unwrap();
    test.mux.remove(SessionKind::Client, 0).await.unwrap();

    assert_eq!(test.mux.router().focus(), FocusState::None);
    assert!(matches!(test.mux.send("anyone?").await, Err(MuxError::NoFocus)));

    test.shutdown().await;
}

#[tokio::test]
async fn test_outbound_text_and_quit_sentinel() {
    let remote = RemotePeer::start().await.unwrap();
    let test = TestMux::start();

    test.mux.add_client(remote.endpoint()).await.unwrap();
    test.mux.select(SessionKind::Client, 0).unwrap();

    assert_eq!(test.mux.send("\\q").await.unwrap(), Outbound::Detached);
    assert_eq!(test.mux.router().focus(), FocusState::None);
    assert!(matches!(test.mux.send("lost").await, Err(MuxError::NoFocus)));

    test.mux.select(SessionKind::Client, 0).unwrap();
    assert_eq!(test.mux.send("hello").await.unwrap(), Outbound::Sent);
    assert!(remote.wait_for_text("hello").await);

    // The sentinel never went over the wire, and the session is still open
    assert_eq!(remote.received(), vec!["hello"]);
    assert_eq!(test.mux.list(SessionKind::Client)[0].state, SessionState::Open);

    test.shutdown().await;
}

// ============================================================================
// Server Sessions
// ============================================================================

#[tokio::test]
async fn test_server_shows_focused_peer_text() {
    let test = TestMux::start();

    test.mux
        .add_server(Endpoint::new("127.0.0.1", 0, false))
        .await
        .unwrap();
    test.mux.select(SessionKind::Server, 0).unwrap();

    let addr = test.server_addr(0).unwrap();
    let mut peer = connect_peer(addr).await.unwrap();
    peer.send(Message::Text("hello".into())).await.unwrap();

    assert!(test.wait_for_message("hello").await);
    assert!(
        wait_until(WAIT, || test.mux.list(SessionKind::Server)[0].peer_addr.is_some()).await
    );

    // And back the other way
    test.mux.send("welcome").await.unwrap();
    assert_eq!(next_text(&mut peer).await.as_deref(), Some("welcome"));

    test.shutdown().await;
}

#[tokio::test]
async fn test_second_peer_is_rejected() {
    let test = TestMux::start();

    test.mux
        .add_server(Endpoint::new("127.0.0.1", 0, false))
        .await
        .unwrap();
    let addr = test.server_addr(0).unwrap();

    let _first = connect_peer(addr).await.unwrap();
    let second = connect_peer(addr).await;
    match second {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 500);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("second peer should be refused"),
    }

    test.shutdown().await;
}

#[tokio::test]
async fn test_plain_http_request_gets_500() {
    let test = TestMux::start();

    test.mux
        .add_server(Endpoint::new("127.0.0.1", 0, false))
        .await
        .unwrap();
    let addr = test.server_addr(0).unwrap();

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The slot is still free for a real peer
    assert!(connect_peer(addr).await.is_ok());

    test.shutdown().await;
}

#[tokio::test]
async fn test_slot_frees_after_peer_leaves() {
    let test = TestMux::start();

    test.mux
        .add_server(Endpoint::new("127.0.0.1", 0, false))
        .await
        .unwrap();
    let addr = test.server_addr(0).unwrap();

    let mut first = connect_peer(addr).await.unwrap();
    assert!(
        wait_until(WAIT, || test.mux.list(SessionKind::Server)[0].peer_addr.is_some()).await
    );
    first.close(None).await.unwrap();

    assert!(
        wait_until(WAIT, || test.mux.list(SessionKind::Server)[0].peer_addr.is_none()).await
    );
    let mut next = connect_peer(addr).await.unwrap();
    assert!(
        wait_until(WAIT, || test.mux.list(SessionKind::Server)[0].peer_addr.is_some()).await
    );

    test.mux.select(SessionKind::Server, 0).unwrap();
    test.mux.send("hi").await.unwrap();
    assert_eq!(next_text(&mut next).await.as_deref(), Some("hi"));

    test.shutdown().await;
}

#[tokio::test]
async fn test_server_disconnect_keeps_listening() {
    let test = TestMux::start();

    test.mux
        .add_server(Endpoint::new("127.0.0.1", 0, false))
        .await
        .unwrap();
    let addr = test.server_addr(0).unwrap();

    let _first = connect_peer(addr).await.unwrap();
    assert!(
        wait_until(WAIT, || test.mux.list(SessionKind::Server)[0].peer_addr.is_some()).await
    );

    let server = test.mux.registry().get(SessionKind::Server, 0).unwrap();
    server.disconnect().await.unwrap();

    assert!(
        wait_until(WAIT, || test.mux.list(SessionKind::Server)[0].peer_addr.is_none()).await
    );
    assert_eq!(test.mux.list(SessionKind::Server)[0].state, SessionState::Open);
    assert!(connect_peer(addr).await.is_ok());

    test.shutdown().await;
}

#[tokio::test]
async fn test_removed_server_closes_peer_and_stops_listening() {
    let test = TestMux::start();

    test.mux
        .add_server(Endpoint::new("127.0.0.1", 0, false))
        .await
        .unwrap();
    let addr = test.server_addr(0).unwrap();
    let mut peer = connect_peer(addr).await.unwrap();
    assert!(
        wait_until(WAIT, || test.mux.list(SessionKind::Server)[0].peer_addr.is_some()).await
    );

    test.mux.remove(SessionKind::Server, 0).await.unwrap();

    // The attached peer gets a normal closure and nobody listens anymore
    assert_eq!(next_close(&mut peer).await, Some(CloseCode::Normal));
    assert!(connect_peer(addr).await.is_err());

    test.shutdown().await;
}

#[tokio::test]
async fn test_secure_server_needs_tls_material() {
    let test = TestMux::start();

    let err = test
        .mux
        .add_server(Endpoint::new("127.0.0.1", 0, true))
        .await
        .unwrap_err();
    assert!(matches!(err, MuxError::BindFailed { .. }));
    assert!(test.mux.list(SessionKind::Server).is_empty());

    test.shutdown().await;
}
