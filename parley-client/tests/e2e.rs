//! End-to-end tests: a real relay and two clients on the loopback transport
//!
//! Signaling goes over actual WebSocket connections to a listener on an
//! ephemeral port; only the point-to-point channel is simulated.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parley_client::native::LoopbackNetwork;
use parley_client::{
    ChannelState, ClientConfig, ClientEvent, CompletedTransfer, EventReceiver, OutgoingFile,
    ParleyClient, TransferDirection,
};
use parley_common::PeerId;
use parley_server::listener::{RelayConfig, serve};
use tokio::net::TcpListener;

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Helper Functions
// ============================================================================

async fn start_relay(config: RelayConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, config, std::future::pending()));
    addr
}

async fn join(addr: SocketAddr, id: &str, network: &LoopbackNetwork) -> (ParleyClient, EventReceiver) {
    let mut config = ClientConfig::new(format!("ws://{addr}"));
    config.peer_id = Some(PeerId::from(id));
    config.transfer.chunk_size = 1024;
    ParleyClient::connect(&config, Arc::new(network.clone()))
        .await
        .unwrap()
}

async fn expect(events: &mut EventReceiver, wanted: impl Fn(&ClientEvent) -> bool) -> ClientEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_two_peers_connect_through_relay() {
    let addr = start_relay(RelayConfig::default()).await;
    let network = LoopbackNetwork::new();
    let (a, mut a_events) = join(addr, "a1", &network).await;
    let (b, mut b_events) = join(addr, "b1", &network).await;
    assert_eq!(a.peer_id().as_str(), "a1");
    assert_eq!(b.peer_id().as_str(), "b1");

    a.connect_peer(&"b1".into()).await.unwrap();

    let event = expect(&mut a_events, |e| matches!(e, ClientEvent::ConnectionEstablished { .. })).await;
    assert_eq!(event.peer_id(), Some(&PeerId::from("b1")));
    let event = expect(&mut b_events, |e| matches!(e, ClientEvent::ConnectionEstablished { .. })).await;
    // The relay stamped the sender, so B knows who is calling
    assert_eq!(event.peer_id(), Some(&PeerId::from("a1")));

    assert_eq!(a.state(&"b1".into()), ChannelState::Connected);
    assert_eq!(b.state(&"a1".into()), ChannelState::Connected);

    let mut watch_a = b.subscribe_state(&"a1".into()).unwrap();
    assert!(a.disconnect_peer(&"b1".into()).await);
    expect(&mut b_events, |e| matches!(e, ClientEvent::ConnectionClosed { .. })).await;
    tokio::time::timeout(WAIT, watch_a.wait_for(|s| *s == ChannelState::Closed))
        .await
        .unwrap()
        .unwrap();

    // A session that ended leaves nothing behind
    assert_eq!(a.state(&"b1".into()), ChannelState::Idle);
    assert!(a.peers().known_peers().is_empty());
}

#[tokio::test]
async fn test_message_and_file_over_negotiated_channel() {
    let addr = start_relay(RelayConfig::default()).await;
    let network = LoopbackNetwork::new();
    let (a, mut a_events) = join(addr, "a1", &network).await;
    let (b, mut b_events) = join(addr, "b1", &network).await;

    a.connect_peer(&"b1".into()).await.unwrap();
    tokio::time::timeout(WAIT, b.wait_for_state(&"a1".into(), ChannelState::Connected))
        .await
        .unwrap()
        .unwrap();
    tokio::time::timeout(WAIT, a.wait_for_state(&"b1".into(), ChannelState::Connected))
        .await
        .unwrap()
        .unwrap();

    b.send_message(&"a1".into(), "ready when you are").await.unwrap();
    let event = expect(&mut a_events, |e| matches!(e, ClientEvent::Message { .. })).await;
    assert_eq!(
        event,
        ClientEvent::Message {
            peer_id: "b1".into(),
            content: "ready when you are".to_string()
        }
    );

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("report.bin");
    let content: Vec<u8> = (0..5000u32).map(|i| (i % 253) as u8).collect();
    tokio::fs::write(&source, &content).await.unwrap();
    let file = OutgoingFile::open(&source).await.unwrap();

    a.send_file(&"b1".into(), &file).await.unwrap();

    let event = expect(&mut a_events, |e| {
        matches!(e, ClientEvent::TransferCompleted { .. })
    })
    .await;
    assert!(matches!(
        event,
        ClientEvent::TransferCompleted {
            transfer: CompletedTransfer::Sent(_),
            ..
        }
    ));

    let started = expect(&mut b_events, |e| matches!(e, ClientEvent::TransferStarted { .. })).await;
    assert!(matches!(
        started,
        ClientEvent::TransferStarted { direction: TransferDirection::Receive, ref metadata, .. }
            if metadata.name == "report.bin" && metadata.size == 5000 && metadata.sha256.is_some()
    ));

    let completed = expect(&mut b_events, |e| matches!(e, ClientEvent::TransferCompleted { .. })).await;
    let ClientEvent::TransferCompleted {
        transfer: CompletedTransfer::Received(received),
        ..
    } = completed
    else {
        panic!("expected a received file");
    };
    assert_eq!(received.data, content);

    let inbox = tempfile::tempdir().unwrap();
    let saved = received.save_in(inbox.path()).await.unwrap();
    assert_eq!(saved.file_name().unwrap(), "report.bin");
    assert_eq!(tokio::fs::read(&saved).await.unwrap(), content);
}

#[tokio::test]
async fn test_connect_to_absent_peer_stays_negotiating() {
    let addr = start_relay(RelayConfig::default()).await;
    let network = LoopbackNetwork::new();
    let (a, _a_events) = join(addr, "a1", &network).await;

    // The relay drops the offer silently; nothing ever answers
    a.connect_peer(&"nobody".into()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(a.state(&"nobody".into()).is_negotiating());
    assert_eq!(
        a.state(&"nobody".into()),
        ChannelState::Negotiating(parley_client::Role::Initiator)
    );
}

#[tokio::test]
async fn test_presence_and_shutdown() {
    let addr = start_relay(RelayConfig {
        presence: true,
        ..Default::default()
    })
    .await;
    let network = LoopbackNetwork::new();
    let (b, mut b_events) = join(addr, "b1", &network).await;
    let (a, mut a_events) = join(addr, "a1", &network).await;

    let event = expect(&mut b_events, |e| matches!(e, ClientEvent::PeerConnected { .. })).await;
    assert_eq!(event.peer_id(), Some(&PeerId::from("a1")));
    let event = expect(&mut a_events, |e| matches!(e, ClientEvent::PeerConnected { .. })).await;
    assert_eq!(event.peer_id(), Some(&PeerId::from("b1")));

    a.connect_peer(&"b1".into()).await.unwrap();
    expect(&mut b_events, |e| matches!(e, ClientEvent::ConnectionEstablished { .. })).await;

    a.shutdown().await;
    assert!(!a.is_relay_connected());
    expect(&mut a_events, |e| matches!(e, ClientEvent::RelayClosed)).await;

    // Channel close and relay presence travel separately, in either order
    let mut closed = false;
    let mut departed = false;
    while !(closed && departed) {
        match expect(&mut b_events, |e| {
            matches!(
                e,
                ClientEvent::ConnectionClosed { .. } | ClientEvent::PeerDisconnected { .. }
            )
        })
        .await
        {
            ClientEvent::ConnectionClosed { peer_id } => {
                assert_eq!(peer_id.as_str(), "a1");
                closed = true;
            }
            ClientEvent::PeerDisconnected { peer_id } => {
                assert_eq!(peer_id.as_str(), "a1");
                departed = true;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(!b.state(&"a1".into()).is_connected());
}
