//! Integration tests for stompwire.
//!
//! These tests run listeners and connectors against each other over
//! loopback TCP.

use std::time::Duration;

use stompwire::protocol::{commands, headers, FrameBuffer};
use stompwire::{
    ClientConnector, Frame, HeartbeatValues, Listener, ListenerConfig, ListenerEvent, StompError,
    Transport, TransportEvent,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const WAIT: Duration = Duration::from_secs(5);

async fn next_event(transport: &mut Transport) -> TransportEvent {
    tokio::time::timeout(WAIT, transport.next_event())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport event channel closed")
}

async fn next_frame(transport: &mut Transport) -> Frame {
    tokio::time::timeout(WAIT, transport.next_frame())
        .await
        .expect("timed out waiting for frame")
        .expect("transport closed before a frame arrived")
}

async fn accept(listener: &mut Listener) -> Transport {
    tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("timed out waiting for connection")
        .expect("listener closed")
}

/// Connect a client and wait until it reports the connection.
async fn connected_pair(listener: &mut Listener, addr: std::net::SocketAddr) -> (Transport, Transport) {
    let mut client = ClientConnector::new(addr.to_string())
        .retry_interval(Duration::from_millis(20))
        .connect();
    let server = accept(listener).await;
    assert!(matches!(
        next_event(&mut client).await,
        TransportEvent::ConnectionChanged(true)
    ));
    (client, server)
}

/// Binding port 0 twice yields two real, distinct ports.
#[tokio::test]
async fn test_listeners_report_distinct_real_ports() {
    let first = Listener::new();
    let second = Listener::new();

    let a = first.bind("127.0.0.1:0").await.unwrap();
    let b = second.bind("127.0.0.1:0").await.unwrap();

    assert_ne!(a.port(), 0);
    assert_ne!(b.port(), 0);
    assert_ne!(a.port(), b.port());
}

/// A client handshake and reply round trip.
#[tokio::test]
async fn test_connect_handshake_round_trip() {
    let mut listener = Listener::new();
    let addr = listener.bind("127.0.0.1:0").await.unwrap();
    let (mut client, mut server) = connected_pair(&mut listener, addr).await;

    client
        .send(
            Frame::new(commands::CONNECT)
                .with_header(headers::ACCEPT_VERSION, "1.2")
                .with_header(headers::HEART_BEAT, "0,5000"),
        )
        .await
        .unwrap();

    let connect = next_frame(&mut server).await;
    assert_eq!(connect.command(), Some(commands::CONNECT));
    let peer_beat = HeartbeatValues::parse(connect.header(headers::HEART_BEAT));
    let agreed = HeartbeatValues::new(10_000, 0).combine(&peer_beat);
    assert_eq!(agreed, HeartbeatValues::new(10_000, 0));

    let ctx = stompwire::FrameContext::new(connect, server.handle());
    ctx.reply(
        Frame::new(commands::CONNECTED)
            .with_header(headers::VERSION, "1.2")
            .with_header(headers::HEART_BEAT, agreed.to_string()),
    )
    .await
    .unwrap();

    let connected = next_frame(&mut client).await;
    assert_eq!(connected.command(), Some(commands::CONNECTED));
    assert_eq!(connected.header(headers::HEART_BEAT), Some("10000,0"));
}

/// Frames arrive in send order with bodies intact, including binary bodies
/// containing NUL bytes and header values containing colons.
#[tokio::test]
async fn test_ordered_delivery_with_binary_bodies() {
    let mut listener = Listener::new();
    let addr = listener.bind("127.0.0.1:0").await.unwrap();
    let (client, mut server) = connected_pair(&mut listener, addr).await;

    for i in 0u8..50 {
        let body = vec![i, 0, i, 0];
        client
            .send(
                Frame::new(commands::SEND)
                    .with_header(headers::DESTINATION, "queue://a:b:c")
                    .with_header("seq", i.to_string())
                    .with_body(body),
            )
            .await
            .unwrap();
    }

    for i in 0u8..50 {
        let frame = next_frame(&mut server).await;
        assert_eq!(frame.header("seq"), Some(i.to_string().as_str()));
        assert_eq!(frame.header(headers::DESTINATION), Some("queue://a:b:c"));
        assert_eq!(frame.body(), &[i, 0, i, 0]);
        assert_eq!(frame.content_length(), Some(4));
    }
}

/// A large body crosses many socket reads and still parses as one frame.
#[tokio::test]
async fn test_large_frame() {
    let mut listener = Listener::new();
    let addr = listener.bind("127.0.0.1:0").await.unwrap();
    let (client, mut server) = connected_pair(&mut listener, addr).await;

    let body: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
    client
        .send_confirmed(Frame::new(commands::SEND).with_body(body.clone()))
        .await
        .unwrap();

    let frame = next_frame(&mut server).await;
    assert_eq!(frame.body(), &body[..]);
}

/// Heartbeats sent by a raw peer surface as heartbeat frames.
#[tokio::test]
async fn test_raw_peer_heartbeats_and_bare_lf() {
    let mut listener = Listener::new();
    let addr = listener.bind("127.0.0.1:0").await.unwrap();

    let mut raw = TcpStream::connect(addr).await.unwrap();
    let mut server = accept(&mut listener).await;

    raw.write_all(b"\nSEND\nreceipt:9\n\nhello\0\n").await.unwrap();

    assert!(next_frame(&mut server).await.is_heartbeat());
    let send = next_frame(&mut server).await;
    assert_eq!(send.command(), Some("SEND"));
    assert_eq!(send.body_str(), Some("hello"));
    assert!(next_frame(&mut server).await.is_heartbeat());

    let ctx = stompwire::FrameContext::new(send, server.handle());
    assert!(ctx.receipt().await.unwrap());

    let mut buf = vec![0u8; 64];
    let mut parser = FrameBuffer::new();
    let receipt = loop {
        let n = tokio::time::timeout(WAIT, raw.read(&mut buf)).await.unwrap().unwrap();
        assert!(n > 0);
        if let Some(frame) = parser.push(&buf[..n]).unwrap().into_iter().next() {
            break frame;
        }
    };
    assert_eq!(receipt.command(), Some("RECEIPT"));
    assert_eq!(receipt.header("receipt-id"), Some("9"));
}

/// Graceful shutdown delivers every queued frame before the socket closes.
#[tokio::test]
async fn test_shutdown_delivers_queued_frames() {
    let mut listener = Listener::new();
    let addr = listener.bind("127.0.0.1:0").await.unwrap();
    let (client, mut server) = connected_pair(&mut listener, addr).await;

    for i in 0..100 {
        client
            .send(Frame::new(commands::SEND).with_header("seq", i.to_string()))
            .await
            .unwrap();
    }
    client.shutdown().await;
    assert!(matches!(
        client.send(Frame::new(commands::SEND)).await,
        Err(StompError::ShutdownRequested)
    ));

    let mut seen = 0;
    loop {
        match tokio::time::timeout(WAIT, server.next_event()).await.unwrap() {
            Some(TransportEvent::FrameArrived(frame)) => {
                assert_eq!(frame.header("seq"), Some(seen.to_string().as_str()));
                seen += 1;
            }
            Some(TransportEvent::ConnectionChanged(false)) | None => break,
            Some(_) => {}
        }
    }
    assert_eq!(seen, 100);
}

/// Peer disconnect is reported once and later sends fail explicitly.
#[tokio::test]
async fn test_peer_disconnect_is_reported() {
    let mut listener = Listener::new();
    let addr = listener.bind("127.0.0.1:0").await.unwrap();

    let raw = TcpStream::connect(addr).await.unwrap();
    let mut server = accept(&mut listener).await;
    assert!(matches!(
        next_event(&mut server).await,
        TransportEvent::ConnectionChanged(true)
    ));

    drop(raw);
    assert!(matches!(
        next_event(&mut server).await,
        TransportEvent::ConnectionChanged(false)
    ));
    assert!(!server.is_connected());
    assert!(matches!(
        server.send(Frame::new(commands::MESSAGE)).await,
        Err(StompError::NotConnected)
    ));
}

/// A malformed frame closes only the offending connection.
#[tokio::test]
async fn test_protocol_violation_isolated_to_one_connection() {
    let mut listener = Listener::new();
    let addr = listener.bind("127.0.0.1:0").await.unwrap();

    let mut bad = TcpStream::connect(addr).await.unwrap();
    let mut bad_server = accept(&mut listener).await;
    let (good_client, mut good_server) = connected_pair(&mut listener, addr).await;

    bad.write_all(b"SEND\ncontent-length:abc\n\n\0").await.unwrap();

    let mut saw_parse_error = false;
    while let Some(event) = tokio::time::timeout(WAIT, bad_server.next_event()).await.unwrap() {
        if let TransportEvent::Error(e) = event {
            saw_parse_error = matches!(*e, StompError::Parse(_));
        }
    }
    assert!(saw_parse_error);

    good_client
        .send(Frame::new(commands::SEND).with_body("still here"))
        .await
        .unwrap();
    assert_eq!(
        next_frame(&mut good_server).await.body_str(),
        Some("still here")
    );
}

/// A client connector started before the server exists connects once the
/// server starts listening.
#[tokio::test]
async fn test_connector_retries_until_server_appears() {
    let addr = {
        let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        spare.local_addr().unwrap()
    };

    let mut client = ClientConnector::new(addr.to_string())
        .retry_interval(Duration::from_millis(20))
        .connect();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!client.is_connected());

    let mut listener = Listener::with_config(ListenerConfig {
        rebind_interval_ms: 20,
        ..ListenerConfig::default()
    });
    listener.bind_with_retry(addr).await.unwrap();
    let _server = accept(&mut listener).await;

    assert!(matches!(
        next_event(&mut client).await,
        TransportEvent::ConnectionChanged(true)
    ));
    assert!(client.is_connected());
}

/// Accepted connections are announced and queued in arrival order.
#[tokio::test]
async fn test_listener_events_and_fifo() {
    let mut listener = Listener::new();
    let addr = listener.bind("127.0.0.1:0").await.unwrap();

    let first = TcpStream::connect(addr).await.unwrap();
    let ListenerEvent::ClientConnected { peer } =
        tokio::time::timeout(WAIT, listener.next_event()).await.unwrap().unwrap();
    assert_eq!(peer, first.local_addr().unwrap());

    let second = TcpStream::connect(addr).await.unwrap();
    tokio::time::timeout(WAIT, listener.next_event()).await.unwrap().unwrap();

    let a = listener.get_next_transport().unwrap();
    let b = listener.get_next_transport().unwrap();
    assert_eq!(a.peer_addr(), Some(first.local_addr().unwrap()));
    assert_eq!(b.peer_addr(), Some(second.local_addr().unwrap()));
    assert!(listener.get_next_transport().is_none());
}
