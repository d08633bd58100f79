//! End-to-end tests: real TCP listener, real WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use group_relay::{DefaultHandler, GroupId, MemberId, RelayServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a server on a random port
async fn start_server(config: ServerConfig) -> (Arc<RelayServer>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(RelayServer::new(config.disable_stats(), DefaultHandler));

    let task_server = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = task_server.serve(listener).await;
    });

    (server, addr)
}

async fn connect(addr: SocketAddr, group: &str, member: &str) -> Client {
    let url = format!("ws://{}/ws?group_id={}&client_id={}", addr, group, member);
    let (ws, _) = connect_async(url).await.expect("connect failed");
    ws
}

async fn wait_for_members(server: &RelayServer, group: &str, count: usize) {
    for _ in 0..200 {
        if server.registry().snapshot(&GroupId::new(group)).await.len() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("group {} never reached {} members", group, count);
}

async fn next_message(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .expect("read error")
}

async fn assert_silent(client: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(150), client.next()).await;
    assert!(result.is_err(), "unexpected message: {:?}", result);
}

#[tokio::test]
async fn test_message_reaches_group_peers_only() {
    let (server, addr) = start_server(ServerConfig::default()).await;

    let mut alice = connect(addr, "room1", "alice").await;
    let mut bob = connect(addr, "room1", "bob").await;
    let mut carol = connect(addr, "room2", "carol").await;
    wait_for_members(&server, "room1", 2).await;
    wait_for_members(&server, "room2", 1).await;

    alice.send(Message::text("hi")).await.unwrap();

    match next_message(&mut bob).await {
        Message::Text(text) => assert_eq!(text.as_str(), "alice: hi"),
        other => panic!("expected text, got {:?}", other),
    }
    assert_silent(&mut alice).await;
    assert_silent(&mut carol).await;
}

#[tokio::test]
async fn test_binary_relayed_verbatim() {
    let (server, addr) = start_server(ServerConfig::default()).await;

    let mut alice = connect(addr, "g", "alice").await;
    let mut bob = connect(addr, "g", "bob").await;
    wait_for_members(&server, "g", 2).await;

    bob.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();

    match next_message(&mut alice).await {
        Message::Binary(data) => assert_eq!(&data[..], &[1, 2, 3]),
        other => panic!("expected binary, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_cleans_up_group() {
    let (server, addr) = start_server(ServerConfig::default()).await;

    let mut alice = connect(addr, "room1", "alice").await;
    let bob = connect(addr, "room1", "bob").await;
    wait_for_members(&server, "room1", 2).await;

    alice.close(None).await.unwrap();
    wait_for_members(&server, "room1", 1).await;
    assert!(server
        .registry()
        .snapshot(&GroupId::new("room1"))
        .await
        .contains(&MemberId::new("bob")));

    drop(bob);
    wait_for_members(&server, "room1", 0).await;
    assert!(!server.registry().group_exists(&GroupId::new("room1")).await);
    assert_eq!(server.stats().await.groups, 0);
}

#[tokio::test]
async fn test_reconnect_supersedes_previous_connection() {
    let (server, addr) = start_server(ServerConfig::default()).await;

    let mut first = connect(addr, "room1", "alice").await;
    wait_for_members(&server, "room1", 1).await;
    let mut second = connect(addr, "room1", "alice").await;

    match next_message(&mut first).await {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.reason.as_str(), "superseded by a newer connection")
        }
        other => panic!("expected close, got {:?}", other),
    }

    let mut bob = connect(addr, "room1", "bob").await;
    wait_for_members(&server, "room1", 2).await;

    bob.send(Message::text("welcome back")).await.unwrap();
    match next_message(&mut second).await {
        Message::Text(text) => assert_eq!(text.as_str(), "bob: welcome back"),
        other => panic!("expected text, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upgrade_rejected_without_ids() {
    let (_server, addr) = start_server(ServerConfig::default()).await;

    let missing = connect_async(format!("ws://{}/ws?group_id=room1", addr)).await;
    match missing {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::BAD_REQUEST)
        }
        other => panic!("expected 400, got {:?}", other.map(|_| ())),
    }

    let wrong_path = connect_async(format!("ws://{}/chat?group_id=g&client_id=c", addr)).await;
    match wrong_path {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::NOT_FOUND)
        }
        other => panic!("expected 404, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_connection_limit() {
    let (server, addr) = start_server(ServerConfig::default().max_connections(1)).await;

    let _alice = connect(addr, "g", "alice").await;
    wait_for_members(&server, "g", 1).await;

    let url = format!("ws://{}/ws?group_id=g&client_id=bob", addr);
    assert!(connect_async(url).await.is_err());
    assert_eq!(server.stats().await.active_connections, 1);
}
