//! Session subscriptions and their replay across reconnects.

mod common;

use std::time::Duration;

use coder1_client::{ClientEvent, ConnectionState, EventKind};
use coder1_core::SessionId;
use serde_json::{Value, json};

use common::{EventLog, MockServer, TIMEOUT};

fn session_of(frame: &Value) -> &str {
    frame["payload"]["sessionId"].as_str().unwrap()
}

#[tokio::test]
async fn subscribed_session_delivers_status_and_output() {
    let mut server = MockServer::start().await;
    let client = server.connected_client().await;
    let log = EventLog::attach(&client);

    client.subscribe("sess-1").unwrap();
    let (_, frame) = server.next_frame_of_type("subscribe").await;
    assert_eq!(frame, json!({"type": "subscribe", "payload": {"sessionId": "sess-1"}}));

    server.send(json!({"type": "status", "sessionId": "sess-1", "data": {"phase": "generating"}}));
    server.send(json!({"type": "output", "sessionId": "sess-1", "output": {"file": "index.html"}}));

    let _ = log.wait_for(EventKind::Output).await;
    assert_eq!(
        log.wait_for(EventKind::Status).await,
        ClientEvent::Status {
            session_id: SessionId::from("sess-1"),
            data: json!({"phase": "generating"})
        }
    );
    assert_eq!(
        log.wait_for(EventKind::Output).await,
        ClientEvent::Output {
            session_id: SessionId::from("sess-1"),
            output: json!({"file": "index.html"})
        }
    );
}

#[tokio::test]
async fn subscribe_while_disconnected_is_sent_on_connect() {
    let mut server = MockServer::start().await;
    let client = server.client();

    client.subscribe("b").unwrap();
    client.subscribe("a").unwrap();
    assert_eq!(server.connection_count(), 0);

    client.connect().await.unwrap();
    let (_, first) = server.next_frame_of_type("subscribe").await;
    let (_, second) = server.next_frame_of_type("subscribe").await;
    assert_eq!(session_of(&first), "a");
    assert_eq!(session_of(&second), "b");
}

#[tokio::test]
async fn resubscribes_exactly_once_after_reconnect() {
    let mut server = MockServer::start().await;
    let client = server.connected_client().await;

    client.subscribe("A").unwrap();
    client.subscribe("B").unwrap();
    let _ = server.next_frame_of_type("subscribe").await;
    let _ = server.next_frame_of_type("subscribe").await;

    server.drop_connections();
    server.wait_for_connections(2).await;
    assert!(
        client
            .wait_for_state(ConnectionState::is_connected, TIMEOUT)
            .await
            .is_some()
    );

    let frames = server.drain(Duration::from_millis(300)).await;
    let replayed: Vec<(usize, &str)> = frames
        .iter()
        .filter(|(_, f)| f["type"] == "subscribe")
        .map(|(conn, f)| (*conn, session_of(f)))
        .collect();
    assert_eq!(replayed, vec![(1, "A"), (1, "B")]);
}

#[tokio::test]
async fn unsubscribed_session_is_not_replayed() {
    let mut server = MockServer::start().await;
    let client = server.connected_client().await;

    client.subscribe("A").unwrap();
    client.subscribe("B").unwrap();
    client.unsubscribe("A").unwrap();
    let (_, frame) = server.next_frame_of_type("unsubscribe").await;
    assert_eq!(session_of(&frame), "A");
    assert_eq!(client.subscriptions().await.unwrap(), vec![SessionId::from("B")]);

    server.drop_connections();
    server.wait_for_connections(2).await;
    let (conn, frame) = loop {
        let (conn, frame) = server.next_frame_of_type("subscribe").await;
        if conn == 1 {
            break (conn, frame);
        }
    };
    assert_eq!(conn, 1);
    assert_eq!(session_of(&frame), "B");
}

#[tokio::test]
async fn disconnect_forgets_subscriptions() {
    let mut server = MockServer::start().await;
    let client = server.connected_client().await;

    client.subscribe("A").unwrap();
    let _ = server.next_frame_of_type("subscribe").await;
    client.disconnect().await.unwrap();
    assert!(client.subscriptions().await.unwrap().is_empty());

    client.connect().await.unwrap();
    server.wait_for_connections(2).await;
    client.ping().unwrap();
    let (conn, frame) = server.next_frame().await;
    assert_eq!((conn, frame), (1, json!({"type": "ping"})));
}
