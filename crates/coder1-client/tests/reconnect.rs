//! Bounded reconnect, explicit disconnect and heartbeat.

mod common;

use std::time::Duration;

use coder1_client::{ClientEvent, ConnectionState, EventKind, StreamClient};
use serde_json::json;
use tokio::time::sleep;

use common::{EventLog, MockServer, TIMEOUT, eventually};

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let mut server = MockServer::start().await;
    let client = server.connected_client().await;
    let log = EventLog::attach(&client);

    server.stop_accepting().await;
    server.drop_connections();

    let state = client
        .wait_for_state(ConnectionState::is_terminal, TIMEOUT)
        .await;
    assert_eq!(state, Some(ConnectionState::Failed));

    let attempts: Vec<(u32, u32)> = log
        .events()
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Reconnecting {
                attempt,
                max_attempts,
            } => Some((*attempt, *max_attempts)),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(log.kinds().last(), Some(&EventKind::Disconnected));

    let settled = log.events().len();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(log.events().len(), settled, "no activity after giving up");
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn successful_reconnect_resets_attempts() {
    let server = MockServer::start().await;
    let client = server.connected_client().await;
    let log = EventLog::attach(&client);

    server.drop_connections();
    server.wait_for_connections(2).await;
    let _ = client
        .wait_for_state(ConnectionState::is_connected, TIMEOUT)
        .await;

    server.drop_connections();
    server.wait_for_connections(3).await;
    let _ = client
        .wait_for_state(ConnectionState::is_connected, TIMEOUT)
        .await;

    let attempts: Vec<u32> = log
        .events()
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Reconnecting { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 1]);
    assert_eq!(log.count(EventKind::Connected), 2);
}

#[tokio::test]
async fn explicit_disconnect_suppresses_reconnect() {
    let server = MockServer::start().await;
    let client = server.connected_client().await;
    let log = EventLog::attach(&client);

    client.disconnect().await.unwrap();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.closed_count(), 1);
    assert_eq!(log.kinds(), vec![EventKind::Disconnected]);
}

#[tokio::test]
async fn connect_is_idempotent() {
    let server = MockServer::start().await;
    let client = server.connected_client().await;
    client.connect().await.unwrap();
    client.connect().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(server.connection_count(), 1);
    assert!(client.is_connected());
}

#[tokio::test]
async fn connect_after_disconnect_reopens() {
    let server = MockServer::start().await;
    let client = server.connected_client().await;
    client.disconnect().await.unwrap();
    client.connect().await.unwrap();
    server.wait_for_connections(2).await;
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn ping_round_trip() {
    let mut server = MockServer::start().await;
    let client = server.connected_client().await;
    let log = EventLog::attach(&client);

    client.ping().unwrap();
    let (_, frame) = server.next_frame().await;
    assert_eq!(frame, json!({"type": "ping"}));
    server.send(json!({"type": "pong"}));
    assert_eq!(log.wait_for(EventKind::Pong).await, ClientEvent::Pong);
}

#[tokio::test]
async fn heartbeat_sends_periodic_pings() {
    let mut server = MockServer::start().await;
    let mut settings = server.settings();
    settings.connection.heartbeat_interval_ms = 30;
    let client = StreamClient::streaming(&settings).unwrap();
    client.connect().await.unwrap();

    let (_, first) = server.next_frame_of_type("ping").await;
    let (_, second) = server.next_frame_of_type("ping").await;
    assert_eq!(first, json!({"type": "ping"}));
    assert_eq!(second, first);
}

#[tokio::test]
async fn dropping_the_last_handle_closes_the_socket() {
    let mut server = MockServer::start().await;
    let client = server.connected_client().await;
    let other = client.clone();
    drop(client);

    other.ping().unwrap();
    let _ = server.next_frame_of_type("ping").await;
    assert_eq!(server.closed_count(), 0);

    drop(other);
    eventually(|| server.closed_count() == 1).await;
}
