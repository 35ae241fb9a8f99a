//! End-to-end WebSocket tests against a bound server.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use geowatch_api::state::AppState;
use geowatch_core::sensor::Reading;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, AppState) {
    let (app, state) = common::build_test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn connect(addr: SocketAddr, session_id: Option<&str>) -> Client {
    let url = match session_id {
        Some(id) => format!("ws://{addr}/api/v1/ws?sessionId={id}"),
        None => format!("ws://{addr}/api/v1/ws"),
    };
    let (client, _) = connect_async(url).await.expect("websocket handshake");
    client
}

/// Next JSON text frame, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("message within timeout")
            .expect("stream open")
            .expect("frame ok");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

fn reading(sensor_id: &str, value: f64) -> Reading {
    Reading {
        sensor_id: sensor_id.into(),
        value,
        unit: "mm".into(),
        timestamp: chrono::Utc::now(),
        quality_score: 0.9,
    }
}

// ---------------------------------------------------------------------------
// Test: session handshake, subscription and alert delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribe_and_receive_critical_alert() {
    let (addr, state) = spawn_server().await;
    let mut client = connect(addr, None).await;

    let hello = next_json(&mut client).await;
    assert_eq!(hello["type"], "session_established");
    assert_eq!(hello["resumed"], false);
    assert!(hello["sessionId"].is_string());

    send_json(&mut client, json!({ "type": "subscribe_alerts" })).await;
    let confirmed = next_json(&mut client).await;
    assert_eq!(confirmed["type"], "subscription_confirmed");
    assert_eq!(confirmed["topic"], "alerts");

    state.ingestor.ingest(reading("S1", 30.0)).await.unwrap();

    let alert = next_json(&mut client).await;
    assert_eq!(alert["type"], "critical_alert");
    assert_eq!(alert["action"], "created");
    assert_eq!(alert["alert"]["sensorId"], "S1");
    assert_eq!(alert["alert"]["severity"], "critical");

    send_json(&mut client, json!({ "type": "ping" })).await;
    assert_eq!(next_json(&mut client).await["type"], "pong");
}

// ---------------------------------------------------------------------------
// Test: live data respects the site filter; snapshot on request
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_data_is_site_filtered() {
    let (addr, state) = spawn_server().await;
    let mut client = connect(addr, None).await;
    next_json(&mut client).await;

    send_json(
        &mut client,
        json!({ "type": "subscribe_live_data", "siteId": "north" }),
    )
    .await;
    assert_eq!(next_json(&mut client).await["topic"], "live_data:north");

    state.ingestor.ingest(reading("S1", 1.0)).await.unwrap();
    state.ingestor.ingest(reading("N2", 4.0)).await.unwrap();

    let live = next_json(&mut client).await;
    assert_eq!(live["type"], "live_data");
    assert_eq!(live["sensorId"], "N2", "south readings are not delivered");
    assert_eq!(live["status"], "normal");

    send_json(&mut client, json!({ "type": "get_live_data" })).await;
    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["type"], "live_snapshot");
    assert_eq!(snapshot["sensors"].as_array().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Test: reconnecting with a session id resumes subscriptions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_keeps_subscriptions() {
    let (addr, state) = spawn_server().await;
    let mut first = connect(addr, None).await;
    let hello = next_json(&mut first).await;
    let session_id = hello["sessionId"].as_str().unwrap().to_string();

    send_json(&mut first, json!({ "type": "subscribe_alerts" })).await;
    next_json(&mut first).await;

    let mut second = connect(addr, Some(&session_id)).await;
    let hello = next_json(&mut second).await;
    assert_eq!(hello["type"], "session_established");
    assert_eq!(hello["resumed"], true);
    assert_eq!(hello["sessionId"], session_id.as_str());
    assert_eq!(hello["subscriptions"], json!(["alerts"]));

    state.ingestor.ingest(reading("N1", 12.0)).await.unwrap();
    let alert = next_json(&mut second).await;
    assert_eq!(alert["type"], "alert");
    assert_eq!(alert["alert"]["severity"], "high");

    assert_eq!(state.broker.session_count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: bad input gets an error reply; disconnect removes the session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_message_then_disconnect() {
    let (addr, state) = spawn_server().await;
    let mut client = connect(addr, None).await;
    next_json(&mut client).await;

    client
        .send(Message::Text("{not json".to_string()))
        .await
        .unwrap();
    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");

    send_json(&mut client, json!({ "type": "unsubscribe", "topic": "weather" })).await;
    assert_eq!(next_json(&mut client).await["type"], "error");

    assert_eq!(state.broker.session_count().await, 1);
    send_json(&mut client, json!({ "type": "disconnect" })).await;

    let mut remaining = 1;
    for _ in 0..50 {
        remaining = state.broker.session_count().await;
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0, "disconnect discards the session");
}

// ---------------------------------------------------------------------------
// Test: a protocol-level ping from the client clears missed heartbeats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_ping_frame_counts_as_activity() {
    let (addr, state) = spawn_server().await;
    let mut client = connect(addr, None).await;
    let hello = next_json(&mut client).await;
    let session_id = hello["sessionId"].as_str().unwrap().to_string();

    // The client does not read, so the server's pings go unanswered.
    state.broker.heartbeat_tick(chrono::Utc::now()).await;
    state.broker.heartbeat_tick(chrono::Utc::now()).await;
    let stats = state.broker.session_stats(&session_id).await.unwrap();
    assert_eq!(stats.missed_pings, 2);

    client.send(Message::Ping(Vec::new())).await.unwrap();

    let cleared = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let stats = state.broker.session_stats(&session_id).await.unwrap();
            if stats.missed_pings == 0 {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("ping frame resets the missed heartbeat count");
    assert!(cleared.attached);
}
