//! Tests for `ConnectionManager` against a scripted WebSocket server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use geowatch_agent::{BackoffPolicy, ConnectionManager, ConnectionState};
use geowatch_events::{ClientMessage, ServerMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        base_delay: Duration::from_millis(10),
        multiplier: 2.0,
        max_attempts,
    }
}

/// Accept one WebSocket connection and return it with the request URI.
async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, String) {
    let (stream, _) = listener.accept().await.unwrap();
    let uri = Arc::new(Mutex::new(String::new()));
    let captured = Arc::clone(&uri);
    let ws = tokio_tungstenite::accept_hdr_async(stream, move |req: &Request, resp: Response| {
        *captured.lock().unwrap() = req.uri().to_string();
        Ok::<_, ErrorResponse>(resp)
    })
    .await
    .unwrap();
    let uri = uri.lock().unwrap().clone();
    (ws, uri)
}

async fn send(ws: &mut WebSocketStream<TcpStream>, msg: &ServerMessage) {
    ws.send(Message::Text(serde_json::to_string(msg).unwrap()))
        .await
        .unwrap();
}

async fn recv(ws: &mut WebSocketStream<TcpStream>) -> ClientMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("client message within timeout")
            .expect("stream open")
            .expect("frame ok");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn established(id: &str, resumed: bool, subscriptions: &[&str]) -> ServerMessage {
    ServerMessage::SessionEstablished {
        session_id: id.to_string(),
        resumed,
        subscriptions: subscriptions.iter().map(|s| s.to_string()).collect(),
    }
}

// ---------------------------------------------------------------------------
// Test: reconnect resumes the session and replays missing subscriptions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnect_resumes_session_and_replays() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/api/v1/ws", listener.local_addr().unwrap());

    let manager = ConnectionManager::new(
        url,
        fast_policy(5),
        vec![
            ClientMessage::SubscribeAlerts,
            ClientMessage::SubscribeLiveData { site_id: None },
        ],
    );
    let mut states = manager.watch_state();
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let runner = tokio::spawn(manager.run(tx, cancel.clone()));

    // First connection: fresh session, both subscriptions sent.
    let (mut ws, uri) = accept(&listener).await;
    assert_eq!(uri, "/api/v1/ws");
    send(&mut ws, &established("s-1", false, &[])).await;
    assert_eq!(recv(&mut ws).await, ClientMessage::SubscribeAlerts);
    assert_eq!(
        recv(&mut ws).await,
        ClientMessage::SubscribeLiveData { site_id: None }
    );
    assert!(matches!(rx.recv().await, Some(ServerMessage::SessionEstablished { .. })));

    // Drop the transport without a close handshake.
    drop(ws);

    // Second connection carries the session id; only the missing topic is replayed.
    let (mut ws, uri) = accept(&listener).await;
    assert_eq!(uri, "/api/v1/ws?sessionId=s-1");
    send(&mut ws, &established("s-1", true, &["alerts"])).await;
    assert_eq!(
        recv(&mut ws).await,
        ClientMessage::SubscribeLiveData { site_id: None }
    );
    send(&mut ws, &ServerMessage::Pong).await;

    let mut forwarded = Vec::new();
    while forwarded.len() < 2 {
        forwarded.push(rx.recv().await.unwrap());
    }
    assert!(matches!(
        forwarded[0],
        ServerMessage::SessionEstablished { resumed: true, .. }
    ));
    assert_eq!(forwarded[1], ServerMessage::Pong);
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

    // Client-initiated close is terminal and announced to the server.
    cancel.cancel();
    assert_eq!(recv(&mut ws).await, ClientMessage::Disconnect);
    let final_state = tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(final_state, ConnectionState::Disconnected);
}

// ---------------------------------------------------------------------------
// Test: an unreachable server exhausts retries and reports Disconnected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unreachable_server_gives_up() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let manager = ConnectionManager::new(format!("ws://{addr}/api/v1/ws"), fast_policy(3), Vec::new());
    let mut states = manager.watch_state();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            recorder.lock().unwrap().push(state);
        }
    });

    let (tx, _rx) = mpsc::channel(1);
    let final_state = tokio::time::timeout(
        Duration::from_secs(5),
        manager.run(tx, CancellationToken::new()),
    )
    .await
    .expect("gives up well within the timeout");

    assert_eq!(final_state, ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let backoffs: Vec<u32> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|s| match s {
            ConnectionState::Backoff { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(backoffs, [1, 2, 3]);
}
