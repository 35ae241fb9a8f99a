use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use geowatch_events::protocol::SensorSnapshot;
use geowatch_events::{ClientMessage, Outbound, ServerMessage, Topic, TopicBroker};
use geowatch_pipeline::ReadingIngestor;
use serde::Deserialize;

use crate::state::AppState;

/// Query parameters for `GET /ws`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    /// Session to resume. Unknown or expired ids start a fresh session.
    pub session_id: Option<String>,
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is attached to a broker session and
/// managed by a writer task plus the inbound loop.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_socket(socket, state.broker, state.ingestor, query.session_id)
    })
}

/// How the inbound side of a connection ended.
enum Ending {
    /// Client closed or sent `disconnect`: the session is discarded.
    Closed,
    /// Transport dropped: the session stays resumable for the grace period.
    Dropped,
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Attaches to a new or resumed broker session.
///   2. Spawns a writer task that drains the session queue into the sink.
///   3. Processes inbound client messages on the current task.
///   4. Disconnects or detaches the session depending on how it ended.
async fn handle_socket(
    socket: WebSocket,
    broker: Arc<TopicBroker>,
    ingestor: Arc<ReadingIngestor>,
    requested: Option<String>,
) {
    let conn = broker.connect(requested.as_deref(), Utc::now()).await;
    let session_id = conn.session_id.clone();
    tracing::info!(session_id = %session_id, resumed = conn.resumed, "WebSocket connected");

    // Queued ahead of anything buffered while detached.
    let _ = broker.send(&session_id, conn.established()).await;

    let (mut sink, mut stream) = socket.split();

    // Writer task: forward queued messages to the WebSocket sink.
    let queue = Arc::clone(&conn.queue);
    let writer_session = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = queue.recv().await {
            let frame = match item {
                Outbound::Message(msg) => match serde_json::to_string(msg.as_ref()) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::error!(session_id = %writer_session, error = %e, "Failed to encode message");
                        continue;
                    }
                },
                Outbound::Ping => Message::Ping(Default::default()),
            };
            if sink.send(frame).await.is_err() {
                tracing::debug!(session_id = %writer_session, "WebSocket sink closed");
                return;
            }
        }
        // Queue closed by the broker (shutdown, removal or overflow).
        let _ = sink.send(Message::Close(None)).await;
    });

    let ending = loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = &mut send_task => break Ending::Dropped,
        };

        let frame = match frame {
            Some(Ok(Message::Close(_))) | None => break Ending::Closed,
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket receive error");
                break Ending::Dropped;
            }
        };

        // Any inbound frame counts as liveness, pings and pongs included.
        if broker.touch(&session_id, Utc::now()).await.is_err() {
            // Removed by the heartbeat while we were reading.
            break Ending::Dropped;
        }

        let Message::Text(text) = frame else {
            continue;
        };

        match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(msg) => {
                let Some(reply) =
                    dispatch_client_message(&broker, &ingestor, &session_id, msg).await
                else {
                    break Ending::Closed;
                };
                if broker.send(&session_id, reply).await.is_err() {
                    break Ending::Dropped;
                }
            }
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Invalid client message");
                let _ = broker
                    .send(&session_id, ServerMessage::error(format!("invalid message: {e}")))
                    .await;
            }
        }
    };

    match ending {
        Ending::Closed => {
            broker.disconnect(&session_id, conn.epoch).await;
        }
        Ending::Dropped => {
            broker.detach(&session_id, conn.epoch, Utc::now()).await;
        }
    }
    send_task.abort();
    tracing::info!(session_id = %session_id, "WebSocket disconnected");
}

/// Apply one client message and build the direct reply. `None` means the
/// client asked to end the session.
pub async fn dispatch_client_message(
    broker: &TopicBroker,
    ingestor: &ReadingIngestor,
    session_id: &str,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    let topic = match msg {
        ClientMessage::SubscribeAlerts => Topic::Alerts,
        ClientMessage::SubscribeLiveData { site_id } => Topic::LiveData(site_id),
        ClientMessage::SubscribePredictions { site_id } => Topic::Predictions(site_id),
        ClientMessage::Unsubscribe { topic } => {
            let reply = match topic.parse::<Topic>() {
                Ok(parsed) => match broker.unsubscribe(session_id, &parsed).await {
                    Ok(_) => ServerMessage::Unsubscribed { topic },
                    Err(e) => ServerMessage::error(e.to_string()),
                },
                Err(e) => ServerMessage::error(e.to_string()),
            };
            return Some(reply);
        }
        ClientMessage::GetLiveData => {
            let sensors: Vec<SensorSnapshot> = ingestor.snapshot().await;
            return Some(ServerMessage::LiveSnapshot { sensors });
        }
        ClientMessage::Ping => return Some(ServerMessage::Pong),
        ClientMessage::Disconnect => return None,
    };

    let name = topic.to_string();
    let reply = match broker.subscribe(session_id, topic).await {
        Ok(_) => {
            tracing::debug!(session_id, topic = %name, "Subscribed");
            ServerMessage::SubscriptionConfirmed { topic: name }
        }
        Err(e) => ServerMessage::error(e.to_string()),
    };
    Some(reply)
}
