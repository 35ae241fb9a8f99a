//! WebSocket runtime around [`ReconnectMachine`].
//!
//! Connects to the server, forwards every server message to a channel,
//! and reconnects with backoff when the connection drops unexpectedly.
//! The session id issued by the server is sent back on reconnect so the
//! server can resume the session; any subscription it did not restore is
//! replayed.

use futures::{SinkExt, StreamExt};
use geowatch_events::{ClientMessage, ServerMessage, Topic};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::reconnect::{BackoffPolicy, ConnectionState, ReconnectMachine};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// How a connected session ended.
enum SessionEnd {
    /// Client side asked to stop: cancelled, or the event consumer is gone.
    Closed,
    /// Transport error, EOF or a server-initiated close.
    Lost,
}

pub struct ConnectionManager {
    url: String,
    machine: ReconnectMachine,
    subscriptions: Vec<ClientMessage>,
    session_id: Option<String>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    /// `subscriptions` are sent after every connect that does not restore
    /// them server-side.
    pub fn new(url: impl Into<String>, policy: BackoffPolicy, subscriptions: Vec<ClientMessage>) -> Self {
        let machine = ReconnectMachine::new(policy);
        let (state_tx, _) = watch::channel(machine.state());
        Self {
            url: url.into(),
            machine,
            subscriptions,
            session_id: None,
            state_tx,
        }
    }

    /// Observe state changes, e.g. to show a terminal `Disconnected`.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Connect and keep the connection alive until `cancel` fires, the
    /// `events` receiver is dropped, or retries are exhausted. Returns the
    /// terminal state.
    pub async fn run(
        mut self,
        events: mpsc::Sender<ServerMessage>,
        cancel: CancellationToken,
    ) -> ConnectionState {
        let state = self.machine.start();
        self.publish(state);

        loop {
            let next = match self.machine.state() {
                ConnectionState::Connecting { attempt } => {
                    let endpoint = self.endpoint();
                    tracing::info!(url = %endpoint, attempt, "Connecting to GeoWatch");

                    let result = tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::info!("Connect cancelled");
                            self.machine.close();
                            break;
                        }
                        result = connect_async(endpoint) => result,
                    };

                    match result {
                        Ok((socket, _response)) => {
                            let state = self.machine.connected();
                            self.publish(state);
                            match self.run_session(socket, &events, &cancel).await {
                                SessionEnd::Closed => self.machine.close(),
                                SessionEnd::Lost => {
                                    tracing::warn!("Connection lost");
                                    self.machine.connection_lost()
                                }
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, attempt, "Connect attempt failed");
                            self.machine.connect_failed()
                        }
                    }
                }
                ConnectionState::Backoff { attempt, delay } => {
                    tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.machine.close();
                            break;
                        }
                        _ = tokio::time::sleep(delay) => self.machine.backoff_elapsed(),
                    }
                }
                ConnectionState::Disconnected => break,
                // `run` only leaves Connected through `run_session`, and
                // `start` never leaves Idle behind.
                ConnectionState::Idle | ConnectionState::Connected => break,
            };
            self.publish(next);
        }

        let state = self.machine.state();
        self.publish(state);
        if state.is_terminal() && self.machine.failures() >= self.machine.policy().max_attempts {
            tracing::error!(
                attempts = self.machine.failures(),
                "Giving up after repeated reconnect failures",
            );
        }
        state
    }

    /// Drive one connected session until it ends.
    async fn run_session(
        &mut self,
        socket: Socket,
        events: &mpsc::Sender<ServerMessage>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Closing connection");
                    if let Ok(frame) = encode(&ClientMessage::Disconnect) {
                        let _ = sink.send(frame).await;
                    }
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Closed;
                }
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Server closed WebSocket");
                            return SessionEnd::Lost;
                        }
                        // Pings are answered by tungstenite.
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "WebSocket receive error");
                            return SessionEnd::Lost;
                        }
                        None => return SessionEnd::Lost,
                    };

                    let message: ServerMessage = match serde_json::from_str(&text) {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!(error = %e, "Unrecognised server message");
                            continue;
                        }
                    };

                    if let ServerMessage::SessionEstablished { session_id, resumed, subscriptions } = &message {
                        tracing::info!(session_id = %session_id, resumed, "Session established");
                        self.session_id = Some(session_id.clone());
                        for sub in self.pending_replay(subscriptions) {
                            let frame = match encode(&sub) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    tracing::error!(error = %e, subscription = ?sub, "Failed to encode subscription");
                                    continue;
                                }
                            };
                            if sink.send(frame).await.is_err() {
                                return SessionEnd::Lost;
                            }
                        }
                    }

                    if events.send(message).await.is_err() {
                        tracing::info!("Event consumer dropped, closing");
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Closed;
                    }
                }
            }
        }
    }

    /// Subscriptions the server did not restore.
    fn pending_replay(&self, restored: &[String]) -> Vec<ClientMessage> {
        self.subscriptions
            .iter()
            .filter(|sub| {
                subscription_topic(sub).is_none_or(|topic| !restored.contains(&topic.to_string()))
            })
            .cloned()
            .collect()
    }

    fn endpoint(&self) -> String {
        match &self.session_id {
            Some(id) => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{sep}sessionId={id}", self.url)
            }
            None => self.url.clone(),
        }
    }

    fn publish(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(?state, "Connection state changed");
            *current = state;
            true
        });
    }
}

/// The topic a subscribe message targets.
pub fn subscription_topic(message: &ClientMessage) -> Option<Topic> {
    match message {
        ClientMessage::SubscribeAlerts => Some(Topic::Alerts),
        ClientMessage::SubscribeLiveData { site_id } => Some(Topic::LiveData(site_id.clone())),
        ClientMessage::SubscribePredictions { site_id } => Some(Topic::Predictions(site_id.clone())),
        _ => None,
    }
}

fn encode(message: &ClientMessage) -> Result<Message, serde_json::Error> {
    serde_json::to_string(message).map(Message::Text)
}
