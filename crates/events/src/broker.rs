//! Topic-based fan-out to client sessions.
//!
//! The broker owns the session table and the topic→subscriber index. Both
//! sit behind their own `RwLock`; when both are needed the session table is
//! locked first. Publishing reads the index, releases it, then pushes into
//! each subscriber's [`SessionQueue`] without ever waiting on a consumer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::RwLock;

use geowatch_core::types::Timestamp;

use crate::protocol::{Lane, ServerMessage};
use crate::queue::{Outbound, PushOutcome, SessionQueue, DEFAULT_LIVE_CAPACITY, DEFAULT_PRIORITY_CAPACITY};
use crate::session::{ClientSession, SessionId, SessionStats};
use crate::topic::Topic;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub live_capacity: usize,
    pub priority_capacity: usize,
    /// Unanswered heartbeat pings before a session is considered stale.
    pub max_missed_pings: u32,
    /// How long a detached session is kept for resume.
    pub resume_grace: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            live_capacity: DEFAULT_LIVE_CAPACITY,
            priority_capacity: DEFAULT_PRIORITY_CAPACITY,
            max_missed_pings: 3,
            resume_grace: Duration::from_secs(120),
        }
    }
}

/// Handle returned to the transport when a client attaches.
#[derive(Debug, Clone)]
pub struct Connection {
    pub session_id: SessionId,
    /// Pass back to [`TopicBroker::detach`] and [`TopicBroker::disconnect`].
    pub epoch: u64,
    pub queue: Arc<SessionQueue>,
    pub resumed: bool,
    pub subscriptions: Vec<String>,
}

impl Connection {
    pub fn established(&self) -> ServerMessage {
        ServerMessage::SessionEstablished {
            session_id: self.session_id.clone(),
            resumed: self.resumed,
            subscriptions: self.subscriptions.clone(),
        }
    }
}

/// Outcome of one heartbeat pass.
#[derive(Debug, Default)]
pub struct HeartbeatReport {
    pub pinged: usize,
    /// Attached sessions removed for not answering pings.
    pub stale: Vec<SessionId>,
    /// Detached sessions removed after the resume grace period.
    pub expired: Vec<SessionId>,
}

pub struct TopicBroker {
    config: BrokerConfig,
    sessions: RwLock<HashMap<SessionId, ClientSession>>,
    topics: RwLock<HashMap<Topic, HashSet<SessionId>>>,
}

impl TopicBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a transport connection.
    ///
    /// A `requested` id naming a session that is still attached, or detached
    /// within the grace period, resumes it with its subscriptions intact.
    /// Anything else gets a fresh session.
    pub async fn connect(&self, requested: Option<&str>, now: Timestamp) -> Connection {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = requested.and_then(|id| sessions.get_mut(id)) {
            let grace = self.grace();
            let resumable = session
                .detached_at
                .is_none_or(|at| now.signed_duration_since(at) <= grace);
            if resumable {
                // A queue with no writer keeps buffering while detached; a
                // closed one or one still owned by another socket is replaced
                // and its buffered messages carried over.
                if session.is_attached() || session.queue.is_closed() {
                    let next = self.new_queue();
                    let carried = session.queue.hand_over(&next);
                    session.queue = Arc::new(next);
                    if carried > 0 {
                        tracing::debug!(session_id = %session.id, carried, "Carried buffered messages to resumed session");
                    }
                }
                session.epoch += 1;
                session.detached_at = None;
                session.last_seen = now;
                session.missed_pings = 0;
                tracing::info!(session_id = %session.id, epoch = session.epoch, "Session resumed");
                return Connection {
                    session_id: session.id.clone(),
                    epoch: session.epoch,
                    queue: Arc::clone(&session.queue),
                    resumed: true,
                    subscriptions: session.topic_names(),
                };
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let queue = Arc::new(self.new_queue());
        sessions.insert(id.clone(), ClientSession::new(id.clone(), Arc::clone(&queue), now));
        tracing::info!(session_id = %id, "Session established");
        Connection {
            session_id: id,
            epoch: 0,
            queue,
            resumed: false,
            subscriptions: Vec::new(),
        }
    }

    /// Returns `true` if the topic was newly added to the session.
    pub async fn subscribe(&self, session_id: &str, topic: Topic) -> Result<bool, BrokerError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| BrokerError::UnknownSession(session_id.to_string()))?;

        let added = session.subscriptions.insert(topic.clone());
        if added {
            tracing::debug!(session_id, topic = %topic, "Subscribed");
            self.topics
                .write()
                .await
                .entry(topic)
                .or_default()
                .insert(session_id.to_string());
        }
        Ok(added)
    }

    /// Returns `true` if the session was subscribed to the topic.
    pub async fn unsubscribe(&self, session_id: &str, topic: &Topic) -> Result<bool, BrokerError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| BrokerError::UnknownSession(session_id.to_string()))?;

        let removed = session.subscriptions.remove(topic);
        if removed {
            tracing::debug!(session_id, topic = %topic, "Unsubscribed");
            let mut topics = self.topics.write().await;
            drop_subscriber(&mut topics, topic, session_id);
        }
        Ok(removed)
    }

    /// Remove a session and all its subscriptions. Idempotent.
    pub async fn remove_session(&self, session_id: &str) -> bool {
        self.remove_where(session_id, |_| true).await
    }

    /// Terminal close from the client side of connection `epoch`.
    ///
    /// A session already detached by a priority overflow stays resumable:
    /// the close is the client answering the server's own close frame.
    pub async fn disconnect(&self, session_id: &str, epoch: u64) -> bool {
        self.remove_where(session_id, |s| s.epoch == epoch && s.is_attached()).await
    }

    /// Mark connection `epoch` as gone but keep the session for resume.
    ///
    /// No-op when a newer connection has already taken the session over.
    pub async fn detach(&self, session_id: &str, epoch: u64, now: Timestamp) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) if session.epoch == epoch && session.is_attached() => {
                session.detached_at = Some(now);
                tracing::info!(session_id, "Session detached");
                true
            }
            _ => false,
        }
    }

    /// Record inbound activity, clearing outstanding pings.
    pub async fn touch(&self, session_id: &str, now: Timestamp) -> Result<(), BrokerError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| BrokerError::UnknownSession(session_id.to_string()))?;
        session.last_seen = now;
        session.missed_pings = 0;
        Ok(())
    }

    /// Queue a message for one session only.
    pub async fn send(&self, session_id: &str, message: ServerMessage) -> Result<PushOutcome, BrokerError> {
        let outcome = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| BrokerError::UnknownSession(session_id.to_string()))?;
            session.queue.push_message(Arc::new(message))
        };
        if outcome == PushOutcome::Overflow {
            self.close_overflowed(session_id).await;
        }
        Ok(outcome)
    }

    /// Fan a message out to every subscriber of `topic` and of its wildcard.
    ///
    /// Returns the number of sessions the message was queued for.
    pub async fn publish(&self, topic: &Topic, message: ServerMessage) -> usize {
        let wildcard = topic.wildcard();
        let targets: HashSet<SessionId> = {
            let topics = self.topics.read().await;
            std::iter::once(topic)
                .chain(wildcard.as_ref())
                .filter_map(|t| topics.get(t))
                .flatten()
                .cloned()
                .collect()
        };
        if targets.is_empty() {
            return 0;
        }

        let message = Arc::new(message);
        let mut delivered = 0;
        let mut overflowed = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for id in &targets {
                let Some(session) = sessions.get(id) else {
                    continue;
                };
                match session.queue.push_message(Arc::clone(&message)) {
                    PushOutcome::Queued => delivered += 1,
                    PushOutcome::DroppedOldest => {
                        delivered += 1;
                        tracing::debug!(
                            session_id = %id,
                            dropped = session.queue.dropped(),
                            "Live queue full, dropped oldest event",
                        );
                    }
                    PushOutcome::Overflow => {
                        delivered += 1;
                        overflowed.push(id.clone());
                    }
                    PushOutcome::Closed => {}
                }
            }
        }

        for id in overflowed {
            self.close_overflowed(&id).await;
        }
        delivered
    }

    /// Ping every attached session and drop stale or expired ones.
    pub async fn heartbeat_tick(&self, now: Timestamp) -> HeartbeatReport {
        let grace = self.grace();
        let mut report = HeartbeatReport::default();
        let mut overflowed = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            for session in sessions.values_mut() {
                if let Some(at) = session.detached_at {
                    if now.signed_duration_since(at) > grace {
                        report.expired.push(session.id.clone());
                    }
                    continue;
                }
                if session.missed_pings >= self.config.max_missed_pings {
                    report.stale.push(session.id.clone());
                    continue;
                }
                match session.queue.push(Lane::Priority, Outbound::Ping) {
                    PushOutcome::Queued | PushOutcome::DroppedOldest => {
                        session.missed_pings += 1;
                        report.pinged += 1;
                    }
                    PushOutcome::Overflow => overflowed.push(session.id.clone()),
                    PushOutcome::Closed => report.stale.push(session.id.clone()),
                }
            }
        }

        for id in &overflowed {
            self.close_overflowed(id).await;
        }
        for id in &report.stale {
            tracing::warn!(session_id = %id, "Session stale, removing");
            self.remove_session(id).await;
        }
        for id in &report.expired {
            tracing::info!(session_id = %id, "Detached session expired");
            self.remove_session(id).await;
        }
        report
    }

    pub async fn session_stats(&self, session_id: &str) -> Result<SessionStats, BrokerError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(ClientSession::stats)
            .ok_or_else(|| BrokerError::UnknownSession(session_id.to_string()))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Sessions currently subscribed to exactly `topic`.
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.read().await.get(topic).map_or(0, HashSet::len)
    }

    /// Close every session queue and clear all state.
    pub async fn shutdown_all(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        for session in sessions.values() {
            session.queue.close();
        }
        sessions.clear();
        self.topics.write().await.clear();
        tracing::info!(count, "Closed all client sessions");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn new_queue(&self) -> SessionQueue {
        SessionQueue::new(self.config.live_capacity, self.config.priority_capacity)
    }

    fn grace(&self) -> TimeDelta {
        TimeDelta::from_std(self.config.resume_grace).unwrap_or(TimeDelta::MAX)
    }

    async fn remove_where(&self, session_id: &str, pred: impl FnOnce(&ClientSession) -> bool) -> bool {
        let mut sessions = self.sessions.write().await;
        if !sessions.get(session_id).is_some_and(pred) {
            return false;
        }
        let Some(session) = sessions.remove(session_id) else {
            return false;
        };
        session.queue.close();

        let mut topics = self.topics.write().await;
        for topic in &session.subscriptions {
            drop_subscriber(&mut topics, topic, session_id);
        }
        tracing::info!(session_id, "Session removed");
        true
    }

    /// The priority lane overflowed: the queue has stopped its writer and
    /// holds what it buffered. Detach so the client can resume and receive it.
    async fn close_overflowed(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            if session.is_attached() {
                session.detached_at = Some(Utc::now());
            }
            tracing::warn!(session_id, "Priority queue overflowed, closing connection");
        }
    }
}

impl Default for TopicBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

fn drop_subscriber(topics: &mut HashMap<Topic, HashSet<SessionId>>, topic: &Topic, session_id: &str) {
    if let Some(ids) = topics.get_mut(topic) {
        ids.remove(session_id);
        if ids.is_empty() {
            topics.remove(topic);
        }
    }
}
