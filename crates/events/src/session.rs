//! Per-client session state held by the broker.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use geowatch_core::types::Timestamp;

use crate::queue::SessionQueue;
use crate::topic::Topic;

/// Session identifiers are issued by the server and echoed back by clients
/// that want to resume.
pub type SessionId = String;

/// One logical client, possibly spanning several transport connections.
#[derive(Debug)]
pub struct ClientSession {
    pub id: SessionId,
    pub queue: Arc<SessionQueue>,
    pub subscriptions: HashSet<Topic>,
    pub connected_at: Timestamp,
    pub last_seen: Timestamp,
    /// Pings sent since the last inbound frame.
    pub missed_pings: u32,
    /// Set while no transport is attached; the session is kept for resume.
    pub detached_at: Option<Timestamp>,
    /// Bumped on every (re)attach so a superseded connection cannot tear
    /// down its successor.
    pub epoch: u64,
}

impl ClientSession {
    pub fn new(id: SessionId, queue: Arc<SessionQueue>, now: Timestamp) -> Self {
        Self {
            id,
            queue,
            subscriptions: HashSet::new(),
            connected_at: now,
            last_seen: now,
            missed_pings: 0,
            detached_at: None,
            epoch: 0,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.detached_at.is_none()
    }

    /// Subscription topics in string form, sorted for stable output.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subscriptions.iter().map(Topic::to_string).collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.id.clone(),
            attached: self.is_attached(),
            connected_at: self.connected_at,
            last_seen: self.last_seen,
            subscriptions: self.topic_names(),
            queued: self.queue.len(),
            dropped_events: self.queue.dropped(),
            missed_pings: self.missed_pings,
        }
    }
}

/// Operator-facing view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: SessionId,
    pub attached: bool,
    pub connected_at: Timestamp,
    pub last_seen: Timestamp,
    pub subscriptions: Vec<String>,
    pub queued: usize,
    pub dropped_events: u64,
    pub missed_pings: u32,
}
