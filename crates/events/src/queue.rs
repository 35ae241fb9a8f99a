//! Bounded per-session outbound queue.
//!
//! Producers never wait: a full live lane evicts its oldest entry and bumps
//! a drop counter, while the priority lane is never evicted and instead
//! reports [`PushOutcome::Overflow`] so the broker can close the connection.
//! An overflowed queue stops handing items to its consumer but keeps
//! buffering until [`SessionQueue::hand_over`] moves everything into the
//! queue of the resumed connection. The single consumer is the session's
//! socket writer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::protocol::{Lane, ServerMessage};

/// Default live-lane capacity.
pub const DEFAULT_LIVE_CAPACITY: usize = 256;

/// Default priority-lane capacity.
pub const DEFAULT_PRIORITY_CAPACITY: usize = 64;

/// An item waiting to be written to the socket.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(Arc<ServerMessage>),
    /// Transport-level ping.
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest live entry.
    DroppedOldest,
    /// The priority lane was full. The item is held, the consumer is
    /// stopped and the queue keeps buffering for a resumed connection.
    Overflow,
    /// The queue was already closed; nothing was queued.
    Closed,
}

#[derive(Debug, Default)]
struct Lanes {
    /// Priority items carried over from a previous connection. Drained
    /// first and not counted against the priority capacity.
    backlog: VecDeque<Outbound>,
    live: VecDeque<Outbound>,
    priority: VecDeque<Outbound>,
    closed: bool,
    /// Closed by overflow: producers may still push.
    holding: bool,
}

#[derive(Debug)]
pub struct SessionQueue {
    lanes: Mutex<Lanes>,
    notify: Notify,
    dropped: AtomicU64,
    live_capacity: usize,
    priority_capacity: usize,
}

impl SessionQueue {
    pub fn new(live_capacity: usize, priority_capacity: usize) -> Self {
        Self {
            lanes: Mutex::new(Lanes::default()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            live_capacity: live_capacity.max(1),
            priority_capacity: priority_capacity.max(1),
        }
    }

    pub fn push(&self, lane: Lane, item: Outbound) -> PushOutcome {
        let outcome = {
            let mut lanes = self.lock();
            if lanes.closed && !lanes.holding {
                return PushOutcome::Closed;
            }
            match lane {
                Lane::Live => {
                    let evicted = lanes.live.len() >= self.live_capacity;
                    if evicted {
                        lanes.live.pop_front();
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    lanes.live.push_back(item);
                    if evicted {
                        PushOutcome::DroppedOldest
                    } else {
                        PushOutcome::Queued
                    }
                }
                Lane::Priority => {
                    let overflow = !lanes.holding && lanes.priority.len() >= self.priority_capacity;
                    if overflow {
                        lanes.closed = true;
                        lanes.holding = true;
                    }
                    lanes.priority.push_back(item);
                    if overflow {
                        PushOutcome::Overflow
                    } else {
                        PushOutcome::Queued
                    }
                }
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Queue a protocol message in the lane it belongs to.
    pub fn push_message(&self, message: Arc<ServerMessage>) -> PushOutcome {
        let lane = message.lane();
        self.push(lane, Outbound::Message(message))
    }

    /// Next item, priority lane first. `None` once the queue is closed.
    pub fn try_recv(&self) -> Option<Outbound> {
        let mut lanes = self.lock();
        if lanes.closed {
            return None;
        }
        lanes
            .backlog
            .pop_front()
            .or_else(|| lanes.priority.pop_front())
            .or_else(|| lanes.live.pop_front())
    }

    /// Wait for the next item. Returns `None` once the queue is closed.
    pub async fn recv(&self) -> Option<Outbound> {
        loop {
            if let Some(item) = self.try_recv() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue, discarding anything still buffered. Idempotent.
    pub fn close(&self) {
        let mut lanes = self.lock();
        lanes.closed = true;
        lanes.holding = false;
        lanes.backlog.clear();
        lanes.live.clear();
        lanes.priority.clear();
        drop(lanes);
        self.notify.notify_one();
    }

    /// Move every buffered message into `next` and close this queue.
    ///
    /// Priority messages land in `next`'s backlog ahead of anything it
    /// receives later; live messages go through `next`'s live lane and its
    /// eviction rule. Transport pings are discarded. Returns the number of
    /// messages moved.
    pub fn hand_over(&self, next: &SessionQueue) -> usize {
        let (priority, live) = {
            let mut lanes = self.lock();
            lanes.closed = true;
            lanes.holding = false;
            let mut priority = std::mem::take(&mut lanes.backlog);
            priority.append(&mut lanes.priority);
            (priority, std::mem::take(&mut lanes.live))
        };
        self.notify.notify_one();

        let mut moved = 0;
        {
            let mut target = next.lock();
            for item in priority {
                if let Outbound::Message(_) = item {
                    target.backlog.push_back(item);
                    moved += 1;
                }
            }
        }
        for item in live {
            if let Outbound::Message(_) = item {
                next.push(Lane::Live, item);
                moved += 1;
            }
        }
        next.notify.notify_one();
        moved
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Buffered items across both lanes.
    pub fn len(&self) -> usize {
        let lanes = self.lock();
        lanes.backlog.len() + lanes.live.len() + lanes.priority.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live entries evicted since the queue was created.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Lanes> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_LIVE_CAPACITY, DEFAULT_PRIORITY_CAPACITY)
    }
}
