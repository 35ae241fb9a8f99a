//! Reconnect state machine with exponential backoff.
//!
//! Pure and transport-free: the runtime in [`crate::connection`] feeds it
//! events and acts on the state it returns, so the retry policy can be
//! tested without a socket.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Factor by which the delay grows after each failed attempt.
    pub multiplier: f64,
    /// Failed attempts tolerated before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (1-based):
    /// `base_delay * multiplier^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }
}

/// Connection state as reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started.
    Idle,
    /// A connection attempt is in flight. `attempt` is 0 for the initial
    /// connect and the reconnect number afterwards.
    Connecting { attempt: u32 },
    Connected,
    /// Waiting `delay` before reconnect attempt `attempt`.
    Backoff { attempt: u32, delay: Duration },
    /// Terminal: closed by the client or retries exhausted.
    Disconnected,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }
}

/// Drives [`ConnectionState`] transitions under a [`BackoffPolicy`].
///
/// Events that make no sense in the current state leave it unchanged.
#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    policy: BackoffPolicy,
    state: ConnectionState,
    failures: u32,
}

impl ReconnectMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Idle,
            failures: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Begin connecting from `Idle`, or start over after `Disconnected`.
    pub fn start(&mut self) -> ConnectionState {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Disconnected) {
            self.failures = 0;
            self.state = ConnectionState::Connecting { attempt: 0 };
        }
        self.state
    }

    /// The in-flight attempt succeeded. Resets the attempt counter.
    pub fn connected(&mut self) -> ConnectionState {
        if let ConnectionState::Connecting { .. } = self.state {
            self.failures = 0;
            self.state = ConnectionState::Connected;
        }
        self.state
    }

    /// The in-flight attempt failed.
    pub fn connect_failed(&mut self) -> ConnectionState {
        if let ConnectionState::Connecting { .. } = self.state {
            self.schedule_retry();
        }
        self.state
    }

    /// An established connection dropped without the client asking.
    pub fn connection_lost(&mut self) -> ConnectionState {
        if self.state == ConnectionState::Connected {
            self.schedule_retry();
        }
        self.state
    }

    /// The backoff delay has elapsed; make the next attempt.
    pub fn backoff_elapsed(&mut self) -> ConnectionState {
        if let ConnectionState::Backoff { attempt, .. } = self.state {
            self.state = ConnectionState::Connecting { attempt };
        }
        self.state
    }

    /// The client closed the connection deliberately. Never retried.
    pub fn close(&mut self) -> ConnectionState {
        self.state = ConnectionState::Disconnected;
        self.state
    }

    fn schedule_retry(&mut self) {
        if self.failures >= self.policy.max_attempts {
            self.state = ConnectionState::Disconnected;
            return;
        }
        self.failures += 1;
        self.state = ConnectionState::Backoff {
            attempt: self.failures,
            delay: self.policy.delay_for(self.failures),
        };
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    /// Fail every attempt until the machine gives up; return the delays seen.
    fn exhaust(machine: &mut ReconnectMachine) -> Vec<Duration> {
        let mut delays = Vec::new();
        while let ConnectionState::Backoff { delay, .. } = machine.state() {
            delays.push(delay);
            machine.backoff_elapsed();
            machine.connect_failed();
        }
        delays
    }

    #[test]
    fn delay_grows_geometrically() {
        let policy = BackoffPolicy::default();
        let delays: Vec<_> = (1..=5).map(|k| policy.delay_for(k)).collect();
        assert_eq!(delays, [secs(1), secs(2), secs(4), secs(8), secs(16)]);
    }

    #[test]
    fn custom_multiplier() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_millis(500),
            multiplier: 3.0,
            max_attempts: 3,
        };
        assert_eq!(policy.delay_for(3), Duration::from_millis(4500));
    }

    #[test]
    fn five_failures_then_terminal() {
        let mut machine = ReconnectMachine::new(BackoffPolicy::default());
        machine.start();
        machine.connected();

        machine.connection_lost();
        let delays = exhaust(&mut machine);

        assert_eq!(delays, [secs(1), secs(2), secs(4), secs(8), secs(16)]);
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn success_resets_attempt_counter() {
        let mut machine = ReconnectMachine::new(BackoffPolicy::default());
        machine.start();
        machine.connected();
        machine.connection_lost();

        // Fail twice, succeed on the third attempt.
        for _ in 0..2 {
            machine.backoff_elapsed();
            machine.connect_failed();
        }
        assert_matches!(
            machine.backoff_elapsed(),
            ConnectionState::Connecting { attempt: 3 }
        );
        assert_eq!(machine.connected(), ConnectionState::Connected);
        assert_eq!(machine.failures(), 0);

        // The next disconnect starts over at the base delay.
        assert_eq!(
            machine.connection_lost(),
            ConnectionState::Backoff {
                attempt: 1,
                delay: secs(1)
            }
        );
    }

    #[test]
    fn initial_connect_failure_backs_off() {
        let mut machine = ReconnectMachine::new(BackoffPolicy::default());
        assert_eq!(machine.start(), ConnectionState::Connecting { attempt: 0 });
        assert_matches!(
            machine.connect_failed(),
            ConnectionState::Backoff { attempt: 1, .. }
        );
    }

    #[test]
    fn client_close_is_terminal_and_never_retried() {
        let mut machine = ReconnectMachine::new(BackoffPolicy::default());
        machine.start();
        machine.connected();

        assert_eq!(machine.close(), ConnectionState::Disconnected);
        assert_eq!(machine.connection_lost(), ConnectionState::Disconnected);
        assert_eq!(machine.backoff_elapsed(), ConnectionState::Disconnected);
    }

    #[test]
    fn out_of_order_events_are_ignored() {
        let mut machine = ReconnectMachine::new(BackoffPolicy::default());
        assert_eq!(machine.connected(), ConnectionState::Idle);
        assert_eq!(machine.connection_lost(), ConnectionState::Idle);

        machine.start();
        assert_eq!(
            machine.connection_lost(),
            ConnectionState::Connecting { attempt: 0 }
        );
    }

    #[test]
    fn zero_attempts_gives_up_immediately() {
        let mut machine = ReconnectMachine::new(BackoffPolicy {
            max_attempts: 0,
            ..Default::default()
        });
        machine.start();
        machine.connected();
        assert_eq!(machine.connection_lost(), ConnectionState::Disconnected);
    }
}
