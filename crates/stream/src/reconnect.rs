//! Exponential-backoff reconnection policy and connection state.
//!
//! [`Backoff`] counts consecutive failures and yields the delay before
//! the next attempt, or `None` once the retry budget is spent.
//! [`ConnectionState`] is the explicit lifecycle the transport publishes.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Consecutive reconnect attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Delay for the zero-based `attempt`: `initial × multiplier^attempt`,
/// clamped to [`ReconnectConfig::max_delay`].
pub fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let factor = config.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
    let ms = config.initial_delay.as_millis() as f64 * factor;
    if !ms.is_finite() || ms >= config.max_delay.as_millis() as f64 {
        return config.max_delay;
    }
    Duration::from_millis(ms as u64).min(config.max_delay)
}

/// Consecutive-failure counter driving reconnect scheduling.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Reconnect attempts scheduled since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// A connection opened: the next failure starts from the initial delay.
    pub fn on_open(&mut self) {
        self.attempt = 0;
    }

    /// Record a failure and return the delay before the next attempt,
    /// or `None` when `max_attempts` reconnects have already been made.
    pub fn on_failure(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        let delay = backoff_delay(self.attempt, &self.config);
        self.attempt += 1;
        Some(delay)
    }
}

/// Lifecycle of the stream transport.
///
/// `Idle → Connecting → Open`, `Open → Reconnecting → Connecting`, and
/// any state `→ Closed` on intentional disconnect. `Failed` is entered
/// when the retry budget is exhausted; a fresh `connect()` leaves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting { attempt: u32, delay: Duration },
    Closed,
    Failed { attempts: u32 },
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// States from which no further activity happens without a new
    /// `connect()`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::Closed | ConnectionState::Failed { .. }
        )
    }

    /// The reconnect budget ran out. An intentional close is not a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }
}
