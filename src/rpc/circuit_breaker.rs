//! Node-wide breaker for `eth_call` traffic.
//!
//! The breaker judges the node, not the contracts behind it. A revert or an
//! undecodable return value still proves the node answered, so only
//! unreachable attempts count toward tripping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_TRIP_AFTER: usize = 5;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// How the node answered one `eth_call` attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeAnswer {
    /// A decodable string came back.
    Value,
    /// The contract reverted or returned something that is not a string.
    Reverted,
    /// Timeout, transport failure, or an oversized response.
    Unreachable,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Copy, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub unreachable_streak: usize,
    pub reverts_answered: u64,
    /// When an open breaker starts admitting trial calls again.
    pub retry_at: Option<Instant>,
}

#[derive(Debug)]
pub enum CircuitBreakerError {
    CircuitOpen,
}

impl std::fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "node circuit breaker is open"),
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

#[derive(Debug)]
struct NodeHealth {
    state: CircuitState,
    unreachable_streak: usize,
    reverts_answered: u64,
    retry_at: Option<Instant>,
    trials_in_flight: usize,
}

/// Shared by every pointer read against one node.
///
/// Unlike the per-address gateway [`FailureTracker`](crate::metadata::FailureTracker),
/// this breaker recovers: once `cooldown` has passed it admits up to
/// `trial_limit` calls, and any answer from the node, reverts included,
/// closes it again.
#[derive(Debug, Clone)]
pub struct RpcCircuitBreaker {
    health: Arc<Mutex<NodeHealth>>,
    trip_after: usize,
    cooldown: Duration,
    trial_limit: usize,
}

impl Default for RpcCircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_TRIP_AFTER, DEFAULT_COOLDOWN, 1)
    }
}

impl RpcCircuitBreaker {
    pub fn new(trip_after: usize, cooldown: Duration, trial_limit: usize) -> Self {
        Self {
            health: Arc::new(Mutex::new(NodeHealth {
                state: CircuitState::Closed,
                unreachable_streak: 0,
                reverts_answered: 0,
                retry_at: None,
                trials_in_flight: 0,
            })),
            trip_after: trip_after.max(1),
            cooldown: cooldown.max(Duration::from_millis(1)),
            trial_limit: trial_limit.max(1),
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let health = self.health.lock().expect("circuit breaker mutex poisoned");
        CircuitBreakerSnapshot {
            state: health.state,
            unreachable_streak: health.unreachable_streak,
            reverts_answered: health.reverts_answered,
            retry_at: health.retry_at,
        }
    }

    /// Admits or rejects the next `eth_call`. While half-open, an admitted
    /// call holds one trial slot until it is settled.
    pub fn admit(&self) -> Result<CircuitState, CircuitBreakerError> {
        let mut health = self.health.lock().expect("circuit breaker mutex poisoned");

        if health.state == CircuitState::Open {
            match health.retry_at {
                Some(retry_at) if Instant::now() >= retry_at => {
                    health.trials_in_flight = 0;
                    self.move_to(&mut health, CircuitState::HalfOpen);
                }
                _ => return Err(CircuitBreakerError::CircuitOpen),
            }
        }

        if health.state == CircuitState::HalfOpen {
            if health.trials_in_flight >= self.trial_limit {
                return Err(CircuitBreakerError::CircuitOpen);
            }
            health.trials_in_flight += 1;
        }

        Ok(health.state)
    }

    /// Records how the node answered an admitted call.
    pub fn settle(&self, answer: NodeAnswer) {
        let mut health = self.health.lock().expect("circuit breaker mutex poisoned");
        if health.state == CircuitState::HalfOpen {
            health.trials_in_flight = health.trials_in_flight.saturating_sub(1);
        }

        match answer {
            NodeAnswer::Value | NodeAnswer::Reverted => {
                if answer == NodeAnswer::Reverted {
                    health.reverts_answered = health.reverts_answered.saturating_add(1);
                }
                health.unreachable_streak = 0;
                if health.state == CircuitState::HalfOpen {
                    health.retry_at = None;
                    self.move_to(&mut health, CircuitState::Closed);
                }
            }
            NodeAnswer::Unreachable => {
                health.unreachable_streak = health.unreachable_streak.saturating_add(1);
                let trips = match health.state {
                    CircuitState::HalfOpen => true,
                    CircuitState::Closed => health.unreachable_streak >= self.trip_after,
                    CircuitState::Open => false,
                };
                if trips {
                    health.retry_at = Some(Instant::now() + self.cooldown);
                    health.trials_in_flight = 0;
                    self.move_to(&mut health, CircuitState::Open);
                }
            }
        }
    }

    fn move_to(&self, health: &mut NodeHealth, next: CircuitState) {
        if health.state == next {
            return;
        }
        tracing::warn!(
            previous = ?health.state,
            next = ?next,
            unreachable_streak = health.unreachable_streak,
            cooldown_ms = self.cooldown.as_millis() as u64,
            "node circuit breaker state changed"
        );
        health.state = next;
    }
}
