//! Retry context and canned log messages shared by the pointer getters so the
//! retry loop reports breaker state, attempts, and exhaustion consistently.

use crate::entities::TokenIndex;
use crate::rpc::circuit_breaker::CircuitState;
use anyhow::Error;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        match ($ctx.contract, $ctx.token) {
            (Some(contract), Some(token)) => {
                tracing::$level!(contract, token = %token, $($rest)*);
            }
            (Some(contract), None) => {
                tracing::$level!(contract, $($rest)*);
            }
            _ => {
                tracing::$level!($($rest)*);
            }
        }
    }};
}

/// Log labels describing how one RPC operation reports its retries.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) method: &'static str,
    pub(crate) permit: &'static str,
    pub(crate) circuit_open: &'static str,
    pub(crate) timeout: &'static str,
    pub(crate) retry: &'static str,
    pub(crate) exhausted: &'static str,
    pub(crate) reverted: &'static str,
    pub(crate) oversized: &'static str,
}

/// Target of an RPC operation plus the messages it logs with.
#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    contract: Option<&'a str>,
    token: Option<&'a TokenIndex>,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn for_contract(messages: &'a RetryMessages, contract: &'a str) -> Self {
        Self {
            contract: Some(contract),
            token: None,
            messages,
        }
    }

    pub(crate) fn for_token(
        messages: &'a RetryMessages,
        contract: &'a str,
        token: &'a TokenIndex,
    ) -> Self {
        Self {
            contract: Some(contract),
            token: Some(token),
            messages,
        }
    }

    pub(crate) fn method(&self) -> &'static str {
        self.messages.method
    }

    pub(crate) fn log_permit(&self, state: CircuitState) {
        log_with_retry_ctx!(trace, self, breaker_state = ?state, "{}", self.messages.permit);
    }

    pub(crate) fn log_circuit_open(&self) {
        log_with_retry_ctx!(warn, self, "{}", self.messages.circuit_open);
    }

    pub(crate) fn log_timeout(&self, attempt: usize, backoff: Duration) {
        let backoff_ms = duration_to_millis(backoff);
        log_with_retry_ctx!(warn, self, attempt, backoff_ms, "{}", self.messages.timeout);
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &Error) {
        let backoff_ms = duration_to_millis(backoff);
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            backoff_ms,
            error = %err,
            "{}",
            self.messages.retry
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(warn, self, attempt, error = %err, "{}", self.messages.exhausted);
    }

    pub(crate) fn log_reverted(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(debug, self, attempt, error = %err, "{}", self.messages.reverted);
    }

    pub(crate) fn log_oversized(&self, attempt: usize) {
        log_with_retry_ctx!(warn, self, attempt, "{}", self.messages.oversized);
    }
}

fn duration_to_millis(backoff: Duration) -> u64 {
    backoff.as_millis().min(u128::from(u64::MAX)) as u64
}

pub(crate) const CONTRACT_URI_RETRY: RetryMessages = RetryMessages {
    method: "contractURI",
    permit: "circuit breaker permit acquired for contractURI",
    circuit_open: "node circuit breaker open; rejecting contractURI call",
    timeout: "contractURI call timed out; will retry",
    retry: "contractURI call failed; retrying",
    exhausted: "contractURI call exhausted retries",
    reverted: "contractURI call reverted",
    oversized: "contractURI response exceeded HTTP size limit",
};

pub(crate) const TOKEN_URI_RETRY: RetryMessages = RetryMessages {
    method: "tokenURI",
    permit: "circuit breaker permit acquired for tokenURI",
    circuit_open: "node circuit breaker open; rejecting tokenURI call",
    timeout: "tokenURI call timed out; will retry",
    retry: "tokenURI call failed; retrying",
    exhausted: "tokenURI call exhausted retries",
    reverted: "tokenURI call reverted",
    oversized: "tokenURI response exceeded HTTP size limit",
};
