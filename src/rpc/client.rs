//! JSON-RPC client that reads metadata pointers from EVM contracts through
//! `eth_call`, plus the `PointerReader` trait the reconciliation stages use.

use crate::entities::TokenIndex;
use crate::rpc::abi;
use crate::rpc::circuit_breaker::{CircuitBreakerError, NodeAnswer, RpcCircuitBreaker};
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::retry::{RetryContext, CONTRACT_URI_RETRY, TOKEN_URI_RETRY};
use crate::runtime::config::ReconcilerConfig;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use futures::future::BoxFuture;
use jsonrpsee::core::{
    client::{ClientT, Error as JsonRpcError},
    http_helpers::HttpError,
};
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde_json::json;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::{sleep, timeout, Instant};

#[derive(Debug)]
pub enum RpcError {
    Timeout { method: &'static str },
    CircuitOpen,
    Reverted { method: &'static str, code: i32, message: String },
    ResponseTooLarge { method: &'static str },
    InvalidResponse { method: &'static str, reason: String },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "{method} call timed out"),
            RpcError::CircuitOpen => write!(f, "node circuit breaker is open"),
            RpcError::Reverted {
                method,
                code,
                message,
            } => write!(f, "{method} call reverted (code={code}): {message}"),
            RpcError::ResponseTooLarge { method } => {
                write!(f, "{method} response exceeded HTTP size limits")
            }
            RpcError::InvalidResponse { method, reason } => {
                write!(f, "{method} returned an undecodable value: {reason}")
            }
        }
    }
}

impl std::error::Error for RpcError {}

/// Reads the on-chain pointer of a contract or token.
pub trait PointerReader: Send + Sync {
    fn read_contract_pointer<'a>(&'a self, contract_id: &'a str) -> BoxFuture<'a, Result<String>>;

    fn read_token_pointer<'a>(
        &'a self,
        contract_id: &'a str,
        token_index: &'a TokenIndex,
    ) -> BoxFuture<'a, Result<String>>;
}

#[derive(Debug, Clone)]
pub struct EvmRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
    breaker: Arc<RpcCircuitBreaker>,
}

impl PointerReader for EvmRpcClient {
    fn read_contract_pointer<'a>(&'a self, contract_id: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.contract_uri(contract_id))
    }

    fn read_token_pointer<'a>(
        &'a self,
        contract_id: &'a str,
        token_index: &'a TokenIndex,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.token_uri(contract_id, token_index))
    }
}

impl EvmRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, None, RpcClientOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        credentials: Option<(&str, &str)>,
        options: RpcClientOptions,
    ) -> Result<Self> {
        Self::with_options_and_breaker(
            url,
            credentials,
            options,
            Arc::new(RpcCircuitBreaker::default()),
        )
    }

    pub fn with_options_and_breaker(
        url: impl Into<String>,
        credentials: Option<(&str, &str)>,
        options: RpcClientOptions,
        breaker: Arc<RpcCircuitBreaker>,
    ) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let headers = auth_headers(credentials)?;
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
            breaker,
        })
    }

    pub fn from_config(config: &ReconcilerConfig) -> Result<Self> {
        let options = RpcClientOptions {
            request_timeout: config.rpc_timeout(),
            max_concurrent_requests: config.contract_batch_size().saturating_mul(2).max(8),
            ..RpcClientOptions::default()
        };
        Self::with_options(config.rpc_url().to_owned(), config.rpc_credentials(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        snapshot.breaker_state = self.breaker.snapshot().state;
        snapshot
    }

    /// Calls `contractURI()` on `contract`.
    pub async fn contract_uri(&self, contract: &str) -> Result<String> {
        let context = RetryContext::for_contract(&CONTRACT_URI_RETRY, contract);
        let calldata = abi::encode_contract_uri();
        self.retry_with_breaker(context, || self.call_string(context, contract, &calldata))
            .await
    }

    /// Calls `tokenURI(index)` on `contract`.
    pub async fn token_uri(&self, contract: &str, index: &TokenIndex) -> Result<String> {
        let context = RetryContext::for_token(&TOKEN_URI_RETRY, contract, index);
        let calldata = abi::encode_token_uri(index);
        self.retry_with_breaker(context, || self.call_string(context, contract, &calldata))
            .await
    }

    /// Shared retry/backoff loop: breaker gating, metrics, exponential
    /// backoff, and consistent logging. Reverts and undecodable results are
    /// answers from a healthy node, so they end the loop without tripping it.
    async fn retry_with_breaker<T, F, Fut>(
        &self,
        context: RetryContext<'_>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match self.breaker.admit() {
                Ok(state) => context.log_permit(state),
                Err(CircuitBreakerError::CircuitOpen) => {
                    context.log_circuit_open();
                    return Err(RpcError::CircuitOpen.into());
                }
            }

            attempt += 1;
            let start = Instant::now();

            let err = match operation().await {
                Ok(value) => {
                    self.metrics.record_success(start.elapsed());
                    self.breaker.settle(NodeAnswer::Value);
                    return Ok(value);
                }
                Err(err) => err,
            };

            let elapsed = start.elapsed();
            match err.downcast_ref::<RpcError>() {
                Some(RpcError::Reverted { .. }) | Some(RpcError::InvalidResponse { .. }) => {
                    self.metrics.record_revert(elapsed);
                    self.breaker.settle(NodeAnswer::Reverted);
                    context.log_reverted(attempt, &err);
                    return Err(err);
                }
                Some(RpcError::ResponseTooLarge { .. }) => {
                    self.metrics.record_failure(elapsed);
                    self.breaker.settle(NodeAnswer::Unreachable);
                    context.log_oversized(attempt);
                    return Err(err);
                }
                Some(RpcError::Timeout { .. }) => {
                    self.metrics.record_timeout(elapsed);
                    self.breaker.settle(NodeAnswer::Unreachable);
                    if attempt < self.options.max_attempts {
                        context.log_timeout(attempt, self.backoff_delay(attempt));
                    }
                }
                _ => {
                    self.metrics.record_failure(elapsed);
                    self.breaker.settle(NodeAnswer::Unreachable);
                }
            }

            if attempt >= self.options.max_attempts {
                context.log_exhausted(attempt, &err);
                return Err(err);
            }

            let backoff = self.backoff_delay(attempt);
            context.log_retry(attempt, backoff, &err);
            sleep(backoff).await;
        }
    }

    async fn call_string(
        &self,
        context: RetryContext<'_>,
        to: &str,
        calldata: &str,
    ) -> Result<String> {
        let method = context.method();
        let call = json!({ "to": to, "data": calldata });

        let raw: String = timeout(
            self.options.request_timeout,
            self.client.request("eth_call", rpc_params![call, "latest"]),
        )
        .await
        .map_err(|_| RpcError::Timeout { method })?
        .map_err(|err| map_rpc_error(method, err))?;

        abi::decode_string(&raw).map_err(|err| {
            RpcError::InvalidResponse {
                method,
                reason: format!("{err:#}"),
            }
            .into()
        })
    }

    fn backoff_delay(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return self.options.initial_backoff;
        }

        let exponent = attempt.saturating_sub(1) as u32;
        let multiplier = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.options
            .initial_backoff
            .saturating_mul(multiplier)
            .min(self.options.max_backoff)
    }
}

fn auth_headers(credentials: Option<(&str, &str)>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some((user, password)) = credentials {
        let encoded = BASE64_STANDARD.encode(format!("{user}:{password}"));
        let value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .context("failed to build Authorization header")?;
        headers.insert("Authorization", value);
    }
    Ok(headers)
}

fn map_rpc_error(method: &'static str, err: JsonRpcError) -> anyhow::Error {
    if let JsonRpcError::Call(call_error) = &err {
        return RpcError::Reverted {
            method,
            code: call_error.code(),
            message: call_error.message().to_owned(),
        }
        .into();
    }
    if response_too_large(&err) {
        return RpcError::ResponseTooLarge { method }.into();
    }
    anyhow!("{method} call failed: {err}")
}

fn response_too_large(err: &JsonRpcError) -> bool {
    let JsonRpcError::Transport(inner) = err else {
        return false;
    };
    match inner.downcast_ref::<HttpTransportError>() {
        Some(HttpTransportError::Http(HttpError::TooLarge)) => true,
        Some(HttpTransportError::RequestTooLarge) => true,
        _ => false,
    }
}
