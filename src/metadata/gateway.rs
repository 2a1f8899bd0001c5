//! HTTP gateway client that resolves metadata pointers into parsed documents.
//! Every failure is soft: callers only ever see `None`, while the reason is
//! logged and charged to the shared [`FailureTracker`].

use crate::metadata::document::{ContractMetadata, MetadataDocument};
use crate::metadata::failures::FailureTracker;
use crate::metadata::ipfs::IpfsNormalizer;
use crate::runtime::config::ReconcilerConfig;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::sync::Arc;
use std::time::Duration;

/// Default timeout applied to a single gateway request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of parsed metadata documents, keyed by the raw on-chain pointer.
pub trait MetadataFetcher: Send + Sync {
    fn fetch_token_metadata<'a>(
        &'a self,
        pointer: &'a str,
    ) -> BoxFuture<'a, Option<MetadataDocument>>;

    fn fetch_contract_metadata<'a>(
        &'a self,
        pointer: &'a str,
    ) -> BoxFuture<'a, Option<ContractMetadata>>;
}

/// Reason a gateway fetch produced no document.
#[derive(Debug)]
pub enum FetchError {
    CircuitOpen { address: String },
    Transport { address: String, source: reqwest::Error },
    Status { address: String, status: u16 },
    Malformed { address: String, source: serde_json::Error },
}

impl FetchError {
    pub fn address(&self) -> &str {
        match self {
            FetchError::CircuitOpen { address }
            | FetchError::Transport { address, .. }
            | FetchError::Status { address, .. }
            | FetchError::Malformed { address, .. } => address,
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::CircuitOpen { address } => {
                write!(f, "gateway address {address} is banned after repeated failures")
            }
            FetchError::Transport { address, source } => {
                write!(f, "request to {address} failed: {source}")
            }
            FetchError::Status { address, status } => {
                write!(f, "gateway answered {status} for {address}")
            }
            FetchError::Malformed { address, source } => {
                write!(f, "document at {address} is malformed: {source}")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Transport { source, .. } => Some(source),
            FetchError::Malformed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    normalizer: IpfsNormalizer,
    failures: FailureTracker,
    telemetry: Arc<Telemetry>,
}

impl GatewayClient {
    pub fn new(
        normalizer: IpfsNormalizer,
        failures: FailureTracker,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        Self::with_options(normalizer, failures, DEFAULT_FETCH_TIMEOUT, telemetry)
    }

    pub fn with_options(
        normalizer: IpfsNormalizer,
        failures: FailureTracker,
        timeout: Duration,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()
            .context("failed to build gateway HTTP client")?;

        Ok(Self {
            client,
            normalizer,
            failures,
            telemetry,
        })
    }

    /// Builds a client for the configured gateway with a fresh failure tracker.
    pub fn from_config(config: &ReconcilerConfig, telemetry: Arc<Telemetry>) -> Result<Self> {
        Self::with_options(
            IpfsNormalizer::new(config.gateway_url())?,
            FailureTracker::new(config.ban_threshold()),
            config.fetch_timeout(),
            telemetry,
        )
    }

    pub fn normalizer(&self) -> &IpfsNormalizer {
        &self.normalizer
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    /// Fetches and decodes the document behind `pointer`, reporting the exact
    /// failure. Transport, status, and decode failures are charged to the
    /// failure tracker; banned addresses are rejected without a request.
    pub async fn try_fetch<T>(
        &self,
        pointer: &str,
        decode: fn(&[u8]) -> serde_json::Result<T>,
    ) -> Result<T, FetchError> {
        let address = self.normalizer.normalize(pointer);
        if self.failures.is_banned(&address) {
            return Err(FetchError::CircuitOpen { address });
        }

        let outcome = self.request(&address, decode).await;
        if outcome.is_err() {
            self.failures.record_failure(&address);
        }
        outcome
    }

    async fn request<T>(
        &self,
        address: &str,
        decode: fn(&[u8]) -> serde_json::Result<T>,
    ) -> Result<T, FetchError> {
        let response = self
            .client
            .get(address)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                address: address.to_owned(),
                source,
            })?;

        let status = response.status();
        tracing::debug!(address, status = status.as_u16(), "gateway responded");

        if status.as_u16() >= 400 {
            return Err(FetchError::Status {
                address: address.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                address: address.to_owned(),
                source,
            })?;

        decode(&body).map_err(|source| FetchError::Malformed {
            address: address.to_owned(),
            source,
        })
    }

    async fn fetch_soft<T>(
        &self,
        pointer: &str,
        decode: fn(&[u8]) -> serde_json::Result<T>,
    ) -> Option<T> {
        match self.try_fetch(pointer, decode).await {
            Ok(document) => Some(document),
            Err(FetchError::CircuitOpen { address }) => {
                self.telemetry.record_banned_skip();
                tracing::warn!(
                    address = %address,
                    "skipping metadata fetch; address exceeded failure limit"
                );
                None
            }
            Err(err) => {
                self.telemetry.record_gateway_error();
                tracing::warn!(
                    address = %err.address(),
                    attempt = self.failures.failures(err.address()),
                    error = %err,
                    "metadata fetch failed"
                );
                None
            }
        }
    }
}

impl MetadataFetcher for GatewayClient {
    fn fetch_token_metadata<'a>(
        &'a self,
        pointer: &'a str,
    ) -> BoxFuture<'a, Option<MetadataDocument>> {
        Box::pin(self.fetch_soft(pointer, MetadataDocument::from_json_slice))
    }

    fn fetch_contract_metadata<'a>(
        &'a self,
        pointer: &'a str,
    ) -> BoxFuture<'a, Option<ContractMetadata>> {
        Box::pin(self.fetch_soft(pointer, ContractMetadata::from_json_slice))
    }
}
