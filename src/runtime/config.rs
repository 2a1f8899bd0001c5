use crate::metadata::failures::DEFAULT_BAN_THRESHOLD;
use crate::metadata::gateway::DEFAULT_FETCH_TIMEOUT;
use crate::metadata::ipfs::DEFAULT_GATEWAY_URL;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONTRACT_BATCH_SIZE: usize = 20;
const DEFAULT_IPFS_BATCH_SIZE: usize = 10;

const ENV_PREFIX: &str = "URI_SYNC_";

/// Runtime configuration for the reconciler.
///
/// All instances must be constructed via [`ReconcilerConfig::builder`] or
/// [`ReconcilerConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    rpc_url: String,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    gateway_url: String,
    contract_batch_size: usize,
    ipfs_batch_size: usize,
    fetch_timeout: Duration,
    ban_threshold: usize,
    rpc_timeout: Duration,
    cycle_deadline: Option<Duration>,
    metrics_interval: Duration,
}

pub struct ReconcilerConfigParams {
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub gateway_url: String,
    pub contract_batch_size: usize,
    pub ipfs_batch_size: usize,
    pub fetch_timeout: Duration,
    pub ban_threshold: usize,
    pub rpc_timeout: Duration,
    pub cycle_deadline: Option<Duration>,
    pub metrics_interval: Duration,
}

impl ReconcilerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> ReconcilerConfigBuilder {
        ReconcilerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: ReconcilerConfigParams) -> Result<Self> {
        let ReconcilerConfigParams {
            rpc_url,
            rpc_user,
            rpc_password,
            gateway_url,
            contract_batch_size,
            ipfs_batch_size,
            fetch_timeout,
            ban_threshold,
            rpc_timeout,
            cycle_deadline,
            metrics_interval,
        } = params;

        let mut gateway_url = trimmed_string(gateway_url);
        if !gateway_url.ends_with('/') {
            gateway_url.push('/');
        }

        let config = Self {
            rpc_url: trimmed_string(rpc_url),
            rpc_user: rpc_user.map(trimmed_string),
            rpc_password: rpc_password.map(trimmed_string),
            gateway_url,
            contract_batch_size,
            ipfs_batch_size,
            fetch_timeout,
            ban_threshold,
            rpc_timeout,
            cycle_deadline,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads `URI_SYNC_*` environment variables. Only `URI_SYNC_RPC_URL` is
    /// required; everything else falls back to the builder defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };

        let mut builder = Self::builder();
        if let Some(url) = read("RPC_URL") {
            builder = builder.rpc_url(url);
        }
        if let Some(user) = read("RPC_USER") {
            builder = builder.rpc_user(user);
        }
        if let Some(password) = read("RPC_PASSWORD") {
            builder = builder.rpc_password(password);
        }
        if let Some(url) = read("GATEWAY_URL") {
            builder = builder.gateway_url(url);
        }
        if let Some(size) = parse_var::<usize>(read("CONTRACT_BATCH_SIZE"), "CONTRACT_BATCH_SIZE")? {
            builder = builder.contract_batch_size(size);
        }
        if let Some(size) = parse_var::<usize>(read("IPFS_BATCH_SIZE"), "IPFS_BATCH_SIZE")? {
            builder = builder.ipfs_batch_size(size);
        }
        if let Some(ms) = parse_var::<u64>(read("FETCH_TIMEOUT_MS"), "FETCH_TIMEOUT_MS")? {
            builder = builder.fetch_timeout(Duration::from_millis(ms));
        }
        if let Some(threshold) = parse_var::<usize>(read("BAN_THRESHOLD"), "BAN_THRESHOLD")? {
            builder = builder.ban_threshold(threshold);
        }
        if let Some(secs) = parse_var::<u64>(read("RPC_TIMEOUT_SECS"), "RPC_TIMEOUT_SECS")? {
            builder = builder.rpc_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(read("CYCLE_DEADLINE_SECS"), "CYCLE_DEADLINE_SECS")? {
            builder = builder.cycle_deadline(Duration::from_secs(secs));
        }
        if let Some(secs) =
            parse_var::<u64>(read("METRICS_INTERVAL_SECS"), "METRICS_INTERVAL_SECS")?
        {
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }

        builder.build()
    }

    /// JSON-RPC endpoint of the node answering `eth_call`.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Basic-auth credentials for the node, when configured.
    pub fn rpc_credentials(&self) -> Option<(&str, &str)> {
        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Gateway base URL, always ending in `/`.
    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    /// Entities per chunk in the pointer stages.
    pub fn contract_batch_size(&self) -> usize {
        self.contract_batch_size
    }

    /// Entities per chunk in the document stages.
    pub fn ipfs_batch_size(&self) -> usize {
        self.ipfs_batch_size
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Failures an address may accumulate before it is banned.
    pub fn ban_threshold(&self) -> usize {
        self.ban_threshold
    }

    /// Per-call timeout applied to the JSON-RPC client.
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn cycle_deadline(&self) -> Option<Duration> {
        self.cycle_deadline
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url, "rpc_url")?;
        validate_url(&self.gateway_url, "gateway_url")?;

        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(password)) => {
                ensure_not_empty(user, "rpc_user")?;
                ensure_not_empty(password, "rpc_password")?;
            }
            (None, None) => {}
            _ => bail!("rpc_user and rpc_password must be provided together"),
        }

        if self.contract_batch_size == 0 {
            bail!("contract_batch_size must be greater than 0");
        }

        if self.ipfs_batch_size == 0 {
            bail!("ipfs_batch_size must be greater than 0");
        }

        if self.fetch_timeout.is_zero() {
            bail!("fetch_timeout must be greater than 0");
        }

        if self.ban_threshold == 0 {
            bail!("ban_threshold must be greater than 0");
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.cycle_deadline.is_some_and(|deadline| deadline.is_zero()) {
            bail!("cycle_deadline must be greater than 0 when set");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReconcilerConfigBuilder {
    rpc_url: Option<String>,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    gateway_url: Option<String>,
    contract_batch_size: Option<usize>,
    ipfs_batch_size: Option<usize>,
    fetch_timeout: Option<Duration>,
    ban_threshold: Option<usize>,
    rpc_timeout: Option<Duration>,
    cycle_deadline: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl ReconcilerConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn rpc_user(mut self, user: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self
    }

    pub fn rpc_password(mut self, password: impl Into<String>) -> Self {
        self.rpc_password = Some(password.into());
        self
    }

    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    pub fn contract_batch_size(mut self, size: usize) -> Self {
        self.contract_batch_size = Some(size);
        self
    }

    pub fn ipfs_batch_size(mut self, size: usize) -> Self {
        self.ipfs_batch_size = Some(size);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn ban_threshold(mut self, threshold: usize) -> Self {
        self.ban_threshold = Some(threshold);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn cycle_deadline(mut self, deadline: Duration) -> Self {
        self.cycle_deadline = Some(deadline);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<ReconcilerConfig> {
        let params = ReconcilerConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            rpc_user: self.rpc_user,
            rpc_password: self.rpc_password,
            gateway_url: self
                .gateway_url
                .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_owned()),
            contract_batch_size: self
                .contract_batch_size
                .unwrap_or(DEFAULT_CONTRACT_BATCH_SIZE),
            ipfs_batch_size: self.ipfs_batch_size.unwrap_or(DEFAULT_IPFS_BATCH_SIZE),
            fetch_timeout: self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            ban_threshold: self.ban_threshold.unwrap_or(DEFAULT_BAN_THRESHOLD),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            cycle_deadline: self.cycle_deadline,
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        ReconcilerConfig::new(params)
    }
}

fn parse_var<T>(value: Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("failed to parse {ENV_PREFIX}{name}='{raw}'"))
        })
        .transpose()
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str, field: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{field} must start with http:// or https://");
    }
    Ok(())
}
