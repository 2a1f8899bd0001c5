//! Rewrites `ipfs://` pointers into addresses served by an HTTP gateway.

use anyhow::{bail, Result};

/// Public gateway used when none is configured.
pub const DEFAULT_GATEWAY_URL: &str = "https://moonsama.mypinata.cloud/";

const IPFS_SCHEME: &str = "ipfs://";
const IPFS_PATH_PREFIX: &str = "ipfs://ipfs";

/// Maps content-addressed pointers onto a single gateway base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpfsNormalizer {
    gateway_base: String,
}

impl IpfsNormalizer {
    /// Builds a normalizer for `gateway_base`, which must be an http(s) URL.
    /// A trailing `/` is appended when missing.
    pub fn new(gateway_base: impl Into<String>) -> Result<Self> {
        let mut gateway_base = gateway_base.into().trim().to_owned();
        if !(gateway_base.starts_with("http://") || gateway_base.starts_with("https://")) {
            bail!("gateway_url must start with http:// or https://");
        }
        if !gateway_base.ends_with('/') {
            gateway_base.push('/');
        }
        Ok(Self { gateway_base })
    }

    pub fn gateway_base(&self) -> &str {
        &self.gateway_base
    }

    /// Returns a resolvable address for `pointer`.
    ///
    /// Pointers starting with `ipfs://ipfs` only have the scheme swapped for
    /// the gateway base, whatever follows. Other `ipfs://<cid>` pointers get an
    /// `ipfs/` segment added, and anything else is returned unchanged. Output
    /// always starts with the http(s) gateway base when a rewrite happens, so
    /// normalizing twice is a no-op.
    pub fn normalize(&self, pointer: &str) -> String {
        if pointer.starts_with(IPFS_PATH_PREFIX) {
            let rest = &pointer[IPFS_SCHEME.len()..];
            return format!("{}{rest}", self.gateway_base);
        }

        if let Some(rest) = pointer.strip_prefix(IPFS_SCHEME) {
            return format!("{}ipfs/{rest}", self.gateway_base);
        }

        pointer.to_owned()
    }
}
