//! Off-chain metadata plumbing: IPFS pointer normalization, the per-address
//! failure tracker, document projections, and the gateway fetcher.

pub mod document;
pub mod failures;
pub mod gateway;
pub mod ipfs;

pub use document::{Attribute, ContractMetadata, MetadataDocument};
pub use failures::{FailureTracker, DEFAULT_BAN_THRESHOLD};
pub use gateway::{FetchError, GatewayClient, MetadataFetcher};
pub use ipfs::{IpfsNormalizer, DEFAULT_GATEWAY_URL};
