//! Managed entities (contracts and tokens) and the per-kind cache that tracks
//! which of them still need their pointer or document reconciled.

pub mod cache;
pub mod contract;
pub mod token;

pub use cache::EntityCache;
pub use contract::ContractEntity;
pub use token::{TokenEntity, TokenIndex};

use std::fmt;

/// Which family of entity a cache or stage operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Contract,
    Token,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Contract => f.write_str("contract"),
            EntityKind::Token => f.write_str("token"),
        }
    }
}

/// Capabilities shared by every reconciled entity: a stable identity, an
/// on-chain pointer, and an optional fetched document.
pub trait ManagedEntity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn pointer(&self) -> Option<&str>;

    /// Stores `pointer` and stamps the entity with `updated_at` (seconds).
    fn set_pointer(&mut self, pointer: String, updated_at: u64);

    fn has_document(&self) -> bool;

    fn last_updated_at(&self) -> Option<u64>;
}
