//! Hooks implemented by the surrounding indexer: where reconciled entities go
//! and which entities the ingestion side considers stale.

use crate::entities::ManagedEntity;

/// Receives entities the pipeline changed. Fire-and-forget: failures are the
/// implementor's concern and never reach the pipeline.
pub trait EntityStore<E: ManagedEntity>: Send + Sync {
    fn persist(&self, entity: &E);
}

/// External dirty flag, queried once per cycle for every buffered entity.
pub trait DirtySource<E: ManagedEntity>: Send + Sync {
    fn is_dirty(&self, entity: &E) -> bool;
}

/// Dirty source for deployments without an ingestion-side dirty flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverDirty;

impl<E: ManagedEntity> DirtySource<E> for NeverDirty {
    fn is_dirty(&self, _entity: &E) -> bool {
        false
    }
}
