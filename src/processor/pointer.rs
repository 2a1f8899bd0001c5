//! Pointer refresh stage: re-reads each queued entity's on-chain pointer and
//! decides whether the stored value must be rewritten.

use crate::entities::{ContractEntity, EntityCache, ManagedEntity, TokenEntity};
use crate::processor::batch::run_in_batches;
use crate::rpc::PointerReader;
use anyhow::Result;
use futures::future::BoxFuture;

/// Kind-specific half of the pointer stage.
pub trait PointerRefresh: ManagedEntity {
    fn read_pointer<'a>(&'a self, reader: &'a dyn PointerReader) -> BoxFuture<'a, Result<String>>;

    /// Whether a successfully read `pointer` should be written back.
    fn should_store_pointer(&self, pointer: &str, forced: bool) -> bool {
        forced || self.pointer() != Some(pointer)
    }
}

impl PointerRefresh for ContractEntity {
    fn read_pointer<'a>(&'a self, reader: &'a dyn PointerReader) -> BoxFuture<'a, Result<String>> {
        reader.read_contract_pointer(&self.id)
    }
}

impl PointerRefresh for TokenEntity {
    fn read_pointer<'a>(&'a self, reader: &'a dyn PointerReader) -> BoxFuture<'a, Result<String>> {
        reader.read_token_pointer(&self.contract_id, &self.numeric_id)
    }

    // Tokens without a document are rewritten even when the pointer matches.
    fn should_store_pointer(&self, pointer: &str, forced: bool) -> bool {
        forced || !self.has_document() || self.pointer() != Some(pointer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PointerOutcome {
    Failed,
    Confirmed,
    Updated,
}

/// Runs the pointer stage over every entity in the cache's pointer queue.
pub(crate) async fn refresh_pointers<E: PointerRefresh>(
    cache: &EntityCache<E>,
    reader: &dyn PointerReader,
    batch_size: usize,
    timestamp: u64,
) -> Vec<PointerOutcome> {
    let queued = cache.pointer_queue().await;
    run_in_batches(queued, batch_size, |entity| {
        refresh_pointer(cache, reader, entity, timestamp)
    })
    .await
}

async fn refresh_pointer<E: PointerRefresh>(
    cache: &EntityCache<E>,
    reader: &dyn PointerReader,
    entity: E,
    timestamp: u64,
) -> PointerOutcome {
    let id = entity.id();

    let pointer = match entity.read_pointer(reader).await {
        Ok(pointer) => pointer,
        Err(err) => {
            tracing::warn!(kind = %E::KIND, id, error = %err, "pointer read failed; keeping stored pointer");
            cache.revoke_pointer(id).await;
            return PointerOutcome::Failed;
        }
    };

    let forced = cache.is_forced(id).await;
    let outcome = if entity.should_store_pointer(&pointer, forced) {
        tracing::debug!(kind = %E::KIND, id, pointer = %pointer, forced, "storing pointer");
        cache
            .update(id, |stored| stored.set_pointer(pointer, timestamp))
            .await;
        cache.mark_unsaved(id).await;
        PointerOutcome::Updated
    } else {
        PointerOutcome::Confirmed
    };

    cache.confirm_pointer(id).await;
    outcome
}
