//! Document refresh stage: fetches the document behind each confirmed
//! pointer and merges it into the cached entity.

use crate::entities::{ContractEntity, EntityCache, ManagedEntity, TokenEntity};
use crate::metadata::{ContractMetadata, MetadataDocument, MetadataFetcher};
use crate::processor::batch::run_in_batches;
use crate::runtime::collaborators::EntityStore;
use futures::future::BoxFuture;

/// Kind-specific half of the document stage: which projection to fetch and
/// how it lands on the entity.
pub trait DocumentRefresh: ManagedEntity {
    type Document: Send + 'static;

    fn fetch_document<'a>(
        fetcher: &'a dyn MetadataFetcher,
        pointer: &'a str,
    ) -> BoxFuture<'a, Option<Self::Document>>;

    fn merge_document(&mut self, document: Self::Document);
}

impl DocumentRefresh for ContractEntity {
    type Document = ContractMetadata;

    fn fetch_document<'a>(
        fetcher: &'a dyn MetadataFetcher,
        pointer: &'a str,
    ) -> BoxFuture<'a, Option<ContractMetadata>> {
        fetcher.fetch_contract_metadata(pointer)
    }

    fn merge_document(&mut self, document: ContractMetadata) {
        self.apply_metadata(document);
    }
}

impl DocumentRefresh for TokenEntity {
    type Document = MetadataDocument;

    fn fetch_document<'a>(
        fetcher: &'a dyn MetadataFetcher,
        pointer: &'a str,
    ) -> BoxFuture<'a, Option<MetadataDocument>> {
        fetcher.fetch_token_metadata(pointer)
    }

    fn merge_document(&mut self, document: MetadataDocument) {
        self.apply_metadata(document);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocumentOutcome {
    MissingPointer,
    Failed,
    Merged,
}

/// Runs the document stage over every entity in the cache's document queue.
pub(crate) async fn refresh_documents<E: DocumentRefresh>(
    cache: &EntityCache<E>,
    fetcher: &dyn MetadataFetcher,
    store: &dyn EntityStore<E>,
    batch_size: usize,
) -> Vec<DocumentOutcome> {
    let queued = cache.document_queue().await;
    run_in_batches(queued, batch_size, |entity| {
        refresh_document(cache, fetcher, store, entity)
    })
    .await
}

async fn refresh_document<E: DocumentRefresh>(
    cache: &EntityCache<E>,
    fetcher: &dyn MetadataFetcher,
    store: &dyn EntityStore<E>,
    entity: E,
) -> DocumentOutcome {
    let id = entity.id();

    let Some(pointer) = entity.pointer().filter(|pointer| !pointer.trim().is_empty()) else {
        tracing::warn!(kind = %E::KIND, id, "no pointer stored; skipping document fetch");
        return DocumentOutcome::MissingPointer;
    };

    let Some(document) = E::fetch_document(fetcher, pointer).await else {
        tracing::debug!(kind = %E::KIND, id, pointer, "document unavailable; will retry next cycle");
        return DocumentOutcome::Failed;
    };

    let Some(merged) = cache
        .update(id, |stored| stored.merge_document(document))
        .await
    else {
        tracing::debug!(kind = %E::KIND, id, "entity left the cache before its document merged");
        return DocumentOutcome::Failed;
    };

    store.persist(&merged);
    cache.complete(id).await;
    tracing::info!(kind = %E::KIND, id, pointer, "metadata merged");
    DocumentOutcome::Merged
}
