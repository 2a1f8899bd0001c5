//! Per-kind entity buffer.
//!
//! Besides the entities themselves the cache tracks four id sets:
//! - `pointer_queue`: entities waiting for a pointer read. Ids stay here until
//!   their document is merged, so failed work is picked up again next cycle.
//! - `document_queue`: entities whose pointer was confirmed by a successful
//!   read. Only the pointer stage adds to it and a failed read removes from it.
//! - `forced`: entities the dirty-flag scan of the current cycle marked dirty.
//! - `unsaved`: entities mutated since they were last handed to storage.

use super::ManagedEntity;
use crate::runtime::collaborators::DirtySource;
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::Mutex;

struct CacheState<E> {
    entities: HashMap<String, E>,
    pointer_queue: BTreeSet<String>,
    document_queue: BTreeSet<String>,
    forced: HashSet<String>,
    unsaved: BTreeSet<String>,
}

impl<E> CacheState<E> {
    fn new() -> Self {
        Self {
            entities: HashMap::new(),
            pointer_queue: BTreeSet::new(),
            document_queue: BTreeSet::new(),
            forced: HashSet::new(),
            unsaved: BTreeSet::new(),
        }
    }

    fn snapshot(&self, ids: &BTreeSet<String>) -> Vec<E>
    where
        E: Clone,
    {
        ids.iter()
            .filter_map(|id| self.entities.get(id).cloned())
            .collect()
    }
}

/// Async, internally synchronized buffer of entities of one kind.
pub struct EntityCache<E> {
    state: Mutex<CacheState<E>>,
}

impl<E: ManagedEntity> Default for EntityCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ManagedEntity> EntityCache<E> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::new()),
        }
    }

    /// Inserts or replaces an entity without touching its queue membership.
    pub async fn insert(&self, entity: E) {
        let mut state = self.state.lock().await;
        state.entities.insert(entity.id().to_owned(), entity);
    }

    /// Inserts an entity and queues it for a pointer read.
    pub async fn insert_for_refresh(&self, entity: E) {
        let mut state = self.state.lock().await;
        let id = entity.id().to_owned();
        state.entities.insert(id.clone(), entity);
        state.pointer_queue.insert(id);
    }

    /// Queues a known entity for a pointer read. Returns false for unknown ids.
    pub async fn enqueue(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        if !state.entities.contains_key(id) {
            return false;
        }
        state.pointer_queue.insert(id.to_owned());
        true
    }

    pub async fn remove(&self, id: &str) -> Option<E> {
        let mut state = self.state.lock().await;
        state.pointer_queue.remove(id);
        state.document_queue.remove(id);
        state.forced.remove(id);
        state.unsaved.remove(id);
        state.entities.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<E> {
        self.state.lock().await.entities.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entities.is_empty()
    }

    /// Asks `source` once per buffered entity whether it is dirty. Dirty
    /// entities are queued for a pointer read and flagged as forced for the
    /// rest of the cycle; flags from the previous scan are discarded.
    pub async fn scan_dirty(&self, source: &dyn DirtySource<E>) -> usize {
        let mut state = self.state.lock().await;
        let dirty: Vec<String> = state
            .entities
            .values()
            .filter(|entity| source.is_dirty(entity))
            .map(|entity| entity.id().to_owned())
            .collect();

        state.forced.clear();
        for id in &dirty {
            state.pointer_queue.insert(id.clone());
            state.forced.insert(id.clone());
        }
        dirty.len()
    }

    /// Flags a known entity as dirty for the current cycle.
    pub async fn force_refresh(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        if !state.entities.contains_key(id) {
            return false;
        }
        state.pointer_queue.insert(id.to_owned());
        state.forced.insert(id.to_owned());
        true
    }

    pub async fn is_forced(&self, id: &str) -> bool {
        self.state.lock().await.forced.contains(id)
    }

    /// Entities waiting for a pointer read, in id order.
    pub async fn pointer_queue(&self) -> Vec<E> {
        let state = self.state.lock().await;
        state.snapshot(&state.pointer_queue)
    }

    /// Entities with a confirmed pointer waiting for a document, in id order.
    pub async fn document_queue(&self) -> Vec<E> {
        let state = self.state.lock().await;
        state.snapshot(&state.document_queue)
    }

    pub async fn in_pointer_queue(&self, id: &str) -> bool {
        self.state.lock().await.pointer_queue.contains(id)
    }

    pub async fn in_document_queue(&self, id: &str) -> bool {
        self.state.lock().await.document_queue.contains(id)
    }

    /// Records a successful pointer read for `id`.
    pub async fn confirm_pointer(&self, id: &str) {
        let mut state = self.state.lock().await;
        if state.entities.contains_key(id) {
            state.document_queue.insert(id.to_owned());
        }
    }

    /// Records a failed pointer read: the entity is not eligible for a
    /// document fetch until a later read succeeds.
    pub async fn revoke_pointer(&self, id: &str) {
        self.state.lock().await.document_queue.remove(id);
    }

    /// Applies `mutate` to the stored entity and returns the updated copy.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Option<E>
    where
        F: FnOnce(&mut E),
    {
        let mut state = self.state.lock().await;
        let entity = state.entities.get_mut(id)?;
        mutate(entity);
        Some(entity.clone())
    }

    pub async fn mark_unsaved(&self, id: &str) {
        let mut state = self.state.lock().await;
        if state.entities.contains_key(id) {
            state.unsaved.insert(id.to_owned());
        }
    }

    pub async fn is_unsaved(&self, id: &str) -> bool {
        self.state.lock().await.unsaved.contains(id)
    }

    /// Removes `id` from every queue after its document was merged and saved.
    pub async fn complete(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.pointer_queue.remove(id);
        state.document_queue.remove(id);
        state.forced.remove(id);
        state.unsaved.remove(id);
    }

    /// Drains the set of mutated-but-unsaved entities, in id order.
    pub async fn take_unsaved(&self) -> Vec<E> {
        let mut state = self.state.lock().await;
        let ids = std::mem::take(&mut state.unsaved);
        state.snapshot(&ids)
    }
}
