//! In-memory collaborators shared by the stage and reconciler tests.

use crate::entities::{ManagedEntity, TokenIndex};
use crate::metadata::{ContractMetadata, MetadataDocument, MetadataFetcher};
use crate::rpc::PointerReader;
use crate::runtime::collaborators::EntityStore;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Answers pointer reads from a fixed map keyed by contract id, or by
/// `<contract>-<index>` for tokens. Unknown keys fail like a revert.
#[derive(Default)]
pub(crate) struct StubReader {
    pointers: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl StubReader {
    pub(crate) fn with(mut self, key: &str, pointer: &str) -> Self {
        self.pointers.insert(key.to_owned(), pointer.to_owned());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls poisoned").clone()
    }

    fn answer(&self, key: String) -> Result<String> {
        self.calls.lock().expect("calls poisoned").push(key.clone());
        self.pointers
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("execution reverted for {key}"))
    }
}

impl PointerReader for StubReader {
    fn read_contract_pointer<'a>(&'a self, contract_id: &'a str) -> BoxFuture<'a, Result<String>> {
        let answer = self.answer(contract_id.to_owned());
        Box::pin(async move { answer })
    }

    fn read_token_pointer<'a>(
        &'a self,
        contract_id: &'a str,
        token_index: &'a TokenIndex,
    ) -> BoxFuture<'a, Result<String>> {
        let answer = self.answer(format!("{contract_id}-{token_index}"));
        Box::pin(async move { answer })
    }
}

/// Serves JSON documents keyed by raw pointer; unknown pointers yield `None`.
#[derive(Default)]
pub(crate) struct StubFetcher {
    documents: HashMap<String, Value>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub(crate) fn with(mut self, pointer: &str, document: Value) -> Self {
        self.documents.insert(pointer.to_owned(), document);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls poisoned").clone()
    }

    fn lookup<T>(&self, pointer: &str, decode: fn(&[u8]) -> serde_json::Result<T>) -> Option<T> {
        self.calls
            .lock()
            .expect("calls poisoned")
            .push(pointer.to_owned());
        let document = self.documents.get(pointer)?;
        let bytes = serde_json::to_vec(document).ok()?;
        decode(&bytes).ok()
    }
}

impl MetadataFetcher for StubFetcher {
    fn fetch_token_metadata<'a>(
        &'a self,
        pointer: &'a str,
    ) -> BoxFuture<'a, Option<MetadataDocument>> {
        let document = self.lookup(pointer, MetadataDocument::from_json_slice);
        Box::pin(async move { document })
    }

    fn fetch_contract_metadata<'a>(
        &'a self,
        pointer: &'a str,
    ) -> BoxFuture<'a, Option<ContractMetadata>> {
        let document = self.lookup(pointer, ContractMetadata::from_json_slice);
        Box::pin(async move { document })
    }
}

pub(crate) struct RecordingStore<E> {
    persisted: Mutex<Vec<E>>,
}

impl<E> Default for RecordingStore<E> {
    fn default() -> Self {
        Self {
            persisted: Mutex::new(Vec::new()),
        }
    }
}

impl<E: ManagedEntity> RecordingStore<E> {
    pub(crate) fn persisted(&self) -> Vec<E> {
        self.persisted.lock().expect("store poisoned").clone()
    }

    pub(crate) fn count_for(&self, id: &str) -> usize {
        self.persisted
            .lock()
            .expect("store poisoned")
            .iter()
            .filter(|entity| entity.id() == id)
            .count()
    }
}

impl<E: ManagedEntity> EntityStore<E> for RecordingStore<E> {
    fn persist(&self, entity: &E) {
        self.persisted
            .lock()
            .expect("store poisoned")
            .push(entity.clone());
    }
}
