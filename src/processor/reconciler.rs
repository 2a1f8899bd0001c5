//! Cycle orchestration: sequences the pointer and document stages for both
//! entity kinds and folds their outcomes into a [`CycleReport`].

use crate::entities::{ContractEntity, EntityCache, ManagedEntity, TokenEntity};
use crate::metadata::MetadataFetcher;
use crate::processor::document::{refresh_documents, DocumentOutcome};
use crate::processor::pointer::{refresh_pointers, PointerOutcome};
use crate::rpc::PointerReader;
use crate::runtime::collaborators::{DirtySource, EntityStore, NeverDirty};
use crate::runtime::config::ReconcilerConfig;
use crate::runtime::telemetry::Telemetry;
use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Per-kind counters for one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KindReport {
    pub dirty: usize,
    pub pointers_read: usize,
    pub pointer_failures: usize,
    pub pointers_updated: usize,
    pub documents_merged: usize,
    pub document_failures: usize,
    pub missing_pointers: usize,
    pub persisted: usize,
}

impl KindReport {
    fn record_pointers(&mut self, outcomes: &[PointerOutcome]) {
        self.pointers_read += outcomes.len();
        for outcome in outcomes {
            match outcome {
                PointerOutcome::Failed => self.pointer_failures += 1,
                PointerOutcome::Updated => self.pointers_updated += 1,
                PointerOutcome::Confirmed => {}
            }
        }
    }

    fn record_documents(&mut self, outcomes: &[DocumentOutcome]) {
        for outcome in outcomes {
            match outcome {
                DocumentOutcome::Merged => {
                    self.documents_merged += 1;
                    self.persisted += 1;
                }
                DocumentOutcome::Failed => self.document_failures += 1,
                DocumentOutcome::MissingPointer => self.missing_pointers += 1,
            }
        }
    }

    fn merged_with(self, other: KindReport) -> KindReport {
        KindReport {
            dirty: self.dirty + other.dirty,
            pointers_read: self.pointers_read + other.pointers_read,
            pointer_failures: self.pointer_failures + other.pointer_failures,
            pointers_updated: self.pointers_updated + other.pointers_updated,
            documents_merged: self.documents_merged + other.documents_merged,
            document_failures: self.document_failures + other.document_failures,
            missing_pointers: self.missing_pointers + other.missing_pointers,
            persisted: self.persisted + other.persisted,
        }
    }
}

/// What one reconciliation cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub timestamp: u64,
    pub contracts: KindReport,
    pub tokens: KindReport,
}

impl CycleReport {
    /// Sum of both kinds.
    pub fn totals(&self) -> KindReport {
        self.contracts.merged_with(self.tokens)
    }
}

pub struct ReconcilerParams {
    pub reader: Arc<dyn PointerReader>,
    pub fetcher: Arc<dyn MetadataFetcher>,
    pub contracts: Arc<EntityCache<ContractEntity>>,
    pub tokens: Arc<EntityCache<TokenEntity>>,
    pub contract_store: Arc<dyn EntityStore<ContractEntity>>,
    pub token_store: Arc<dyn EntityStore<TokenEntity>>,
    pub contract_dirty: Arc<dyn DirtySource<ContractEntity>>,
    pub token_dirty: Arc<dyn DirtySource<TokenEntity>>,
    pub contract_batch_size: usize,
    pub ipfs_batch_size: usize,
    pub cycle_deadline: Option<Duration>,
    pub telemetry: Arc<Telemetry>,
}

impl ReconcilerParams {
    /// Params sized from `config`, with empty caches and no dirty flags.
    /// Pass the same `telemetry` the fetcher was built with so gateway and
    /// cycle counters land in one sink. Fields can be overridden before
    /// building.
    pub fn from_config(
        config: &ReconcilerConfig,
        reader: Arc<dyn PointerReader>,
        fetcher: Arc<dyn MetadataFetcher>,
        contract_store: Arc<dyn EntityStore<ContractEntity>>,
        token_store: Arc<dyn EntityStore<TokenEntity>>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            reader,
            fetcher,
            contracts: Arc::new(EntityCache::new()),
            tokens: Arc::new(EntityCache::new()),
            contract_store,
            token_store,
            contract_dirty: Arc::new(NeverDirty),
            token_dirty: Arc::new(NeverDirty),
            contract_batch_size: config.contract_batch_size(),
            ipfs_batch_size: config.ipfs_batch_size(),
            cycle_deadline: config.cycle_deadline(),
            telemetry,
        }
    }
}

/// Owns the caches and collaborators; one `reconcile_cycle` call per trigger.
pub struct Reconciler {
    reader: Arc<dyn PointerReader>,
    fetcher: Arc<dyn MetadataFetcher>,
    contracts: Arc<EntityCache<ContractEntity>>,
    tokens: Arc<EntityCache<TokenEntity>>,
    contract_store: Arc<dyn EntityStore<ContractEntity>>,
    token_store: Arc<dyn EntityStore<TokenEntity>>,
    contract_dirty: Arc<dyn DirtySource<ContractEntity>>,
    token_dirty: Arc<dyn DirtySource<TokenEntity>>,
    contract_batch_size: usize,
    ipfs_batch_size: usize,
    cycle_deadline: Option<Duration>,
    telemetry: Arc<Telemetry>,
}

impl Reconciler {
    pub fn new(params: ReconcilerParams) -> Result<Self> {
        if params.contract_batch_size == 0 {
            bail!("contract_batch_size must be greater than 0");
        }
        if params.ipfs_batch_size == 0 {
            bail!("ipfs_batch_size must be greater than 0");
        }
        if params.cycle_deadline.is_some_and(|deadline| deadline.is_zero()) {
            bail!("cycle_deadline must be greater than 0 when set");
        }

        Ok(Self {
            reader: params.reader,
            fetcher: params.fetcher,
            contracts: params.contracts,
            tokens: params.tokens,
            contract_store: params.contract_store,
            token_store: params.token_store,
            contract_dirty: params.contract_dirty,
            token_dirty: params.token_dirty,
            contract_batch_size: params.contract_batch_size,
            ipfs_batch_size: params.ipfs_batch_size,
            cycle_deadline: params.cycle_deadline,
            telemetry: params.telemetry,
        })
    }

    pub fn contracts(&self) -> &Arc<EntityCache<ContractEntity>> {
        &self.contracts
    }

    pub fn tokens(&self) -> &Arc<EntityCache<TokenEntity>> {
        &self.tokens
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Runs one cycle stamped with the current wall-clock time.
    pub async fn reconcile_cycle(&self) -> Result<CycleReport> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        self.reconcile_cycle_at(timestamp).await
    }

    /// Runs one cycle; pointer updates are stamped with `timestamp` (seconds).
    ///
    /// Fails only when the configured cycle deadline expires. In-flight work
    /// is then dropped while queue membership is kept for the next cycle.
    pub async fn reconcile_cycle_at(&self, timestamp: u64) -> Result<CycleReport> {
        let Some(deadline) = self.cycle_deadline else {
            return Ok(self.run_cycle(timestamp).await);
        };

        match tokio::time::timeout(deadline, self.run_cycle(timestamp)).await {
            Ok(report) => Ok(report),
            Err(_) => {
                self.telemetry.record_cycle_timeout();
                tracing::warn!(
                    timestamp,
                    deadline_ms = deadline.as_millis() as u64,
                    "reconciliation cycle exceeded its deadline"
                );
                bail!("reconciliation cycle exceeded deadline of {deadline:?}")
            }
        }
    }

    async fn run_cycle(&self, timestamp: u64) -> CycleReport {
        let mut report = CycleReport {
            timestamp,
            ..CycleReport::default()
        };

        report.contracts.dirty = self.contracts.scan_dirty(self.contract_dirty.as_ref()).await;
        report.tokens.dirty = self.tokens.scan_dirty(self.token_dirty.as_ref()).await;

        let contract_pointers = refresh_pointers(
            &*self.contracts,
            self.reader.as_ref(),
            self.contract_batch_size,
            timestamp,
        )
        .await;
        report.contracts.record_pointers(&contract_pointers);

        let (contract_documents, token_pointers) = tokio::join!(
            refresh_documents(
                &*self.contracts,
                self.fetcher.as_ref(),
                self.contract_store.as_ref(),
                self.ipfs_batch_size,
            ),
            refresh_pointers(
                &*self.tokens,
                self.reader.as_ref(),
                self.contract_batch_size,
                timestamp,
            ),
        );
        report.contracts.record_documents(&contract_documents);
        report.tokens.record_pointers(&token_pointers);

        let token_documents = refresh_documents(
            &*self.tokens,
            self.fetcher.as_ref(),
            self.token_store.as_ref(),
            self.ipfs_batch_size,
        )
        .await;
        report.tokens.record_documents(&token_documents);

        report.contracts.persisted +=
            flush_unsaved(&*self.contracts, self.contract_store.as_ref()).await;
        report.tokens.persisted += flush_unsaved(&*self.tokens, self.token_store.as_ref()).await;

        let totals = report.totals();
        tracing::info!(
            timestamp,
            dirty = totals.dirty,
            pointers_read = totals.pointers_read,
            pointer_failures = totals.pointer_failures,
            pointers_updated = totals.pointers_updated,
            documents_merged = totals.documents_merged,
            document_failures = totals.document_failures,
            missing_pointers = totals.missing_pointers,
            persisted = totals.persisted,
            "reconciliation cycle finished"
        );
        self.telemetry.record_cycle(&report);
        report
    }
}

/// Persists entities whose pointer changed but whose document did not merge.
async fn flush_unsaved<E: ManagedEntity>(cache: &EntityCache<E>, store: &dyn EntityStore<E>) -> usize {
    let pending = cache.take_unsaved().await;
    for entity in &pending {
        tracing::debug!(kind = %E::KIND, id = entity.id(), "persisting pointer update");
        store.persist(entity);
    }
    pending.len()
}
