pub mod entities;
pub mod metadata;
pub mod processor;
pub mod rpc;
pub mod runtime;

pub use entities::{ContractEntity, EntityCache, EntityKind, ManagedEntity, TokenEntity, TokenIndex};
pub use metadata::{
    Attribute, ContractMetadata, FailureTracker, FetchError, GatewayClient, IpfsNormalizer,
    MetadataDocument, MetadataFetcher,
};
pub use processor::batch::run_in_batches;
pub use processor::document::DocumentRefresh;
pub use processor::pointer::PointerRefresh;
pub use processor::reconciler::{CycleReport, KindReport, Reconciler, ReconcilerParams};
pub use rpc::circuit_breaker::{
    CircuitBreakerSnapshot, CircuitState, NodeAnswer, RpcCircuitBreaker,
};
pub use rpc::{EvmRpcClient, PointerReader, RpcClientOptions, RpcError};
pub use runtime::collaborators::{DirtySource, EntityStore, NeverDirty};
pub use runtime::config::{ReconcilerConfig, ReconcilerConfigBuilder, ReconcilerConfigParams};
pub use runtime::runner::{CycleTrigger, Runner};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
