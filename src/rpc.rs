//! JSON-RPC plumbing for reading metadata pointers from EVM contracts:
//! `eth_call` encoding, circuit breaker, retry policy, and metrics.

pub mod abi;
pub mod circuit_breaker;
pub mod client;
pub mod metrics;
pub mod options;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreakerError, CircuitBreakerSnapshot, CircuitState, NodeAnswer, RpcCircuitBreaker,
};
pub use client::{EvmRpcClient, PointerReader, RpcError};
pub use metrics::RpcMetricsSnapshot;
pub use options::RpcClientOptions;
