//! The reconciliation pipeline: batch scheduling, the pointer and document
//! stages, and the per-cycle orchestrator.

pub mod batch;
pub mod document;
pub mod pointer;
pub mod reconciler;

#[cfg(test)]
pub(crate) mod test_support;
