//! Memory types and operations
//!
//! The write path ([`IngestionPipeline`]), the read path
//! ([`RetrievalPipeline`]) and the [`MemoryService`] tying them to one
//! store and one embedding provider.

pub mod ingestion;
pub mod retrieval;
pub mod service;
pub mod similarity;
pub mod types;

pub use ingestion::{IngestionPipeline, StoreRequest, StoredMemory};
pub use retrieval::{RecallOutcome, RecallRequest, RetrievalPipeline};
pub use service::{MemoryService, MemoryStats};
pub use types::{Category, MemoryRecord, NewMemory, Priority, ScoredMemory};
