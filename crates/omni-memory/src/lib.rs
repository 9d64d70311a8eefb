//! Omni Memory - semantic memory engine for multi-agent LLM systems
//!
//! Stores free-text memories as embedding vectors with categorical
//! metadata, and recalls them by cosine similarity to a query, narrowed
//! by exact-match filters. Exposed as two tools over HTTP.

pub mod config;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod server;
pub mod storage;
pub mod testing;
pub mod tools;

pub use error::MemoryError;
