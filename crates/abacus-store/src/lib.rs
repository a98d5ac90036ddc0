//! Operation store implementations.
//!
//! Two backends for [`abacus_core::store::OperationStore`]:
//!
//! - [`MemoryStore`]: deterministic in-memory store; every primitive is one
//!   mutex-guarded critical section. Default backend for tests and
//!   single-process runs.
//! - [`SqliteStore`]: durable SQLite store; concurrency-critical transitions
//!   are conditional UPDATEs, so coordinator and workers can be restarted
//!   independently without losing queue state.

#![warn(missing_docs)]

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
