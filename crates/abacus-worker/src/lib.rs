//! Worker pool for the abacus evaluation service.
//!
//! Workers poll the coordinator for ready operations, apply one of the four
//! operators, sleep the configured per-operator latency to simulate real
//! work, and report the result (or a division-by-zero error) back. They
//! hold no state of their own, so any number can be started, stopped and
//! restarted independently of the coordinator.

#![warn(missing_docs)]

mod compute;
mod pool;

pub use compute::{apply_operator, execute};
pub use pool::WorkerPool;
