//! Local persistence of "last known good" composed views for offline use.
//!
//! A snapshot is written after every successful load of a resource that
//! opts in, and read back only when the environment reports offline at
//! mount time. Payloads are JSON wrapped with the time they were saved.

pub mod store;

pub use store::{FileKvStore, KvStore, MemoryKvStore, Snapshot, SnapshotStore};
