//! boothcache core: the shared reactive cache and realtime sync layer for
//! event administration data (companies, yearly subscriptions, booth
//! markers and company-to-booth assignments).
//!
//! - [`backend`]: query and push contracts, REST and in-memory adapters
//! - [`sync`]: cache registry, single-flight loads, debounced push reloads
//! - [`compose`]: joins marker tables into the composed map view
//! - [`resources`]: the resource catalogue and its mutations
//! - [`snapshot`]: offline "last known good" persistence

pub mod backend;
pub mod compose;
pub mod config;
pub mod error;
pub mod models;
pub mod mutation;
pub mod resources;
pub mod snapshot;
pub mod sync;

pub use config::Config;
pub use error::StoreError;
pub use mutation::MutationResult;
pub use sync::{CacheRegistry, Connectivity, ResourceHandle, ResourceState, SyncSettings};
