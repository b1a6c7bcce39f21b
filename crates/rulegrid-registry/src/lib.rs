//! rulegrid-registry — persistent registry of rule-execution runtime instances.
//!
//! Backed by [redb](https://docs.rs/redb). One row per (instance, version);
//! an index table tracks the single active instance per ruleset identity.
//! Deployment history is an append-only audit table.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Instance rows are keyed `{container_name}@{version:010}` so versions of
//! the same instance sort together and the newest is a cheap suffix scan.
//! redb commits one write transaction at a time, which is what gives
//! `register` its required atomicity: deactivating the previous active row
//! and inserting the replacement either both happen or neither does, and no
//! two registrations for the same identity can interleave.
//!
//! The `RegistryStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and is shared across the deploy pipeline, the health
//! monitor, and the request router.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use store::RegistryStore;
pub use types::*;
